#![no_main]

//! Fuzz target for concurrent container operations
//!
//! Tests thread-safety of resolve/contains against a shared, already-built
//! container (registration happens once up front: `ContainerBuilder` is not
//! `Sync` and seals on `build()`, so there is nothing to race there).

use arbitrary::Arbitrary;
use armature::ContainerBuilder;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::thread;

#[derive(Clone, Debug, Arbitrary)]
struct SharedConfig {
    value: u32,
}

#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    Resolve,
    TryResolveMissing,
    Contains,
}

#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    thread_count: u8,
    ops_per_thread: Vec<ThreadOp>,
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let mut builder = ContainerBuilder::new();
    builder
        .register_singleton::<SharedConfig, _>(|_| Ok(SharedConfig { value: 42 }))
        .unwrap();
    let container = Arc::new(builder.build());

    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops_per_thread;

    let mut handles = Vec::new();
    for _ in 0..thread_count {
        let container = Arc::clone(&container);
        let ops = ops.clone();

        handles.push(thread::spawn(move || {
            for op in ops.into_iter().take(50) {
                match op {
                    ThreadOp::Resolve => {
                        let _ = container.resolve::<SharedConfig>();
                    }
                    ThreadOp::TryResolveMissing => {
                        let _ = container.try_resolve::<u64>();
                    }
                    ThreadOp::Contains => {
                        let _ = container.contains::<SharedConfig>();
                        let _ = container.contains::<u64>();
                    }
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }

    let _ = container.try_resolve::<SharedConfig>();
    let _ = container.len();
});
