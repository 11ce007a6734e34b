#![no_main]

//! Fuzz target for service lifecycle operations
//!
//! Tests shared (lazy, once-per-scope) vs. transient activation and scope
//! disposal.

use arbitrary::Arbitrary;
use armature::{Container, ContainerBuilder};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::{AtomicU64, Ordering};

static SHARED_COUNTER: AtomicU64 = AtomicU64::new(0);
static TRANSIENT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
struct SharedService {
    id: u64,
}

#[derive(Clone, Debug)]
struct TransientService {
    instance_id: u64,
}

#[derive(Debug, Arbitrary)]
enum LifecycleOp {
    ResolveShared,
    ResolveTransient,
    ResolveTransientMultiple(u8),
    Contains,
    CreateScopeAndResolveShared,
    DisposeScope,
}

fuzz_target!(|ops: Vec<LifecycleOp>| {
    SHARED_COUNTER.store(0, Ordering::SeqCst);
    TRANSIENT_COUNTER.store(0, Ordering::SeqCst);

    let mut builder = ContainerBuilder::new();
    builder
        .register::<SharedService, _>(|_| {
            Ok(SharedService {
                id: SHARED_COUNTER.fetch_add(1, Ordering::SeqCst),
            })
        })
        .unwrap();
    builder
        .register_transient::<TransientService, _>(|_| {
            Ok(TransientService {
                instance_id: TRANSIENT_COUNTER.fetch_add(1, Ordering::SeqCst),
            })
        })
        .unwrap();
    let root = builder.build();

    let mut scope: Option<Container> = None;

    for op in ops.into_iter().take(100) {
        match op {
            LifecycleOp::ResolveShared => {
                let r1 = root.resolve::<SharedService>();
                let r2 = root.resolve::<SharedService>();
                if let (Ok(s1), Ok(s2)) = (r1, r2) {
                    assert!(
                        std::sync::Arc::ptr_eq(&s1, &s2),
                        "shared service should resolve to the same instance within a scope"
                    );
                }
            }
            LifecycleOp::ResolveTransient => {
                let r1 = root.resolve::<TransientService>();
                let r2 = root.resolve::<TransientService>();
                if let (Ok(s1), Ok(s2)) = (r1, r2) {
                    assert!(!std::sync::Arc::ptr_eq(&s1, &s2));
                    assert_ne!(s1.instance_id, s2.instance_id);
                }
            }
            LifecycleOp::ResolveTransientMultiple(count) => {
                let count = (count % 10).max(1);
                let mut instances = Vec::new();
                for _ in 0..count {
                    if let Ok(svc) = root.resolve::<TransientService>() {
                        instances.push(svc);
                    }
                }
                for i in 0..instances.len() {
                    for j in (i + 1)..instances.len() {
                        assert!(!std::sync::Arc::ptr_eq(&instances[i], &instances[j]));
                    }
                }
            }
            LifecycleOp::Contains => {
                let _ = root.contains::<SharedService>();
                let _ = root.contains::<TransientService>();
            }
            LifecycleOp::CreateScopeAndResolveShared => {
                let s = root.begin_scope();
                let _ = s.resolve::<SharedService>();
                scope = Some(s);
            }
            LifecycleOp::DisposeScope => {
                if let Some(s) = scope.take() {
                    s.dispose();
                }
            }
        }
    }
});
