#![no_main]

//! Fuzz target for basic container operations
//!
//! Tests registration and resolution with various data patterns. Registration
//! ops apply while building the container (sealing happens once, like any
//! real use of `ContainerBuilder`); resolution/query ops then run against the
//! built container.

use arbitrary::Arbitrary;
use armature::ContainerBuilder;
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
struct SmallService {
    id: u32,
    name: String,
}

#[derive(Clone, Debug, Arbitrary)]
struct MediumService {
    id: u64,
    data: Vec<u8>,
    config: ServiceConfig,
}

#[derive(Clone, Debug, Arbitrary)]
struct ServiceConfig {
    enabled: bool,
    timeout_ms: u32,
    retries: u8,
    tags: Vec<String>,
}

#[derive(Clone, Debug, Arbitrary)]
struct LargeService {
    id: u128,
    payload: Vec<u8>,
    metadata: Vec<(String, String)>,
}

#[derive(Debug, Arbitrary)]
enum RegisterOp {
    Small(SmallService),
    Medium(MediumService),
    Large(LargeService),
    SharedSmall,
    TransientSmall,
}

#[derive(Debug, Arbitrary)]
enum QueryOp {
    ResolveSmall,
    ResolveMedium,
    ResolveLarge,
    TryResolveSmall,
    TryResolveMedium,
    ContainsSmall,
    ContainsMedium,
    ContainsLarge,
    Len,
    IsEmpty,
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    registrations: Vec<RegisterOp>,
    queries: Vec<QueryOp>,
}

fuzz_target!(|scenario: Scenario| {
    let mut builder = ContainerBuilder::new();

    for op in scenario.registrations.into_iter().take(100) {
        match op {
            RegisterOp::Small(svc) => {
                let _ = builder.register_singleton::<SmallService, _>(move |_| Ok(svc.clone()));
            }
            RegisterOp::Medium(svc) => {
                let _ = builder.register_singleton::<MediumService, _>(move |_| Ok(svc.clone()));
            }
            RegisterOp::Large(svc) => {
                let _ = builder.register_singleton::<LargeService, _>(move |_| Ok(svc.clone()));
            }
            RegisterOp::SharedSmall => {
                let _ = builder.register::<SmallService, _>(|_| {
                    Ok(SmallService {
                        id: 42,
                        name: "shared".into(),
                    })
                });
            }
            RegisterOp::TransientSmall => {
                let _ = builder.register_transient::<SmallService, _>(|_| {
                    Ok(SmallService {
                        id: 0,
                        name: "transient".into(),
                    })
                });
            }
        }
    }

    let container = builder.build();

    for op in scenario.queries.into_iter().take(100) {
        match op {
            QueryOp::ResolveSmall => {
                let _ = container.resolve::<SmallService>();
            }
            QueryOp::ResolveMedium => {
                let _ = container.resolve::<MediumService>();
            }
            QueryOp::ResolveLarge => {
                let _ = container.resolve::<LargeService>();
            }
            QueryOp::TryResolveSmall => {
                let _ = container.try_resolve::<SmallService>();
            }
            QueryOp::TryResolveMedium => {
                let _ = container.try_resolve::<MediumService>();
            }
            QueryOp::ContainsSmall => {
                let _ = container.contains::<SmallService>();
            }
            QueryOp::ContainsMedium => {
                let _ = container.contains::<MediumService>();
            }
            QueryOp::ContainsLarge => {
                let _ = container.contains::<LargeService>();
            }
            QueryOp::Len => {
                let _ = container.len();
            }
            QueryOp::IsEmpty => {
                let _ = container.is_empty();
            }
        }
    }
});
