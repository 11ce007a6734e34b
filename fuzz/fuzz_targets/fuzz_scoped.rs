#![no_main]

//! Fuzz target for scoped container operations
//!
//! Tests hierarchical scope relationships and parent-chain resolution.

use arbitrary::Arbitrary;
use armature::{Container, ContainerBuilder};
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
struct RootService {
    id: u32,
}

#[derive(Debug, Arbitrary)]
enum ScopedOp {
    // Scope creation
    CreateScope,
    CreateNestedScope,

    // Queries against the most recently created scope
    ResolveFromScope,
    ContainsInScope,
    ResolveRootFromScope,

    // Cleanup
    DisposeScope,
    DropScope,
}

fuzz_target!(|ops: Vec<ScopedOp>| {
    let mut builder = ContainerBuilder::new();
    builder
        .register_singleton::<RootService, _>(|_| Ok(RootService { id: 1 }))
        .unwrap();
    let root = builder.build();

    let mut scopes: Vec<Container> = Vec::new();

    for op in ops.into_iter().take(100) {
        match op {
            ScopedOp::CreateScope => {
                if scopes.len() < 10 {
                    scopes.push(root.begin_scope());
                }
            }
            ScopedOp::CreateNestedScope => {
                if let Some(parent) = scopes.last() {
                    if scopes.len() < 10 {
                        scopes.push(parent.begin_scope());
                    }
                }
            }
            ScopedOp::ResolveFromScope => {
                if let Some(scope) = scopes.last() {
                    let _ = scope.resolve::<RootService>();
                }
            }
            ScopedOp::ContainsInScope => {
                if let Some(scope) = scopes.last() {
                    let _ = scope.contains::<RootService>();
                }
            }
            ScopedOp::ResolveRootFromScope => {
                if let Some(scope) = scopes.last() {
                    // Should be able to resolve root services from a child scope.
                    let _ = scope.resolve::<RootService>();
                }
            }
            ScopedOp::DisposeScope => {
                if let Some(scope) = scopes.last() {
                    scope.dispose();
                }
            }
            ScopedOp::DropScope => {
                scopes.pop();
            }
        }
    }

    // The root should still be functional after scope churn.
    let _ = root.resolve::<RootService>();
    let _ = root.contains::<RootService>();
});
