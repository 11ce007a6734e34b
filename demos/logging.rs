//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use armature::ContainerBuilder;

#[allow(dead_code)]
#[derive(Clone)]
struct Database {
    url: String,
}

#[allow(dead_code)]
#[derive(Clone)]
struct UserService {
    name: String,
}

#[allow(dead_code)]
#[derive(Clone)]
struct RequestContext {
    request_id: String,
}

fn main() {
    // Initialize logging - uses JSON if logging-json feature enabled,
    // pretty if logging-pretty enabled
    #[cfg(feature = "logging")]
    {
        armature::logging::init();
    }

    println!("=== Armature Logging Demo ===\n");

    let mut builder = ContainerBuilder::new();

    // Register services (logs: registration events at phase 5-7)
    builder
        .register_singleton::<Database, _>(|_| {
            Ok(Database {
                url: "postgres://localhost/mydb".into(),
            })
        })
        .unwrap();

    builder
        .register_singleton::<UserService, _>(|_| {
            Ok(UserService {
                name: "UserService".into(),
            })
        })
        .unwrap();

    // Register a lazily-shared service (shared within whichever scope first resolves it)
    builder
        .register::<RequestContext, _>(|_| {
            println!("  [App] Lazy service being created...");
            Ok(RequestContext {
                request_id: "default".into(),
            })
        })
        .unwrap();

    let container = builder.build();

    // Resolve services (logs: resolve_request_starting/succeeded diagnostics)
    let _db = container.resolve::<Database>().unwrap();
    let _users = container.resolve::<UserService>().unwrap();

    // Try to resolve a service that doesn't exist (logs: resolve_request_failed)
    let missing = container.try_resolve::<i32>().unwrap();
    assert!(missing.is_none());

    // Create a child scope
    let request_scope = container.begin_scope();

    // Resolving from the child scope shares within the child only
    let _ctx = request_scope.resolve::<RequestContext>().unwrap();

    // Resolve a root-scoped service from the child - falls back to the parent registry
    let _db_from_child = request_scope.resolve::<Database>().unwrap();

    // Dispose the child scope (reverse-order disposal of anything it owns)
    request_scope.dispose();

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
