//! Example demonstrating the #[derive(Activate)] macro
//!
//! Run with:
//!   cargo run --example derive --features derive

use armature::{Activate, ComponentRegistration, ContainerBuilder, ServiceKey};
use std::sync::Arc;

#[allow(dead_code)]
#[derive(Clone)]
struct Database {
    url: String,
}

#[allow(dead_code)]
#[derive(Clone)]
struct Cache {
    size: usize,
}

#[allow(dead_code)]
#[derive(Clone)]
struct Logger {
    level: String,
}

#[derive(Clone, Activate)]
struct UserService {
    #[dep]
    db: Arc<Database>,
    #[dep]
    cache: Arc<Cache>,
    #[dep(optional)]
    logger: Option<Arc<Logger>>,
    // Non-dependency field uses Default
    request_count: u64,
}

impl UserService {
    fn describe(&self) -> String {
        let logger_status = if self.logger.is_some() {
            "with logging"
        } else {
            "without logging"
        };
        format!(
            "UserService connected to {} with cache size {} ({}, requests: {})",
            self.db.url, self.cache.size, logger_status, self.request_count
        )
    }
}

fn register_user_service(builder: &mut ContainerBuilder) {
    builder
        .register_builder(
            ComponentRegistration::builder(Arc::new(UserService {
                db: Arc::new(Database { url: String::new() }),
                cache: Arc::new(Cache { size: 0 }),
                logger: None,
                request_count: 0,
            }))
            .with_service(ServiceKey::typed::<UserService>())
            .build(),
        )
        .expect("register UserService");
}

fn main() {
    println!("=== Armature Derive Macro Demo ===\n");

    let mut builder = ContainerBuilder::new();
    builder
        .register_singleton::<Database, _>(|_| {
            Ok(Database {
                url: "postgres://localhost:5432/myapp".into(),
            })
        })
        .unwrap();
    builder
        .register_singleton::<Cache, _>(|_| Ok(Cache { size: 1024 }))
        .unwrap();
    // Note: Logger is NOT registered, so it resolves to None.
    register_user_service(&mut builder);

    let container = builder.build();

    println!("Resolving UserService from container...");
    let user_service = container
        .resolve::<UserService>()
        .expect("failed to resolve UserService");
    println!("  {}", user_service.describe());
    println!();

    // Build a second container with a Logger registered too.
    let mut builder = ContainerBuilder::new();
    builder
        .register_singleton::<Database, _>(|_| {
            Ok(Database {
                url: "postgres://localhost:5432/myapp".into(),
            })
        })
        .unwrap();
    builder
        .register_singleton::<Cache, _>(|_| Ok(Cache { size: 1024 }))
        .unwrap();
    builder
        .register_singleton::<Logger, _>(|_| Ok(Logger { level: "DEBUG".into() }))
        .unwrap();
    register_user_service(&mut builder);

    let container = builder.build();
    println!("Resolving UserService with Logger registered...");
    let user_service = container
        .resolve::<UserService>()
        .expect("failed to resolve UserService");
    println!("  {}", user_service.describe());
    println!();

    println!("=== Demo Complete ===");
    println!("\nThe #[derive(Activate)] macro generated an Activator impl that:");
    println!("  - Resolves #[dep] fields from the request context");
    println!("  - Uses Option<Arc<T>> via try_resolve for #[dep(optional)] fields");
    println!("  - Uses Default::default() for non-dependency fields");
}
