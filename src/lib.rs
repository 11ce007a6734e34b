//! # Armature - a service-registration based dependency injection container
//!
//! Armature builds on a `ComponentRegistration` + `LifetimeScope` model:
//! services are registered against a `Registry`, resolved through an
//! eight-phase middleware pipeline, and shared (or not) according to a
//! per-registration `Lifetime`. Hierarchical scopes let per-request or
//! per-task state live alongside long-lived singletons without either one
//! leaking into the other.
//!
//! ## Quick Start
//!
//! ```rust
//! use armature::ContainerBuilder;
//!
//! #[derive(Clone)]
//! struct Database {
//!     url: String,
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register_singleton::<Database, _>(|_| {
//!         Ok(Database { url: "postgres://localhost".into() })
//!     })
//!     .unwrap();
//!
//! let container = builder.build();
//! let db = container.resolve::<Database>().unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! ```
//!
//! ## Lifetimes
//!
//! - `register_singleton` shares one instance from the root scope.
//! - `register` shares one instance per resolving scope (`Lifetime::CurrentScope`).
//! - `register_transient` builds a fresh instance on every resolve.
//!
//! ## Scopes
//!
//! ```rust
//! use armature::ContainerBuilder;
//!
//! let mut builder = ContainerBuilder::new();
//! builder.register_singleton::<u32, _>(|_| Ok(7)).unwrap();
//! let container = builder.build();
//!
//! let request_scope = container.begin_scope();
//! assert_eq!(*request_scope.resolve::<u32>().unwrap(), 7);
//! ```

mod activator;
mod container;
mod decorator;
mod diagnostics;
mod error;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod middleware;
mod operation;
mod parameter;
mod pipeline;
mod registration;
mod registry;
mod scope;
mod sources;

pub use activator::{from_fn, from_instance, Activator, AnyArc};
pub use container::{Container, ContainerBuilder};
pub use decorator::{typed as typed_decorator, Decorator, DecoratorRegistration};
pub use diagnostics::{DiagnosticListener, NoopDiagnostics};
#[cfg(feature = "logging")]
pub use diagnostics::TracingDiagnostics;
pub use error::{DiError, Result};
pub use key::{DecoratorRole, KeyValue, ServiceKey};
pub use middleware::Middleware;
pub use operation::{ResolveOperation, ResolveRequestContext};
pub use parameter::{NamedParameter, Parameter, PositionalParameter, TypedParameter};
pub use pipeline::{InsertionMode, Phase, PipelineBuilder};
pub use registration::{
    ComponentRegistration, ComponentRegistrationBuilder, Lifetime, MetadataValue, Ownership,
    RegistrationId, RegistrationOptions, Sharing,
};
pub use registry::{Registry, RegistryBuilder, RegistrationSource};
pub use scope::{LifetimeScope, ScopeId, ScopeTag};
pub use sources::{
    instance_registration, Collection, CollectionSource, Func, FuncSource, IndexedSource,
    IndexedServices, Lazy, LazySource, Meta, MetaSource, Owned, OwnedSource,
};

#[cfg(feature = "derive")]
pub use armature_derive::Activate;

#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

pub use std::sync::Arc;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Container, ContainerBuilder, DiError, Lifetime, Ownership, Result, ServiceKey, Sharing,
    };
    pub use std::sync::Arc;
}
