//! Closed error taxonomy raised by registry, scope, and pipeline operations.

use crate::key::ServiceKey;
use crate::pipeline::Phase;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while registering, resolving, or disposing components.
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// `resolve` found no default registration for a service and no source produced one.
    #[error("no component registered for service: {service}")]
    ComponentNotRegistered {
        /// The service that could not be resolved.
        service: ServiceKey,
    },

    /// An activator, parameter, middleware, or decorator raised during resolution.
    #[error("error resolving {service}: {cause}")]
    DependencyResolution {
        /// The service at the point of failure.
        service: ServiceKey,
        /// The activation chain leading to the failure, outermost first.
        chain: Vec<ServiceKey>,
        /// The underlying cause, as reported by the failing component.
        cause: String,
    },

    /// The operation's in-flight set already contains `(scope, registration)`.
    #[error("circular dependency detected: {chain}")]
    CircularDependency {
        /// Human-readable rendering of the activation chain that cycled.
        chain: String,
    },

    /// A `matching-scope(tag)` registration found no ancestor scope with the tag.
    #[error("no scope tagged '{tag}' found in the ancestor chain")]
    NoMatchingScope {
        /// The tag that was searched for.
        tag: String,
    },

    /// Resolution or disposer registration was attempted on a disposed scope.
    #[error("lifetime scope has been disposed")]
    ObjectDisposed,

    /// The registry was mutated after its owning scope sealed it.
    #[error("registry is sealed: cannot register new components or sources")]
    InvalidRegistrationState,

    /// Middleware was inserted at a phase its pipeline does not accept.
    #[error("middleware phase {phase:?} is not valid for this pipeline")]
    PipelinePhaseViolation {
        /// The offending phase.
        phase: Phase,
    },

    /// Internal invariant violation in the core itself.
    #[error("internal armature error: {0}")]
    Internal(Arc<str>),
}

impl DiError {
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(Arc::from(msg.into()))
    }

    pub(crate) fn not_registered(service: ServiceKey) -> Self {
        Self::ComponentNotRegistered { service }
    }

    pub(crate) fn no_matching_scope(tag: impl Into<String>) -> Self {
        Self::NoMatchingScope { tag: tag.into() }
    }

    pub(crate) fn phase_violation(phase: Phase) -> Self {
        Self::PipelinePhaseViolation { phase }
    }

    pub(crate) fn resolution_failed(
        service: ServiceKey,
        chain: Vec<ServiceKey>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::DependencyResolution {
            service,
            chain,
            cause: cause.to_string(),
        }
    }

    /// `true` for the one kind that `try_resolve` downgrades to `Ok(None)`.
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::ComponentNotRegistered { .. })
    }
}

/// Result type alias used throughout the core.
pub type Result<T> = std::result::Result<T, DiError>;
