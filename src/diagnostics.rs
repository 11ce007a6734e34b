//! Diagnostic listener: an event-based tracing hook into registry and scope
//! activity.

use crate::key::ServiceKey;
use crate::pipeline::Phase;

/// Receives lifecycle events as they happen. Implementations must be cheap
/// to call on the hot path when `is_enabled` returns `false` for an event.
pub trait DiagnosticListener: Send + Sync {
    /// Lets a listener skip event construction entirely on the hot path.
    fn is_enabled(&self) -> bool {
        true
    }

    fn registered(&self, _service: &ServiceKey) {}
    fn registration_source_added(&self) {}
    fn child_lifetime_scope_beginning(&self, _parent_scope: u64) {}
    fn current_scope_ending(&self, _scope: u64) {}
    fn resolve_operation_beginning(&self, _operation: u64) {}
    fn resolve_operation_succeeded(&self, _operation: u64) {}
    fn resolve_operation_failed(&self, _operation: u64, _cause: &str) {}
    fn resolve_request_starting(&self, _service: &ServiceKey) {}
    fn resolve_request_succeeded(&self, _service: &ServiceKey) {}
    fn resolve_request_failed(&self, _service: &ServiceKey, _cause: &str) {}
    fn middleware_starting(&self, _phase: Phase) {}
    fn middleware_succeeded(&self, _phase: Phase) {}
    fn middleware_failed(&self, _phase: Phase, _cause: &str) {}
}

/// A listener that discards every event. The default when the `logging`
/// feature is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDiagnostics;

impl DiagnosticListener for NoopDiagnostics {
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Forwards every event to `tracing` spans/events at `DEBUG`. The default
/// listener when the `logging` feature is enabled.
#[cfg(feature = "logging")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

#[cfg(feature = "logging")]
impl DiagnosticListener for TracingDiagnostics {
    fn is_enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }

    fn registered(&self, service: &ServiceKey) {
        tracing::debug!(target: "armature::registry", %service, "component registered");
    }

    fn registration_source_added(&self) {
        tracing::debug!(target: "armature::registry", "registration source added");
    }

    fn child_lifetime_scope_beginning(&self, parent_scope: u64) {
        tracing::debug!(target: "armature::scope", parent_scope, "child lifetime scope beginning");
    }

    fn current_scope_ending(&self, scope: u64) {
        tracing::debug!(target: "armature::scope", scope, "lifetime scope ending");
    }

    fn resolve_operation_beginning(&self, operation: u64) {
        tracing::trace!(target: "armature::operation", operation, "resolve operation beginning");
    }

    fn resolve_operation_succeeded(&self, operation: u64) {
        tracing::trace!(target: "armature::operation", operation, "resolve operation succeeded");
    }

    fn resolve_operation_failed(&self, operation: u64, cause: &str) {
        tracing::debug!(target: "armature::operation", operation, cause, "resolve operation failed");
    }

    fn resolve_request_starting(&self, service: &ServiceKey) {
        tracing::trace!(target: "armature::operation", %service, "resolve request starting");
    }

    fn resolve_request_succeeded(&self, service: &ServiceKey) {
        tracing::trace!(target: "armature::operation", %service, "resolve request succeeded");
    }

    fn resolve_request_failed(&self, service: &ServiceKey, cause: &str) {
        tracing::debug!(target: "armature::operation", %service, cause, "resolve request failed");
    }

    fn middleware_starting(&self, phase: Phase) {
        tracing::trace!(target: "armature::pipeline", ?phase, "middleware starting");
    }

    fn middleware_succeeded(&self, phase: Phase) {
        tracing::trace!(target: "armature::pipeline", ?phase, "middleware succeeded");
    }

    fn middleware_failed(&self, phase: Phase, cause: &str) {
        tracing::debug!(target: "armature::pipeline", ?phase, cause, "middleware failed");
    }
}

/// Picks the default listener for the current feature set: `tracing`-backed
/// when `logging` is enabled, a no-op otherwise.
#[cfg(feature = "logging")]
pub fn default_listener() -> std::sync::Arc<dyn DiagnosticListener> {
    std::sync::Arc::new(TracingDiagnostics)
}

#[cfg(not(feature = "logging"))]
pub fn default_listener() -> std::sync::Arc<dyn DiagnosticListener> {
    std::sync::Arc::new(NoopDiagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_listener_reports_disabled() {
        assert!(!NoopDiagnostics.is_enabled());
    }
}
