//! The resolve operation: cycle detection and the mutable per-request context
//! threaded through a pipeline invocation.

use crate::diagnostics::DiagnosticListener;
use crate::error::{DiError, Result};
use crate::key::ServiceKey;
use crate::parameter::Parameter;
use crate::registration::{AnyArc, ComponentRegistration, RegistrationId};
use crate::scope::{LifetimeScope, ScopeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Spans one top-level `resolve` call and every nested resolution it triggers
/// through a [`ResolveRequestContext`]. Nested requests reuse the same
/// operation rather than starting a fresh one, so the in-flight stack below
/// sees the whole activation chain.
pub struct ResolveOperation {
    id: u64,
    in_flight: Mutex<Vec<(ScopeId, RegistrationId)>>,
    diagnostics: Arc<dyn DiagnosticListener>,
}

impl ResolveOperation {
    pub fn new(diagnostics: Arc<dyn DiagnosticListener>) -> Arc<Self> {
        Arc::new(Self {
            id: OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed),
            in_flight: Mutex::new(Vec::new()),
            diagnostics,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticListener> {
        &self.diagnostics
    }

    /// Pushes `(scope, registration)` onto the in-flight stack, failing with
    /// [`DiError::CircularDependency`] if it is already present. The returned
    /// guard pops the entry on drop, so the stack always mirrors the live
    /// call stack even when a downstream activator returns an error.
    pub(crate) fn enter(
        self: &Arc<Self>,
        scope: ScopeId,
        registration: RegistrationId,
        service: &ServiceKey,
    ) -> Result<InFlightGuard> {
        let mut stack = self.in_flight.lock().unwrap();
        if stack.iter().any(|&(s, r)| s == scope && r == registration) {
            let chain = stack
                .iter()
                .map(|(_, r)| r.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DiError::CircularDependency {
                chain: format!("{chain} -> {service} (repeats)"),
            });
        }
        stack.push((scope, registration));
        drop(stack);
        Ok(InFlightGuard {
            operation: Arc::clone(self),
            scope,
            registration,
        })
    }
}

/// RAII guard that removes an in-flight `(scope, registration)` entry when an
/// activation completes or unwinds with an error.
pub(crate) struct InFlightGuard {
    operation: Arc<ResolveOperation>,
    scope: ScopeId,
    registration: RegistrationId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut stack = self.operation.in_flight.lock().unwrap();
        if let Some(pos) = stack
            .iter()
            .rposition(|&(s, r)| s == self.scope && r == self.registration)
        {
            stack.remove(pos);
        }
    }
}

/// Mutable state threaded through a single service/registration pipeline
/// invocation. Middleware reads and rewrites this as it runs; the final
/// activator consumes `parameters` and populates `instance`.
pub struct ResolveRequestContext {
    pub(crate) operation: Arc<ResolveOperation>,
    pub(crate) scope: Arc<LifetimeScope>,
    pub(crate) service: ServiceKey,
    pub(crate) registration: Arc<ComponentRegistration>,
    pub(crate) parameters: Vec<Arc<dyn Parameter>>,
    pub(crate) instance: Option<AnyArc>,
}

impl ResolveRequestContext {
    pub(crate) fn new(
        operation: Arc<ResolveOperation>,
        scope: Arc<LifetimeScope>,
        service: ServiceKey,
        registration: Arc<ComponentRegistration>,
        parameters: Vec<Arc<dyn Parameter>>,
    ) -> Self {
        Self {
            operation,
            scope,
            service,
            registration,
            parameters,
            instance: None,
        }
    }

    pub fn service(&self) -> &ServiceKey {
        &self.service
    }

    pub fn registration(&self) -> &Arc<ComponentRegistration> {
        &self.registration
    }

    pub fn parameters(&self) -> &[Arc<dyn Parameter>] {
        &self.parameters
    }

    pub fn scope(&self) -> &Arc<LifetimeScope> {
        &self.scope
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticListener> {
        self.operation.diagnostics()
    }

    /// Overrides the scope used for sharing lookups and nested activation.
    /// Middleware in the `ScopeSelection` phase is the intended caller.
    pub fn change_scope(&mut self, scope: Arc<LifetimeScope>) {
        self.scope = scope;
    }

    /// Replaces the parameter list visible to `ParameterSelection` middleware
    /// and the activator. Middleware in earlier phases is the intended caller.
    pub fn change_parameters(&mut self, parameters: Vec<Arc<dyn Parameter>>) {
        self.parameters = parameters;
    }

    /// The activated instance, once the registration pipeline has produced one.
    pub fn instance(&self) -> Option<&AnyArc> {
        self.instance.as_ref()
    }

    pub(crate) fn set_instance(&mut self, instance: AnyArc) {
        self.instance = Some(instance);
    }

    /// Resolves `service` against the current scope, reusing this context's
    /// operation so the combined activation chain is still cycle-checked as
    /// one unit. Activators call this for their own dependencies.
    pub fn resolve(&self, service: ServiceKey) -> Result<AnyArc> {
        let scope = Arc::clone(&self.scope);
        scope.resolve_within(service, Vec::new(), Arc::clone(&self.operation))
    }

    /// Like [`Self::resolve`] but downgrades `ComponentNotRegistered` to `None`.
    pub fn try_resolve(&self, service: ServiceKey) -> Result<Option<AnyArc>> {
        match self.resolve(service) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_registered() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
