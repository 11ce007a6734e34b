//! Lifetime scopes: the tree of nested contexts instances are shared and
//! disposed within.

use crate::activator::AnyArc;
use crate::diagnostics::DiagnosticListener;
use crate::error::{DiError, Result};
use crate::key::ServiceKey;
use crate::operation::{ResolveOperation, ResolveRequestContext};
use crate::parameter::Parameter;
use crate::pipeline::BuiltPipeline;
use crate::registration::{ComponentRegistration, Lifetime, RegistrationId, Sharing};
use crate::registry::Registry;
use once_cell::sync::OnceCell as SyncOnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type ScopeId = u64;

static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The opaque tag a scope can be opened with, matched by
/// `Lifetime::MatchingScope`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum ScopeTag {
    #[default]
    Root,
    Named(Arc<str>),
}

impl ScopeTag {
    pub fn named(tag: impl Into<Arc<str>>) -> Self {
        Self::Named(tag.into())
    }

    fn matches(&self, wanted: &str) -> bool {
        matches!(self, Self::Named(t) if &**t == wanted)
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Named(t) => write!(f, "{t}"),
        }
    }
}

type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

enum DisposableHandle {
    Sync(Box<dyn FnOnce() + Send>),
    #[cfg(feature = "async")]
    Async(Box<dyn FnOnce() -> BoxFuture + Send>),
}

#[derive(Default)]
struct Disposer {
    handles: Vec<DisposableHandle>,
}

impl Disposer {
    fn push_sync(&mut self, f: Box<dyn FnOnce() + Send>) {
        self.handles.push(DisposableHandle::Sync(f));
    }

    #[cfg(feature = "async")]
    fn push_async(&mut self, f: Box<dyn FnOnce() -> BoxFuture + Send>) {
        self.handles.push(DisposableHandle::Async(f));
    }

    /// Runs every handle in reverse registration order. Async handles are
    /// skipped (not awaited) in the sync path; only `dispose_async` awaits
    /// them, in the same reverse order.
    fn dispose_sync(&mut self) {
        for handle in std::mem::take(&mut self.handles).into_iter().rev() {
            if let DisposableHandle::Sync(f) = handle {
                f();
            }
        }
    }

    #[cfg(feature = "async")]
    async fn dispose_async(&mut self) {
        for handle in std::mem::take(&mut self.handles).into_iter().rev() {
            match handle {
                DisposableHandle::Sync(f) => f(),
                DisposableHandle::Async(f) => f().await,
            }
        }
    }
}

/// Per-(scope, registration) shared-instance cache. Uses a short-lived outer
/// lock only to get-or-create each registration's own `OnceCell`, so two
/// unrelated registrations never contend; within one registration, the
/// `OnceCell` itself provides the single-flight guarantee.
#[derive(Default)]
struct InstanceCache {
    cells: Mutex<HashMap<RegistrationId, Arc<SyncOnceCell<AnyArc>>>>,
}

impl InstanceCache {
    fn cell_for(&self, id: RegistrationId) -> Arc<SyncOnceCell<AnyArc>> {
        let mut cells = self.cells.lock().unwrap();
        Arc::clone(cells.entry(id).or_insert_with(|| Arc::new(SyncOnceCell::new())))
    }
}

/// A node in the lifetime scope tree. Owns its own instance cache and
/// disposer list; delegates lookups that its local registry can't satisfy to
/// its parent.
pub struct LifetimeScope {
    id: ScopeId,
    parent: Option<Arc<LifetimeScope>>,
    tag: ScopeTag,
    registry: Arc<Registry>,
    cache: InstanceCache,
    disposer: Mutex<Disposer>,
    disposed: AtomicBool,
    diagnostics: Arc<dyn DiagnosticListener>,
}

impl LifetimeScope {
    pub(crate) fn new_root(
        registry: Arc<Registry>,
        diagnostics: Arc<dyn DiagnosticListener>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed),
            parent: None,
            tag: ScopeTag::Root,
            registry,
            cache: InstanceCache::default(),
            disposer: Mutex::new(Disposer::default()),
            disposed: AtomicBool::new(false),
            diagnostics,
        })
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn tag(&self) -> &ScopeTag {
        &self.tag
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The outermost scope in this scope's ancestor chain.
    pub fn root(self: &Arc<Self>) -> Arc<LifetimeScope> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        current
    }

    /// Walks `self` and ancestors looking for a scope tagged `tag`.
    pub fn find_tagged(self: &Arc<Self>, tag: &str) -> Option<Arc<LifetimeScope>> {
        let mut current = Arc::clone(self);
        loop {
            if current.tag.matches(tag) {
                return Some(current);
            }
            match current.parent.clone() {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// Resolves `Lifetime` to the scope whose cache should hold the instance.
    pub(crate) fn target_scope_for(
        self: &Arc<Self>,
        lifetime: Lifetime,
    ) -> Result<Arc<LifetimeScope>> {
        match lifetime {
            Lifetime::CurrentScope => Ok(Arc::clone(self)),
            Lifetime::RootScope => Ok(self.root()),
            Lifetime::MatchingScope(tag) => self
                .find_tagged(tag)
                .ok_or_else(|| DiError::no_matching_scope(tag)),
        }
    }

    pub(crate) fn cache_cell(&self, id: RegistrationId) -> Arc<SyncOnceCell<AnyArc>> {
        self.cache.cell_for(id)
    }

    /// Opens a child scope, optionally tagged, with its own local registry
    /// layered on top of this one. `configure` may add registrations and
    /// sources visible only within the child (and its descendants).
    pub fn begin_scope(
        self: &Arc<Self>,
        tag: Option<ScopeTag>,
        configure: impl FnOnce(&mut crate::registry::RegistryBuilder),
    ) -> Arc<LifetimeScope> {
        self.diagnostics.child_lifetime_scope_beginning(self.id);
        let child_registry = Registry::child_of(Arc::clone(&self.registry), configure);
        Arc::new(Self {
            id: SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed),
            parent: Some(Arc::clone(self)),
            tag: tag.unwrap_or_default(),
            registry: Arc::new(child_registry),
            cache: InstanceCache::default(),
            disposer: Mutex::new(Disposer::default()),
            disposed: AtomicBool::new(false),
            diagnostics: Arc::clone(&self.diagnostics),
        })
    }

    pub(crate) fn push_disposer(&self, f: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.is_disposed() {
            return Err(DiError::ObjectDisposed);
        }
        self.disposer.lock().unwrap().push_sync(Box::new(f));
        Ok(())
    }

    #[cfg(feature = "async")]
    pub(crate) fn push_async_disposer(
        &self,
        f: impl FnOnce() -> BoxFuture + Send + 'static,
    ) -> Result<()> {
        if self.is_disposed() {
            return Err(DiError::ObjectDisposed);
        }
        self.disposer.lock().unwrap().push_async(Box::new(f));
        Ok(())
    }

    /// Registers an arbitrary cleanup closure to run when this scope
    /// disposes, in reverse order alongside instance disposers. Useful from
    /// a custom [`crate::activator::Activator`] or
    /// [`crate::decorator::Decorator`] that needs to track its own cleanup.
    pub fn register_for_disposal(&self, f: impl FnOnce() + Send + 'static) -> Result<()> {
        self.push_disposer(f)
    }

    #[cfg(feature = "async")]
    pub fn register_for_async_disposal(
        &self,
        f: impl FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + 'static,
    ) -> Result<()> {
        self.push_async_disposer(f)
    }

    /// Resolves a top-level service, starting a fresh [`ResolveOperation`].
    pub fn resolve(self: &Arc<Self>, service: ServiceKey) -> Result<AnyArc> {
        self.resolve_with_parameters(service, Vec::new())
    }

    pub fn resolve_with_parameters(
        self: &Arc<Self>,
        service: ServiceKey,
        parameters: Vec<Arc<dyn Parameter>>,
    ) -> Result<AnyArc> {
        let operation = ResolveOperation::new(Arc::clone(&self.diagnostics));
        let operation_id = operation.id();
        self.diagnostics.resolve_operation_beginning(operation_id);
        let result = self.resolve_within(service, parameters, operation);
        match &result {
            Ok(_) => self.diagnostics.resolve_operation_succeeded(operation_id),
            Err(e) => self
                .diagnostics
                .resolve_operation_failed(operation_id, &e.to_string()),
        }
        result
    }

    pub fn try_resolve(self: &Arc<Self>, service: ServiceKey) -> Result<Option<AnyArc>> {
        match self.resolve(service) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_registered() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves within an existing operation, reusing its in-flight stack.
    /// Used both for top-level resolves and for nested resolves triggered by
    /// an activator calling [`ResolveRequestContext::resolve`]. Picks the
    /// service's default registration; use
    /// [`Self::resolve_registration_within`] to re-run the full service
    /// pipeline against a specific, already-chosen registration instead.
    pub(crate) fn resolve_within(
        self: &Arc<Self>,
        service: ServiceKey,
        parameters: Vec<Arc<dyn Parameter>>,
        operation: Arc<ResolveOperation>,
    ) -> Result<AnyArc> {
        if self.is_disposed() {
            return Err(DiError::ObjectDisposed);
        }
        let (registration, service_pipeline) = self.registry.service_pipeline_for(&service)?;
        self.run_pipeline(service, registration, service_pipeline, parameters, operation)
    }

    /// Like [`Self::resolve_within`], but runs the full service pipeline
    /// (decoration, sharing preparation, diagnostics) against `registration`
    /// directly instead of looking up the service's default. Used by
    /// collection-style adapters that already have the exact registration
    /// they want to activate but must still behave like any other resolve —
    /// otherwise a shared registration reached only through a collection
    /// would never hit the same cache cell a direct `resolve` does.
    pub(crate) fn resolve_registration_within(
        self: &Arc<Self>,
        service: ServiceKey,
        registration: Arc<ComponentRegistration>,
        parameters: Vec<Arc<dyn Parameter>>,
        operation: Arc<ResolveOperation>,
    ) -> Result<AnyArc> {
        if self.is_disposed() {
            return Err(DiError::ObjectDisposed);
        }
        let service_pipeline = self.registry.built_service_pipeline_for(&service);
        self.run_pipeline(service, registration, service_pipeline, parameters, operation)
    }

    fn run_pipeline(
        self: &Arc<Self>,
        service: ServiceKey,
        registration: Arc<ComponentRegistration>,
        service_pipeline: BuiltPipeline,
        parameters: Vec<Arc<dyn Parameter>>,
        operation: Arc<ResolveOperation>,
    ) -> Result<AnyArc> {
        // Key the in-flight guard on the scope this registration will
        // actually be shared from, not `self` — `ScopeSelectionMiddleware`
        // reassigns the context's scope to this same target before a nested
        // resolve re-enters, so a self-referential singleton only trips
        // `CircularDependency` if both entries are keyed on the same scope.
        let target_scope = self.target_scope_for(registration.lifetime())?;
        let guard = operation.enter(target_scope.id(), registration.id(), &service)?;
        let mut ctx = ResolveRequestContext::new(
            Arc::clone(&operation),
            Arc::clone(self),
            service.clone(),
            Arc::clone(&registration),
            parameters,
        );
        let result = service_pipeline.invoke(&mut ctx).and_then(|()| {
            ctx.instance()
                .cloned()
                .ok_or_else(|| DiError::internal("pipeline completed without an instance"))
        });
        drop(guard);
        result.map_err(|e| match e {
            DiError::ComponentNotRegistered { .. }
            | DiError::DependencyResolution { .. }
            | DiError::CircularDependency { .. } => e,
            other => DiError::resolution_failed(service, vec![], other),
        })
    }

    /// Idempotently disposes this scope: marks it disposed, then runs every
    /// registered disposer in reverse order. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.diagnostics.current_scope_ending(self.id);
        self.disposer.lock().unwrap().dispose_sync();
    }

    #[cfg(feature = "async")]
    pub async fn dispose_async(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.diagnostics.current_scope_ending(self.id);
        self.disposer.lock().unwrap().dispose_async().await;
    }
}

impl Drop for LifetimeScope {
    fn drop(&mut self) {
        if !self.is_disposed() {
            self.dispose();
        }
    }
}

impl fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeScope")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .finish()
    }
}

pub(crate) fn sharing_cache_cell(
    scope: &Arc<LifetimeScope>,
    registration: &Arc<ComponentRegistration>,
) -> Option<Arc<SyncOnceCell<AnyArc>>> {
    if registration.sharing() == Sharing::None {
        None
    } else {
        Some(scope.cache_cell(registration.id()))
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::diagnostics::NoopDiagnostics;
    use crate::registry::Registry;

    pub fn test_root_scope() -> Arc<LifetimeScope> {
        LifetimeScope::new_root(Arc::new(Registry::new_root()), Arc::new(NoopDiagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tests_support::test_root_scope;

    #[test]
    fn disposal_is_idempotent() {
        let scope = test_root_scope();
        scope.dispose();
        scope.dispose();
        assert!(scope.is_disposed());
    }

    #[test]
    fn disposers_run_in_reverse_order() {
        let scope = test_root_scope();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            scope
                .push_disposer(move || order.lock().unwrap().push(i))
                .unwrap();
        }
        scope.dispose();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn resolve_fails_after_disposal() {
        let scope = test_root_scope();
        scope.dispose();
        let err = scope.resolve(ServiceKey::typed::<u32>()).unwrap_err();
        assert!(matches!(err, DiError::ObjectDisposed));
    }

    #[test]
    fn root_scope_has_root_tag() {
        let scope = test_root_scope();
        assert_eq!(scope.tag(), &ScopeTag::Root);
        assert!(scope.find_tagged("root").is_none());
    }

    #[test]
    fn self_referential_singleton_trips_circular_dependency() {
        let registry = Arc::new(Registry::new_root());
        let activator: Arc<dyn crate::activator::Activator> = Arc::new(
            |ctx: &ResolveRequestContext, _: &[Arc<dyn Parameter>]| {
                ctx.resolve(ServiceKey::typed::<u32>())
            },
        );
        registry
            .register(
                ComponentRegistration::builder(activator)
                    .with_service(ServiceKey::typed::<u32>())
                    .single_instance()
                    .build(),
            )
            .unwrap();
        let scope = LifetimeScope::new_root(registry, Arc::new(NoopDiagnostics));
        let err = scope.resolve(ServiceKey::typed::<u32>()).unwrap_err();
        assert!(matches!(err, DiError::CircularDependency { .. }));
    }
}
