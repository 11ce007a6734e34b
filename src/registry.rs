//! The registry: per-service registration state, registration sources, and
//! service pipeline construction.

use crate::decorator::DecoratorRegistration;
use crate::diagnostics::{default_listener, DiagnosticListener};
use crate::error::{DiError, Result};
use crate::key::ServiceKey;
use crate::middleware::{
    DecorationMiddleware, DiagnosticMiddleware, ScopeSelectionMiddleware,
    SharingPreparationMiddleware,
};
use crate::pipeline::{BuiltPipeline, Phase, PipelineBuilder};
use crate::registration::ComponentRegistration;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

/// Produces registrations for a service on demand, the first time that
/// service is looked up. Built-in sources cover `Lazy<T>`, `Func<T>`,
/// `Owned<T>`, `Meta<T>`, collections, and indexed lookups (see
/// [`crate::sources`]); callers can add their own.
pub trait RegistrationSource: Send + Sync {
    /// `true` if this source adapts individual components one at a time
    /// (its output should not itself be re-offered to other sources).
    fn is_adapter_for_individual_components(&self) -> bool {
        true
    }

    /// Produces zero or more registrations satisfying `service`. `accessor`
    /// looks up (and lazily initializes) the registrations for any other
    /// service, including services this source recurses into (e.g. a
    /// `Lazy<T>` source calling back for plain `T`).
    fn registrations_for(
        &self,
        service: &ServiceKey,
        accessor: &dyn Fn(&ServiceKey) -> Vec<Arc<ComponentRegistration>>,
    ) -> Vec<Arc<ComponentRegistration>>;

    fn description(&self) -> &str {
        "registration source"
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum InitState {
    Uninitialized,
    Initializing,
    Initialized,
}

/// Per-service mutable registration state. Registrations accumulate into one
/// of three buckets depending on how they arrived; default selection reads
/// them back out in a fixed priority order.
struct ServiceRegistrationInfo {
    state: InitState,
    /// Explicitly registered, in registration order. Last wins as default.
    defaults: Vec<Arc<ComponentRegistration>>,
    /// Produced by a `RegistrationSource`, in the order sources ran.
    source_originated: Vec<Arc<ComponentRegistration>>,
    /// Registered with `fixed()` competitors demoted here instead of
    /// displacing the existing default.
    preserve_defaults: Vec<Arc<ComponentRegistration>>,
    /// Once a `fixed()` registration wins, it is locked in here.
    fixed: Option<Arc<ComponentRegistration>>,
    /// Sources not yet asked to contribute to this service.
    pending_sources: VecDeque<Arc<dyn RegistrationSource>>,
    pipeline: OnceCell<BuiltPipeline>,
}

impl ServiceRegistrationInfo {
    fn new(pending_sources: VecDeque<Arc<dyn RegistrationSource>>) -> Self {
        Self {
            state: InitState::Uninitialized,
            defaults: Vec::new(),
            source_originated: Vec::new(),
            preserve_defaults: Vec::new(),
            fixed: None,
            pending_sources,
            pipeline: OnceCell::new(),
        }
    }

    fn add_explicit(&mut self, registration: Arc<ComponentRegistration>) {
        let options = registration.options();
        if options.fixed {
            if self.fixed.is_none() {
                self.fixed = Some(Arc::clone(&registration));
            } else {
                self.preserve_defaults.push(registration);
            }
        } else if options.preserve_defaults {
            self.preserve_defaults.push(registration);
        } else {
            self.defaults.push(registration);
        }
    }

    fn add_source_originated(&mut self, registration: Arc<ComponentRegistration>) {
        self.source_originated.push(registration);
    }

    /// Default registration for this service: fixed wins outright, else the
    /// most recently registered default, else the first source-originated
    /// registration, else the first preserved (non-winning fixed) default.
    fn default_registration(&self) -> Option<Arc<ComponentRegistration>> {
        self.fixed
            .clone()
            .or_else(|| self.defaults.last().cloned())
            .or_else(|| self.source_originated.first().cloned())
            .or_else(|| self.preserve_defaults.first().cloned())
    }

    fn all(&self) -> Vec<Arc<ComponentRegistration>> {
        let mut all = Vec::with_capacity(
            self.defaults.len() + self.source_originated.len() + self.preserve_defaults.len() + 1,
        );
        all.extend(self.fixed.iter().cloned());
        all.extend(self.defaults.iter().cloned());
        all.extend(self.source_originated.iter().cloned());
        all.extend(self.preserve_defaults.iter().cloned());
        all
    }
}

/// Per-service, per-scope registration state plus the registration-source
/// pipeline, decorator table, and registration index backing a lifetime
/// scope's lookups.
pub struct Registry {
    services: DashMap<ServiceKey, Arc<Mutex<ServiceRegistrationInfo>>, RandomState>,
    registrations: DashMap<u64, Arc<ComponentRegistration>, RandomState>,
    sources: RwLock<Vec<Arc<dyn RegistrationSource>>>,
    decorators: DashMap<ServiceKey, Vec<Arc<DecoratorRegistration>>, RandomState>,
    extra_service_middleware: DashMap<ServiceKey, Vec<Arc<dyn crate::middleware::Middleware>>, RandomState>,
    parent: Option<Arc<Registry>>,
    sealed: std::sync::atomic::AtomicBool,
    diagnostics: Arc<dyn DiagnosticListener>,
}

impl Registry {
    pub fn new_root() -> Self {
        Self::with_diagnostics(default_listener())
    }

    pub fn with_diagnostics(diagnostics: Arc<dyn DiagnosticListener>) -> Self {
        Self {
            services: DashMap::with_hasher(RandomState::new()),
            registrations: DashMap::with_hasher(RandomState::new()),
            sources: RwLock::new(Vec::new()),
            decorators: DashMap::with_hasher(RandomState::new()),
            extra_service_middleware: DashMap::with_hasher(RandomState::new()),
            parent: None,
            sealed: std::sync::atomic::AtomicBool::new(false),
            diagnostics,
        }
    }

    /// Builds a child registry that delegates to `parent` for any service it
    /// does not itself define, via `RegistryBuilder::configure`.
    pub fn child_of(
        parent: Arc<Registry>,
        configure: impl FnOnce(&mut RegistryBuilder),
    ) -> Registry {
        let diagnostics = Arc::clone(&parent.diagnostics);
        let mut registry = Self {
            services: DashMap::with_hasher(RandomState::new()),
            registrations: DashMap::with_hasher(RandomState::new()),
            sources: RwLock::new(Vec::new()),
            decorators: DashMap::with_hasher(RandomState::new()),
            extra_service_middleware: DashMap::with_hasher(RandomState::new()),
            parent: Some(parent),
            sealed: std::sync::atomic::AtomicBool::new(false),
            diagnostics,
        };
        let mut builder = RegistryBuilder::wrapping(&mut registry);
        configure(&mut builder);
        registry.sealed.store(true, std::sync::atomic::Ordering::Release);
        registry
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(std::sync::atomic::Ordering::Acquire)
    }

    pub(crate) fn seal(&self) {
        self.sealed.store(true, std::sync::atomic::Ordering::Release);
    }

    fn check_unsealed(&self) -> Result<()> {
        if self.is_sealed() {
            Err(DiError::InvalidRegistrationState)
        } else {
            Ok(())
        }
    }

    fn get_or_create_info(&self, service: &ServiceKey) -> Arc<Mutex<ServiceRegistrationInfo>> {
        if let Some(existing) = self.services.get(service) {
            return Arc::clone(&existing);
        }
        let pending = self.sources.read().unwrap().iter().cloned().collect();
        let info = Arc::new(Mutex::new(ServiceRegistrationInfo::new(pending)));
        self.services
            .entry(service.clone())
            .or_insert_with(|| info)
            .clone()
    }

    /// Registers `registration` for every service it advertises.
    pub fn register(&self, registration: ComponentRegistration) -> Result<Arc<ComponentRegistration>> {
        self.check_unsealed()?;
        let registration = Arc::new(registration);
        for service in registration.services().to_vec() {
            let bare = service.bare().clone();
            let info = self.get_or_create_info(&bare);
            info.lock().unwrap().add_explicit(Arc::clone(&registration));
            self.diagnostics.registered(&bare);
        }
        self.registrations
            .insert(registration.id(), Arc::clone(&registration));
        Ok(registration)
    }

    /// Registers a decorator applying to every registration currently or
    /// later advertising `service`.
    pub fn register_decorator(&self, service: ServiceKey, decorator: Arc<DecoratorRegistration>) -> Result<()> {
        self.check_unsealed()?;
        self.decorators.entry(service).or_default().push(decorator);
        Ok(())
    }

    pub fn decorators_for(&self, service: &ServiceKey) -> Vec<Arc<DecoratorRegistration>> {
        let mut chain = self
            .parent
            .as_ref()
            .map(|p| p.decorators_for(service))
            .unwrap_or_default();
        if let Some(local) = self.decorators.get(service) {
            chain.extend(local.iter().cloned());
        }
        chain
    }

    /// Appends a registration source. Already-initialized services are
    /// unaffected; services not yet touched (including ones whose info
    /// already exists but hasn't finished draining its pending queue) pick
    /// it up.
    pub fn add_registration_source(&self, source: Arc<dyn RegistrationSource>) -> Result<()> {
        self.check_unsealed()?;
        self.sources.write().unwrap().push(Arc::clone(&source));
        for entry in self.services.iter() {
            let mut info = entry.value().lock().unwrap();
            if info.state != InitState::Initialized {
                info.pending_sources.push_back(Arc::clone(&source));
            }
        }
        self.diagnostics.registration_source_added();
        Ok(())
    }

    pub fn add_service_middleware(
        &self,
        service: ServiceKey,
        middleware: Arc<dyn crate::middleware::Middleware>,
    ) -> Result<()> {
        self.check_unsealed()?;
        if !middleware.phase().belongs_to_service_pipeline() {
            return Err(DiError::phase_violation(middleware.phase()));
        }
        self.extra_service_middleware
            .entry(service)
            .or_default()
            .push(middleware);
        Ok(())
    }

    /// Drains `info`'s pending source queue, running each source in turn and
    /// feeding its output back as `source_originated` registrations.
    fn drain_sources(self: &Arc<Self>, service: &ServiceKey, info: &Arc<Mutex<ServiceRegistrationInfo>>) {
        loop {
            let next_source = {
                let mut guard = info.lock().unwrap();
                guard.state = InitState::Initializing;
                guard.pending_sources.pop_front()
            };
            let Some(source) = next_source else { break };
            let registry = Arc::clone(self);
            let accessor = move |svc: &ServiceKey| registry.registrations_for(svc);
            let produced = source.registrations_for(service, &accessor);
            let mut guard = info.lock().unwrap();
            for reg in produced {
                self.registrations.insert(reg.id(), Arc::clone(&reg));
                if reg.services().iter().any(|svc| svc.bare() == service) {
                    guard.add_source_originated(Arc::clone(&reg));
                }
            }
        }
        info.lock().unwrap().state = InitState::Initialized;
    }

    /// All registrations currently known for `service`, across this
    /// registry and its ancestors, after draining any pending sources.
    pub fn registrations_for(self: &Arc<Self>, service: &ServiceKey) -> Vec<Arc<ComponentRegistration>> {
        let bare = service.bare();
        let mut local = {
            let info = self.get_or_create_info(bare);
            self.drain_sources(bare, &info);
            info.lock().unwrap().all()
        };
        if let Some(parent) = &self.parent {
            let mut inherited = parent.registrations_for(bare);
            inherited.append(&mut local);
            inherited
        } else {
            local
        }
    }

    /// The default registration for `service`: the local registry's choice
    /// if it has any registrations at all for that service, else the
    /// nearest ancestor's.
    fn default_registration(self: &Arc<Self>, service: &ServiceKey) -> Option<Arc<ComponentRegistration>> {
        let bare = service.bare();
        let info = self.get_or_create_info(bare);
        self.drain_sources(bare, &info);
        let local = info.lock().unwrap().default_registration();
        match local {
            Some(reg) => Some(reg),
            None => self.parent.as_ref().and_then(|p| p.default_registration(bare)),
        }
    }

    pub fn contains(self: &Arc<Self>, service: &ServiceKey) -> bool {
        self.default_registration(service).is_some()
    }

    /// Resolves the default registration for `service` and its (cached,
    /// shared) service pipeline.
    pub(crate) fn service_pipeline_for(
        self: &Arc<Self>,
        service: &ServiceKey,
    ) -> Result<(Arc<ComponentRegistration>, BuiltPipeline)> {
        let registration = self
            .default_registration(service)
            .ok_or_else(|| DiError::not_registered(service.clone()))?;
        let pipeline = self.built_service_pipeline_for(service);
        Ok((registration, pipeline))
    }

    /// The (cached, shared) service pipeline for `service`, independent of
    /// which registration ends up in the context — the pipeline's terminal
    /// always invokes whichever registration the caller put in `ctx`. Used
    /// both for the default-registration path above and by adapters that
    /// re-enter the service pipeline for a specific, already-chosen
    /// registration (e.g. `CollectionSource`).
    pub(crate) fn built_service_pipeline_for(self: &Arc<Self>, service: &ServiceKey) -> BuiltPipeline {
        let bare = service.bare().clone();
        let info = self.get_or_create_info(&bare);
        let guard = info.lock().unwrap();
        guard
            .pipeline
            .get_or_init(|| self.build_service_pipeline(&bare))
            .clone()
    }

    fn build_service_pipeline(self: &Arc<Self>, service: &ServiceKey) -> BuiltPipeline {
        let mut builder = PipelineBuilder::for_service_pipeline();
        builder
            .push(Arc::new(DiagnosticMiddleware {
                phase: Phase::ResolveRequestStart,
            }))
            .expect("ResolveRequestStart is a valid service-pipeline phase");
        builder
            .push(Arc::new(ScopeSelectionMiddleware))
            .expect("ScopeSelection is a valid service-pipeline phase");
        builder
            .push(Arc::new(DecorationMiddleware {
                registry: Arc::clone(self),
            }))
            .expect("Decoration is a valid service-pipeline phase");
        builder
            .push(Arc::new(SharingPreparationMiddleware))
            .expect("SharingPreparation is a valid service-pipeline phase");
        if let Some(extra) = self.extra_service_middleware.get(service) {
            for mw in extra.iter() {
                builder
                    .push(Arc::clone(mw))
                    .expect("add_service_middleware already validated this phase");
            }
        }
        let terminal: Arc<
            dyn Fn(&mut crate::operation::ResolveRequestContext) -> Result<()> + Send + Sync,
        > = Arc::new(|ctx| ctx.registration().clone().built_pipeline().invoke(ctx));
        builder.build(terminal)
    }

    pub fn registration_by_id(&self, id: u64) -> Option<Arc<ComponentRegistration>> {
        self.registrations
            .get(&id)
            .map(|r| Arc::clone(&r))
            .or_else(|| self.parent.as_ref().and_then(|p| p.registration_by_id(id)))
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

/// Configures a [`Registry`] before it is sealed by a scope's construction.
pub struct RegistryBuilder<'a> {
    registry: &'a mut Registry,
}

impl<'a> RegistryBuilder<'a> {
    pub(crate) fn wrapping(registry: &'a mut Registry) -> Self {
        Self { registry }
    }

    pub fn register(&mut self, registration: ComponentRegistration) -> Result<Arc<ComponentRegistration>> {
        self.registry.register(registration)
    }

    pub fn register_decorator(
        &mut self,
        service: ServiceKey,
        decorator: Arc<DecoratorRegistration>,
    ) -> Result<()> {
        self.registry.register_decorator(service, decorator)
    }

    pub fn add_registration_source(&mut self, source: Arc<dyn RegistrationSource>) -> Result<()> {
        self.registry.add_registration_source(source)
    }

    pub fn add_service_middleware(
        &mut self,
        service: ServiceKey,
        middleware: Arc<dyn crate::middleware::Middleware>,
    ) -> Result<()> {
        self.registry.add_service_middleware(service, middleware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::from_fn;

    #[test]
    fn most_recently_registered_default_wins() {
        let registry = Arc::new(Registry::new_root());
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 1u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .build(),
            )
            .unwrap();
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 2u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .build(),
            )
            .unwrap();
        let (reg, _) = registry.service_pipeline_for(&ServiceKey::typed::<u32>()).unwrap();
        let scope = crate::scope::tests_support::test_root_scope();
        let op = crate::operation::ResolveOperation::new(Arc::new(crate::diagnostics::NoopDiagnostics));
        let ctx = crate::operation::ResolveRequestContext::new(
            op,
            scope,
            ServiceKey::typed::<u32>(),
            Arc::clone(&reg),
            Vec::new(),
        );
        let value = reg.activator().activate(&ctx, &[]).unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn fixed_registration_cannot_be_displaced() {
        let registry = Arc::new(Registry::new_root());
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 1u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .fixed()
                    .build(),
            )
            .unwrap();
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 2u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .build(),
            )
            .unwrap();
        let reg = registry.default_registration(&ServiceKey::typed::<u32>()).unwrap();
        let scope = crate::scope::tests_support::test_root_scope();
        let op = crate::operation::ResolveOperation::new(Arc::new(crate::diagnostics::NoopDiagnostics));
        let ctx = crate::operation::ResolveRequestContext::new(
            op,
            scope,
            ServiceKey::typed::<u32>(),
            Arc::clone(&reg),
            Vec::new(),
        );
        let value = reg.activator().activate(&ctx, &[]).unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 1);
    }

    #[test]
    fn ordinary_registration_after_a_fixed_one_still_lands_in_defaults() {
        let mut info = ServiceRegistrationInfo::new(VecDeque::new());
        info.add_explicit(Arc::new(
            ComponentRegistration::builder(from_fn(|| 1u32))
                .with_service(ServiceKey::typed::<u32>())
                .fixed()
                .build(),
        ));
        info.add_explicit(Arc::new(
            ComponentRegistration::builder(from_fn(|| 2u32))
                .with_service(ServiceKey::typed::<u32>())
                .build(),
        ));
        assert!(info.fixed.is_some());
        assert_eq!(info.defaults.len(), 1);
        assert!(info.preserve_defaults.is_empty());
    }

    #[test]
    fn preserve_defaults_registration_never_becomes_the_default() {
        let registry = Arc::new(Registry::new_root());
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 1u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .build(),
            )
            .unwrap();
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 2u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .preserve_defaults()
                    .build(),
            )
            .unwrap();
        let reg = registry.default_registration(&ServiceKey::typed::<u32>()).unwrap();
        let scope = crate::scope::tests_support::test_root_scope();
        let op = crate::operation::ResolveOperation::new(Arc::new(crate::diagnostics::NoopDiagnostics));
        let ctx = crate::operation::ResolveRequestContext::new(
            op,
            scope,
            ServiceKey::typed::<u32>(),
            Arc::clone(&reg),
            Vec::new(),
        );
        let value = reg.activator().activate(&ctx, &[]).unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 1);
        assert_eq!(registry.registrations_for(&ServiceKey::typed::<u32>()).len(), 2);
    }

    #[test]
    fn unregistered_service_errors() {
        let registry = Arc::new(Registry::new_root());
        assert!(!registry.contains(&ServiceKey::typed::<u32>()));
        let err = registry.service_pipeline_for(&ServiceKey::typed::<u32>()).unwrap_err();
        assert!(err.is_not_registered());
    }

    #[test]
    fn sealed_registry_rejects_further_registration() {
        let registry = Registry::new_root();
        registry.seal();
        let err = registry
            .register(ComponentRegistration::builder(from_fn(|| 1u32)).build())
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidRegistrationState));
    }
}
