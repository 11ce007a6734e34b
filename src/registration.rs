//! Component registrations: the immutable record of how to build a service.

pub use crate::activator::AnyArc;
use crate::activator::Activator;
use crate::key::ServiceKey;
use crate::pipeline::PipelineBuilder;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Stable identity for a registration, used as the key for per-scope instance
/// caches and the in-flight cycle-detection stack.
pub type RegistrationId = u64;

static REGISTRATION_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_registration_id() -> RegistrationId {
    REGISTRATION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Where a shared instance lives once activated.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Lifetime {
    /// Shared within the scope that requested activation.
    CurrentScope,
    /// Always shared from the outermost scope in the tree.
    RootScope,
    /// Shared from the nearest ancestor (including self) tagged `tag`.
    MatchingScope(&'static str),
}

/// Whether a service shares one instance per qualifying scope or creates a
/// fresh one per resolve.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sharing {
    /// Every resolve runs the activator again.
    None,
    /// Resolves within the same qualifying scope share one instance.
    Shared,
}

/// Who is responsible for disposing an activated instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ownership {
    /// The owning lifetime scope disposes the instance when it is disposed.
    OwnedByLifetimeScope,
    /// The registrant is responsible; the scope never disposes it.
    ExternallyOwned,
}

/// A metadata value attached to a registration, inspectable by middleware or
/// by callers via [`ComponentRegistration::metadata`].
#[derive(Clone, Debug)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Text(Arc<str>),
}

/// Bitset of per-registration options that affect how the registry and
/// collection-style sources treat a registration.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct RegistrationOptions {
    /// Removable default is locked in: later registrations for the same
    /// service are added as non-default (`preserve_defaults` bucket) instead
    /// of displacing this one.
    pub fixed: bool,
    /// Excluded from `CollectionSource`/`IndexedSource` enumeration.
    pub exclude_from_collections: bool,
    /// Opts this registration itself into the `preserve_defaults` bucket,
    /// i.e. "register me, but don't become the default if one already
    /// exists" (Autofac's `PreserveExistingDefaults`).
    pub preserve_defaults: bool,
}

/// Runs against the freshly activated instance when its owning scope disposes.
pub(crate) type SyncDisposer = Arc<dyn Fn(&AnyArc) + Send + Sync>;

#[cfg(feature = "async")]
pub(crate) type AsyncDisposer =
    Arc<dyn Fn(AnyArc) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync>;

/// An immutable, fully-specified way of producing one or more services.
///
/// Built once via [`ComponentRegistrationBuilder`] and never mutated after;
/// the registry and scope tree only ever hold `Arc<ComponentRegistration>`.
pub struct ComponentRegistration {
    pub(crate) id: RegistrationId,
    pub(crate) services: Vec<ServiceKey>,
    pub(crate) activator: Arc<dyn Activator>,
    pub(crate) lifetime: Lifetime,
    pub(crate) sharing: Sharing,
    pub(crate) ownership: Ownership,
    pub(crate) metadata: HashMap<&'static str, MetadataValue>,
    pub(crate) options: RegistrationOptions,
    pub(crate) pipeline: PipelineBuilder,
    pub(crate) disposer: Option<SyncDisposer>,
    #[cfg(feature = "async")]
    pub(crate) async_disposer: Option<AsyncDisposer>,
    built_pipeline: OnceLock<crate::pipeline::BuiltPipeline>,
}

impl ComponentRegistration {
    pub fn builder(activator: Arc<dyn Activator>) -> ComponentRegistrationBuilder {
        ComponentRegistrationBuilder::new(activator)
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn services(&self) -> &[ServiceKey] {
        &self.services
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn sharing(&self) -> Sharing {
        self.sharing
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn options(&self) -> RegistrationOptions {
        self.options
    }

    pub fn metadata(&self) -> &HashMap<&'static str, MetadataValue> {
        &self.metadata
    }

    pub fn activator(&self) -> &Arc<dyn Activator> {
        &self.activator
    }

    /// Builds (once) and returns this registration's own pipeline: the
    /// `RegistrationPipelineStart` -> `ParameterSelection` -> `Activation`
    /// chain terminating in a call to `self.activator`.
    pub(crate) fn built_pipeline(&self) -> &crate::pipeline::BuiltPipeline {
        self.built_pipeline.get_or_init(|| {
            let activator = Arc::clone(&self.activator);
            let ownership = self.ownership;
            let disposer = self.disposer.clone();
            #[cfg(feature = "async")]
            let async_disposer = self.async_disposer.clone();
            let terminal: Arc<
                dyn Fn(&mut crate::operation::ResolveRequestContext) -> crate::error::Result<()>
                    + Send
                    + Sync,
            > = Arc::new(move |ctx| {
                let instance = activator.activate(ctx, ctx.parameters())?;
                if ownership == Ownership::OwnedByLifetimeScope {
                    if let Some(d) = &disposer {
                        let d = Arc::clone(d);
                        let inst = Arc::clone(&instance);
                        let _ = ctx.scope().push_disposer(move || (*d)(&inst));
                    }
                    #[cfg(feature = "async")]
                    if let Some(d) = &async_disposer {
                        let d = Arc::clone(d);
                        let inst = Arc::clone(&instance);
                        let _ = ctx.scope().push_async_disposer(move || (*d)(inst));
                    }
                }
                ctx.set_instance(instance);
                Ok(())
            });
            self.pipeline.build(terminal)
        })
    }
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("id", &self.id)
            .field("services", &self.services)
            .field("lifetime", &self.lifetime)
            .field("sharing", &self.sharing)
            .field("ownership", &self.ownership)
            .finish()
    }
}

/// Builds a [`ComponentRegistration`]. Defaults: no services (at least one
/// must be added), `Lifetime::CurrentScope`, `Sharing::Shared`,
/// `Ownership::OwnedByLifetimeScope`.
pub struct ComponentRegistrationBuilder {
    services: Vec<ServiceKey>,
    activator: Arc<dyn Activator>,
    lifetime: Lifetime,
    sharing: Sharing,
    ownership: Ownership,
    metadata: HashMap<&'static str, MetadataValue>,
    options: RegistrationOptions,
    pipeline: PipelineBuilder,
    disposer: Option<SyncDisposer>,
    #[cfg(feature = "async")]
    async_disposer: Option<AsyncDisposer>,
}

impl ComponentRegistrationBuilder {
    fn new(activator: Arc<dyn Activator>) -> Self {
        Self {
            services: Vec::new(),
            activator,
            lifetime: Lifetime::CurrentScope,
            sharing: Sharing::Shared,
            ownership: Ownership::OwnedByLifetimeScope,
            metadata: HashMap::new(),
            options: RegistrationOptions::default(),
            pipeline: PipelineBuilder::for_registration_pipeline(),
            disposer: None,
            #[cfg(feature = "async")]
            async_disposer: None,
        }
    }

    pub fn with_service(mut self, service: ServiceKey) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_services(mut self, services: impl IntoIterator<Item = ServiceKey>) -> Self {
        self.services.extend(services);
        self
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn sharing(mut self, sharing: Sharing) -> Self {
        self.sharing = sharing;
        self
    }

    pub fn transient(self) -> Self {
        self.sharing(Sharing::None)
    }

    pub fn single_instance(self) -> Self {
        self.sharing(Sharing::Shared).lifetime(Lifetime::RootScope)
    }

    pub fn ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn externally_owned(self) -> Self {
        self.ownership(Ownership::ExternallyOwned)
    }

    pub fn with_metadata(mut self, key: &'static str, value: MetadataValue) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.options.fixed = true;
        self
    }

    pub fn exclude_from_collections(mut self) -> Self {
        self.options.exclude_from_collections = true;
        self
    }

    /// Registers this component without contesting the current default:
    /// if the service already has a default, this registration is only
    /// reachable via `all()`/`servicesFor`-style enumeration, not `resolve`.
    pub fn preserve_defaults(mut self) -> Self {
        self.options.preserve_defaults = true;
        self
    }

    /// Appends `middleware` to this registration's own pipeline, at the
    /// end of its phase. Fails with `DiError::PipelinePhaseViolation` if
    /// `middleware`'s phase isn't one of the registration pipeline's phases
    /// (`RegistrationPipelineStart`, `ParameterSelection`, `Activation`).
    pub fn with_middleware(
        self,
        middleware: Arc<dyn crate::middleware::Middleware>,
    ) -> crate::error::Result<Self> {
        self.with_middleware_at(middleware, crate::pipeline::InsertionMode::EndOfPhase)
    }

    /// Like [`Self::with_middleware`] but lets the caller choose where within
    /// the middleware's phase it lands.
    pub fn with_middleware_at(
        mut self,
        middleware: Arc<dyn crate::middleware::Middleware>,
        mode: crate::pipeline::InsertionMode,
    ) -> crate::error::Result<Self> {
        self.pipeline.insert(middleware, mode)?;
        Ok(self)
    }

    /// Registers a synchronous cleanup hook, run against the activated
    /// instance when the owning scope disposes (ignored for
    /// `Ownership::ExternallyOwned`).
    pub fn on_dispose(mut self, f: impl Fn(&AnyArc) + Send + Sync + 'static) -> Self {
        self.disposer = Some(Arc::new(f));
        self
    }

    /// Registers an async cleanup hook, run when the owning scope's
    /// `dispose_async` is awaited. A scope's synchronous `dispose` skips
    /// async-only hooks entirely.
    #[cfg(feature = "async")]
    pub fn on_dispose_async<Fut>(mut self, f: impl Fn(AnyArc) -> Fut + Send + Sync + 'static) -> Self
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.async_disposer = Some(Arc::new(move |instance| Box::pin(f(instance))));
        self
    }

    pub fn build(self) -> ComponentRegistration {
        ComponentRegistration {
            id: next_registration_id(),
            services: self.services,
            activator: self.activator,
            lifetime: self.lifetime,
            sharing: self.sharing,
            ownership: self.ownership,
            metadata: self.metadata,
            options: self.options,
            pipeline: self.pipeline,
            disposer: self.disposer,
            #[cfg(feature = "async")]
            async_disposer: self.async_disposer,
            built_pipeline: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::from_fn;

    #[test]
    fn builder_defaults_to_shared_current_scope() {
        let reg = ComponentRegistration::builder(from_fn(|| 1u32))
            .with_service(ServiceKey::typed::<u32>())
            .build();
        assert_eq!(reg.lifetime(), Lifetime::CurrentScope);
        assert_eq!(reg.sharing(), Sharing::Shared);
        assert_eq!(reg.ownership(), Ownership::OwnedByLifetimeScope);
    }

    #[test]
    fn transient_clears_sharing() {
        let reg = ComponentRegistration::builder(from_fn(|| 1u32))
            .with_service(ServiceKey::typed::<u32>())
            .transient()
            .build();
        assert_eq!(reg.sharing(), Sharing::None);
    }

    #[test]
    fn registration_ids_are_unique() {
        let a = ComponentRegistration::builder(from_fn(|| 1u32)).build();
        let b = ComponentRegistration::builder(from_fn(|| 1u32)).build();
        assert_ne!(a.id(), b.id());
    }
}
