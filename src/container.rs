//! The container: a minimal fluent builder over an unsealed [`Registry`],
//! and the sealed root [`LifetimeScope`] it produces.

use crate::activator::{from_instance, AnyArc};
use crate::decorator::{Decorator, DecoratorRegistration};
use crate::diagnostics::{default_listener, DiagnosticListener};
use crate::error::{DiError, Result};
use crate::key::{KeyValue, ServiceKey};
use crate::operation::ResolveRequestContext;
use crate::parameter::Parameter;
use crate::registration::{ComponentRegistration, Lifetime, Ownership};
use crate::registry::{RegistrationSource, Registry};
use crate::scope::{LifetimeScope, ScopeTag};
use std::sync::Arc;

/// Accumulates registrations, registration sources, and decorators before
/// the container is built. Not reusable after [`ContainerBuilder::build`]
/// consumes it.
pub struct ContainerBuilder {
    registry: Registry,
    diagnostics: Arc<dyn DiagnosticListener>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        let diagnostics = default_listener();
        Self {
            registry: Registry::with_diagnostics(Arc::clone(&diagnostics)),
            diagnostics,
        }
    }

    pub fn with_diagnostics(diagnostics: Arc<dyn DiagnosticListener>) -> Self {
        Self {
            registry: Registry::with_diagnostics(Arc::clone(&diagnostics)),
            diagnostics,
        }
    }

    /// Registers an activator built from a plain closure over a resolve
    /// context, under `T`'s type-identified service key, with the default
    /// `Lifetime::CurrentScope` / shared sharing policy.
    pub fn register<T, F>(&mut self, factory: F) -> Result<Arc<ComponentRegistration>>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveRequestContext) -> Result<T> + Send + Sync + 'static,
    {
        let activator = Arc::new(
            move |ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| -> Result<AnyArc> {
                Ok(Arc::new(factory(ctx)?) as AnyArc)
            },
        );
        self.registry.register(
            ComponentRegistration::builder(activator)
                .with_service(ServiceKey::typed::<T>())
                .build(),
        )
    }

    /// Like [`Self::register`] but shared from the root scope regardless of
    /// which scope first resolves it.
    pub fn register_singleton<T, F>(&mut self, factory: F) -> Result<Arc<ComponentRegistration>>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveRequestContext) -> Result<T> + Send + Sync + 'static,
    {
        let activator = Arc::new(
            move |ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| -> Result<AnyArc> {
                Ok(Arc::new(factory(ctx)?) as AnyArc)
            },
        );
        self.registry.register(
            ComponentRegistration::builder(activator)
                .with_service(ServiceKey::typed::<T>())
                .single_instance()
                .build(),
        )
    }

    /// Like [`Self::register`] but creates a fresh instance on every resolve.
    pub fn register_transient<T, F>(&mut self, factory: F) -> Result<Arc<ComponentRegistration>>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveRequestContext) -> Result<T> + Send + Sync + 'static,
    {
        let activator = Arc::new(
            move |ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| -> Result<AnyArc> {
                Ok(Arc::new(factory(ctx)?) as AnyArc)
            },
        );
        self.registry.register(
            ComponentRegistration::builder(activator)
                .with_service(ServiceKey::typed::<T>())
                .transient()
                .build(),
        )
    }

    /// Like [`Self::register`], plus a synchronous cleanup hook run against
    /// the activated instance when its owning scope disposes.
    pub fn register_with_disposal<T, F, D>(&mut self, factory: F, dispose: D) -> Result<Arc<ComponentRegistration>>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveRequestContext) -> Result<T> + Send + Sync + 'static,
        D: Fn(&T) + Send + Sync + 'static,
    {
        let activator = Arc::new(
            move |ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| -> Result<AnyArc> {
                Ok(Arc::new(factory(ctx)?) as AnyArc)
            },
        );
        self.registry.register(
            ComponentRegistration::builder(activator)
                .with_service(ServiceKey::typed::<T>())
                .on_dispose(move |any| {
                    if let Some(t) = any.downcast_ref::<T>() {
                        dispose(t);
                    }
                })
                .build(),
        )
    }

    /// Like [`Self::register`], plus an async cleanup hook run when the
    /// owning scope's `dispose_async` is awaited.
    #[cfg(feature = "async")]
    pub fn register_with_async_disposal<T, F, D, Fut>(
        &mut self,
        factory: F,
        dispose: D,
    ) -> Result<Arc<ComponentRegistration>>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveRequestContext) -> Result<T> + Send + Sync + 'static,
        D: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let activator = Arc::new(
            move |ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| -> Result<AnyArc> {
                Ok(Arc::new(factory(ctx)?) as AnyArc)
            },
        );
        self.registry.register(
            ComponentRegistration::builder(activator)
                .with_service(ServiceKey::typed::<T>())
                .on_dispose_async(move |any: AnyArc| {
                    let fut = any.downcast::<T>().ok().map(&dispose);
                    async move {
                        if let Some(fut) = fut {
                            fut.await;
                        }
                    }
                })
                .build(),
        )
    }

    /// Registers an already-constructed value. Externally owned: the scope
    /// tree never disposes it.
    pub fn register_instance<T>(&mut self, value: T) -> Result<Arc<ComponentRegistration>>
    where
        T: Send + Sync + 'static,
    {
        self.registry.register(
            ComponentRegistration::builder(from_instance(value))
                .with_service(ServiceKey::typed::<T>())
                .lifetime(Lifetime::RootScope)
                .ownership(Ownership::ExternallyOwned)
                .build(),
        )
    }

    /// Registers `factory` under a keyed variant of `T`'s service, selected
    /// at resolve time via [`Container::resolve_keyed`].
    pub fn register_keyed<T, K, F>(&mut self, key: K, factory: F) -> Result<Arc<ComponentRegistration>>
    where
        T: Send + Sync + 'static,
        K: std::any::Any + Send + Sync + Eq + std::hash::Hash + std::fmt::Debug,
        F: Fn(&ResolveRequestContext) -> Result<T> + Send + Sync + 'static,
    {
        let activator = Arc::new(
            move |ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| -> Result<AnyArc> {
                Ok(Arc::new(factory(ctx)?) as AnyArc)
            },
        );
        self.registry.register(
            ComponentRegistration::builder(activator)
                .with_service(ServiceKey::keyed::<T>(KeyValue::new(key)))
                .build(),
        )
    }

    pub fn register_builder(&mut self, registration: ComponentRegistration) -> Result<Arc<ComponentRegistration>> {
        self.registry.register(registration)
    }

    pub fn add_registration_source(&mut self, source: Arc<dyn RegistrationSource>) -> Result<()> {
        self.registry.add_registration_source(source)
    }

    pub fn register_decorator<T>(&mut self, decorator: Arc<dyn Decorator>) -> Result<()>
    where
        T: 'static,
    {
        self.registry.register_decorator(
            ServiceKey::typed::<T>(),
            Arc::new(DecoratorRegistration::new(std::any::type_name::<T>(), decorator)),
        )
    }

    pub fn add_service_middleware(
        &mut self,
        service: ServiceKey,
        middleware: Arc<dyn crate::middleware::Middleware>,
    ) -> Result<()> {
        self.registry.add_service_middleware(service, middleware)
    }

    /// Seals the registry and returns the root container.
    pub fn build(self) -> Container {
        self.registry.seal();
        Container(LifetimeScope::new_root(Arc::new(self.registry), self.diagnostics))
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The root of a scope tree. A thin, ergonomic facade over
/// `Arc<LifetimeScope>` offering type-safe `resolve`/`resolve_keyed` and
/// scope creation; disposal and sharing live in [`LifetimeScope`] itself.
#[derive(Clone)]
pub struct Container(Arc<LifetimeScope>);

impl Container {
    pub fn scope(&self) -> &Arc<LifetimeScope> {
        &self.0
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let raw = self.0.resolve(ServiceKey::typed::<T>())?;
        downcast(raw)
    }

    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        match self.0.try_resolve(ServiceKey::typed::<T>())? {
            Some(raw) => Ok(Some(downcast(raw)?)),
            None => Ok(None),
        }
    }

    pub fn resolve_keyed<T, K>(&self, key: K) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        K: std::any::Any + Send + Sync + Eq + std::hash::Hash + std::fmt::Debug,
    {
        let raw = self.0.resolve(ServiceKey::keyed::<T>(KeyValue::new(key)))?;
        downcast(raw)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.0.registry().contains(&ServiceKey::typed::<T>())
    }

    /// Number of services registered directly on this scope (not counting ancestors).
    pub fn len(&self) -> usize {
        self.0.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.registry().is_empty()
    }

    /// Opens an untagged, unconfigured child scope.
    pub fn begin_scope(&self) -> Container {
        Container(self.0.begin_scope(None, |_| {}))
    }

    /// Opens a tagged child scope, matchable by `Lifetime::MatchingScope`.
    pub fn begin_scope_tagged(&self, tag: impl Into<Arc<str>>) -> Container {
        Container(self.0.begin_scope(Some(ScopeTag::named(tag)), |_| {}))
    }

    /// Opens a child scope with registrations visible only to it (and its
    /// descendants).
    pub fn begin_scope_with(
        &self,
        tag: Option<ScopeTag>,
        configure: impl FnOnce(&mut crate::registry::RegistryBuilder),
    ) -> Container {
        Container(self.0.begin_scope(tag, configure))
    }

    pub fn dispose(&self) {
        self.0.dispose();
    }

    #[cfg(feature = "async")]
    pub async fn dispose_async(&self) {
        self.0.dispose_async().await;
    }
}

fn downcast<T: Send + Sync + 'static>(raw: AnyArc) -> Result<Arc<T>> {
    raw.downcast::<T>()
        .map_err(|_| DiError::internal("resolved instance did not match the requested type"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_resolves_the_same_instance_twice() {
        let mut builder = ContainerBuilder::new();
        builder.register_singleton::<u32, _>(|_| Ok(42)).unwrap();
        let container = builder.build();
        let a = container.resolve::<u32>().unwrap();
        let b = container.resolve::<u32>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn transient_resolves_a_fresh_instance_each_time() {
        let mut builder = ContainerBuilder::new();
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        builder
            .register_transient::<u32, _>(move |_| {
                Ok(counter_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
            })
            .unwrap();
        let container = builder.build();
        let a = container.resolve::<u32>().unwrap();
        let b = container.resolve::<u32>().unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn scoped_child_shares_within_itself_but_not_with_siblings() {
        let mut builder = ContainerBuilder::new();
        builder.register::<u32, _>(|_| Ok(1)).unwrap();
        let container = builder.build();
        let child_a = container.begin_scope();
        let child_b = container.begin_scope();
        let a1 = child_a.resolve::<u32>().unwrap();
        let a2 = child_a.resolve::<u32>().unwrap();
        let b1 = child_b.resolve::<u32>().unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b1));
    }

    #[test]
    fn not_registered_surfaces_as_component_not_registered() {
        let container = ContainerBuilder::new().build();
        let err = container.resolve::<u32>().unwrap_err();
        assert!(err.is_not_registered());
    }

    #[test]
    fn keyed_registrations_do_not_collide_with_the_plain_service() {
        let mut builder = ContainerBuilder::new();
        builder.register::<u32, _>(|_| Ok(1)).unwrap();
        builder.register_keyed::<u32, _, _>("answer", |_| Ok(42)).unwrap();
        let container = builder.build();
        assert_eq!(*container.resolve::<u32>().unwrap(), 1);
        assert_eq!(*container.resolve_keyed::<u32, _>("answer").unwrap(), 42);
    }
}
