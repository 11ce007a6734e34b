//! Built-in registration sources: generic adapters synthesized on demand for
//! `Lazy<T>`, `Func<T>`, `Owned<T>`, `Meta<T, M>`, collections, and indexed
//! lookups, composing recursively (e.g. `Lazy<Func<Owned<T>>>`) through the
//! registry's accessor callback.

use crate::activator::{from_instance, AnyArc};
use crate::error::{DiError, Result};
use crate::key::{KeyValue, ServiceKey};
use crate::registration::{ComponentRegistration, Lifetime, Ownership, Sharing};
use crate::registry::RegistrationSource;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// A deferred resolution of `T`: the activator runs only on first call to
/// [`Lazy::get`].
pub struct Lazy<T: ?Sized + 'static> {
    inner: once_cell::sync::OnceCell<Arc<T>>,
    resolve: Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>,
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub fn get(&self) -> Result<&Arc<T>> {
        self.inner.get_or_try_init(|| (self.resolve)())
    }
}

/// Produces a fresh `T` (subject to its own sharing policy) on every call.
pub struct Func<T: ?Sized + 'static> {
    resolve: Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>,
}

impl<T: Send + Sync + 'static> Func<T> {
    pub fn call(&self) -> Result<Arc<T>> {
        (self.resolve)()
    }
}

/// Wraps an activated `T` together with the scope that owns its disposal,
/// decoupling a consumer's reference from the scope that created it.
pub struct Owned<T: Send + Sync + 'static> {
    value: Arc<T>,
    _scope: Arc<crate::scope::LifetimeScope>,
}

impl<T: Send + Sync + 'static> Owned<T> {
    pub fn get(&self) -> &Arc<T> {
        &self.value
    }
}

/// An activated `T` alongside the metadata attached to the registration that
/// produced it.
pub struct Meta<T: Send + Sync + 'static> {
    value: Arc<T>,
    metadata: Arc<std::collections::HashMap<&'static str, crate::registration::MetadataValue>>,
}

impl<T: Send + Sync + 'static> Meta<T> {
    pub fn get(&self) -> &Arc<T> {
        &self.value
    }

    pub fn metadata(&self) -> &std::collections::HashMap<&'static str, crate::registration::MetadataValue> {
        &self.metadata
    }
}

/// Every activated `T` currently registered, enumerated in registration
/// order, excluding registrations marked `exclude_from_collections`.
pub struct Collection<T: Send + Sync + 'static>(Vec<Arc<T>>, PhantomData<T>);

impl<T: Send + Sync + 'static> Collection<T> {
    pub fn items(&self) -> &[Arc<T>] {
        &self.0
    }
}

/// Looks up a `V` registered under key `K` among a family of keyed
/// registrations, mirroring Autofac's `IIndex<K, V>`.
pub struct IndexedServices<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    lookup: Box<dyn Fn(&K) -> Result<Arc<V>> + Send + Sync>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> IndexedServices<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn get(&self, key: &K) -> Result<Arc<V>> {
        (self.lookup)(key)
    }
}

fn downcast_services<T: Send + Sync + 'static>(raw: AnyArc) -> Result<Arc<T>> {
    raw.downcast::<T>()
        .map_err(|_| DiError::internal("adapter source produced a mistyped instance"))
}

/// Generic helper: builds a one-shot adapter registration wrapping whatever
/// `inner_service` resolves to, reusing the requesting context's own
/// resolution (not a fresh top-level operation) so cycle detection still
/// covers the whole chain.
fn adapter_activator<T, W>(
    inner: ServiceKey,
    wrap: impl Fn(AnyArc, &crate::operation::ResolveRequestContext) -> Result<W> + Send + Sync + 'static,
) -> Arc<dyn crate::activator::Activator>
where
    T: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    Arc::new(
        move |ctx: &crate::operation::ResolveRequestContext, _params: &[Arc<dyn crate::parameter::Parameter>]| -> Result<AnyArc> {
            let raw = ctx.resolve(inner.clone())?;
            Ok(Arc::new(wrap(raw, ctx)?) as AnyArc)
        },
    )
}

/// Adapts `T` into `Lazy<T>` for any `T` the registry can already resolve.
pub struct LazySource<T: Send + Sync + 'static>(PhantomData<T>);

impl<T: Send + Sync + 'static> LazySource<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(PhantomData))
    }
}

impl<T: Send + Sync + 'static> RegistrationSource for LazySource<T> {
    fn registrations_for(
        &self,
        service: &ServiceKey,
        accessor: &dyn Fn(&ServiceKey) -> Vec<Arc<ComponentRegistration>>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let target = ServiceKey::typed::<Lazy<T>>();
        if service != &target {
            return Vec::new();
        }
        let inner = ServiceKey::typed::<T>();
        if accessor(&inner).is_empty() {
            return Vec::new();
        }
        let activator = Arc::new(
            move |ctx: &crate::operation::ResolveRequestContext, _p: &[Arc<dyn crate::parameter::Parameter>]| -> Result<AnyArc> {
                let inner = ServiceKey::typed::<T>();
                let ctx_scope = Arc::clone(ctx.scope());
                let operation = Arc::clone(&ctx.operation);
                let resolve = Box::new(move || -> Result<Arc<T>> {
                    let raw = ctx_scope.resolve_within(inner.clone(), Vec::new(), Arc::clone(&operation))?;
                    downcast_services::<T>(raw)
                });
                Ok(Arc::new(Lazy::<T> {
                    inner: once_cell::sync::OnceCell::new(),
                    resolve,
                }) as AnyArc)
            },
        );
        vec![Arc::new(
            ComponentRegistration::builder(activator)
                .with_service(target)
                .sharing(Sharing::None)
                .build(),
        )]
    }

    fn description(&self) -> &str {
        "Lazy<T> adapter"
    }
}

/// Adapts `T` into `Func<T>`: a callable that resolves a fresh `T` (subject
/// to `T`'s own registered sharing policy) each time it's invoked.
pub struct FuncSource<T: Send + Sync + 'static>(PhantomData<T>);

impl<T: Send + Sync + 'static> FuncSource<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(PhantomData))
    }
}

impl<T: Send + Sync + 'static> RegistrationSource for FuncSource<T> {
    fn registrations_for(
        &self,
        service: &ServiceKey,
        accessor: &dyn Fn(&ServiceKey) -> Vec<Arc<ComponentRegistration>>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let target = ServiceKey::typed::<Func<T>>();
        if service != &target {
            return Vec::new();
        }
        let inner = ServiceKey::typed::<T>();
        if accessor(&inner).is_empty() {
            return Vec::new();
        }
        let activator = Arc::new(
            move |ctx: &crate::operation::ResolveRequestContext, _p: &[Arc<dyn crate::parameter::Parameter>]| -> Result<AnyArc> {
                let ctx_scope = Arc::clone(ctx.scope());
                let operation = Arc::clone(&ctx.operation);
                let resolve = Box::new(move || -> Result<Arc<T>> {
                    let raw =
                        ctx_scope.resolve_within(ServiceKey::typed::<T>(), Vec::new(), Arc::clone(&operation))?;
                    downcast_services::<T>(raw)
                });
                Ok(Arc::new(Func::<T> { resolve }) as AnyArc)
            },
        );
        vec![Arc::new(
            ComponentRegistration::builder(activator)
                .with_service(target)
                .sharing(Sharing::None)
                .build(),
        )]
    }

    fn description(&self) -> &str {
        "Func<T> adapter"
    }
}

/// Adapts `T` into `Owned<T>`, pinning the activating scope alongside the
/// value so a consumer can outlive the call that produced it without losing
/// track of who disposes it.
pub struct OwnedSource<T: Send + Sync + 'static>(PhantomData<T>);

impl<T: Send + Sync + 'static> OwnedSource<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(PhantomData))
    }
}

impl<T: Send + Sync + 'static> RegistrationSource for OwnedSource<T> {
    fn registrations_for(
        &self,
        service: &ServiceKey,
        accessor: &dyn Fn(&ServiceKey) -> Vec<Arc<ComponentRegistration>>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let target = ServiceKey::typed::<Owned<T>>();
        if service != &target {
            return Vec::new();
        }
        let inner = ServiceKey::typed::<T>();
        if accessor(&inner).is_empty() {
            return Vec::new();
        }
        let activator = adapter_activator::<T, Owned<T>>(inner, |raw, ctx| {
            Ok(Owned {
                value: downcast_services::<T>(raw)?,
                _scope: Arc::clone(ctx.scope()),
            })
        });
        vec![Arc::new(
            ComponentRegistration::builder(activator)
                .with_service(target)
                .sharing(Sharing::None)
                .ownership(Ownership::ExternallyOwned)
                .build(),
        )]
    }

    fn description(&self) -> &str {
        "Owned<T> adapter"
    }
}

/// Adapts `T` into `Meta<T>` by pairing the activated instance with the
/// metadata of the registration the registry chose as its default.
pub struct MetaSource<T: Send + Sync + 'static>(PhantomData<T>);

impl<T: Send + Sync + 'static> MetaSource<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(PhantomData))
    }
}

impl<T: Send + Sync + 'static> RegistrationSource for MetaSource<T> {
    fn registrations_for(
        &self,
        service: &ServiceKey,
        accessor: &dyn Fn(&ServiceKey) -> Vec<Arc<ComponentRegistration>>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let target = ServiceKey::typed::<Meta<T>>();
        if service != &target {
            return Vec::new();
        }
        let inner = ServiceKey::typed::<T>();
        let candidates = accessor(&inner);
        let Some(winner) = candidates.last().cloned() else {
            return Vec::new();
        };
        let metadata = Arc::new(winner.metadata().clone());
        let activator = adapter_activator::<T, Meta<T>>(inner, move |raw, _ctx| {
            Ok(Meta {
                value: downcast_services::<T>(raw)?,
                metadata: Arc::clone(&metadata),
            })
        });
        vec![Arc::new(
            ComponentRegistration::builder(activator)
                .with_service(target)
                .sharing(Sharing::None)
                .build(),
        )]
    }

    fn description(&self) -> &str {
        "Meta<T> adapter"
    }
}

/// Adapts the registrations of a keyed service family into
/// `Collection<T>`/`IndexedServices<K, T>`, honoring
/// `exclude_from_collections`.
pub struct CollectionSource<T: Send + Sync + 'static>(PhantomData<T>);

impl<T: Send + Sync + 'static> CollectionSource<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(PhantomData))
    }
}

impl<T: Send + Sync + 'static> RegistrationSource for CollectionSource<T> {
    fn registrations_for(
        &self,
        service: &ServiceKey,
        accessor: &dyn Fn(&ServiceKey) -> Vec<Arc<ComponentRegistration>>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let target = ServiceKey::typed::<Collection<T>>();
        if service != &target {
            return Vec::new();
        }
        let inner = ServiceKey::typed::<T>();
        let candidates: Vec<_> = accessor(&inner)
            .into_iter()
            .filter(|r| !r.options().exclude_from_collections)
            .collect();
        let activator = Arc::new(
            move |ctx: &crate::operation::ResolveRequestContext, _p: &[Arc<dyn crate::parameter::Parameter>]| -> Result<AnyArc> {
                let mut items = Vec::with_capacity(candidates.len());
                let ctx_scope = Arc::clone(ctx.scope());
                let operation = Arc::clone(&ctx.operation);
                for reg in &candidates {
                    // Re-enter through the full service pipeline (not just
                    // `reg.built_pipeline()`) so decorators and shared-instance
                    // caching apply to collection members the same as they
                    // would to a direct `resolve::<T>()` of the same registration.
                    let raw = ctx_scope.resolve_registration_within(
                        ServiceKey::typed::<T>(),
                        Arc::clone(reg),
                        Vec::new(),
                        Arc::clone(&operation),
                    )?;
                    items.push(downcast_services::<T>(raw)?);
                }
                Ok(Arc::new(Collection(items, PhantomData::<T>)) as AnyArc)
            },
        );
        vec![Arc::new(
            ComponentRegistration::builder(activator)
                .with_service(target)
                .sharing(Sharing::None)
                .build(),
        )]
    }

    fn description(&self) -> &str {
        "Collection<T> adapter"
    }
}

/// Adapts a keyed service family into `IndexedServices<K, V>`.
pub struct IndexedSource<K, V>
where
    K: Any + Send + Sync + Eq + std::hash::Hash + std::fmt::Debug + Clone + 'static,
    V: Send + Sync + 'static,
{
    _marker: PhantomData<(K, V)>,
}

impl<K, V> IndexedSource<K, V>
where
    K: Any + Send + Sync + Eq + std::hash::Hash + std::fmt::Debug + Clone + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            _marker: PhantomData,
        })
    }
}

impl<K, V> RegistrationSource for IndexedSource<K, V>
where
    K: Any + Send + Sync + Eq + std::hash::Hash + std::fmt::Debug + Clone + 'static,
    V: Send + Sync + 'static,
{
    fn registrations_for(
        &self,
        service: &ServiceKey,
        _accessor: &dyn Fn(&ServiceKey) -> Vec<Arc<ComponentRegistration>>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let target = ServiceKey::typed::<IndexedServices<K, V>>();
        if service != &target {
            return Vec::new();
        }
        let activator = Arc::new(
            move |ctx: &crate::operation::ResolveRequestContext, _p: &[Arc<dyn crate::parameter::Parameter>]| -> Result<AnyArc> {
                let ctx_scope = Arc::clone(ctx.scope());
                let operation = Arc::clone(&ctx.operation);
                let lookup = Box::new(move |key: &K| -> Result<Arc<V>> {
                    let service = ServiceKey::keyed::<V>(KeyValue::new(key.clone()));
                    let raw = ctx_scope.resolve_within(service, Vec::new(), Arc::clone(&operation))?;
                    downcast_services::<V>(raw)
                });
                Ok(Arc::new(IndexedServices::<K, V> {
                    lookup,
                    _marker: PhantomData,
                }) as AnyArc)
            },
        );
        vec![Arc::new(
            ComponentRegistration::builder(activator)
                .with_service(target)
                .sharing(Sharing::None)
                .build(),
        )]
    }

    fn description(&self) -> &str {
        "IndexedServices<K, V> adapter"
    }
}

/// Registers a plain instance with no activator indirection: `Ownership`
/// defaults to externally owned, since the caller already owns `value`.
pub fn instance_registration<T>(value: T, service: ServiceKey) -> ComponentRegistration
where
    T: Send + Sync + 'static,
{
    ComponentRegistration::builder(from_instance(value))
        .with_service(service)
        .lifetime(Lifetime::RootScope)
        .ownership(Ownership::ExternallyOwned)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::from_fn;
    use crate::registry::Registry;

    #[test]
    fn lazy_source_only_fires_on_first_get() {
        let registry = Arc::new(Registry::new_root());
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 7u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .build(),
            )
            .unwrap();
        registry.add_registration_source(LazySource::<u32>::new()).unwrap();
        let scope = crate::scope::LifetimeScope::new_root(registry, crate::diagnostics::default_listener());
        let lazy = scope.resolve(ServiceKey::typed::<Lazy<u32>>()).unwrap();
        let lazy = lazy.downcast::<Lazy<u32>>().unwrap();
        assert_eq!(**lazy.get().unwrap(), 7);
    }

    #[test]
    fn collection_source_excludes_flagged_registrations() {
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
                    .exclude_from_collections()
                    .build(),
            )
            .unwrap();
        registry.add_registration_source(CollectionSource::<u32>::new()).unwrap();
        let scope = crate::scope::LifetimeScope::new_root(registry, crate::diagnostics::default_listener());
        let all = scope.resolve(ServiceKey::typed::<Collection<u32>>()).unwrap();
        let all = all.downcast::<Collection<u32>>().unwrap();
        assert_eq!(all.items().len(), 1);
    }

    #[test]
    fn collection_members_share_the_same_instance_as_a_direct_resolve() {
        let registry = Arc::new(Registry::new_root());
        registry
            .register(
                ComponentRegistration::builder(from_fn(|| 42u32))
                    .with_service(ServiceKey::typed::<u32>())
                    .single_instance()
                    .build(),
            )
            .unwrap();
        registry.add_registration_source(CollectionSource::<u32>::new()).unwrap();
        let scope = crate::scope::LifetimeScope::new_root(registry, crate::diagnostics::default_listener());
        let direct = scope.resolve(ServiceKey::typed::<u32>()).unwrap();
        let direct = direct.downcast::<u32>().unwrap();
        let collection = scope.resolve(ServiceKey::typed::<Collection<u32>>()).unwrap();
        let collection = collection.downcast::<Collection<u32>>().unwrap();
        assert_eq!(collection.items().len(), 1);
        assert!(Arc::ptr_eq(&direct, &collection.items()[0]));
    }
}
