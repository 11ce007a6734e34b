//! End-to-end scenarios exercising the container's resolution, sharing,
//! adapter, scoping, decoration, and disposal semantics together, as opposed
//! to the unit tests living alongside each module.

use armature::{
    typed_decorator, Collection, CollectionSource, ComponentRegistration, Container,
    ContainerBuilder, DiError, Lazy, LazySource, Lifetime, ScopeTag,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Foo(u32);

#[test]
fn typed_resolve_sharing_none_vs_shared() {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let mut transient_builder = ContainerBuilder::new();
    transient_builder
        .register_transient::<Foo, _>(|_| Ok(Foo(COUNTER.fetch_add(1, Ordering::SeqCst))))
        .unwrap();
    let transient = transient_builder.build();
    let a = transient.resolve::<Foo>().unwrap();
    let b = transient.resolve::<Foo>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(a.0, b.0);

    let mut shared_builder = ContainerBuilder::new();
    shared_builder.register::<Foo, _>(|_| Ok(Foo(99))).unwrap();
    let shared = shared_builder.build();
    let c = shared.resolve::<Foo>().unwrap();
    let d = shared.resolve::<Foo>().unwrap();
    assert!(Arc::ptr_eq(&c, &d));
}

#[derive(Debug, PartialEq, Eq)]
struct NamedService(&'static str);

#[test]
fn keyed_resolution_and_missing_key_fails() {
    let mut builder = ContainerBuilder::new();
    builder
        .register_keyed::<NamedService, _, _>("x", |_| Ok(NamedService("A")))
        .unwrap();
    builder
        .register_keyed::<NamedService, _, _>("y", |_| Ok(NamedService("B")))
        .unwrap();
    let container = builder.build();

    let a = container.resolve_keyed::<NamedService, _>("x").unwrap();
    assert_eq!(*a, NamedService("A"));

    let err = container
        .resolve_keyed::<NamedService, _>("z")
        .unwrap_err();
    assert!(err.is_not_registered());
    assert!(matches!(err, DiError::ComponentNotRegistered { .. }));
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Handler(u32);

#[test]
fn collection_adapter_preserves_registration_order() {
    let mut builder = ContainerBuilder::new();
    builder.register::<Handler, _>(|_| Ok(Handler(1))).unwrap();
    builder.register::<Handler, _>(|_| Ok(Handler(2))).unwrap();
    builder.register::<Handler, _>(|_| Ok(Handler(3))).unwrap();
    builder
        .add_registration_source(CollectionSource::<Handler>::new())
        .unwrap();
    let container = builder.build();

    let all = container.resolve::<Collection<Handler>>().unwrap();
    let ids: Vec<u32> = all.items().iter().map(|h| h.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

struct Heavy;

#[test]
fn lazy_defers_construction_until_first_observed() {
    static CONSTRUCTED: AtomicU32 = AtomicU32::new(0);

    let mut builder = ContainerBuilder::new();
    builder
        .register::<Heavy, _>(|_| {
            CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Heavy)
        })
        .unwrap();
    builder
        .add_registration_source(LazySource::<Heavy>::new())
        .unwrap();
    let container = builder.build();

    let lazy = container.resolve::<Lazy<Heavy>>().unwrap();
    assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 0);

    let first = lazy.get().unwrap() as *const Arc<Heavy>;
    assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);

    let second = lazy.get().unwrap() as *const Arc<Heavy>;
    assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[derive(Debug)]
struct ServiceV(u32);

#[test]
fn sub_scope_isolation_and_disposal_independence() {
    let mut builder = ContainerBuilder::new();
    builder.register::<ServiceV, _>(|_| Ok(ServiceV(1))).unwrap();
    let root = builder.build();

    let child = root.begin_scope_with(Some(ScopeTag::named("child")), |b| {
        b.register::<ServiceV, _>(|_| Ok(ServiceV(2))).unwrap();
    });

    assert_eq!(root.resolve::<ServiceV>().unwrap().0, 1);
    assert_eq!(child.resolve::<ServiceV>().unwrap().0, 2);

    child.dispose();
    assert_eq!(root.resolve::<ServiceV>().unwrap().0, 1);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IxValue(String);

#[test]
fn decorator_stack_orders_outermost_last_registered_and_cascades_disposal() {
    let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let mut builder = ContainerBuilder::new();
    {
        let log = Arc::clone(&log);
        builder
            .register_with_disposal::<IxValue, _, _>(
                |_| Ok(IxValue("Core".to_string())),
                move |_| log.lock().unwrap().push("core"),
            )
            .unwrap();
    }
    {
        let log = Arc::clone(&log);
        builder
            .register_decorator::<IxValue>(typed_decorator::<IxValue, _>(move |inner, ctx| {
                let log = Arc::clone(&log);
                let _ = ctx
                    .scope()
                    .register_for_disposal(move || log.lock().unwrap().push("d1"));
                IxValue(format!("D1({})", inner.0))
            }))
            .unwrap();
    }
    {
        let log = Arc::clone(&log);
        builder
            .register_decorator::<IxValue>(typed_decorator::<IxValue, _>(move |inner, ctx| {
                let log = Arc::clone(&log);
                let _ = ctx
                    .scope()
                    .register_for_disposal(move || log.lock().unwrap().push("d2"));
                IxValue(format!("D2({})", inner.0))
            }))
            .unwrap();
    }

    let container = builder.build();
    let resolved = container.resolve::<IxValue>().unwrap();
    assert_eq!(resolved.0, "D2(D1(Core))");

    container.dispose();
    assert_eq!(*log.lock().unwrap(), vec!["d2", "d1", "core"]);
}

#[derive(Debug)]
struct Request(u32);

#[test]
fn matching_scope_lifetime() {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let mut builder = ContainerBuilder::new();
    builder
        .register_builder(
            ComponentRegistration::builder(armature::from_fn(|| {
                Request(COUNTER.fetch_add(1, Ordering::SeqCst))
            }))
            .with_service(armature::ServiceKey::typed::<Request>())
            .lifetime(Lifetime::MatchingScope("request"))
            .build(),
        )
        .unwrap();
    let root = builder.build();

    let err = root.resolve::<Request>().unwrap_err();
    match err {
        DiError::NoMatchingScope { tag } => assert_eq!(tag, "request"),
        other => panic!("expected NoMatchingScope, got {other:?}"),
    }

    let tagged_a = root.begin_scope_tagged("request");
    let a1 = tagged_a.resolve::<Request>().unwrap();
    let a2 = tagged_a.resolve::<Request>().unwrap();
    assert!(Arc::ptr_eq(&a1, &a2));

    let tagged_b = root.begin_scope_tagged("request");
    let b1 = tagged_b.resolve::<Request>().unwrap();
    assert!(!Arc::ptr_eq(&a1, &b1));
}

struct SyncThing;
struct AsyncThing;

fn disposal_fixture(
    sync_disposed: Arc<AtomicBool>,
    async_disposed: Arc<AtomicBool>,
) -> Container {
    let mut builder = ContainerBuilder::new();
    builder
        .register_with_disposal::<SyncThing, _, _>(
            |_| Ok(SyncThing),
            move |_| sync_disposed.store(true, Ordering::SeqCst),
        )
        .unwrap();
    builder
        .register_with_async_disposal::<AsyncThing, _, _, _>(
            |_| Ok(AsyncThing),
            move |_inst: Arc<AsyncThing>| {
                let async_disposed = Arc::clone(&async_disposed);
                async move {
                    async_disposed.store(true, Ordering::SeqCst);
                }
            },
        )
        .unwrap();
    let container = builder.build();
    let _ = container.resolve::<SyncThing>().unwrap();
    let _ = container.resolve::<AsyncThing>().unwrap();
    container
}

#[test]
fn sync_dispose_skips_async_only_disposables() {
    let sync_disposed = Arc::new(AtomicBool::new(false));
    let async_disposed = Arc::new(AtomicBool::new(false));
    let container = disposal_fixture(Arc::clone(&sync_disposed), Arc::clone(&async_disposed));

    container.dispose();

    assert!(sync_disposed.load(Ordering::SeqCst));
    assert!(!async_disposed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn dispose_async_awaits_the_async_disposable_too() {
    let sync_disposed = Arc::new(AtomicBool::new(false));
    let async_disposed = Arc::new(AtomicBool::new(false));
    let container = disposal_fixture(Arc::clone(&sync_disposed), Arc::clone(&async_disposed));

    container.dispose_async().await;

    assert!(sync_disposed.load(Ordering::SeqCst));
    assert!(async_disposed.load(Ordering::SeqCst));
}
