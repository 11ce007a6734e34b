//! Benchmarks for the DI container

use armature::ContainerBuilder;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

#[allow(dead_code)]
#[derive(Clone)]
struct SmallService {
    value: i32,
}

#[allow(dead_code)]
#[derive(Clone)]
struct MediumService {
    name: String,
    values: Vec<i32>,
}

#[allow(dead_code)]
#[derive(Clone)]
struct LargeService {
    data: Vec<u8>,
    config: std::collections::HashMap<String, String>,
}

#[allow(dead_code)]
#[derive(Clone)]
struct ServiceA {
    value: i32,
}

#[allow(dead_code)]
#[derive(Clone)]
struct ServiceB {
    name: String,
}

#[allow(dead_code)]
#[derive(Clone)]
struct ServiceC {
    data: Vec<u8>,
}

#[allow(dead_code)]
#[derive(Clone)]
struct ServiceD {
    flag: bool,
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("singleton_small", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            builder
                .register_singleton::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
                .unwrap();
            black_box(builder.build())
        })
    });

    group.bench_function("singleton_medium", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            builder
                .register_singleton::<MediumService, _>(|_| {
                    Ok(MediumService {
                        name: "test".to_string(),
                        values: vec![1, 2, 3, 4, 5],
                    })
                })
                .unwrap();
            black_box(builder.build())
        })
    });

    group.bench_function("lazy", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            builder
                .register::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
                .unwrap();
            black_box(builder.build())
        })
    });

    group.bench_function("transient", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            builder
                .register_transient::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
                .unwrap();
            black_box(builder.build())
        })
    });

    group.bench_function("individual_4_services", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            builder
                .register_singleton::<ServiceA, _>(|_| Ok(ServiceA { value: 1 }))
                .unwrap();
            builder
                .register_singleton::<ServiceB, _>(|_| Ok(ServiceB { name: "test".into() }))
                .unwrap();
            builder
                .register_singleton::<ServiceC, _>(|_| Ok(ServiceC { data: vec![1, 2, 3] }))
                .unwrap();
            builder
                .register_singleton::<ServiceD, _>(|_| Ok(ServiceD { flag: true }))
                .unwrap();
            black_box(builder.build())
        })
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let mut builder = ContainerBuilder::new();
    builder
        .register_singleton::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
        .unwrap();
    builder
        .register_singleton::<MediumService, _>(|_| {
            Ok(MediumService {
                name: "test".to_string(),
                values: vec![1, 2, 3, 4, 5],
            })
        })
        .unwrap();
    let container = builder.build();

    group.bench_function("resolve_singleton", |b| {
        b.iter(|| {
            let service = container.resolve::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("resolve_medium", |b| {
        b.iter(|| {
            let service = container.resolve::<MediumService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("contains_check", |b| {
        b.iter(|| black_box(container.contains::<SmallService>()))
    });

    group.bench_function("try_resolve_found", |b| {
        b.iter(|| black_box(container.try_resolve::<SmallService>()))
    });

    group.bench_function("try_resolve_not_found", |b| {
        b.iter(|| black_box(container.try_resolve::<LargeService>()))
    });

    group.finish();
}

fn bench_transient_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("transient");
    group.throughput(Throughput::Elements(1));

    let mut builder = ContainerBuilder::new();
    builder
        .register_transient::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
        .unwrap();
    let container = builder.build();

    group.bench_function("resolve_transient", |b| {
        b.iter(|| {
            let service = container.resolve::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped");

    group.bench_function("begin_scope", |b| {
        let mut builder = ContainerBuilder::new();
        builder
            .register_singleton::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
            .unwrap();
        let root = builder.build();

        b.iter(|| black_box(root.begin_scope()))
    });

    group.bench_function("resolve_from_parent", |b| {
        let mut builder = ContainerBuilder::new();
        builder
            .register_singleton::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
            .unwrap();
        let root = builder.build();
        let child = root.begin_scope();

        b.iter(|| {
            let service = child.resolve::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let mut builder = ContainerBuilder::new();
        builder
            .register_singleton::<SmallService, _>(|_| Ok(SmallService { value: 42 }))
            .unwrap();
        let container = Arc::new(builder.build());

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let c = Arc::clone(&container);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = c.resolve::<SmallService>().unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_transient_resolution,
    bench_scoped,
    bench_concurrent,
);

criterion_main!(benches);
