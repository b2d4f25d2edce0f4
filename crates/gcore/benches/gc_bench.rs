//! gcore Benchmarks
//!
//! Run with: `cargo bench --package gcore`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gcore::object::{ElementKind, TypeInfo};
use gcore::{Collaborators, Gc, GcConfig, GlobalRoots, MarkAndSweep, NoopCollector};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NODE: TypeInfo = TypeInfo::object("Node", 16, &[0, 8]);
static BYTES: TypeInfo = TypeInfo::array("Bytes", ElementKind::Primitive(1));

fn config() -> GcConfig {
    GcConfig {
        start_finalizer_thread: false,
        ..Default::default()
    }
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    group.throughput(Throughput::Elements(1));

    let gc = Gc::<MarkAndSweep>::with_collaborators(config(), Collaborators::default()).unwrap();
    let mut thread = gc.register_thread();

    group.bench_function("object", |b| {
        b.iter(|| black_box(thread.create_object(&NODE)));
        thread.publish_object_factory();
        thread.in_native(|| gc.collect());
    });

    group.bench_function("byte_array_256", |b| {
        b.iter(|| black_box(thread.create_array(&BYTES, 256)));
        thread.publish_object_factory();
        thread.in_native(|| gc.collect());
    });

    group.finish();
}

fn bench_safe_point(c: &mut Criterion) {
    let mut group = c.benchmark_group("safe_point");

    let noop = Gc::<NoopCollector>::with_collaborators(config(), Collaborators::default()).unwrap();
    let mut noop_thread = noop.register_thread();
    group.bench_function("noop", |b| b.iter(|| noop_thread.safe_point()));

    let gc = Gc::<MarkAndSweep>::with_collaborators(config(), Collaborators::default()).unwrap();
    let mut thread = gc.register_thread();
    group.bench_function("mark_sweep_unrequested", |b| b.iter(|| thread.safe_point()));

    group.finish();
}

fn bench_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection");

    for &live in &[100usize, 10_000] {
        group.bench_function(format!("chain_{}_live", live), |b| {
            let roots = Arc::new(GlobalRoots::new());
            let gc =
                Gc::<MarkAndSweep>::with_collaborators(config(), Collaborators::new(roots.clone()))
                    .unwrap();
            let mut thread = gc.register_thread();

            let head = thread.create_object(&NODE);
            let mut tail = head;
            for _ in 1..live {
                let next = thread.create_object(&NODE);
                tail.store_field(0, Some(next));
                tail = next;
            }
            roots.register(Some(head));

            // Each iteration adds `live` garbage objects and times only the cycle
            b.iter_custom(|iters| {
                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    for _ in 0..live {
                        thread.create_object(&NODE);
                    }
                    let start = Instant::now();
                    thread.in_native(|| gc.collect());
                    total += start.elapsed();
                }
                total
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_allocation, bench_safe_point, bench_collection);
criterion_main!(benches);
