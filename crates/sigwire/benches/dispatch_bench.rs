//! Benchmarks for the dispatch hot path and connect/disconnect churn.
//!
//! Run with: cargo bench -p sigwire --bench dispatch_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sigwire::prelude::*;
use std::hint::black_box;

// =============================================================================
// Dispatch
// =============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal/dispatch");

    for slots in [1usize, 16, 64, 256] {
        let signal: Signal<u64, u64> = Signal::new();
        for i in 0..slots as u64 {
            signal.connect(Slot::new(move |x: &u64| x.wrapping_add(i)), ConnectPosition::Back);
        }
        group.throughput(Throughput::Elements(slots as u64));
        group.bench_with_input(BenchmarkId::new("slots", slots), &signal, |b, signal| {
            b.iter(|| black_box(signal.invoke(&1)));
        });
    }

    group.finish();
}

fn bench_dispatch_with_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal/dispatch_tracked");

    for slots in [16usize, 64] {
        let signal: Signal<u64, u64> = Signal::new();
        let mut keep_alive = Vec::new();
        for i in 0..slots as u64 {
            let dep = std::sync::Arc::new(i);
            signal.connect(
                Slot::new(move |x: &u64| x.wrapping_add(i)).track(&dep),
                ConnectPosition::Back,
            );
            keep_alive.push(dep);
        }
        group.throughput(Throughput::Elements(slots as u64));
        group.bench_with_input(BenchmarkId::new("slots", slots), &signal, |b, signal| {
            b.iter(|| black_box(signal.invoke(&1)));
        });
        drop(keep_alive);
    }

    group.finish();
}

// =============================================================================
// Connect / disconnect churn
// =============================================================================

fn bench_connect_disconnect(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal/churn");

    group.bench_function("connect_disconnect", |b| {
        let signal: Signal<u64, u64> = Signal::new();
        b.iter(|| {
            let handle = signal.connect(Slot::new(|x: &u64| *x), ConnectPosition::Back);
            handle.disconnect();
        });
    });

    group.bench_function("grouped_connect_disconnect", |b| {
        let signal: Signal<u64, u64> = Signal::new();
        b.iter(|| {
            let handle =
                signal.connect_in_group(7, Slot::new(|x: &u64| *x), ConnectPosition::Back);
            handle.disconnect();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch,
    bench_dispatch_with_tracking,
    bench_connect_disconnect
);
criterion_main!(benches);
