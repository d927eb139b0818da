//! Predicate compilation and evaluation benchmarks.
//!
//! Compares the native predicate against the interpreter on the same tuple,
//! and measures end-to-end compile latency.
//!
//! Run with: cargo bench --bench predicate_bench

#![cfg(feature = "jit")]

use std::hint::black_box;
use std::sync::Arc;

use bumpalo::Bump;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use tessera_core::compiler::{Backend, CodegenConfig, CodegenContext, PredicateCache};
use tessera_core::expr::{col, lit, param, Expr};
use tessera_core::interpret;
use tessera_core::params::ParamSlots;
use tessera_core::tuple::{MutableTuple, TupleSchema};
use tessera_core::types::{LogicalType, Value};

// ── Helpers ─────────────────────────────────────────────────────────

fn schema() -> TupleSchema {
    TupleSchema::packed([
        (LogicalType::BigInt, false),
        (LogicalType::Integer, true),
        (LogicalType::SmallInt, true),
        (LogicalType::Boolean, true),
    ])
}

fn predicate(slots: &Arc<ParamSlots>) -> Expr {
    col(0)
        .gt_eq(param(slots, 0, LogicalType::BigInt))
        .and(col(1).lt(lit(1_000_i32)))
        .and(col(2).is_not_null().or(col(3)))
}

// ── Evaluation ──────────────────────────────────────────────────────

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("predicate_evaluate");
    group.throughput(Throughput::Elements(1));

    let schema = schema();
    let slots = Arc::new(ParamSlots::new(1));
    slots.set(0, Value::BigInt(10)).unwrap();
    let expr = predicate(&slots);
    let ctx = CodegenContext::new(Backend::host().unwrap(), CodegenConfig::default());
    let compiled = ctx.compile(&schema, &expr).unwrap();

    let arena = Bump::new();
    let mut row = MutableTuple::new_in(&arena, &schema);
    row.set(0, Value::BigInt(42)).unwrap();
    row.set(1, Value::Integer(7)).unwrap();
    row.set_null(2).unwrap();
    row.set(3, Value::Boolean(true)).unwrap();
    let tuple = row.freeze();

    group.bench_function("compiled", |b| {
        b.iter(|| black_box(compiled.evaluate(black_box(&tuple))));
    });

    group.bench_function("interpreted", |b| {
        b.iter(|| black_box(interpret::evaluate(&expr, black_box(&tuple))));
    });

    group.finish();
}

// ── Compilation ─────────────────────────────────────────────────────

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("predicate_compile");
    let schema = schema();
    let slots = Arc::new(ParamSlots::new(1));
    let expr = predicate(&slots);

    group.bench_function("optimized", |b| {
        let ctx = CodegenContext::new(Backend::host().unwrap(), CodegenConfig::default());
        b.iter(|| black_box(ctx.compile(&schema, &expr).is_some()));
    });

    group.bench_function("unoptimized", |b| {
        let ctx = CodegenContext::new(
            Backend::host().unwrap(),
            CodegenConfig::default().with_optimize(false),
        );
        b.iter(|| black_box(ctx.compile(&schema, &expr).is_some()));
    });

    group.bench_function("cache_hit", |b| {
        let ctx = CodegenContext::new(Backend::host().unwrap(), CodegenConfig::default());
        let mut cache = PredicateCache::new(&ctx);
        cache.get_or_compile(&schema, &expr);
        b.iter(|| black_box(cache.get_or_compile(&schema, &expr)));
    });

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_compile);
criterion_main!(benches);
