//! Benchmarks for the lowering passes.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linalg_lower::prelude::*;

/// Benchmark lowering a matmul to loops.
fn bench_lower_matmul(c: &mut Criterion) {
    let config = LoweringConfig::default();
    c.bench_function("lower_matmul_to_loops", |b| {
        b.iter(|| {
            let mut func = build_kernel(ContractionKind::Matmul, black_box(&[64i64, 64, 64][..]), true);
            linalg_lower::lower_to_loops(&mut func, &config).unwrap()
        })
    });
}

/// Benchmark the full refine, compose and lower pipeline.
fn bench_full_pipeline(c: &mut Criterion) {
    let config = LoweringConfig::default()
        .with_passes(vec![
            PassKind::LowerToFinerGrainedContractions,
            PassKind::LowerToFinerGrainedContractions,
            PassKind::ComposeSliceOps,
            PassKind::LowerToLoops,
        ])
        .with_tile_sizes(ContractionKind::Dot, vec![4]);
    c.bench_function("matmul_full_pipeline", |b| {
        b.iter(|| {
            let mut func = build_kernel(ContractionKind::Matmul, black_box(&[32i64, 32, 32][..]), false);
            linalg_lower::run_pipeline(&mut func, &config).unwrap()
        })
    });
}

/// Benchmark affine map composition and inversion.
fn bench_affine_maps(c: &mut Criterion) {
    c.bench_function("operand_ranges_to_loops_map", |b| {
        b.iter(|| {
            ContractionKind::Matmul.operand_ranges_to_loops_map().unwrap()
        })
    });

    let f = AffineMap::new(2, 0, vec![
        AffineExpr::dim(0) * 4 + AffineExpr::dim(1),
        AffineExpr::dim(1).floor_div(8),
    ]);
    let g = AffineMap::new(1, 1, vec![AffineExpr::dim(0) + AffineExpr::symbol(0), AffineExpr::dim(0) * 2]);
    c.bench_function("compose_maps", |b| {
        b.iter(|| black_box(&f).compose(black_box(&g)))
    });
}

criterion_group!(benches, bench_lower_matmul, bench_full_pipeline, bench_affine_maps);
criterion_main!(benches);
