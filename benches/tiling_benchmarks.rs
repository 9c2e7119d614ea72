//! Benchmarks for the tiling strategies.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polytile::analysis::{time_dim_size, time_tiling, DependenceProbe};
use polytile::prelude::*;

/// Benchmark the dependence probe on its own.
fn bench_probe(c: &mut Criterion) {
    let scop = kernels::heat_1d(32, 64);
    let band = scop.band();
    let domain = scop.domain().unwrap();
    let (sizes, delta) = time_tiling(&[8, 8], time_dim_size(&domain), false);

    c.bench_function("probe_heat_1d", |b| {
        b.iter(|| {
            let probe = DependenceProbe::new(&scop, &band, black_box(&sizes), TileOptions::default()).unwrap();
            probe.run(&domain, delta).unwrap()
        })
    });
}

/// Benchmark each strategy on the same kernel.
fn bench_strategies(c: &mut Criterion) {
    let scop = kernels::heat_1d(16, 32);
    let strategies = [
        ("plain", Strategy::Plain),
        ("split", Strategy::Split),
        ("overlapped", Strategy::Overlapped { multi_dim: 1 }),
    ];
    for (name, strategy) in strategies {
        let config = TilingConfig::new().strategy(strategy).tile_sizes(vec![4, 8]);
        c.bench_function(&format!("tile_heat_1d_{}", name), |b| {
            b.iter(|| polytile::tile(black_box(&scop), &config).unwrap())
        });
    }
}

/// Benchmark split tiling of a two-statement kernel.
fn bench_jacobi_split(c: &mut Criterion) {
    let scop = kernels::jacobi_1d(16, 32);
    let config = TilingConfig::new().strategy(Strategy::Split).tile_sizes(vec![4, 8]);

    c.bench_function("split_jacobi_1d", |b| {
        b.iter(|| polytile::tile(black_box(&scop), &config).unwrap())
    });
}

criterion_group!(benches, bench_probe, bench_strategies, bench_jacobi_split);
criterion_main!(benches);
