//! # Spatial Index Benchmark
//!
//! Populates a grid with scattered points and boxes, then measures
//! moves and range queries.
//!
//! Run with: `cargo bench --package tessera_replica`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tessera_core::{Aabb, EntityId, Vec3};
use tessera_replica::{SpatialIndex, Volume};

const WORLD_EXTENT: f32 = 4096.0;

fn populated(count: u64, rng: &mut StdRng) -> SpatialIndex {
    let mut index = SpatialIndex::new(32.0);
    for n in 0..count {
        let p = Vec3::new(
            rng.gen_range(0.0..WORLD_EXTENT),
            rng.gen_range(0.0..64.0),
            rng.gen_range(0.0..WORLD_EXTENT),
        );
        let volume = if n % 8 == 0 {
            Volume::Box(Aabb::around(p, Vec3::new(8.0, 8.0, 8.0)))
        } else {
            Volume::Point(p)
        };
        index.update(EntityId::new(n), volume);
    }
    index
}

/// Benchmark: moving entities between cells.
fn bench_update(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut index = populated(100_000, &mut rng);
    c.bench_function("spatial_update_move", |b| {
        b.iter(|| {
            let id = EntityId::new(rng.gen_range(0..100_000));
            let p = Vec3::new(rng.gen_range(0.0..WORLD_EXTENT), 1.0, rng.gen_range(0.0..WORLD_EXTENT));
            index.update(black_box(id), Volume::Point(p));
        });
    });
}

/// Benchmark: sphere queries at interaction range.
fn bench_scan_sphere(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_scan_sphere");
    for count in [10_000u64, 100_000] {
        let mut rng = StdRng::seed_from_u64(11);
        let index = populated(count, &mut rng);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let center = Vec3::new(rng.gen_range(0.0..WORLD_EXTENT), 8.0, rng.gen_range(0.0..WORLD_EXTENT));
                black_box(index.scan_sphere(center, 8.0))
            });
        });
    }
    group.finish();
}

/// Benchmark: a query big enough to fall back to the linear scan.
fn bench_scan_huge_box(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(13);
    let index = populated(10_000, &mut rng);
    let everything = Aabb::new(Vec3::ZERO, Vec3::new(WORLD_EXTENT, 64.0, WORLD_EXTENT));
    c.bench_function("spatial_scan_world", |b| {
        b.iter(|| black_box(index.scan_box(&everything)));
    });
}

criterion_group!(benches, bench_update, bench_scan_sphere, bench_scan_huge_box);
criterion_main!(benches);
