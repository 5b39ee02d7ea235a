//! Dynamic Tree Benchmarks
//!
//! Proxy churn and queries against the broad-phase tree

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pegbox_core::math::{Aabb, Vec2};
use pegbox_physics::collision::{DynamicTree, ProxyId, RayCastInput};

/// Deterministic scatter of small boxes over a square field
fn boxes(count: usize) -> Vec<Aabb> {
    let mut seed = 0x2545_f491_u32;
    let mut next = move || {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (seed >> 8) as f32 / (1u32 << 24) as f32
    };
    (0..count)
        .map(|_| {
            let center = Vec2::new(next() * 100.0, next() * 100.0);
            Aabb::from_center_half_extents(center, Vec2::splat(0.5))
        })
        .collect()
}

fn filled_tree(aabbs: &[Aabb]) -> (DynamicTree<usize>, Vec<ProxyId>) {
    let mut tree = DynamicTree::new(0.1, 2.0);
    let ids = aabbs.iter().enumerate().map(|(i, aabb)| tree.create_proxy(aabb, i)).collect();
    (tree, ids)
}

fn bench_tree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_insert");

    for count in [100, 1000, 10000].iter() {
        let aabbs = boxes(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &aabbs, |b, aabbs| {
            b.iter(|| black_box(filled_tree(aabbs)));
        });
    }

    group.finish();
}

fn bench_tree_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_move");

    for count in [100, 1000, 10000].iter() {
        let aabbs = boxes(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &aabbs, |b, aabbs| {
            let (mut tree, ids) = filled_tree(aabbs);
            let mut offset = 0.0_f32;
            b.iter(|| {
                offset = if offset > 0.0 { -1.0 } else { 1.0 };
                let displacement = Vec2::new(offset, 0.0);
                for (id, aabb) in ids.iter().zip(aabbs) {
                    let moved = Aabb::new(aabb.min + displacement, aabb.max + displacement);
                    black_box(tree.move_proxy(*id, &moved, displacement));
                }
            });
        });
    }

    group.finish();
}

fn bench_tree_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_query");

    for count in [1000, 10000].iter() {
        let aabbs = boxes(*count);
        let (tree, _) = filled_tree(&aabbs);
        group.bench_with_input(BenchmarkId::from_parameter(count), &tree, |b, tree| {
            let region = Aabb::new(Vec2::new(40.0, 40.0), Vec2::new(60.0, 60.0));
            b.iter(|| {
                let mut hits = 0usize;
                tree.query(&region, |_| {
                    hits += 1;
                    true
                });
                black_box(hits)
            });
        });
    }

    group.finish();
}

fn bench_tree_raycast(c: &mut Criterion) {
    let aabbs = boxes(10000);
    let (tree, _) = filled_tree(&aabbs);
    let input = RayCastInput::new(Vec2::new(0.0, 50.0), Vec2::new(100.0, 50.0));

    c.bench_function("tree_raycast_10000", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            tree.raycast(&input, |sub_input, _| {
                hits += 1;
                sub_input.max_fraction
            });
            black_box(hits)
        });
    });
}

criterion_group!(benches, bench_tree_insert, bench_tree_move, bench_tree_query, bench_tree_raycast);
criterion_main!(benches);
