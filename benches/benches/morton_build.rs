// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::Vec3;
use understory_lbvh::{
    Aabb3, BuildConfig, HostMemoryResource, KeyValueSorter, Queue, RadixSorter, build,
};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f32(&mut self) -> f32 {
        let v = self.next_u64() >> 40;
        (v as f32) / ((1u64 << 24) as f32)
    }
    fn next_vec3(&mut self) -> Vec3 {
        Vec3::new(self.next_f32(), self.next_f32(), self.next_f32())
    }
}

fn gen_uniform_boxes(count: usize, extent: f32, size: f32) -> Vec<Aabb3> {
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    (0..count)
        .map(|_| Aabb3::from_origin_size(rng.next_vec3() * extent, Vec3::splat(size)))
        .collect()
}

fn gen_clustered_boxes(n_clusters: usize, per_cluster: usize, spread: f32) -> Vec<Aabb3> {
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    for _ in 0..n_clusters {
        let center = rng.next_vec3() * 2000.0;
        for _ in 0..per_cluster {
            let d = (rng.next_vec3() - Vec3::splat(0.5)) * spread;
            out.push(Aabb3::from_origin_size(center + d, Vec3::splat(2.0)));
        }
    }
    out
}

fn bench_build_uniform(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_uniform");
    let queue = Queue::default();
    for &n in &[10_000usize, 100_000, 1_000_000] {
        let boxes = gen_uniform_boxes(n, 1000.0, 1.0);
        group.throughput(Throughput::Elements(n as u64));
        for threshold in [1, 8] {
            group.bench_function(format!("n{}_leaf{}", n, threshold), |b| {
                let config = BuildConfig::default().with_leaf_threshold(threshold);
                b.iter(|| {
                    let resource = HostMemoryResource::new();
                    let bvh = build(&boxes, config, &queue, &resource).unwrap();
                    black_box(bvh.num_nodes());
                });
            });
        }
    }
    group.finish();
}

fn bench_build_clustered(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_clustered");
    let queue = Queue::default();
    let boxes = gen_clustered_boxes(64, 4096, 20.0);
    group.throughput(Throughput::Elements(boxes.len() as u64));
    group.bench_function("c64x4096", |b| {
        b.iter(|| {
            let resource = HostMemoryResource::new();
            let bvh = build(&boxes, BuildConfig::default(), &queue, &resource).unwrap();
            black_box(bvh.depth());
        });
    });
    group.finish();
}

fn bench_group_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_size");
    let boxes = gen_uniform_boxes(200_000, 1000.0, 1.0);
    group.throughput(Throughput::Elements(boxes.len() as u64));
    for &gs in &[256usize, 1024, 4096] {
        let queue = Queue::new(gs);
        group.bench_function(format!("gs{}", gs), |b| {
            b.iter(|| {
                let resource = HostMemoryResource::new();
                let bvh = build(&boxes, BuildConfig::default(), &queue, &resource).unwrap();
                black_box(bvh.num_nodes());
            });
        });
    }
    group.finish();
}

fn bench_radix_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("radix_sort");
    let queue = Queue::default();
    for &n in &[100_000usize, 1_000_000] {
        let mut rng = Rng::new(0xFACE_FEED_CAFE_BABE);
        let keys: Vec<u64> = (0..n).map(|_| rng.next_u64() >> 1).collect();
        let ids: Vec<u32> = (0..n as u32).collect();
        let mut scratch = vec![0u64; RadixSorter.scratch_len(n)];
        let mut keys_out = vec![0u64; n];
        let mut ids_out = vec![0u32; n];
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("n{}", n), |b| {
            b.iter(|| {
                RadixSorter
                    .sort_pairs(&queue, &mut scratch, &keys, &ids, &mut keys_out, &mut ids_out)
                    .unwrap();
                black_box(keys_out[0]);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_build_uniform,
    bench_build_clustered,
    bench_group_size,
    bench_radix_sort,
);
criterion_main!(benches);
