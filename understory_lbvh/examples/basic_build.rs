// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Basic usage of Understory LBVH: build over a small scene, inspect, refit, free.

use glam::Vec3;
use understory_lbvh::{Aabb3, BuildConfig, HostMemoryResource, Queue, build};

fn main() -> Result<(), understory_lbvh::BuildError> {
    // An 8x8x8 lattice of unit boxes, plus one empty box that is skipped.
    let mut boxes: Vec<Aabb3> = (0..512)
        .map(|i| {
            let p = Vec3::new((i % 8) as f32, ((i / 8) % 8) as f32, (i / 64) as f32) * 3.0;
            Aabb3::from_origin_size(p, Vec3::ONE)
        })
        .collect();
    boxes.push(Aabb3::EMPTY);

    let queue = Queue::with_threads(4, 64)?;
    let resource = HostMemoryResource::new();
    let config = BuildConfig::default().with_leaf_threshold(4);
    let mut bvh = build(&boxes, config, &queue, &resource)?;

    println!("{bvh:?}");
    println!(
        "nodes={}, prims={}, depth={}, bytes={}",
        bvh.num_nodes(),
        bvh.num_prims(),
        bvh.depth(),
        bvh.node_bytes().len()
    );
    println!(
        "memory: in_use={}, peak={}, allocations={}",
        resource.in_use(),
        resource.peak(),
        resource.allocations()
    );

    // Push everything up by 10 and refit without rebuilding.
    for b in boxes.iter_mut().filter(|b| !b.is_empty()) {
        *b = Aabb3::new(b.lower + Vec3::Y * 10.0, b.upper + Vec3::Y * 10.0);
    }
    bvh.refit(&boxes, &queue, &resource)?;
    println!("bounds after refit: {:?}", bvh.bounds());

    bvh.free(&queue, &resource);
    println!("memory after free: in_use={}", resource.in_use());
    Ok(())
}
