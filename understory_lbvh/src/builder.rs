// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-side orchestration of a build.

use bytemuck::Zeroable;

use crate::bounds::{clear_build_state, fill_build_state, finish_build_state};
use crate::bvh::{Bvh, Node};
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::finalize::write_final_nodes;
use crate::memory::{DeviceBuffer, HostMemoryResource, MemoryResource};
use crate::morton::compute_unsorted_keys_and_prim_ids;
use crate::queue::Queue;
use crate::refit::refit;
use crate::sort::{KeyValueSorter, RadixSorter};
use crate::state::BuildState;
use crate::tree::{TempNode, create_nodes, init_nodes};
use crate::types::Aabb3;

/// Build a BVH over `boxes` with the default [`RadixSorter`].
///
/// Empty boxes (see [`Aabb3::is_empty`]) are left out of the tree. Every
/// buffer, including the returned tree's, is charged to `resource`; hand the
/// result back with [`Bvh::free`] when done.
pub fn build(
    boxes: &[Aabb3],
    config: BuildConfig,
    queue: &Queue,
    resource: &dyn MemoryResource,
) -> Result<Bvh, BuildError> {
    build_with_sorter(boxes, config, queue, resource, &RadixSorter)
}

/// Build with the default config on the global pool, charging a throwaway
/// [`HostMemoryResource`].
pub fn build_default(boxes: &[Aabb3]) -> Result<Bvh, BuildError> {
    build(
        boxes,
        BuildConfig::default(),
        &Queue::default(),
        &HostMemoryResource::new(),
    )
}

fn check_prim_count(num_prims: usize) -> Result<u32, BuildError> {
    u32::try_from(num_prims).map_err(|_| BuildError::TooManyPrimitives(num_prims))
}

/// Like [`build`], sorting keys with `sorter`.
pub fn build_with_sorter(
    boxes: &[Aabb3],
    config: BuildConfig,
    queue: &Queue,
    resource: &dyn MemoryResource,
    sorter: &dyn KeyValueSorter,
) -> Result<Bvh, BuildError> {
    let num_prims = check_prim_count(boxes.len())?;
    let leaf_threshold = config.effective_leaf_threshold();
    log::debug!("building over {num_prims} boxes, leaf threshold {leaf_threshold}");

    // Centroid bounds and the valid count.
    let mut state_buf = DeviceBuffer::alloc_with(1, |_| BuildState::new(), queue, resource)?;
    let state = &mut state_buf[0];
    clear_build_state(state, num_prims);
    fill_build_state(queue, state, boxes)?;
    finish_build_state(state);
    let num_valid_prims = state.download().num_valid_prims;
    let num_valid = num_valid_prims as usize;
    log::debug!(
        "centroid bounds {:?}, {num_valid} of {num_prims} boxes valid",
        state.cent_bounds
    );
    if num_valid == 0 && num_prims > 0 {
        log::warn!("all {num_prims} boxes are empty; producing an empty tree");
    }

    // Keys, then sort them.
    let mut unsorted_keys = DeviceBuffer::alloc(num_valid, 0_u64, queue, resource)?;
    let mut unsorted_ids = DeviceBuffer::alloc(num_valid, 0_u32, queue, resource)?;
    compute_unsorted_keys_and_prim_ids(queue, state, boxes, &mut unsorted_keys, &mut unsorted_ids)?;

    let mut scratch = DeviceBuffer::alloc(sorter.scratch_len(num_valid), 0_u64, queue, resource)?;
    let mut keys = DeviceBuffer::alloc(num_valid, 0_u64, queue, resource)?;
    let mut prim_ids = DeviceBuffer::alloc(num_valid, 0_u32, queue, resource)?;
    sorter.sort_pairs(
        queue,
        &mut scratch,
        &unsorted_keys,
        &unsorted_ids,
        &mut keys,
        &mut prim_ids,
    )?;
    drop(scratch);
    drop(unsorted_ids);
    drop(unsorted_keys);
    log::debug!("sorted {num_valid} keys");

    // Topology, one frontier per round.
    let mut temp_nodes = DeviceBuffer::alloc(
        (2 * num_valid).max(2),
        TempNode::default(),
        queue,
        resource,
    )?;
    init_nodes(state, &mut temp_nodes, num_valid_prims);
    let mut done = 0_u32;
    let mut alloced = 1_u32;
    let mut rounds = 0_u32;
    while done < alloced {
        create_nodes(queue, state, leaf_threshold, &mut temp_nodes, done, alloced, &keys)?;
        let counters = state.download();
        log::trace!(
            "round {rounds}: resolved nodes {done}..{alloced}, {} allocated",
            counters.num_nodes_alloced
        );
        done = alloced;
        alloced = counters.num_nodes_alloced;
        rounds += 1;
    }
    drop(keys);
    log::debug!("topology done: {alloced} nodes in {rounds} rounds");

    let mut nodes = DeviceBuffer::alloc(alloced as usize, Node::zeroed(), queue, resource)?;
    write_final_nodes(queue, &mut nodes, &temp_nodes[..alloced as usize])?;
    drop(temp_nodes);
    drop(state_buf);

    let oversized = nodes
        .iter()
        .filter(|n| n.is_leaf() && n.count > leaf_threshold)
        .count();
    if oversized > 0 {
        log::warn!(
            "{oversized} leaves exceed the leaf threshold of {leaf_threshold}: their boxes share one Morton cell"
        );
    }

    refit(queue, resource, &mut nodes, &prim_ids, boxes)?;
    log::debug!("refit {alloced} nodes");

    Ok(Bvh {
        nodes: nodes.detach(),
        prim_ids: prim_ids.detach(),
    })
}
