// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Centroid bounds reduction and quantization parameters.

use core::sync::atomic::Ordering;

use glam::Vec3;

use crate::error::BuildError;
use crate::queue::Queue;
use crate::state::BuildState;
use crate::types::Aabb3;

/// Number of cells per axis of the Morton grid.
pub(crate) const MORTON_GRID: u32 = 1 << 21;

/// Floor on each centroid extent, so flat axes do not blow up the scale.
const MIN_EXTENT: f32 = 1e-20;

/// Clear the accumulator and counters. Valid count starts optimistic.
pub(crate) fn clear_build_state(state: &mut BuildState, num_prims: u32) {
    state.a_cent_bounds.clear();
    *state.num_valid_prims.get_mut() = num_prims;
    *state.num_nodes_alloced.get_mut() = 0;
    *state.adopt_cursor.get_mut() = num_prims;
}

/// Grow the centroid bounds with every non-empty primitive.
///
/// Each group reduces into a local box and merges it once, and subtracts its
/// tally of empty primitives from the valid count in one atomic step.
pub(crate) fn fill_build_state(
    queue: &Queue,
    state: &BuildState,
    prims: &[Aabb3],
) -> Result<(), BuildError> {
    queue.dispatch("fill_build_state", prims.len(), |group| {
        let mut l_cent_bounds = Aabb3::EMPTY;
        let mut l_num_empty = 0_u32;
        for prim in &prims[group.range] {
            if prim.is_empty() {
                l_num_empty += 1;
            } else {
                l_cent_bounds = l_cent_bounds.grow_point(prim.center());
            }
        }
        state.a_cent_bounds.grow(&l_cent_bounds);
        if l_num_empty > 0 {
            state
                .num_valid_prims
                .fetch_sub(l_num_empty, Ordering::AcqRel);
        }
    })?;
    Ok(())
}

/// Turn the accumulator into a plain box and derive the quantization.
pub(crate) fn finish_build_state(state: &mut BuildState) {
    // Slots past the final valid count are what empty slots may adopt.
    let num_valid_prims = *state.num_valid_prims.get_mut();
    *state.adopt_cursor.get_mut() = num_valid_prims;
    let cent_bounds = state.a_cent_bounds.load();
    state.cent_bounds = cent_bounds;
    if cent_bounds.is_empty() {
        // Nothing valid to quantize; keep the parameters finite.
        state.quantize_bias = Vec3::ZERO;
        state.quantize_scale = Vec3::ONE;
        return;
    }
    state.quantize_bias = cent_bounds.lower;
    state.quantize_scale =
        Vec3::splat(MORTON_GRID as f32) / cent_bounds.size().max(Vec3::splat(MIN_EXTENT));
}
