// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Morton keys and the key generator.
//!
//! A key interleaves three 21-bit quantized coordinates into the low 63 bits
//! of a `u64`: bit `3i` is bit `i` of x, bit `3i + 1` of y, bit `3i + 2` of z.
//! Sorting by key orders primitives along a Z-order curve.
//!
//! Spreading the 21 bits of one coordinate takes five stages. Each stage
//! moves a masked set of bits left by 32, 16, 8, 4 and then 2 places and
//! leaves the rest alone:
//!
//! ```text
//! stage   mask                    shift
//! 1       0x0000_0000_001f_0000   32
//! 2       0x0000_0000_0000_ff00   16
//! 3       0x0010_0000_f000_00f0    8
//! 4       0x000c_00c0_0c00_c00c    4
//! 5       0x0082_0820_8208_2082    2
//! ```

use core::sync::atomic::Ordering;

use glam::Vec3;

use crate::bounds::MORTON_GRID;
use crate::error::BuildError;
use crate::queue::Queue;
use crate::state::BuildState;
use crate::types::Aabb3;

/// Move the bits selected by `mask` left by `shift`; keep the others in place.
#[inline]
const fn shift_bits(x: u64, mask: u64, shift: u32) -> u64 {
    ((x & mask) << shift) | (x & !mask)
}

/// Spread the low 21 bits of `x` so that bit `i` lands on bit `3i`.
#[inline]
pub const fn bit_interleave_21(x: u64) -> u64 {
    let mut x = x & 0x1f_ffff;
    x = shift_bits(x, 0x0000_0000_001f_0000, 32);
    x = shift_bits(x, 0x0000_0000_0000_ff00, 16);
    x = shift_bits(x, 0x0010_0000_f000_00f0, 8);
    x = shift_bits(x, 0x000c_00c0_0c00_c00c, 4);
    x = shift_bits(x, 0x0082_0820_8208_2082, 2);
    x
}

/// Quantize `p` into the Morton grid and interleave its cell coordinates.
///
/// Coordinates are clamped into `[0, 2^21 - 1]`, so points outside the
/// quantization domain land on its border cells.
#[inline]
pub fn compute_morton_code(p: Vec3, quantize_bias: Vec3, quantize_scale: Vec3) -> u64 {
    let q = (p - quantize_bias) * quantize_scale;
    let max_cell = (MORTON_GRID - 1) as f32;
    // `as` saturates, and the clamp keeps the top cell reachable but not exceeded.
    let cell = |v: f32| u64::from(v.clamp(0.0, max_cell) as u32);
    (bit_interleave_21(cell(q.z)) << 2)
        | (bit_interleave_21(cell(q.y)) << 1)
        | bit_interleave_21(cell(q.x))
}

/// Write one key and one primitive id per valid primitive.
///
/// `keys` and `prim_ids` must be `num_valid_prims` long. A slot whose own
/// primitive is empty adopts one from past the valid range, claimed through
/// the state's adopt cursor, until it holds a non-empty one. The valid set
/// ends up in `[0, num_valid_prims)` in unspecified relative order.
pub(crate) fn compute_unsorted_keys_and_prim_ids(
    queue: &Queue,
    state: &BuildState,
    prims: &[Aabb3],
    keys: &mut [u64],
    prim_ids: &mut [u32],
) -> Result<(), BuildError> {
    let bias = state.quantize_bias;
    let scale = state.quantize_scale;
    let results = queue.dispatch_mut2(
        "compute_unsorted_keys_and_prim_ids",
        keys,
        prim_ids,
        |group, keys, prim_ids| -> Result<(), BuildError> {
            for ((tid, key), prim_id_out) in group.range.zip(keys).zip(prim_ids) {
                let mut prim_id = tid;
                let mut prim = prims[tid];
                while prim.is_empty() {
                    prim_id = state.adopt_cursor.fetch_add(1, Ordering::AcqRel) as usize;
                    prim = *prims.get(prim_id).ok_or_else(|| {
                        BuildError::Device(format!(
                            "slot {tid} found no valid primitive to adopt"
                        ))
                    })?;
                }
                *prim_id_out = u32::try_from(prim_id)
                    .map_err(|_| BuildError::TooManyPrimitives(prims.len()))?;
                *key = compute_morton_code(prim.center(), bias, scale);
            }
            Ok(())
        },
    )?;
    results.into_iter().collect()
}
