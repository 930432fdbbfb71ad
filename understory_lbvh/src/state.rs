// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared state of one build.

use core::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

use crate::atomic_box::AtomicAabb3;
use crate::types::Aabb3;

/// High-level summary of a build in progress.
///
/// Created once per build and passed by reference through every phase.
/// Dispatches only touch the atomic fields; the plain fields are written by
/// single-threaded steps that hold `&mut`.
#[derive(Debug)]
pub(crate) struct BuildState {
    /// Nodes allocated so far; only ever grows.
    pub(crate) num_nodes_alloced: AtomicU32,
    /// Primitives that make it into the tree. Starts at the input count and
    /// shrinks as empty primitives are discovered.
    pub(crate) num_valid_prims: AtomicU32,
    /// Next position past the valid range that an empty slot may adopt.
    pub(crate) adopt_cursor: AtomicU32,
    /// Centroid bounds while they are being grown.
    pub(crate) a_cent_bounds: AtomicAabb3,
    /// Centroid bounds once the reduction is done.
    pub(crate) cent_bounds: Aabb3,
    /// Coefficients of `scale * (x - bias)` in the 21-bit quantization:
    /// `bias` is the lower centroid corner and `scale` is
    /// `2^21 / centroid_size`.
    pub(crate) quantize_bias: Vec3,
    pub(crate) quantize_scale: Vec3,
}

/// Controller-side copy of the build counters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BuildCounters {
    pub(crate) num_nodes_alloced: u32,
    pub(crate) num_valid_prims: u32,
}

impl BuildState {
    pub(crate) fn new() -> Self {
        Self {
            num_nodes_alloced: AtomicU32::new(0),
            num_valid_prims: AtomicU32::new(0),
            adopt_cursor: AtomicU32::new(0),
            a_cent_bounds: AtomicAabb3::new(),
            cent_bounds: Aabb3::EMPTY,
            quantize_bias: Vec3::ZERO,
            quantize_scale: Vec3::ONE,
        }
    }

    /// The one blocking readback: copy the counters out for the controller.
    ///
    /// Only called between dispatches, so everything the last dispatch wrote
    /// is visible.
    pub(crate) fn download(&self) -> BuildCounters {
        BuildCounters {
            num_nodes_alloced: self.num_nodes_alloced.load(Ordering::Acquire),
            num_valid_prims: self.num_valid_prims.load(Ordering::Acquire),
        }
    }
}
