// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory LBVH: a Morton-code bounding volume hierarchy builder for 3D boxes.
//!
//! Given a slice of axis-aligned boxes, [`build`] produces a binary BVH whose
//! leaves reference primitives in Morton (Z-order) sequence:
//!
//! - Reduce the bounds of all box centers and derive a 21-bit-per-axis
//!   quantization.
//! - Compute one 63-bit Morton key per non-empty box.
//! - Sort keys together with primitive ids ([`KeyValueSorter`]).
//! - Split sorted ranges at the highest differing key bit, one tree level per
//!   round, until every range is small enough or cannot be split.
//! - Compute node boxes bottom-up.
//!
//! Every phase is a dispatch of fixed-size work groups on a [`Queue`] backed
//! by rayon. All shared updates are atomics and the host reads the build's
//! counters back once per round. Buffers are accounted against a
//! caller-provided [`MemoryResource`], so the caller can cap and observe what
//! a build uses.
//!
//! Empty boxes (any `upper < lower`) are dropped. Boxes whose centers fall
//! into the same Morton cell cannot be separated and end up in one leaf,
//! which may exceed the configured leaf threshold.
//!
//! # Example
//!
//! ```rust
//! use glam::Vec3;
//! use understory_lbvh::{Aabb3, BuildConfig, HostMemoryResource, Queue, build};
//!
//! let boxes: Vec<Aabb3> = (0..100)
//!     .map(|i| Aabb3::from_origin_size(Vec3::new(i as f32, 0.0, 0.0), Vec3::ONE))
//!     .collect();
//!
//! let queue = Queue::default();
//! let resource = HostMemoryResource::new();
//! let config = BuildConfig::default().with_leaf_threshold(4);
//! let bvh = build(&boxes, config, &queue, &resource).unwrap();
//!
//! assert_eq!(bvh.num_prims(), 100);
//! assert!(bvh.leaves().all(|(_, leaf)| leaf.count <= 4));
//! assert_eq!(bvh.bounds(), Aabb3::new(Vec3::ZERO, Vec3::new(100.0, 1.0, 1.0)));
//!
//! // The tree's buffers stay charged to `resource` until freed.
//! assert!(resource.in_use() > 0);
//! bvh.free(&queue, &resource);
//! assert_eq!(resource.in_use(), 0);
//! ```
//!
//! ## Node layout
//!
//! [`Node`] is 32 bytes and `Pod`: a box followed by `offset` and `count`.
//! `count == 0` marks an inner node whose children are `offset` and
//! `offset + 1`; otherwise the node is a leaf over
//! `prim_ids[offset..offset + count]`. Node 0 is the root. The node array can
//! be uploaded as is through [`Bvh::node_bytes`].

mod atomic_box;
mod bounds;
mod builder;
mod bvh;
mod config;
mod error;
mod finalize;
mod memory;
mod morton;
mod queue;
mod refit;
mod sort;
mod state;
mod tree;
mod types;

pub use atomic_box::AtomicAabb3;
pub use builder::{build, build_default, build_with_sorter};
pub use bvh::{Bvh, Node};
pub use config::BuildConfig;
pub use error::BuildError;
pub use memory::{HostMemoryResource, MemoryResource};
pub use morton::{bit_interleave_21, compute_morton_code};
pub use queue::{DEFAULT_GROUP_SIZE, Queue};
pub use sort::{KeyValueSorter, RadixSorter};
pub use types::Aabb3;
