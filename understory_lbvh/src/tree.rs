// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Level-synchronous binary radix tree construction over sorted keys.
//!
//! Every node starts [`Open`](TempNode::Open) over a range of sorted keys and
//! is resolved exactly once, in the round after its parent allocated it:
//!
//! - small ranges, and ranges whose first and last key are equal, become
//!   leaves;
//! - anything else is split at the highest key bit that differs across the
//!   range, which is one level of the octree implied by Morton order, and
//!   gets two new open children allocated as a contiguous pair.
//!
//! A round only looks at the previous round's frontier. Construction is done
//! once a round allocates nothing.

use core::sync::atomic::Ordering;

use rayon::prelude::*;

use crate::error::BuildError;
use crate::queue::Queue;
use crate::state::BuildState;

/// A node while the tree is being built.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum TempNode {
    /// Allocated by its parent but not yet resolved; covers sorted positions
    /// `begin..end`.
    Open { begin: u32, end: u32 },
    /// Resolved leaf over `count` primitives starting at `offset`.
    Leaf { offset: u32, count: u32 },
    /// Resolved inner node; its children sit at `first_child` and
    /// `first_child + 1`.
    Inner { first_child: u32 },
}

impl Default for TempNode {
    fn default() -> Self {
        Self::Open { begin: 0, end: 0 }
    }
}

/// Find where to split the sorted range `keys[begin..end]`.
///
/// Returns `None` when the first and last key are equal: the whole range sits
/// in one Morton cell and no boundary exists.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Ranges index a key array whose length fits in u32."
)]
pub(crate) fn find_split(keys: &[u64], begin: u32, end: u32) -> Option<u32> {
    let range = &keys[begin as usize..end as usize];
    let (&first_key, &last_key) = (range.first()?, range.last()?);
    if first_key == last_key {
        return None;
    }
    let num_matching_bits = (first_key ^ last_key).leading_zeros();
    // Keep the matching prefix plus the first differing bit of the last key.
    let search_key = last_key & (u64::MAX << (63 - num_matching_bits));
    let split = range.partition_point(|&k| k < search_key);
    // `split` is strictly inside the range since first < search_key <= last.
    Some(begin + split as u32)
}

/// Seed node 0 as the root over every valid primitive.
pub(crate) fn init_nodes(state: &mut BuildState, nodes: &mut [TempNode], num_valid_prims: u32) {
    *state.num_nodes_alloced.get_mut() = 1;
    nodes[0] = TempNode::Open {
        begin: 0,
        end: num_valid_prims,
    };
}

/// Children allocated by one work group, to be written at `first_child`.
struct GroupChildren {
    first_child: u32,
    children: Vec<TempNode>,
}

/// Resolve the frontier `nodes[begin..end]` and append any new children.
///
/// Within a group, splits are tallied locally and reserved with one atomic
/// add on the global node counter; each parent learns its child index from
/// that reservation. Children are then written to their reserved slots.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Node counts are bounded by twice the primitive count, which fits in u32."
)]
pub(crate) fn create_nodes(
    queue: &Queue,
    state: &BuildState,
    leaf_threshold: u32,
    nodes: &mut [TempNode],
    begin: u32,
    end: u32,
    keys: &[u64],
) -> Result<(), BuildError> {
    let (resolved, unresolved) = nodes.split_at_mut(end as usize);
    let frontier = &mut resolved[begin as usize..];

    let reservations = queue.dispatch_mut("create_nodes", frontier, |_group, frontier| {
        let mut splits = Vec::new();
        for (local, node) in frontier.iter_mut().enumerate() {
            let TempNode::Open { begin, end } = *node else {
                continue;
            };
            let size = end - begin;
            if size <= leaf_threshold {
                // we want a leaf
                *node = TempNode::Leaf {
                    offset: begin,
                    count: size,
                };
            } else if let Some(split) = find_split(keys, begin, end) {
                splits.push((local, begin, split, end));
            } else {
                // we have to make a leaf: nothing left to split on
                *node = TempNode::Leaf {
                    offset: begin,
                    count: size,
                };
            }
        }
        if splits.is_empty() {
            return None;
        }
        let tally = 2 * splits.len() as u32;
        let first_child = state.num_nodes_alloced.fetch_add(tally, Ordering::AcqRel);
        let mut children = Vec::with_capacity(2 * splits.len());
        for (i, (local, begin, split, end)) in splits.into_iter().enumerate() {
            frontier[local] = TempNode::Inner {
                first_child: first_child + 2 * i as u32,
            };
            children.push(TempNode::Open { begin, end: split });
            children.push(TempNode::Open { begin: split, end });
        }
        Some(GroupChildren {
            first_child,
            children,
        })
    })?;

    let mut reservations: Vec<GroupChildren> = reservations.into_iter().flatten().collect();
    if reservations.is_empty() {
        return Ok(());
    }
    reservations.sort_unstable_by_key(|r| r.first_child);

    // Reservations tile `end..` without gaps; hand each its own slice.
    let mut rest = unresolved;
    let mut cursor = end;
    let mut writes = Vec::with_capacity(reservations.len());
    for r in &reservations {
        let n = r.children.len();
        if r.first_child != cursor || rest.len() < n {
            return Err(BuildError::Device(format!(
                "node reservation at {} does not fit (expected {cursor}, {} slots left)",
                r.first_child,
                rest.len()
            )));
        }
        let (head, tail) = rest.split_at_mut(n);
        writes.push((head, &r.children));
        rest = tail;
        cursor += n as u32;
    }
    queue.run("write_children", || {
        writes
            .into_par_iter()
            .for_each(|(dst, src)| dst.copy_from_slice(src));
    })
}
