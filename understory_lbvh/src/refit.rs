// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bottom-up box computation over a finished topology.
//!
//! Every leaf unions its primitives' boxes and then climbs toward the root.
//! Each inner node counts arrivals: the first child to arrive stops, the
//! second one unions both children and keeps climbing. That way an inner
//! node is evaluated exactly once and only after both children are final.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::atomic_box::AtomicAabb3;
use crate::bvh::{Bvh, Node};
use crate::error::BuildError;
use crate::memory::{DeviceBuffer, MemoryResource};
use crate::queue::Queue;
use crate::types::{Aabb3, union_all};

const NO_PARENT: u32 = u32::MAX;

/// Recompute `nodes[..].bounds` from `boxes`, reached through `prim_ids`.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Node indices are bounded by twice the primitive count, which fits in u32."
)]
pub(crate) fn refit(
    queue: &Queue,
    resource: &dyn MemoryResource,
    nodes: &mut [Node],
    prim_ids: &[u32],
    boxes: &[Aabb3],
) -> Result<(), BuildError> {
    if prim_ids.is_empty() {
        for node in nodes.iter_mut() {
            node.bounds = Aabb3::EMPTY;
        }
        return Ok(());
    }
    if let Some(&id) = prim_ids.iter().find(|&&id| id as usize >= boxes.len()) {
        return Err(BuildError::Device(format!(
            "primitive id {id} out of range for {} boxes",
            boxes.len()
        )));
    }

    let num_nodes = nodes.len();
    let parents = DeviceBuffer::alloc_with(num_nodes, |_| AtomicU32::new(NO_PARENT), queue, resource)?;
    let arrivals = DeviceBuffer::alloc_with(num_nodes, |_| AtomicU32::new(0), queue, resource)?;
    let bounds = DeviceBuffer::alloc_with(num_nodes, |_| AtomicAabb3::new(), queue, resource)?;

    let topology: &[Node] = nodes;
    queue.dispatch("refit_parents", num_nodes, |group| {
        for i in group.range {
            if let Some([l, r]) = topology[i].children() {
                parents[l].store(i as u32, Ordering::Relaxed);
                parents[r].store(i as u32, Ordering::Relaxed);
            }
        }
    })?;

    queue.dispatch("refit_leaves", num_nodes, |group| {
        for leaf in group.range {
            let node = &topology[leaf];
            if !node.is_leaf() {
                continue;
            }
            let leaf_bounds = union_all(
                node.prim_range()
                    .map(|slot| boxes[prim_ids[slot] as usize]),
            );
            bounds[leaf].store(&leaf_bounds);

            let mut child = leaf;
            loop {
                let parent = parents[child].load(Ordering::Relaxed);
                if parent == NO_PARENT {
                    break;
                }
                let parent = parent as usize;
                // Release our child's box; acquire the sibling's if we are second.
                if arrivals[parent].fetch_add(1, Ordering::AcqRel) == 0 {
                    break;
                }
                let first = topology[parent].offset as usize;
                let merged = bounds[first].load().union(&bounds[first + 1].load());
                bounds[parent].store(&merged);
                child = parent;
            }
        }
    })?;

    queue.dispatch_mut("refit_write", nodes, |group, out| {
        for (i, node) in group.range.zip(out) {
            node.bounds = bounds[i].load();
        }
    })?;
    Ok(())
}

impl Bvh {
    /// Recompute every node's box from `boxes` without touching the topology.
    ///
    /// `boxes` is indexed by original primitive id, like the build input. Use
    /// this after primitives move; quality degrades as they drift from the
    /// positions the tree was built for.
    pub fn refit(
        &mut self,
        boxes: &[Aabb3],
        queue: &Queue,
        resource: &dyn MemoryResource,
    ) -> Result<(), BuildError> {
        refit(queue, resource, &mut self.nodes, &self.prim_ids, boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HostMemoryResource;
    use glam::Vec3;

    fn topo(offset: u32, count: u32) -> Node {
        Node {
            bounds: Aabb3::EMPTY,
            offset,
            count,
        }
    }

    fn unit_at(x: f32) -> Aabb3 {
        Aabb3::from_origin_size(Vec3::new(x, 0.0, 0.0), Vec3::ONE)
    }

    #[test]
    fn every_node_is_union_of_its_subtree() {
        let q = Queue::new(1);
        let res = HostMemoryResource::new();
        // root -> (1, 2); 1 -> (3, 4); leaves 2, 3, 4.
        let mut nodes = vec![topo(1, 0), topo(3, 0), topo(2, 2), topo(0, 1), topo(1, 1)];
        let prim_ids = [3_u32, 0, 1, 2];
        let boxes = [unit_at(0.0), unit_at(10.0), unit_at(20.0), unit_at(-5.0)];
        refit(&q, &res, &mut nodes, &prim_ids, &boxes).unwrap();

        assert_eq!(nodes[3].bounds, boxes[3]);
        assert_eq!(nodes[4].bounds, boxes[0]);
        assert_eq!(nodes[2].bounds, boxes[1].union(&boxes[2]));
        assert_eq!(nodes[1].bounds, boxes[3].union(&boxes[0]));
        assert_eq!(nodes[0].bounds, union_all(boxes));
        assert_eq!(res.in_use(), 0, "scratch tables are released");
    }

    #[test]
    fn empty_tree_gets_empty_root() {
        let q = Queue::default();
        let res = HostMemoryResource::new();
        let mut nodes = vec![Node {
            bounds: unit_at(1.0),
            offset: 0,
            count: 0,
        }];
        refit(&q, &res, &mut nodes, &[], &[]).unwrap();
        assert!(nodes[0].bounds.is_empty());
    }

    #[test]
    fn out_of_range_prim_id_is_rejected() {
        let q = Queue::default();
        let res = HostMemoryResource::new();
        let mut nodes = vec![topo(0, 1)];
        let err = refit(&q, &res, &mut nodes, &[7], &[unit_at(0.0)]).unwrap_err();
        assert!(matches!(err, BuildError::Device(_)));
    }
}
