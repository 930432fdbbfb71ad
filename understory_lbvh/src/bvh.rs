// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The finished hierarchy.

use crate::memory::MemoryResource;
use crate::queue::Queue;
use crate::types::Aabb3;

/// One node of a [`Bvh`].
///
/// `count == 0` marks an inner node whose two children sit at `offset` and
/// `offset + 1`. `count > 0` marks a leaf over
/// `prim_ids[offset..offset + count]`.
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Node {
    /// Union of every primitive below this node.
    pub bounds: Aabb3,
    /// First child (inner) or first primitive slot (leaf).
    pub offset: u32,
    /// Primitive count; zero for inner nodes.
    pub count: u32,
}

impl Node {
    /// Whether this node references primitives directly.
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    /// Indices of the two children, for inner nodes.
    pub fn children(&self) -> Option<[usize; 2]> {
        (self.count == 0).then(|| {
            let first = self.offset as usize;
            [first, first + 1]
        })
    }

    /// Primitive slots covered by a leaf (empty for inner nodes).
    pub fn prim_range(&self) -> core::ops::Range<usize> {
        let begin = self.offset as usize;
        if self.is_leaf() {
            begin..begin + self.count as usize
        } else {
            begin..begin
        }
    }
}

/// A binary BVH over 3D boxes, in Morton order.
///
/// Node 0 is the root. A tree over no valid primitives is a single node with
/// `count == 0` and no children; see [`Bvh::is_empty`].
#[derive(Clone)]
pub struct Bvh {
    pub(crate) nodes: Vec<Node>,
    pub(crate) prim_ids: Vec<u32>,
}

impl Bvh {
    /// Every node, root first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Maps a leaf's primitive slot to the index of the original input box.
    pub fn prim_ids(&self) -> &[u32] {
        &self.prim_ids
    }

    /// Number of primitives in the tree (input boxes minus empty ones).
    pub fn num_prims(&self) -> usize {
        self.prim_ids.len()
    }

    /// The root node.
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Whether the tree holds no primitives.
    pub fn is_empty(&self) -> bool {
        self.prim_ids.is_empty()
    }

    /// Box around every primitive; [`Aabb3::EMPTY`] for an empty tree.
    pub fn bounds(&self) -> Aabb3 {
        self.root().bounds
    }

    /// Child indices of node `index`, unless it is a leaf or the empty root.
    fn children_of(&self, index: usize) -> Option<[usize; 2]> {
        if self.is_empty() {
            None
        } else {
            self.nodes[index].children()
        }
    }

    /// Leaves with their node indices.
    pub fn leaves(&self) -> impl Iterator<Item = (usize, &Node)> + '_ {
        self.nodes.iter().enumerate().filter(|(_, n)| n.is_leaf())
    }

    /// Longest root-to-leaf path, counting edges.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0_usize, 0_usize)];
        while let Some((i, d)) = stack.pop() {
            max_depth = max_depth.max(d);
            if let Some([l, r]) = self.children_of(i) {
                stack.push((l, d + 1));
                stack.push((r, d + 1));
            }
        }
        max_depth
    }

    /// The node array as raw bytes, ready for upload.
    pub fn node_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    /// Give the output buffers' bytes back to the resource they came from.
    pub fn free(self, queue: &Queue, resource: &dyn MemoryResource) {
        resource.free(size_of_val(self.nodes.as_slice()), queue);
        resource.free(size_of_val(self.prim_ids.as_slice()), queue);
    }

    /// Check structural invariants; returns a description of the first
    /// violation.
    #[cfg(test)]
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("no root".into());
        }
        if self.is_empty() {
            let root = self.root();
            return if self.nodes.len() == 1 && root.count == 0 {
                Ok(())
            } else {
                Err(format!("empty tree with {} nodes", self.nodes.len()))
            };
        }
        let n = self.num_prims();
        if self.nodes.len() > 2 * n - 1 {
            return Err(format!("{} nodes for {n} prims", self.nodes.len()));
        }
        let mut covered = vec![false; n];
        let mut reached = vec![false; self.nodes.len()];
        let mut stack = vec![0_usize];
        while let Some(i) = stack.pop() {
            if core::mem::replace(&mut reached[i], true) {
                return Err(format!("node {i} reached twice"));
            }
            let node = &self.nodes[i];
            match node.children() {
                Some([l, r]) => {
                    if l <= i || r >= self.nodes.len() {
                        return Err(format!("node {i} has bad children {l}/{r}"));
                    }
                    stack.push(l);
                    stack.push(r);
                }
                None => {
                    for s in node.prim_range() {
                        if s >= n || core::mem::replace(&mut covered[s], true) {
                            return Err(format!("leaf {i} overlaps or overruns at slot {s}"));
                        }
                    }
                }
            }
        }
        if let Some(i) = reached.iter().position(|r| !r) {
            return Err(format!("node {i} unreachable"));
        }
        if let Some(s) = covered.iter().position(|c| !c) {
            return Err(format!("slot {s} not in any leaf"));
        }
        Ok(())
    }
}

impl core::fmt::Debug for Bvh {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let leaves = self.leaves().count();
        f.debug_struct("Bvh")
            .field("num_nodes", &self.nodes.len())
            .field("num_prims", &self.prim_ids.len())
            .field("leaves", &leaves)
            .field("bounds", &self.bounds())
            .finish_non_exhaustive()
    }
}
