// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transient nodes to final nodes.

use crate::bvh::Node;
use crate::error::BuildError;
use crate::queue::Queue;
use crate::tree::TempNode;
use crate::types::Aabb3;

/// Fill in topology for every final node. Bounds are left empty for refit.
pub(crate) fn write_final_nodes(
    queue: &Queue,
    final_nodes: &mut [Node],
    temp_nodes: &[TempNode],
) -> Result<(), BuildError> {
    let results = queue.dispatch_mut("write_final_nodes", final_nodes, |group, out| {
        for (tid, node) in group.range.zip(out) {
            let (offset, count) = match temp_nodes[tid] {
                TempNode::Leaf { offset, count } => (offset, count),
                TempNode::Inner { first_child } => (first_child, 0),
                TempNode::Open { .. } => {
                    return Err(BuildError::Device(format!(
                        "node {tid} still open after construction"
                    )));
                }
            };
            *node = Node {
                bounds: Aabb3::EMPTY,
                offset,
                count,
            };
        }
        Ok(())
    })?;
    results.into_iter().collect()
}
