//! Pack nodes: pairs of IR nodes proven fusible into one 256-bit operation.

use smallvec::SmallVec;

use crate::ir::arena::Id;
use crate::ir::node::NodeId;

use super::NodeGroup;

/// Handle to a pack in the tree's arena.
pub type PackId = Id<PackNode>;

/// A pairing of two IR nodes, forming one logical 256-bit operation.
///
/// Lane 0 holds the node covering the lower 16 bytes, lane 1 the upper.
/// Child packs are recorded sparsely by operand position; only positions
/// the tree builder recursed into are set.
#[derive(Debug, Clone)]
pub struct PackNode {
    nodes: NodeGroup,
    operands: SmallVec<[Option<PackId>; 4]>,
    revectorized: Option<NodeId>,
}

impl PackNode {
    pub(crate) fn new(nodes: NodeGroup) -> Self {
        PackNode {
            nodes,
            operands: SmallVec::new(),
            revectorized: None,
        }
    }

    /// The two member nodes, lane 0 first.
    #[inline]
    pub fn nodes(&self) -> NodeGroup {
        self.nodes
    }

    /// Check if the pack's members match `group` element-wise.
    #[inline]
    pub fn is_same(&self, group: NodeGroup) -> bool {
        self.nodes == group
    }

    /// Child pack at operand position `index`, if one was recorded.
    pub fn operand(&self, index: usize) -> Option<PackId> {
        self.operands.get(index).copied().flatten()
    }

    pub(crate) fn set_operand(&mut self, index: usize, child: PackId) {
        if self.operands.len() <= index {
            self.operands.resize(index + 1, None);
        }
        self.operands[index] = Some(child);
    }

    /// The 256-bit node materialized for this pack, once the later
    /// code-generation stage has produced one.
    #[inline]
    pub fn revectorized_node(&self) -> Option<NodeId> {
        self.revectorized
    }

    /// Record the materialized 256-bit node.
    pub fn set_revectorized_node(&mut self, node: NodeId) {
        self.revectorized = Some(node);
    }
}

// =============================================================================
// Tests
// =============================================================================
