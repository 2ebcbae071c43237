//! IR node definitions.

use smallvec::SmallVec;

use super::arena::Id;
use super::operators::Operator;

/// A unique node identifier.
pub type NodeId = Id<Node>;

/// Identifier of a basic block, as assigned by the surrounding scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// An IR node: an operator applied to an ordered list of inputs.
///
/// Inputs are segmented: value inputs first, then effect inputs, then
/// control inputs. `first_control_index` marks the end of the
/// value-and-effect segment; dependency walks stop there.
#[derive(Debug, Clone)]
pub struct Node {
    /// The operator, carrying opcode and static parameters.
    pub op: Operator,
    /// All inputs in segment order.
    pub inputs: SmallVec<[NodeId; 4]>,
    value_input_count: u16,
    first_control_index: u16,
    block: BlockId,
    schedule_early: BlockId,
}

impl Node {
    pub(crate) fn new(
        op: Operator,
        inputs: SmallVec<[NodeId; 4]>,
        value_input_count: u16,
        first_control_index: u16,
        block: BlockId,
    ) -> Self {
        debug_assert!(value_input_count <= first_control_index);
        debug_assert!(first_control_index as usize <= inputs.len());
        Node {
            op,
            inputs,
            value_input_count,
            first_control_index,
            block,
            schedule_early: block,
        }
    }

    /// Number of value inputs.
    #[inline]
    pub fn value_input_count(&self) -> usize {
        self.value_input_count as usize
    }

    /// Index of the first control input; inputs before it are value or
    /// effect inputs.
    #[inline]
    pub fn first_control_index(&self) -> usize {
        self.first_control_index as usize
    }

    /// The block this node is assigned to.
    #[inline]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// The earliest (dominating) block this node may be scheduled in.
    #[inline]
    pub fn early_schedule_position(&self) -> BlockId {
        self.schedule_early
    }

    pub(crate) fn set_early_schedule_position(&mut self, block: BlockId) {
        self.schedule_early = block;
    }
}

// =============================================================================
// Tests
// =============================================================================
