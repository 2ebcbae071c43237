//! Graph structure and the read-only query interface consumed by passes.
//!
//! The graph owns all nodes in an arena. Per-opcode constructors fix each
//! opcode's input layout so the value/effect/control segmentation is always
//! consistent:
//!
//! - loads: `[offset, index, effect, control]`
//! - stores: `[offset, index, value, effect, control]`
//! - phi: `[v0 .. vn, control]`
//!
//! Block assignment and the early schedule position are recorded per node;
//! computing them is the scheduler's job, not the graph's.

use smallvec::{smallvec, SmallVec};

use super::arena::Arena;
use super::node::{BlockId, Node, NodeId};
use super::operators::{IrOpcode, Operator};
use super::types::{LoadTransformation, MachineRepr};

/// A function's IR graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Arena<Node>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Graph {
            nodes: Arena::with_capacity(64),
        }
    }

    /// Get a reference to a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Get the number of nodes in the graph.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes with their IDs.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    fn add(
        &mut self,
        op: Operator,
        inputs: SmallVec<[NodeId; 4]>,
        value_input_count: u16,
        first_control_index: u16,
        block: BlockId,
    ) -> NodeId {
        self.nodes.alloc(Node::new(
            op,
            inputs,
            value_input_count,
            first_control_index,
            block,
        ))
    }

    // =========================================================================
    // Node Creation
    // =========================================================================

    /// Create the start node; source of the initial effect and control chains.
    pub fn start(&mut self, block: BlockId) -> NodeId {
        self.add(Operator::Start, smallvec![], 0, 0, block)
    }

    /// Create a parameter node.
    pub fn parameter(&mut self, index: u16, block: BlockId) -> NodeId {
        self.add(Operator::Parameter(index), smallvec![], 0, 0, block)
    }

    /// Create a 64-bit integer constant.
    pub fn int64_constant(&mut self, value: i64, block: BlockId) -> NodeId {
        self.add(Operator::Int64Constant(value), smallvec![], 0, 0, block)
    }

    /// Create a 64-bit addition.
    pub fn int64_add(&mut self, lhs: NodeId, rhs: NodeId, block: BlockId) -> NodeId {
        self.add(Operator::Int64Add, smallvec![lhs, rhs], 2, 2, block)
    }

    /// Create a zero-extension of a 32-bit index.
    pub fn change_uint32_to_uint64(&mut self, input: NodeId, block: BlockId) -> NodeId {
        self.add(Operator::ChangeUint32ToUint64, smallvec![input], 1, 1, block)
    }

    /// Create a plain load.
    pub fn load(
        &mut self,
        repr: MachineRepr,
        offset: NodeId,
        index: NodeId,
        effect: NodeId,
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        self.add(
            Operator::Load(repr),
            smallvec![offset, index, effect, control],
            2,
            3,
            block,
        )
    }

    /// Create a load from a managed object.
    pub fn load_from_object(
        &mut self,
        repr: MachineRepr,
        offset: NodeId,
        index: NodeId,
        effect: NodeId,
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        self.add(
            Operator::LoadFromObject(repr),
            smallvec![offset, index, effect, control],
            2,
            3,
            block,
        )
    }

    /// Create a bounds-checked load.
    pub fn protected_load(
        &mut self,
        repr: MachineRepr,
        offset: NodeId,
        index: NodeId,
        effect: NodeId,
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        self.add(
            Operator::ProtectedLoad(repr),
            smallvec![offset, index, effect, control],
            2,
            3,
            block,
        )
    }

    /// Create a widening load.
    pub fn load_transform(
        &mut self,
        transformation: LoadTransformation,
        offset: NodeId,
        index: NodeId,
        effect: NodeId,
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        self.add(
            Operator::LoadTransform(transformation),
            smallvec![offset, index, effect, control],
            2,
            3,
            block,
        )
    }

    /// Create a plain store.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &mut self,
        repr: MachineRepr,
        offset: NodeId,
        index: NodeId,
        value: NodeId,
        effect: NodeId,
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        self.add(
            Operator::Store(repr),
            smallvec![offset, index, value, effect, control],
            3,
            4,
            block,
        )
    }

    /// Create a bounds-checked store.
    #[allow(clippy::too_many_arguments)]
    pub fn protected_store(
        &mut self,
        repr: MachineRepr,
        offset: NodeId,
        index: NodeId,
        value: NodeId,
        effect: NodeId,
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        self.add(
            Operator::ProtectedStore(repr),
            smallvec![offset, index, value, effect, control],
            3,
            4,
            block,
        )
    }

    /// Create a phi merging `values`, controlled by `control`.
    pub fn phi(
        &mut self,
        repr: MachineRepr,
        values: &[NodeId],
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        let count = values.len() as u16;
        let mut inputs: SmallVec<[NodeId; 4]> = SmallVec::from_slice(values);
        inputs.push(control);
        self.add(Operator::Phi(repr), inputs, count, count, block)
    }

    /// Create a loop exit value.
    pub fn loop_exit_value(
        &mut self,
        repr: MachineRepr,
        value: NodeId,
        control: NodeId,
        block: BlockId,
    ) -> NodeId {
        self.add(
            Operator::LoopExitValue(repr),
            smallvec![value, control],
            1,
            1,
            block,
        )
    }

    /// Create an extraction of one 128-bit half of a 256-bit vector.
    pub fn extract_f128(&mut self, lane: i32, source: NodeId, block: BlockId) -> NodeId {
        self.add(Operator::ExtractF128(lane), smallvec![source], 1, 1, block)
    }

    /// Create a lane-wise f32x4 addition.
    pub fn f32x4_add(&mut self, lhs: NodeId, rhs: NodeId, block: BlockId) -> NodeId {
        self.add(Operator::F32x4Add, smallvec![lhs, rhs], 2, 2, block)
    }

    /// Create a lane-wise f32x4 multiplication.
    pub fn f32x4_mul(&mut self, lhs: NodeId, rhs: NodeId, block: BlockId) -> NodeId {
        self.add(Operator::F32x4Mul, smallvec![lhs, rhs], 2, 2, block)
    }

    // =========================================================================
    // Node Modification
    // =========================================================================

    /// Replace a node's input at the given index.
    ///
    /// Needed to tie loop back-edges: a header phi is created before the
    /// node that feeds its back-edge input.
    pub fn replace_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        self.nodes[node].inputs[index] = new_input;
    }

    /// Override a node's early schedule position.
    pub fn set_early_schedule_position(&mut self, node: NodeId, block: BlockId) {
        self.nodes[node].set_early_schedule_position(block);
    }

    // =========================================================================
    // Query Interface
    // =========================================================================

    /// The node's operator.
    #[inline]
    pub fn operator(&self, node: NodeId) -> Operator {
        self.nodes[node].op
    }

    /// The node's opcode discriminant.
    #[inline]
    pub fn opcode(&self, node: NodeId) -> IrOpcode {
        self.nodes[node].op.opcode()
    }

    /// Raw input at `index`.
    #[inline]
    pub fn input_at(&self, node: NodeId, index: usize) -> NodeId {
        self.nodes[node].inputs[index]
    }

    /// Value input at `index`.
    #[inline]
    pub fn value_input(&self, node: NodeId, index: usize) -> NodeId {
        debug_assert!(index < self.nodes[node].value_input_count());
        self.nodes[node].inputs[index]
    }

    /// Number of value inputs.
    #[inline]
    pub fn value_input_count(&self, node: NodeId) -> usize {
        self.nodes[node].value_input_count()
    }

    /// Number of inputs before the control segment (value + effect).
    #[inline]
    pub fn input_count_before_control(&self, node: NodeId) -> usize {
        self.nodes[node].first_control_index()
    }

    /// The block a node is assigned to.
    #[inline]
    pub fn block(&self, node: NodeId) -> BlockId {
        self.nodes[node].block()
    }

    /// The earliest (dominating) block a node may be scheduled in.
    #[inline]
    pub fn early_schedule_position(&self, node: NodeId) -> BlockId {
        self.nodes[node].early_schedule_position()
    }

    /// Check if two nodes share a basic block.
    #[inline]
    pub fn same_basic_block(&self, a: NodeId, b: NodeId) -> bool {
        self.block(a) == self.block(b)
    }

    /// Check if a node is a constant.
    #[inline]
    pub fn is_constant(&self, node: NodeId) -> bool {
        self.nodes[node].op.is_constant()
    }

    /// Check if a node is a phi.
    #[inline]
    pub fn is_phi(&self, node: NodeId) -> bool {
        self.nodes[node].op.is_phi()
    }

    /// Check if a node is a 128-bit SIMD operation.
    #[inline]
    pub fn is_simd128_op(&self, node: NodeId) -> bool {
        self.nodes[node].op.is_simd128()
    }

    /// All stores of 128-bit vectors, in id order.
    pub fn simd128_store_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| {
                matches!(
                    node.op,
                    Operator::Store(MachineRepr::Simd128)
                        | Operator::ProtectedStore(MachineRepr::Simd128)
                )
            })
            .map(|(id, _)| id)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
