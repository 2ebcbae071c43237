//! The SLP tree builder.
//!
//! Starting from a pair of adjacent 128-bit stores, [`SlpTree::build_tree`]
//! recursively proves that the operands feeding the pair can themselves be
//! paired, producing a tree of [`PackNode`]s that mirrors the original IR
//! subgraph. Every rejection is an expected outcome and simply yields no
//! pack; the reasons are visible on the trace channel.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::arena::Arena;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{IrOpcode, Operator};
use crate::ir::types::MachineRepr;

use super::addr::{all_same_address, is_continuous_access, memory_offset_value};
use super::dependency::is_side_effect_free_load;
use super::pack::{PackId, PackNode};
use super::stack::RecursionStack;
use super::{trace, NodeGroup};

/// Recursion ceiling for tree building; candidate chains deeper than this
/// are rejected rather than explored.
pub const RECURSION_MAX_DEPTH: u32 = 8;

/// Builder and owner of one pack tree per store-pair root.
///
/// Packs are arena-allocated and survive until the pass ends; the
/// node-to-pack registry and the recursion stack are reset on every
/// [`build_tree`](SlpTree::build_tree). Registry contents are only
/// meaningful if the most recent `build_tree` returned a root.
pub struct SlpTree<'g> {
    graph: &'g Graph,
    packs: Arena<PackNode>,
    node_to_pack: FxHashMap<NodeId, PackId>,
    stack: RecursionStack,
    trace: bool,
}

impl<'g> SlpTree<'g> {
    /// Create a tree builder over `graph`.
    pub fn new(graph: &'g Graph, trace: bool) -> Self {
        SlpTree {
            graph,
            packs: Arena::new(),
            node_to_pack: FxHashMap::default(),
            stack: RecursionStack::new(),
            trace,
        }
    }

    /// Get a pack by id.
    #[inline]
    pub fn pack(&self, id: PackId) -> &PackNode {
        &self.packs[id]
    }

    /// Get a mutable pack by id.
    #[inline]
    pub fn pack_mut(&mut self, id: PackId) -> &mut PackNode {
        &mut self.packs[id]
    }

    /// The pack an IR node participates in, if any.
    pub fn get_pack_node(&self, node: NodeId) -> Option<PackId> {
        self.node_to_pack.get(&node).copied()
    }

    /// Number of packs allocated over the tree's lifetime.
    #[inline]
    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    pub(crate) fn stack_is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Build a pack tree rooted at a store pair.
    ///
    /// Clears the registry and recursion stack, then recurses from the
    /// roots. Returns the root pack on success.
    pub fn build_tree(&mut self, roots: NodeGroup) -> Option<PackId> {
        trace!(self.trace, "enter BuildTree");
        self.delete_tree();
        let root = self.build_tree_rec(roots, 0);
        if root.is_none() {
            // Failed descents leave their frames behind; drop them so the
            // next build starts clean.
            self.stack.clear();
        }
        root
    }

    /// Drop the registry and stack; allocated packs stay in the arena.
    pub fn delete_tree(&mut self) {
        self.stack.clear();
        self.node_to_pack.clear();
    }

    fn mnemonic(&self, node: NodeId) -> &'static str {
        self.graph.operator(node).mnemonic()
    }

    fn push_stack(&mut self, group: NodeGroup) {
        trace!(
            self.trace,
            "stack push ({} {}, {} {})",
            group[0],
            self.mnemonic(group[0]),
            group[1],
            self.mnemonic(group[1])
        );
        self.stack.push(group);
    }

    fn pop_stack(&mut self) {
        if let Some(group) = self.stack.pop() {
            trace!(
                self.trace,
                "stack pop ({} {}, {} {})",
                group[0],
                self.mnemonic(group[0]),
                group[1],
                self.mnemonic(group[1])
            );
        }
    }

    // =========================================================================
    // Pairing predicates
    // =========================================================================

    fn all_constant(&self, group: &NodeGroup) -> bool {
        group.iter().all(|&node| self.graph.is_constant(node))
    }

    fn all_same_operator(&self, group: &NodeGroup) -> bool {
        let op0 = self.graph.operator(group[0]);
        let op1 = self.graph.operator(group[1]);
        match (op0, op1) {
            // Lane parameters are deliberately ignored here; the extract
            // leaf rule decides which lane combinations pair.
            (Operator::ExtractF128(_), Operator::ExtractF128(_)) => true,
            _ => op0 == op1,
        }
    }

    fn can_be_packed(&self, group: &NodeGroup) -> bool {
        let [node0, node1] = *group;
        if !self.graph.same_basic_block(node0, node1) {
            trace!(
                self.trace,
                "{}({}, {}) not in same BB",
                self.mnemonic(node0),
                node0,
                node1
            );
            return false;
        }
        if !self.all_same_operator(group) {
            trace!(
                self.trace,
                "{}({}, {}) have different operator",
                self.mnemonic(node0),
                node0,
                node1
            );
            return false;
        }
        // Packing a constant pair would need materialization support the
        // later stage does not have.
        if self.all_constant(group) {
            trace!(
                self.trace,
                "{}({}, {}) are constant, not supported",
                self.mnemonic(node0),
                node0,
                node1
            );
            return false;
        }

        // Only simd128 operators, or the common operators that can carry a
        // simd128 representation. The root's representation was checked by
        // the seed collector and leaf representations are checked later, so
        // only the opcode matters here.
        self.graph.is_simd128_op(node0)
            || matches!(
                self.graph.opcode(node0),
                IrOpcode::Store
                    | IrOpcode::ProtectedStore
                    | IrOpcode::Load
                    | IrOpcode::ProtectedLoad
                    | IrOpcode::Phi
                    | IrOpcode::LoopExitValue
                    | IrOpcode::ExtractF128
            )
    }

    // =========================================================================
    // Pack creation
    // =========================================================================

    fn new_pack_node(&mut self, group: NodeGroup) -> PackId {
        trace!(
            self.trace,
            "PackNode {}({}, {})",
            self.mnemonic(group[0]),
            group[0],
            group[1]
        );
        let id = self.packs.alloc(PackNode::new(group));
        for node in group {
            self.node_to_pack.insert(node, id);
        }
        id
    }

    fn new_pack_node_and_recurse(
        &mut self,
        group: NodeGroup,
        start_index: usize,
        count: usize,
        depth: u32,
    ) -> Option<PackId> {
        let pack = self.new_pack_node(group);
        for i in start_index..start_index + count {
            let operands = [
                self.graph.value_input(group[0], i),
                self.graph.value_input(group[1], i),
            ];
            let child = self.build_tree_rec(operands, depth + 1)?;
            self.packs[pack].set_operand(i, child);
        }
        Some(pack)
    }

    // =========================================================================
    // Tree building
    // =========================================================================

    fn build_tree_rec(&mut self, group: NodeGroup, depth: u32) -> Option<PackId> {
        let [node0, node1] = group;

        if depth == RECURSION_MAX_DEPTH {
            trace!(self.trace, "failed due to max recursion depth");
            return None;
        }

        if self.stack.any_on_stack(&group) && !self.stack.top_is_phi(self.graph) {
            // A cycle not routed through a phi cannot be packed.
            trace!(
                self.trace,
                "failed due to ({} {}, {} {}) on stack",
                node0,
                self.mnemonic(node0),
                node1,
                self.mnemonic(node1)
            );
            return None;
        }
        self.push_stack(group);

        if !self.can_be_packed(&group) {
            return None;
        }

        // Check if this is a duplicate of a subtree already built.
        for node in group {
            if let Some(existing) = self.get_pack_node(node) {
                if !self.packs[existing].is_same(group) {
                    // TODO(revec): gather packs for partially overlapping groups.
                    trace!(
                        self.trace,
                        "failed due to partial overlap at {},{}",
                        node,
                        self.mnemonic(node)
                    );
                    return None;
                }

                self.pop_stack();
                trace!(
                    self.trace,
                    "perfect diamond merge at {},{}",
                    node,
                    self.mnemonic(node)
                );
                return Some(existing);
            }
        }

        match self.graph.operator(node0) {
            Operator::ExtractF128(lane0) => self.build_extract_leaf(group, lane0),

            Operator::ProtectedLoad(_) | Operator::LoadTransform(_) => {
                self.build_load_leaf(group)
            }

            Operator::Phi(repr) => {
                trace!(self.trace, "added a vector of phi nodes");
                if repr != MachineRepr::Simd128 {
                    return None;
                }
                let count = self.graph.value_input_count(node0);
                let pack = self.new_pack_node_and_recurse(group, 0, count, depth);
                self.pop_stack();
                pack
            }

            Operator::LoopExitValue(repr) => {
                if repr != MachineRepr::Simd128 {
                    return None;
                }
                let count = self.graph.value_input_count(node0);
                let pack = self.new_pack_node_and_recurse(group, 0, count, depth);
                self.pop_stack();
                pack
            }

            Operator::F32x4Add | Operator::F32x4Mul => {
                trace!(self.trace, "added a vector of simd ops");
                let count = self.graph.value_input_count(node0);
                let pack = self.new_pack_node_and_recurse(group, 0, count, depth);
                self.pop_stack();
                pack
            }

            Operator::Store(_) | Operator::ProtectedStore(_) => {
                trace!(self.trace, "added a vector of stores");
                if !all_same_address(self.graph, &group) {
                    trace!(self.trace, "failed due to different store addr");
                    return None;
                }
                // Operands 0 and 1 are the address, proven equal above;
                // only the stored value at position 2 is recursed.
                let pack = self.new_pack_node_and_recurse(group, 2, 1, depth);
                self.pop_stack();
                pack
            }

            op => {
                trace!(
                    self.trace,
                    "default branch {}:{}",
                    node0,
                    op.mnemonic()
                );
                None
            }
        }
    }

    fn build_extract_leaf(&mut self, group: NodeGroup, lane0: i32) -> Option<PackId> {
        let [node0, node1] = group;
        let source = self.graph.value_input(node0, 0);
        trace!(
            self.trace,
            "extract leaf node from {},{}",
            source,
            self.mnemonic(source)
        );

        // Both halves must come from one 256-bit source: either the same
        // splat (a widened splat is still a splat) or consecutive lanes.
        let paired = source == self.graph.value_input(node1, 0)
            && if self.graph.opcode(source) == IrOpcode::LoadTransform {
                node0 == node1
            } else {
                match self.graph.operator(node1) {
                    Operator::ExtractF128(lane1) => lane1 == lane0 + 1,
                    _ => false,
                }
            };

        if paired {
            trace!(self.trace, "added a pair of extracts");
            let pack = self.new_pack_node(group);
            self.pop_stack();
            return Some(pack);
        }
        trace!(self.trace, "failed due to extract lanes");
        None
    }

    fn build_load_leaf(&mut self, group: NodeGroup) -> Option<PackId> {
        let [node0, _] = group;
        trace!(self.trace, "load leaf node");

        if !all_same_address(self.graph, &group) {
            trace!(self.trace, "failed due to different load addr");
            return None;
        }

        if let Operator::ProtectedLoad(repr) = self.graph.operator(node0) {
            if repr != MachineRepr::Simd128 {
                return None;
            }
            // Pair in ascending offset order before the stride check.
            let mut sorted = group;
            sorted.sort_by_key(|&node| memory_offset_value(self.graph, node));
            if !is_continuous_access(self.graph, &sorted) {
                trace!(self.trace, "failed due to non-continuous load");
                return None;
            }
        }

        if let Operator::LoadTransform(transformation) = self.graph.operator(node0) {
            // A transform pair only widens as a splat of itself.
            if node0 != group[1] {
                trace!(self.trace, "load transform failed due to splat check");
                return None;
            }
            if !transformation.is_widenable_splat() {
                trace!(
                    self.trace,
                    "load transform failed due to unsupported kind {}",
                    node0
                );
                return None;
            }
        }

        if !is_side_effect_free_load(self.graph, &self.stack, &group, self.trace) {
            trace!(self.trace, "failed due to dependency check");
            return None;
        }

        let pack = self.new_pack_node(group);
        self.pop_stack();
        Some(pack)
    }

    // =========================================================================
    // Trace output
    // =========================================================================

    /// Dump every distinct pack once, prefixed with `info`.
    pub fn print(&self, info: &str) {
        if !self.trace {
            return;
        }
        trace!(self.trace, "{}, packed nodes:", info);
        let mut visited: FxHashSet<PackId> = FxHashSet::default();
        for &pack in self.node_to_pack.values() {
            if !visited.insert(pack) {
                continue;
            }
            let entry = &self.packs[pack];
            let [node0, node1] = entry.nodes();
            match entry.revectorized_node() {
                Some(wide) => trace!(
                    self.trace,
                    "{} {}:{}({} {}, {})",
                    pack,
                    wide,
                    self.mnemonic(wide),
                    node0,
                    node1,
                    self.mnemonic(node0)
                ),
                None => trace!(
                    self.trace,
                    "{} null({} {}, {})",
                    pack,
                    node0,
                    node1,
                    self.mnemonic(node0)
                ),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::BlockId;
    use crate::ir::types::LoadTransformation;

    /// Test graphs with the linear-memory addressing idiom prebuilt.
    struct Builder {
        graph: Graph,
        start: NodeId,
        mem: NodeId,
        next_param: u16,
    }

    const B0: BlockId = BlockId(0);

    impl Builder {
        fn new() -> Self {
            let mut graph = Graph::new();
            let start = graph.start(B0);
            let obj = graph.parameter(0, B0);
            let field = graph.parameter(1, B0);
            let mem = graph.load_from_object(MachineRepr::Word64, obj, field, start, start, B0);
            Builder {
                graph,
                start,
                mem,
                next_param: 2,
            }
        }

        fn param(&mut self) -> NodeId {
            let index = self.next_param;
            self.next_param += 1;
            self.graph.parameter(index, B0)
        }

        fn base(&mut self, offset: i64) -> NodeId {
            if offset == 0 {
                self.mem
            } else {
                let c = self.graph.int64_constant(offset, B0);
                self.graph.int64_add(self.mem, c, B0)
            }
        }

        fn load(&mut self, offset: i64, index: NodeId) -> NodeId {
            let base = self.base(offset);
            self.graph
                .protected_load(MachineRepr::Simd128, base, index, self.start, self.start, B0)
        }

        fn store(&mut self, offset: i64, index: NodeId, value: NodeId) -> NodeId {
            let base = self.base(offset);
            self.graph.protected_store(
                MachineRepr::Simd128,
                base,
                index,
                value,
                self.start,
                self.start,
                B0,
            )
        }
    }

    #[test]
    fn test_load_pair_leaf() {
        let mut b = Builder::new();
        let index = b.param();
        let l0 = b.load(0, index);
        let l1 = b.load(16, index);

        let mut tree = SlpTree::new(&b.graph, false);
        let root = tree.build_tree([l0, l1]);

        let root = root.expect("contiguous load pair should pack");
        assert_eq!(tree.pack(root).nodes(), [l0, l1]);
        assert_eq!(tree.get_pack_node(l0), Some(root));
        assert_eq!(tree.get_pack_node(l1), Some(root));
        assert!(tree.stack_is_empty());
    }

    #[test]
    fn test_non_contiguous_load_pair_fails() {
        let mut b = Builder::new();
        let index = b.param();
        let l0 = b.load(0, index);
        let l1 = b.load(32, index);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([l0, l1]).is_none());
        assert!(tree.stack_is_empty());
    }

    #[test]
    fn test_load_pair_sorted_by_offset() {
        let mut b = Builder::new();
        let index = b.param();
        let l0 = b.load(0, index);
        let l1 = b.load(16, index);

        // Reversed lanes still satisfy the stride check after sorting.
        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([l1, l0]).is_some());
    }

    #[test]
    fn test_load_pair_wrong_representation_fails() {
        let mut b = Builder::new();
        let index = b.param();
        let base0 = b.base(0);
        let base1 = b.base(16);
        let l0 = b
            .graph
            .protected_load(MachineRepr::Word64, base0, index, b.start, b.start, B0);
        let l1 = b
            .graph
            .protected_load(MachineRepr::Word64, base1, index, b.start, b.start, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([l0, l1]).is_none());
    }

    #[test]
    fn test_different_address_fails() {
        let mut b = Builder::new();
        let index0 = b.param();
        let index1 = b.param();
        let l0 = b.load(0, index0);
        let l1 = b.load(16, index1);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([l0, l1]).is_none());
    }

    #[test]
    fn test_different_block_fails() {
        let mut b = Builder::new();
        let index = b.param();
        let base = b.base(16);
        let l0 = b.load(0, index);
        let l1 = b
            .graph
            .protected_load(MachineRepr::Simd128, base, index, b.start, b.start, BlockId(1));

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([l0, l1]).is_none());
    }

    #[test]
    fn test_different_operator_fails() {
        let mut b = Builder::new();
        let x = b.param();
        let y = b.param();
        let add = b.graph.f32x4_add(x, y, B0);
        let mul = b.graph.f32x4_mul(x, y, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([add, mul]).is_none());
    }

    #[test]
    fn test_constant_group_fails() {
        // Equal constants share an operator, so the rejection is the
        // constant check itself rather than an operator mismatch.
        let mut b = Builder::new();
        let c0 = b.graph.int64_constant(5, B0);
        let c1 = b.graph.int64_constant(5, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([c0, c1]).is_none());
    }

    #[test]
    fn test_unsupported_opcode_fails() {
        let mut b = Builder::new();
        let x = b.param();
        let y = b.param();
        let a0 = b.graph.int64_add(x, y, B0);
        let a1 = b.graph.int64_add(y, x, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([a0, a1]).is_none());
    }

    #[test]
    fn test_plain_load_has_no_rule() {
        let mut b = Builder::new();
        let index = b.param();
        let base0 = b.base(0);
        let base1 = b.base(16);
        // Accepted by the pairing predicate, but no dispatch rule exists.
        let l0 = b
            .graph
            .load(MachineRepr::Simd128, base0, index, b.start, b.start, B0);
        let l1 = b
            .graph
            .load(MachineRepr::Simd128, base1, index, b.start, b.start, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([l0, l1]).is_none());
    }

    #[test]
    fn test_store_pair_recurses_on_value() {
        let mut b = Builder::new();
        let index = b.param();
        let la0 = b.load(0, index);
        let la1 = b.load(16, index);
        let out = b.param();
        let s0 = b.store(0, out, la0);
        let s1 = b.store(16, out, la1);

        let mut tree = SlpTree::new(&b.graph, false);
        let root = tree.build_tree([s0, s1]).expect("store pair should pack");

        let value_pack = tree.pack(root).operand(2).expect("value operand wired");
        assert_eq!(tree.pack(value_pack).nodes(), [la0, la1]);
        // Address operands are never recursed.
        assert_eq!(tree.pack(root).operand(0), None);
        assert_eq!(tree.pack(root).operand(1), None);
    }

    #[test]
    fn test_extract_pair_consecutive_lanes() {
        let mut b = Builder::new();
        let source = b.param();
        let e0 = b.graph.extract_f128(0, source, B0);
        let e1 = b.graph.extract_f128(1, source, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        let root = tree.build_tree([e0, e1]).expect("consecutive lanes pack");
        assert_eq!(tree.pack(root).nodes(), [e0, e1]);
    }

    #[test]
    fn test_extract_pair_wrong_lane_order_fails() {
        let mut b = Builder::new();
        let source = b.param();
        let e0 = b.graph.extract_f128(1, source, B0);
        let e1 = b.graph.extract_f128(0, source, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([e0, e1]).is_none());
    }

    #[test]
    fn test_extract_pair_different_sources_fails() {
        let mut b = Builder::new();
        let s0 = b.param();
        let s1 = b.param();
        let e0 = b.graph.extract_f128(0, s0, B0);
        let e1 = b.graph.extract_f128(1, s1, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([e0, e1]).is_none());
    }

    #[test]
    fn test_extract_splat_from_load_transform() {
        let mut b = Builder::new();
        let index = b.param();
        let base = b.base(0);
        let lt = b.graph.load_transform(
            LoadTransformation::S128Load32Splat,
            base,
            index,
            b.start,
            b.start,
            B0,
        );
        let e = b.graph.extract_f128(0, lt, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        let root = tree.build_tree([e, e]).expect("splat extract packs");
        assert_eq!(tree.pack(root).nodes(), [e, e]);
    }

    #[test]
    fn test_load_transform_splat_pair() {
        let mut b = Builder::new();
        let index = b.param();
        let base = b.base(0);
        let lt = b.graph.load_transform(
            LoadTransformation::S128Load64Splat,
            base,
            index,
            b.start,
            b.start,
            B0,
        );

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([lt, lt]).is_some());
    }

    #[test]
    fn test_load_transform_distinct_nodes_fail() {
        let mut b = Builder::new();
        let index = b.param();
        let base = b.base(0);
        let lt0 = b.graph.load_transform(
            LoadTransformation::S128Load32Splat,
            base,
            index,
            b.start,
            b.start,
            B0,
        );
        let lt1 = b.graph.load_transform(
            LoadTransformation::S128Load32Splat,
            base,
            index,
            b.start,
            b.start,
            B0,
        );

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([lt0, lt1]).is_none());
    }

    #[test]
    fn test_load_transform_unsupported_kind_fails() {
        let mut b = Builder::new();
        let index = b.param();
        let base = b.base(0);
        let lt = b.graph.load_transform(
            LoadTransformation::S128Load64Zero,
            base,
            index,
            b.start,
            b.start,
            B0,
        );

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([lt, lt]).is_none());
    }

    #[test]
    fn test_diamond_merge_returns_same_pack() {
        let mut b = Builder::new();
        let index = b.param();
        let l0 = b.load(0, index);
        let l1 = b.load(16, index);
        // Both operands of the multiply pair resolve to the same load pair.
        let m0 = b.graph.f32x4_mul(l0, l0, B0);
        let m1 = b.graph.f32x4_mul(l1, l1, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        let root = tree.build_tree([m0, m1]).expect("diamond should pack");

        let first = tree.pack(root).operand(0).unwrap();
        let second = tree.pack(root).operand(1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_overlap_fails() {
        let mut b = Builder::new();
        let index = b.param();
        let l0 = b.load(0, index);
        let l1 = b.load(16, index);
        let l2 = b.load(32, index);
        // Operand 0 packs {l0,l1}; operand 1 would need {l1,l2}, which
        // overlaps the existing pack in one lane only.
        let m0 = b.graph.f32x4_mul(l0, l1, B0);
        let m1 = b.graph.f32x4_mul(l1, l2, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([m0, m1]).is_none());
    }

    #[test]
    fn test_phi_cycle_through_back_edge() {
        let mut b = Builder::new();
        let index = b.param();
        let i0 = b.load(0, index);
        let i1 = b.load(16, index);
        let p0 = b.graph.phi(MachineRepr::Simd128, &[i0, i0], b.start, B0);
        let p1 = b.graph.phi(MachineRepr::Simd128, &[i1, i1], b.start, B0);
        let index2 = b.param();
        let d0 = b.load(32, index2);
        let d1 = b.load(48, index2);
        let n0 = b.graph.f32x4_add(p0, d0, B0);
        let n1 = b.graph.f32x4_add(p1, d1, B0);
        b.graph.replace_input(p0, 1, n0);
        b.graph.replace_input(p1, 1, n1);

        // Root at the adds: the phi revisits them through its back edge,
        // which resolves as a diamond merge while the phi frame is on top.
        let mut tree = SlpTree::new(&b.graph, false);
        let root = tree.build_tree([n0, n1]).expect("loop carried adds pack");

        let phi_pack = tree.pack(root).operand(0).unwrap();
        assert_eq!(tree.pack(phi_pack).nodes(), [p0, p1]);
        // The phi's back-edge operand is the root pack itself.
        assert_eq!(tree.pack(phi_pack).operand(1), Some(root));
        assert!(tree.stack_is_empty());
    }

    #[test]
    fn test_cycle_through_non_phi_fails() {
        let mut b = Builder::new();
        let index = b.param();
        let d0 = b.load(0, index);
        let d1 = b.load(16, index);
        let a0 = b.graph.f32x4_add(d0, d0, B0);
        let a1 = b.graph.f32x4_add(d1, d1, B0);
        // a1's first operand chains back onto a0's group lane.
        b.graph.replace_input(a1, 0, a0);

        // Group [a0, a1] recurses into [d0, a0]; a0 is on the stack and the
        // top frame is not a phi.
        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([a0, a1]).is_none());
        assert!(tree.stack_is_empty());
    }

    #[test]
    fn test_phi_wrong_representation_fails() {
        let mut b = Builder::new();
        let x = b.param();
        let y = b.param();
        let p0 = b.graph.phi(MachineRepr::Float64, &[x, x], b.start, B0);
        let p1 = b.graph.phi(MachineRepr::Float64, &[y, y], b.start, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([p0, p1]).is_none());
    }

    #[test]
    fn test_loop_exit_value_pair() {
        let mut b = Builder::new();
        let index = b.param();
        let l0 = b.load(0, index);
        let l1 = b.load(16, index);
        let x0 = b.graph.loop_exit_value(MachineRepr::Simd128, l0, b.start, B0);
        let x1 = b.graph.loop_exit_value(MachineRepr::Simd128, l1, b.start, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        let root = tree.build_tree([x0, x1]).expect("loop exit values pack");
        let child = tree.pack(root).operand(0).unwrap();
        assert_eq!(tree.pack(child).nodes(), [l0, l1]);
    }

    #[test]
    fn test_recursion_depth_cap() {
        // A chain of adds feeding a store pair: the group at depth d is the
        // add pair d levels below the root. Leaves at depth
        // RECURSION_MAX_DEPTH are rejected, one level less is accepted.
        fn chain(levels: usize) -> Option<()> {
            let mut b = Builder::new();
            let index = b.param();
            let mut v0 = b.load(0, index);
            let mut v1 = b.load(16, index);
            for _ in 0..levels {
                v0 = b.graph.f32x4_add(v0, v0, B0);
                v1 = b.graph.f32x4_add(v1, v1, B0);
            }
            let out = b.param();
            let s0 = b.store(0, out, v0);
            let s1 = b.store(16, out, v1);

            let mut tree = SlpTree::new(&b.graph, false);
            tree.build_tree([s0, s1]).map(|_| ())
        }

        // Root store at depth 0, adds at 1..=levels, loads at levels + 1.
        let deepest_ok = (RECURSION_MAX_DEPTH - 2) as usize;
        assert!(chain(deepest_ok).is_some());
        assert!(chain(deepest_ok + 1).is_none());
    }

    #[test]
    fn test_side_effect_dependency_rejects_load_pair() {
        let mut b = Builder::new();
        let index = b.param();
        let lb = b.load(16, index);
        let a1 = b.graph.f32x4_add(lb, lb, B0);
        // la is effect-chained after a1, the upper lane of the very pair
        // being assembled; packing [la, lb] would reorder that effect.
        let base0 = b.base(0);
        let la = b
            .graph
            .protected_load(MachineRepr::Simd128, base0, index, a1, b.start, B0);
        let a0 = b.graph.f32x4_add(la, la, B0);

        let mut tree = SlpTree::new(&b.graph, false);
        assert!(tree.build_tree([a0, a1]).is_none());
    }

    #[test]
    fn test_rebuild_on_same_roots_is_stable() {
        let mut b = Builder::new();
        let index = b.param();
        let l0 = b.load(0, index);
        let l1 = b.load(16, index);
        let out = b.param();
        let s0 = b.store(0, out, l0);
        let s1 = b.store(16, out, l1);

        let mut tree = SlpTree::new(&b.graph, false);
        let first = tree.build_tree([s0, s1]).unwrap();
        let second = tree.build_tree([s0, s1]).unwrap();

        // Fresh packs each build, identical shape.
        assert_eq!(tree.pack(first).nodes(), tree.pack(second).nodes());
        let c1 = tree.pack(first).operand(2).unwrap();
        let c2 = tree.pack(second).operand(2).unwrap();
        assert_eq!(tree.pack(c1).nodes(), tree.pack(c2).nodes());
    }
}
