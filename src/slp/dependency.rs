//! Side-effect probe for candidate load pairs.
//!
//! Two loads may only be packed if nothing they transitively depend on is
//! part of the tree currently under construction; otherwise fusing them
//! would introduce a cycle or reorder an effect past the pair.

use rustc_hash::FxHashSet;

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;

use super::stack::RecursionStack;
use super::{trace, NodeGroup};

/// Check that the input cones of a candidate load pair stay clear of every
/// group on the recursion stack.
///
/// Walks value and effect inputs (inputs before the control segment) of
/// both loads, skipping edges that point at the sibling lane. Inputs
/// outside the loads' basic block cannot be part of the in-progress tree
/// and are not followed.
pub fn is_side_effect_free_load(
    graph: &Graph,
    stack: &RecursionStack,
    group: &NodeGroup,
    tracing: bool,
) -> bool {
    debug_assert!(group.iter().all(|&node| graph.operator(node).is_load()));
    trace!(
        tracing,
        "enter IsSideEffectFreeLoad ({} {}, {} {})",
        group[0],
        graph.operator(group[0]).mnemonic(),
        group[1],
        graph.operator(group[1]).mnemonic()
    );

    let mut to_visit: Vec<NodeId> = Vec::new();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();

    for &load in group {
        for i in 0..graph.input_count_before_control(load) {
            let input = graph.input_at(load, i);
            if !group.contains(&input) {
                to_visit.push(input);
            }
        }
    }

    while let Some(input) = to_visit.pop() {
        trace!(
            tracing,
            "IsSideEffectFreeLoad visit ({} {})",
            input,
            graph.operator(input).mnemonic()
        );
        if !visited.insert(input) {
            continue;
        }

        if stack.on_stack(input) {
            trace!(
                tracing,
                "has internal dependency because ({} {}) on stack",
                input,
                graph.operator(input).mnemonic()
            );
            return false;
        }

        if graph.same_basic_block(input, group[0]) {
            for i in 0..graph.input_count_before_control(input) {
                to_visit.push(graph.input_at(input, i));
            }
        }
    }
    true
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::BlockId;
    use crate::ir::types::MachineRepr;

    #[test]
    fn test_independent_loads_pass() {
        let mut graph = Graph::new();
        let b = BlockId(0);
        let start = graph.start(b);
        let base = graph.parameter(0, b);
        let index = graph.parameter(1, b);
        let l0 = graph.protected_load(MachineRepr::Simd128, base, index, start, start, b);
        let l1 = graph.protected_load(MachineRepr::Simd128, base, index, start, start, b);

        let stack = RecursionStack::new();
        assert!(is_side_effect_free_load(&graph, &stack, &[l0, l1], false));
    }

    #[test]
    fn test_on_stack_input_fails() {
        let mut graph = Graph::new();
        let b = BlockId(0);
        let start = graph.start(b);
        let base = graph.parameter(0, b);
        let index = graph.parameter(1, b);
        // Both loads hang off an effect that is part of the tree being built.
        let pending = graph.f32x4_add(base, base, b);
        let l0 = graph.protected_load(MachineRepr::Simd128, base, index, pending, start, b);
        let l1 = graph.protected_load(MachineRepr::Simd128, base, index, pending, start, b);

        let mut stack = RecursionStack::new();
        stack.push([pending, pending]);

        assert!(!is_side_effect_free_load(&graph, &stack, &[l0, l1], false));
    }

    #[test]
    fn test_transitive_dependency_within_block_fails() {
        let mut graph = Graph::new();
        let b = BlockId(0);
        let start = graph.start(b);
        let base = graph.parameter(0, b);
        let index = graph.parameter(1, b);
        let pending = graph.f32x4_mul(base, base, b);
        // One hop removed: load -> chained -> pending.
        let chained = graph.f32x4_add(pending, base, b);
        let l0 = graph.protected_load(MachineRepr::Simd128, base, index, chained, start, b);
        let l1 = graph.protected_load(MachineRepr::Simd128, base, index, chained, start, b);

        let mut stack = RecursionStack::new();
        stack.push([pending, pending]);

        assert!(!is_side_effect_free_load(&graph, &stack, &[l0, l1], false));
    }

    #[test]
    fn test_other_block_edges_not_followed() {
        let mut graph = Graph::new();
        let b0 = BlockId(0);
        let b1 = BlockId(1);
        let start = graph.start(b0);
        let base = graph.parameter(0, b0);
        let index = graph.parameter(1, b0);
        // The on-stack node is only reachable through a node in another
        // block, which the probe must not look through.
        let pending = graph.f32x4_add(base, base, b0);
        let remote = graph.f32x4_mul(pending, base, b1);
        let l0 = graph.protected_load(MachineRepr::Simd128, base, index, remote, start, b0);
        let l1 = graph.protected_load(MachineRepr::Simd128, base, index, remote, start, b0);

        let mut stack = RecursionStack::new();
        stack.push([pending, pending]);

        assert!(is_side_effect_free_load(&graph, &stack, &[l0, l1], false));
    }

    #[test]
    fn test_sibling_edges_are_skipped() {
        let mut graph = Graph::new();
        let b = BlockId(0);
        let start = graph.start(b);
        let base = graph.parameter(0, b);
        let index = graph.parameter(1, b);
        let l0 = graph.protected_load(MachineRepr::Simd128, base, index, start, start, b);
        // l1 is effect-chained on its sibling l0; that edge must not count
        // as a dependency even while the pair itself is on the stack.
        let l1 = graph.protected_load(MachineRepr::Simd128, base, index, l0, start, b);

        let mut stack = RecursionStack::new();
        stack.push([l0, l1]);

        assert!(is_side_effect_free_load(&graph, &stack, &[l0, l1], false));
    }
}
