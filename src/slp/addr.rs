//! Memory address analysis for load/store pairing.
//!
//! The pass only understands the standard linear-memory addressing idiom:
//! input(0) of a load/store is `memory_start + constant_offset` and
//! input(1) is the index. Nodes with the same index and offsets exactly one
//! 128-bit vector apart are candidates for combining; anything else is
//! conservatively rejected.

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{IrOpcode, Operator};

/// Width of a 128-bit vector in bytes; also the required seed alignment.
pub const SIMD128_BYTES: i64 = 16;

fn constant_value(graph: &Graph, node: NodeId) -> i64 {
    match graph.operator(node) {
        Operator::Int64Constant(value) => value,
        _ => -1,
    }
}

/// Extract the constant byte offset of a load/store node.
///
/// A raw memory-base load as input(0) means offset 0; an
/// `Int64Add(_, Int64Constant(k))` (either operand order) means `k`. Any
/// other shape is unanalyzable and yields the sentinel -1.
pub fn memory_offset_value(graph: &Graph, node: NodeId) -> i64 {
    debug_assert!(matches!(
        graph.opcode(node),
        IrOpcode::ProtectedLoad | IrOpcode::Store | IrOpcode::ProtectedStore
    ));

    let offset = graph.input_at(node, 0);
    match graph.opcode(offset) {
        IrOpcode::LoadFromObject | IrOpcode::Load => 0,
        IrOpcode::Int64Add => {
            let lhs = graph.input_at(offset, 0);
            let rhs = graph.input_at(offset, 1);
            if graph.is_constant(lhs) {
                constant_value(graph, lhs)
            } else if graph.is_constant(rhs) {
                constant_value(graph, rhs)
            } else {
                -1
            }
        }
        _ => -1,
    }
}

/// A load/store node's address for pairing purposes: input(1), looking
/// through the uint32-to-uint64 index widening inserted for 32-bit memory.
pub fn node_address(graph: &Graph, node: NodeId) -> NodeId {
    let address = graph.input_at(node, 1);
    if graph.opcode(address) == IrOpcode::ChangeUint32ToUint64 {
        graph.input_at(address, 0)
    } else {
        address
    }
}

/// Check that consecutive nodes are exactly 16 bytes apart, in the order
/// given.
pub fn is_continuous_access(graph: &Graph, nodes: &[NodeId]) -> bool {
    debug_assert!(!nodes.is_empty());
    let mut previous = memory_offset_value(graph, nodes[0]);
    for &node in &nodes[1..] {
        let current = memory_offset_value(graph, node);
        if current - previous != SIMD128_BYTES {
            return false;
        }
        previous = current;
    }
    true
}

/// Check that all nodes share one address node.
pub fn all_same_address(graph: &Graph, nodes: &[NodeId]) -> bool {
    let address = node_address(graph, nodes[0]);
    nodes[1..]
        .iter()
        .all(|&node| node_address(graph, node) == address)
}

// =============================================================================
// Tests
// =============================================================================
