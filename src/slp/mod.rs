//! 256-bit re-vectorization of paired 128-bit SIMD operations.
//!
//! Runs late in the pipeline, after earlier stages have lowered source
//! SIMD to 128-bit vector operations. When the target supports 256-bit
//! vectors, pairs of adjacent 128-bit stores over contiguous memory seed a
//! bottom-up SLP search that proves the whole feeding computation can be
//! paired, producing a pack tree for a later code-generation stage to
//! materialize as 256-bit nodes.
//!
//! # Module Structure
//!
//! - `addr`: base-plus-constant address analysis and contiguity checks
//! - `pack`: the pack-node type and its operand wiring
//! - `stack`: recursion stack with on-stack membership tracking
//! - `dependency`: side-effect probe for candidate load pairs
//! - `tree`: the recursive SLP tree builder
//!
//! The driver in this module finds candidate store pairs, groups them by
//! dominating block and address, and hands each adjacent pair to the tree
//! builder.

pub mod addr;
pub mod dependency;
pub mod pack;
pub mod stack;
pub mod tree;

use std::collections::BTreeMap;

use crate::ir::graph::Graph;
use crate::ir::node::{BlockId, NodeId};

use self::addr::{is_continuous_access, memory_offset_value, node_address, SIMD128_BYTES};
use self::pack::PackId;
use self::tree::SlpTree;

/// A pair of IR nodes considered for packing, lane 0 first.
pub type NodeGroup = [NodeId; 2];

/// Trace line gated on a runtime flag. Sites are numerous and hot; the
/// flag check is the only cost when tracing is off.
macro_rules! trace {
    ($enabled:expr, $($arg:tt)*) => {
        if $enabled {
            eprintln!("Revec: {}", format_args!($($arg)*));
        }
    };
}
pub(crate) use trace;

// =============================================================================
// Store chains
// =============================================================================

/// Store nodes of one chain, keyed and ordered by constant byte offset.
///
/// All members share one base address and one dominating block.
#[derive(Debug, Clone, Default)]
pub struct StoreNodeSet {
    nodes: BTreeMap<i64, NodeId>,
}

impl StoreNodeSet {
    /// Insert a store at `offset`. A store already recorded at that offset
    /// wins; returns whether the node was inserted.
    pub fn insert(&mut self, offset: i64, node: NodeId) -> bool {
        match self.nodes.entry(offset) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(node);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Number of stores in the chain.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate members in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.values().copied()
    }
}

/// Store chains of one dominating block, keyed by base address.
type StoreChains = BTreeMap<NodeId, StoreNodeSet>;

// =============================================================================
// Configuration & statistics
// =============================================================================

/// Configuration for the revectorizer.
#[derive(Debug, Clone)]
pub struct RevecConfig {
    /// Whether the target supports 256-bit SIMD. Probed from the host CPU
    /// by `Default`; tests override it.
    pub support_simd256: bool,
    /// Emit `Revec: ` trace lines on stderr.
    pub trace_revectorize: bool,
}

impl Default for RevecConfig {
    fn default() -> Self {
        RevecConfig {
            support_simd256: detect_simd256(),
            trace_revectorize: false,
        }
    }
}

/// Probe the host CPU once for 256-bit vector support.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_simd256() -> bool {
    std::arch::is_x86_feature_detected!("avx2")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn detect_simd256() -> bool {
    false
}

/// Counters accumulated while the pass runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevecStats {
    /// Aligned 128-bit stores grouped into chains.
    pub seeds_collected: usize,
    /// Adjacent store pairs handed to the tree builder.
    pub chains_examined: usize,
    /// Pairs for which a full pack tree was built.
    pub chains_reduced: usize,
}

// =============================================================================
// Revectorizer
// =============================================================================

/// The pass driver.
///
/// Collects seed stores, groups them by `(dominating block, base address)`,
/// walks each offset-ordered chain in adjacent pairs and builds one SLP
/// tree per pair. Successful roots accumulate in [`roots`](Self::roots);
/// the tree's registry maps every packed IR node to its pack.
pub struct Revectorizer<'g> {
    graph: &'g Graph,
    slp_tree: SlpTree<'g>,
    group_of_stores: BTreeMap<BlockId, StoreChains>,
    roots: Vec<PackId>,
    support_simd256: bool,
    trace: bool,
    stats: RevecStats,
}

impl<'g> Revectorizer<'g> {
    /// Create a driver with CPU-probed configuration.
    pub fn new(graph: &'g Graph) -> Self {
        Self::with_config(graph, RevecConfig::default())
    }

    /// Create a driver with explicit configuration.
    pub fn with_config(graph: &'g Graph, config: RevecConfig) -> Self {
        Revectorizer {
            graph,
            slp_tree: SlpTree::new(graph, config.trace_revectorize),
            group_of_stores: BTreeMap::new(),
            roots: Vec::new(),
            support_simd256: config.support_simd256,
            trace: config.trace_revectorize,
            stats: RevecStats::default(),
        }
    }

    /// The pack tree, including the node-to-pack registry.
    pub fn tree(&self) -> &SlpTree<'g> {
        &self.slp_tree
    }

    /// Mutable access to the pack tree, for the materialization stage.
    pub fn tree_mut(&mut self) -> &mut SlpTree<'g> {
        &mut self.slp_tree
    }

    /// Root packs of every successfully reduced store pair.
    pub fn roots(&self) -> &[PackId] {
        &self.roots
    }

    /// Accumulated counters.
    pub fn stats(&self) -> RevecStats {
        self.stats
    }

    /// Whether the target supports 256-bit SIMD.
    pub fn support_simd256(&self) -> bool {
        self.support_simd256
    }

    /// Attempt to re-vectorize the function.
    ///
    /// Purely opportunistic: returns whether any store pair reduced to a
    /// pack tree. On failure the surrounding compiler simply keeps emitting
    /// 128-bit SIMD.
    pub fn try_revectorize(&mut self, function: &str) -> bool {
        let mut success = false;
        if self.support_simd256 && !self.graph.simd128_store_nodes().is_empty() {
            trace!(self.trace, "TryRevectorize {}", function);
            self.collect_seeds();

            let group_of_stores = std::mem::take(&mut self.group_of_stores);
            for store_chains in group_of_stores.values() {
                self.print_stores(store_chains);
                if self.reduce_store_chains(store_chains) {
                    trace!(self.trace, "successful revectorize {}", function);
                    success = true;
                }
            }
            self.group_of_stores = group_of_stores;
            trace!(self.trace, "finish revectorize {}", function);
        }
        success
    }

    /// Group every aligned 128-bit store by dominating block and address.
    ///
    /// Idempotent: chains are offset-keyed sets, so re-collection inserts
    /// nothing new.
    pub fn collect_seeds(&mut self) {
        for node in self.graph.simd128_store_nodes() {
            let dominator = self.graph.early_schedule_position(node);

            let offset = memory_offset_value(self.graph, node);
            if offset % SIMD128_BYTES != 0 {
                continue;
            }
            let address = node_address(self.graph, node);
            let inserted = self
                .group_of_stores
                .entry(dominator)
                .or_default()
                .entry(address)
                .or_default()
                .insert(offset, node);
            if inserted {
                self.stats.seeds_collected += 1;
            }
        }
    }

    /// Walk every even-sized chain in adjacent pairs and reduce each pair.
    fn reduce_store_chains(&mut self, store_chains: &StoreChains) -> bool {
        trace!(self.trace, "enter ReduceStoreChains");
        let mut changed = false;
        for chain in store_chains.values() {
            if chain.len() >= 2 && chain.len() % 2 == 0 {
                let store_chain: Vec<NodeId> = chain.iter().collect();
                for unit in store_chain.chunks_exact(2) {
                    if self.reduce_store_chain([unit[0], unit[1]]) {
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Build one SLP tree from a store pair.
    fn reduce_store_chain(&mut self, stores: NodeGroup) -> bool {
        trace!(
            self.trace,
            "enter ReduceStoreChain, root@ ({},{})",
            stores[0],
            stores[1]
        );
        self.stats.chains_examined += 1;
        // The chain is offset-sorted but not necessarily dense.
        if !is_continuous_access(self.graph, &stores) {
            return false;
        }

        let Some(root) = self.slp_tree.build_tree(stores) else {
            trace!(self.trace, "build tree failed");
            return false;
        };
        self.roots.push(root);
        self.stats.chains_reduced += 1;

        self.slp_tree.print("after build tree");
        true
    }

    fn print_stores(&self, store_chains: &StoreChains) {
        if !self.trace {
            return;
        }
        trace!(self.trace, "enter PrintStores");
        for (address, chain) in store_chains {
            if chain.is_empty() {
                continue;
            }
            trace!(
                self.trace,
                "address = {}:{}",
                address,
                self.graph.operator(*address).mnemonic()
            );
            for node in chain.iter() {
                trace!(
                    self.trace,
                    "  {}:{}",
                    node,
                    self.graph.operator(node).mnemonic()
                );
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
