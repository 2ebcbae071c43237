//! 256-bit SLP revectorization pass over a sea-of-nodes SIMD IR.
//!
//! Earlier pipeline stages lower source-level SIMD to 128-bit vector
//! operations. On targets with 256-bit vector support this crate packs
//! pairs of adjacent 128-bit operations back together:
//!
//! 1. **Seed collection**: 128-bit stores are grouped by dominating block
//!    and base address, ordered by constant offset.
//! 2. **Tree building**: each adjacent store pair roots a bottom-up SLP
//!    search proving the feeding computation pairs lane-by-lane.
//! 3. **Result**: a registry of pack nodes mirroring the IR subgraph, which
//!    a later code-generation stage materializes as 256-bit nodes.
//!
//! The pass is purely opportunistic: every rejected candidate simply keeps
//! its 128-bit form.

pub mod ir;
pub mod slp;

pub use slp::{RevecConfig, RevecStats, Revectorizer};
