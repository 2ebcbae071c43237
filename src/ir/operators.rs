//! IR operator definitions.
//!
//! An [`Operator`] carries the opcode together with its static parameters
//! (representation, lane index, transformation kind), so derived equality is
//! exactly the "identical operator" test the vectorizer needs. The
//! payload-free [`IrOpcode`] discriminant is what dispatch switches on.

use super::types::{LoadTransformation, MachineRepr};

// =============================================================================
// Opcode
// =============================================================================

/// Payload-free opcode discriminant, for dispatch and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IrOpcode {
    Start,
    Parameter,
    Int64Constant,
    Int64Add,
    ChangeUint32ToUint64,
    Load,
    LoadFromObject,
    ProtectedLoad,
    LoadTransform,
    Store,
    ProtectedStore,
    Phi,
    LoopExitValue,
    ExtractF128,
    F32x4Add,
    F32x4Mul,
}

// =============================================================================
// Operator
// =============================================================================

/// An operator: opcode plus static parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Function entry; source of the initial effect and control chains.
    Start,
    /// Incoming argument.
    Parameter(u16),
    /// 64-bit integer constant.
    Int64Constant(i64),
    /// 64-bit integer addition.
    Int64Add,
    /// Zero-extension of a 32-bit index to 64 bits.
    ChangeUint32ToUint64,
    /// Plain memory load.
    Load(MachineRepr),
    /// Load of a field from a managed object.
    LoadFromObject(MachineRepr),
    /// Bounds-checked memory load.
    ProtectedLoad(MachineRepr),
    /// Load that widens narrower memory into a 128-bit vector.
    LoadTransform(LoadTransformation),
    /// Plain memory store.
    Store(MachineRepr),
    /// Bounds-checked memory store.
    ProtectedStore(MachineRepr),
    /// SSA merge of values.
    Phi(MachineRepr),
    /// Value leaving a loop.
    LoopExitValue(MachineRepr),
    /// Selects one 128-bit half of a 256-bit vector; parameter is the lane.
    ExtractF128(i32),
    /// Lane-wise f32x4 addition.
    F32x4Add,
    /// Lane-wise f32x4 multiplication.
    F32x4Mul,
}

impl Operator {
    /// Get the opcode discriminant.
    pub const fn opcode(&self) -> IrOpcode {
        match self {
            Operator::Start => IrOpcode::Start,
            Operator::Parameter(_) => IrOpcode::Parameter,
            Operator::Int64Constant(_) => IrOpcode::Int64Constant,
            Operator::Int64Add => IrOpcode::Int64Add,
            Operator::ChangeUint32ToUint64 => IrOpcode::ChangeUint32ToUint64,
            Operator::Load(_) => IrOpcode::Load,
            Operator::LoadFromObject(_) => IrOpcode::LoadFromObject,
            Operator::ProtectedLoad(_) => IrOpcode::ProtectedLoad,
            Operator::LoadTransform(_) => IrOpcode::LoadTransform,
            Operator::Store(_) => IrOpcode::Store,
            Operator::ProtectedStore(_) => IrOpcode::ProtectedStore,
            Operator::Phi(_) => IrOpcode::Phi,
            Operator::LoopExitValue(_) => IrOpcode::LoopExitValue,
            Operator::ExtractF128(_) => IrOpcode::ExtractF128,
            Operator::F32x4Add => IrOpcode::F32x4Add,
            Operator::F32x4Mul => IrOpcode::F32x4Mul,
        }
    }

    /// Human-readable opcode name for trace output.
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Operator::Start => "Start",
            Operator::Parameter(_) => "Parameter",
            Operator::Int64Constant(_) => "Int64Constant",
            Operator::Int64Add => "Int64Add",
            Operator::ChangeUint32ToUint64 => "ChangeUint32ToUint64",
            Operator::Load(_) => "Load",
            Operator::LoadFromObject(_) => "LoadFromObject",
            Operator::ProtectedLoad(_) => "ProtectedLoad",
            Operator::LoadTransform(_) => "LoadTransform",
            Operator::Store(_) => "Store",
            Operator::ProtectedStore(_) => "ProtectedStore",
            Operator::Phi(_) => "Phi",
            Operator::LoopExitValue(_) => "LoopExitValue",
            Operator::ExtractF128(_) => "ExtractF128",
            Operator::F32x4Add => "F32x4Add",
            Operator::F32x4Mul => "F32x4Mul",
        }
    }

    /// Check if this operator is a constant.
    #[inline]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Operator::Int64Constant(_))
    }

    /// Check if this operator is a phi.
    #[inline]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Operator::Phi(_))
    }

    /// Check if this is a 128-bit SIMD operation.
    #[inline]
    pub const fn is_simd128(&self) -> bool {
        matches!(
            self,
            Operator::F32x4Add | Operator::F32x4Mul | Operator::LoadTransform(_)
        )
    }

    /// Check if this operator reads from memory.
    #[inline]
    pub const fn is_load(&self) -> bool {
        matches!(
            self,
            Operator::Load(_)
                | Operator::LoadFromObject(_)
                | Operator::ProtectedLoad(_)
                | Operator::LoadTransform(_)
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
