//! IR operators
//!
//! Every node in the graph carries one operator, immutable after creation.
//! Operators fall into a few families: constants, pure machine operators
//! (`Binop`/`Unop`), effect-chained accesses (locals, memory, calls), and
//! control. Input ordering conventions are documented per family:
//! value inputs first, then the effect input, then the control input.

use tern_bytecode::{CodeRef, FuncSig, MemType, ValueType};

/// Pure two-input machine operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binop {
    // ===== 32-bit integer =====
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrU,
    I32ShrS,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LeS,
    I32LtU,
    I32LeU,

    // ===== 64-bit integer =====
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrU,
    I64ShrS,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LeS,
    I64LtU,
    I64LeU,

    // ===== 32-bit float =====
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Eq,
    F32Ne,
    F32Lt,
    F32Le,

    // ===== 64-bit float =====
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Le,

    /// Replace the high 32 bits of an f64 (used on 32-bit targets)
    F64InsertHighWord32,
}

impl Binop {
    /// Whether this operator is a comparison producing an i32 boolean
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::I32Eq
                | Self::I32Ne
                | Self::I32LtS
                | Self::I32LeS
                | Self::I32LtU
                | Self::I32LeU
                | Self::I64Eq
                | Self::I64Ne
                | Self::I64LtS
                | Self::I64LeS
                | Self::I64LtU
                | Self::I64LeU
                | Self::F32Eq
                | Self::F32Ne
                | Self::F32Lt
                | Self::F32Le
                | Self::F64Eq
                | Self::F64Ne
                | Self::F64Lt
                | Self::F64Le
        )
    }
}

/// Pure one-input machine operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unop {
    // ===== Bit counting =====
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I64Clz,
    I64Ctz,
    I64Popcnt,

    // ===== Float =====
    F32Abs,
    F32Neg,
    F32Sqrt,
    F64Abs,
    F64Neg,
    F64Sqrt,

    // ===== Conversions =====
    I32ConvertI64,
    I64SConvertI32,
    I64UConvertI32,
    I32SConvertF64,
    I32UConvertF64,
    F32SConvertI32,
    F32UConvertI32,
    F32ConvertF64,
    F64SConvertI32,
    F64UConvertI32,
    F64ConvertF32,
    /// Zero-extend an i32 index to a 64-bit address word
    ChangeUint32ToUint64,

    // ===== Reinterpretations =====
    BitcastF32ToI32,
    BitcastI32ToF32,
    BitcastF64ToI64,
    BitcastI64ToF64,
    /// High 32 bits of an f64 (used on 32-bit targets)
    F64ExtractHighWord32,
}

/// Why a trap check branches to a trap block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapReason {
    /// Integer division or remainder by zero
    DivByZero,
    /// INT_MIN / -1
    DivUnrepresentable,
    /// Linear-memory access outside [0, size)
    MemOutOfBounds,
    /// Indirect-call table index outside the table
    FuncInvalid,
    /// Indirect-call signature mismatch
    FuncSigMismatch,
}

impl TrapReason {
    /// Number of distinct trap reasons
    pub const COUNT: usize = 5;

    /// Dense index used by the per-function trap cache
    pub fn index(self) -> usize {
        match self {
            Self::DivByZero => 0,
            Self::DivUnrepresentable => 1,
            Self::MemOutOfBounds => 2,
            Self::FuncInvalid => 3,
            Self::FuncSigMismatch => 4,
        }
    }

    /// Diagnostic string passed to the runtime-throw stub
    pub fn message(self) -> &'static str {
        match self {
            Self::DivByZero => "integer division by zero",
            Self::DivUnrepresentable => "integer division result unrepresentable",
            Self::MemOutOfBounds => "memory access out of bounds",
            Self::FuncInvalid => "invalid function table index",
            Self::FuncSigMismatch => "function signature mismatch",
        }
    }
}

impl std::fmt::Display for TrapReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Host runtime entry points callable from generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeStub {
    /// Raise a runtime trap with a diagnostic string
    ThrowTrap,
}

/// Operator of a graph node
///
/// Input conventions:
/// - `Binop`/`Unop` and constants: value inputs only
/// - `LoadLocal`: `[effect]`; `StoreLocal`: `[value, effect]`
/// - `Load`/`CheckedLoad`: `[base, index, effect]` (`CheckedLoad` takes an
///   extra `limit` before the effect)
/// - `Store`/`CheckedStore`: `[base, index, value, effect]` (`CheckedStore`
///   takes an extra `limit` before the effect)
/// - `Call`/`RuntimeCall`: `[code, args.., effect, control]`
/// - `Branch`: `[cond, control]`; `Switch`: `[key, control]`
/// - `Merge`/`Loop`: control inputs only
/// - `Phi`/`EffectPhi`: `[values.., merge]`
/// - `Return`: `[value, effect, control]`; `Throw`: `[effect, control]`;
///   `Terminate`: `[effect, control]`
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Root of the graph; the initial effect and control
    Start {
        /// Number of function parameters materialized as local slots
        param_count: u16,
    },
    /// Collects every terminator (returns, throws, terminates)
    End,
    /// Placeholder value inside unreachable code
    Dead,

    // ===== Constants =====
    Int32Constant(i32),
    Int64Constant(i64),
    Float32Constant(f32),
    Float64Constant(f64),
    /// Pointer-sized address constant
    IntPtrConstant(u64),
    /// Small-integer-tagged constant (value shifted left one bit)
    SmiConstant(u32),
    /// Code-object handle bound into call sites
    CodeConstant(CodeRef),
    /// Opaque heap-object handle (module context)
    HeapConstant(u64),
    /// Constant diagnostic string
    StringConstant(&'static str),

    // ===== Pure machine operators =====
    Binop(Binop),
    Unop(Unop),

    // ===== Effect-chained accesses =====
    /// Read a local slot
    LoadLocal(u16),
    /// Write a local slot
    StoreLocal(u16),
    /// Typed load from a computed address
    Load(MemType),
    /// Typed store to a computed address
    Store(MemType),
    /// Non-trapping load: out-of-bounds reads produce zero
    CheckedLoad(MemType),
    /// Non-trapping store: out-of-bounds writes are dropped
    CheckedStore(MemType),

    // ===== Calls =====
    /// Call through a function signature
    Call(FuncSig),
    /// Call into a host runtime stub
    RuntimeCall(RuntimeStub),

    // ===== Control =====
    Branch,
    IfTrue,
    IfFalse,
    Switch {
        /// Number of `IfValue` projections
        case_count: u32,
    },
    /// Projection taken when the switch key equals the case value
    IfValue(i32),
    /// Projection taken when no case value matches
    IfDefault,
    Merge,
    /// Merge whose first input is the entry edge and whose later inputs
    /// are back edges
    Loop,
    Phi(ValueType),
    EffectPhi,
    Return,
    Throw,
    /// Marks an infinite loop so End can observe it
    Terminate,
}

impl Operator {
    /// Stable name for grouping and printing
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "Start",
            Self::End => "End",
            Self::Dead => "Dead",
            Self::Int32Constant(_) => "Int32Constant",
            Self::Int64Constant(_) => "Int64Constant",
            Self::Float32Constant(_) => "Float32Constant",
            Self::Float64Constant(_) => "Float64Constant",
            Self::IntPtrConstant(_) => "IntPtrConstant",
            Self::SmiConstant(_) => "SmiConstant",
            Self::CodeConstant(_) => "CodeConstant",
            Self::HeapConstant(_) => "HeapConstant",
            Self::StringConstant(_) => "StringConstant",
            Self::Binop(_) => "Binop",
            Self::Unop(_) => "Unop",
            Self::LoadLocal(_) => "LoadLocal",
            Self::StoreLocal(_) => "StoreLocal",
            Self::Load(_) => "Load",
            Self::Store(_) => "Store",
            Self::CheckedLoad(_) => "CheckedLoad",
            Self::CheckedStore(_) => "CheckedStore",
            Self::Call(_) => "Call",
            Self::RuntimeCall(_) => "RuntimeCall",
            Self::Branch => "Branch",
            Self::IfTrue => "IfTrue",
            Self::IfFalse => "IfFalse",
            Self::Switch { .. } => "Switch",
            Self::IfValue(_) => "IfValue",
            Self::IfDefault => "IfDefault",
            Self::Merge => "Merge",
            Self::Loop => "Loop",
            Self::Phi(_) => "Phi",
            Self::EffectPhi => "EffectPhi",
            Self::Return => "Return",
            Self::Throw => "Throw",
            Self::Terminate => "Terminate",
        }
    }

    /// Whether nodes with this operator sit on the effect chain
    pub fn is_effectful(&self) -> bool {
        matches!(
            self,
            Self::LoadLocal(_)
                | Self::StoreLocal(_)
                | Self::Load(_)
                | Self::Store(_)
                | Self::CheckedLoad(_)
                | Self::CheckedStore(_)
                | Self::Call(_)
                | Self::RuntimeCall(_)
        )
    }

    /// Whether nodes with this operator participate in control flow
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Start { .. }
                | Self::End
                | Self::Branch
                | Self::IfTrue
                | Self::IfFalse
                | Self::Switch { .. }
                | Self::IfValue(_)
                | Self::IfDefault
                | Self::Merge
                | Self::Loop
                | Self::Return
                | Self::Throw
                | Self::Terminate
        )
    }

    /// Whether this operator is a pure constant
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Self::Int32Constant(_)
                | Self::Int64Constant(_)
                | Self::Float32Constant(_)
                | Self::Float64Constant(_)
                | Self::IntPtrConstant(_)
                | Self::SmiConstant(_)
                | Self::CodeConstant(_)
                | Self::HeapConstant(_)
                | Self::StringConstant(_)
        )
    }

    /// Position of the effect input within a node's input list, if any
    pub fn effect_input_index(&self, input_count: usize) -> Option<usize> {
        match self {
            Self::LoadLocal(_) => Some(0),
            Self::StoreLocal(_) => Some(1),
            Self::Load(_) => Some(2),
            Self::CheckedLoad(_) => Some(3),
            Self::Store(_) => Some(3),
            Self::CheckedStore(_) => Some(4),
            // [code, args.., effect, control]
            Self::Call(_) | Self::RuntimeCall(_) => Some(input_count - 2),
            Self::Return => Some(1),
            Self::Throw | Self::Terminate => Some(0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_families() {
        assert!(Operator::Load(MemType::Int32).is_effectful());
        assert!(Operator::StoreLocal(0).is_effectful());
        assert!(!Operator::Binop(Binop::I32Add).is_effectful());
        assert!(Operator::Merge.is_control());
        assert!(Operator::Loop.is_control());
        assert!(!Operator::Phi(ValueType::I32).is_control());
        assert!(Operator::Int32Constant(1).is_constant());
        assert!(!Operator::Dead.is_constant());
    }

    #[test]
    fn test_trap_reason_index_dense() {
        let all = [
            TrapReason::DivByZero,
            TrapReason::DivUnrepresentable,
            TrapReason::MemOutOfBounds,
            TrapReason::FuncInvalid,
            TrapReason::FuncSigMismatch,
        ];
        for (i, r) in all.iter().enumerate() {
            assert_eq!(r.index(), i);
        }
        assert_eq!(all.len(), TrapReason::COUNT);
    }

    #[test]
    fn test_effect_input_position() {
        assert_eq!(Operator::Load(MemType::Int32).effect_input_index(3), Some(2));
        assert_eq!(Operator::Store(MemType::Int32).effect_input_index(4), Some(3));
        // call with 2 args: [code, a0, a1, effect, control]
        let sig = FuncSig::new(
            vec![ValueType::I32, ValueType::I32],
            Some(ValueType::I32),
        );
        assert_eq!(Operator::Call(sig).effect_input_index(5), Some(3));
        assert_eq!(Operator::Binop(Binop::I32Add).effect_input_index(2), None);
    }
}
