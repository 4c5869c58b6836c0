//! Tree bytecode opcodes
//!
//! This module defines the complete instruction set of the tree-structured
//! function bytecode together with the static signature table consulted by
//! the decoder and the graph builder.
//!
//! All opcodes are single-byte instructions. Some opcodes take immediate
//! bytes that follow the opcode in the stream; children follow immediates
//! in left-to-right order.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Statements
//! - 0x10-0x1F: Constants, accessors, calls & misc expressions
//! - 0x20-0x3F: i32 operators
//! - 0x40-0x5F: i64 operators
//! - 0x60-0x6F: f32 operators
//! - 0x70-0x7F: f64 operators
//! - 0x80-0x8F: Conversions
//! - 0x90-0x9F: Memory loads
//! - 0xA0-0xAF: Memory stores

use crate::types::{MemType, ValueType};
use once_cell::sync::Lazy;

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Statements (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Sequence of N statements (immediate: u8 count)
    Block = 0x01,
    /// Infinite loop of N statements, exits only via break (immediate: u8 count)
    Loop = 0x02,
    /// Conditional without else: cond expr, then stmt
    If = 0x03,
    /// Conditional with else: cond expr, then stmt, else stmt
    IfElse = 0x04,
    /// While loop: cond expr, body stmt
    While = 0x05,
    /// Switch with fall-through between cases (immediate: u8 count)
    Switch = 0x06,
    /// Switch without fall-through (immediate: u8 count)
    SwitchNf = 0x07,
    /// Break out of the K-th enclosing block context (immediate: u8 depth)
    Break = 0x08,
    /// Back-edge to the K-th enclosing loop context (immediate: u8 depth)
    Continue = 0x09,
    /// Return; child count follows the function signature
    Return = 0x0A,
    /// Store to a local (immediate: u8 index; child: value expr)
    SetLocal = 0x0B,
    /// Store to a module global (immediate: u8 index; child: value expr)
    StoreGlobal = 0x0C,

    // ===== Constants, accessors & calls (0x10-0x1F) =====
    /// 8-bit immediate sign-extended to i32
    I8Const = 0x10,
    /// 32-bit integer constant (immediate: 4 bytes LE)
    I32Const = 0x11,
    /// 64-bit integer constant (immediate: 8 bytes LE)
    I64Const = 0x12,
    /// 32-bit float constant (immediate: 4 bytes IEEE-754 LE)
    F32Const = 0x13,
    /// 64-bit float constant (immediate: 8 bytes IEEE-754 LE)
    F64Const = 0x14,
    /// Read a local or parameter (immediate: u8 index)
    GetLocal = 0x15,
    /// Read a module global (immediate: u8 index)
    LoadGlobal = 0x16,
    /// Value-producing conditional: cond, then expr, else expr
    Ternary = 0x17,
    /// Evaluate both children, discard the left value
    Comma = 0x18,
    /// Logical negation of an i32
    BoolNot = 0x19,
    /// Direct call (immediate: u8 function index; args per signature)
    CallFunction = 0x1A,
    /// Indirect call (immediate: u8 signature index; key expr + args)
    CallIndirect = 0x1B,

    // ===== i32 operators (0x20-0x3F) =====
    I32Add = 0x20,
    I32Sub = 0x21,
    I32Mul = 0x22,
    I32DivS = 0x23,
    I32DivU = 0x24,
    I32RemS = 0x25,
    I32RemU = 0x26,
    I32And = 0x27,
    I32Or = 0x28,
    I32Xor = 0x29,
    I32Shl = 0x2A,
    I32ShrU = 0x2B,
    I32ShrS = 0x2C,
    I32Eq = 0x2D,
    I32Ne = 0x2E,
    I32LtS = 0x2F,
    I32LeS = 0x30,
    I32LtU = 0x31,
    I32LeU = 0x32,
    I32GtS = 0x33,
    I32GeS = 0x34,
    I32GtU = 0x35,
    I32GeU = 0x36,
    I32Clz = 0x37,
    I32Ctz = 0x38,
    I32Popcnt = 0x39,

    // ===== i64 operators (0x40-0x5F) =====
    I64Add = 0x40,
    I64Sub = 0x41,
    I64Mul = 0x42,
    I64DivS = 0x43,
    I64DivU = 0x44,
    I64RemS = 0x45,
    I64RemU = 0x46,
    I64And = 0x47,
    I64Or = 0x48,
    I64Xor = 0x49,
    I64Shl = 0x4A,
    I64ShrU = 0x4B,
    I64ShrS = 0x4C,
    I64Eq = 0x4D,
    I64Ne = 0x4E,
    I64LtS = 0x4F,
    I64LeS = 0x50,
    I64LtU = 0x51,
    I64LeU = 0x52,
    I64GtS = 0x53,
    I64GeS = 0x54,
    I64GtU = 0x55,
    I64GeU = 0x56,
    I64Clz = 0x57,
    I64Ctz = 0x58,
    I64Popcnt = 0x59,

    // ===== f32 operators (0x60-0x6F) =====
    F32Add = 0x60,
    F32Sub = 0x61,
    F32Mul = 0x62,
    F32Div = 0x63,
    F32Min = 0x64,
    F32Max = 0x65,
    F32Abs = 0x66,
    F32Neg = 0x67,
    F32Sqrt = 0x68,
    F32CopySign = 0x69,
    F32Eq = 0x6A,
    F32Ne = 0x6B,
    F32Lt = 0x6C,
    F32Le = 0x6D,
    F32Gt = 0x6E,
    F32Ge = 0x6F,

    // ===== f64 operators (0x70-0x7F) =====
    F64Add = 0x70,
    F64Sub = 0x71,
    F64Mul = 0x72,
    F64Div = 0x73,
    F64Min = 0x74,
    F64Max = 0x75,
    F64Abs = 0x76,
    F64Neg = 0x77,
    F64Sqrt = 0x78,
    F64CopySign = 0x79,
    F64Eq = 0x7A,
    F64Ne = 0x7B,
    F64Lt = 0x7C,
    F64Le = 0x7D,
    F64Gt = 0x7E,
    F64Ge = 0x7F,

    // ===== Conversions (0x80-0x8F) =====
    /// Wrap i64 to i32
    I32ConvertI64 = 0x80,
    I64SConvertI32 = 0x81,
    I64UConvertI32 = 0x82,
    I32SConvertF64 = 0x83,
    I32UConvertF64 = 0x84,
    F32SConvertI32 = 0x85,
    F32UConvertI32 = 0x86,
    F32ConvertF64 = 0x87,
    F64SConvertI32 = 0x88,
    F64UConvertI32 = 0x89,
    F64ConvertF32 = 0x8A,

    // ===== Memory loads (0x90-0x9F) =====
    // All memory opcodes carry a u32 LE static offset immediate.
    I32LoadMem8S = 0x90,
    I32LoadMem8U = 0x91,
    I32LoadMem16S = 0x92,
    I32LoadMem16U = 0x93,
    I32LoadMem = 0x94,
    I64LoadMem32S = 0x95,
    I64LoadMem32U = 0x96,
    I64LoadMem = 0x97,
    F32LoadMem = 0x98,
    F64LoadMem = 0x99,

    // ===== Memory stores (0xA0-0xAF) =====
    I32StoreMem8 = 0xA0,
    I32StoreMem16 = 0xA1,
    I32StoreMem = 0xA2,
    I64StoreMem32 = 0xA3,
    I64StoreMem = 0xA4,
    F32StoreMem = 0xA5,
    F64StoreMem = 0xA6,
}

/// Whether an opcode forms a statement or an expression production
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Produces no value
    Stmt,
    /// Produces exactly one value
    Expr,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            // Statements
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Block),
            0x02 => Some(Self::Loop),
            0x03 => Some(Self::If),
            0x04 => Some(Self::IfElse),
            0x05 => Some(Self::While),
            0x06 => Some(Self::Switch),
            0x07 => Some(Self::SwitchNf),
            0x08 => Some(Self::Break),
            0x09 => Some(Self::Continue),
            0x0A => Some(Self::Return),
            0x0B => Some(Self::SetLocal),
            0x0C => Some(Self::StoreGlobal),

            // Constants, accessors & calls
            0x10 => Some(Self::I8Const),
            0x11 => Some(Self::I32Const),
            0x12 => Some(Self::I64Const),
            0x13 => Some(Self::F32Const),
            0x14 => Some(Self::F64Const),
            0x15 => Some(Self::GetLocal),
            0x16 => Some(Self::LoadGlobal),
            0x17 => Some(Self::Ternary),
            0x18 => Some(Self::Comma),
            0x19 => Some(Self::BoolNot),
            0x1A => Some(Self::CallFunction),
            0x1B => Some(Self::CallIndirect),

            // i32 operators
            0x20 => Some(Self::I32Add),
            0x21 => Some(Self::I32Sub),
            0x22 => Some(Self::I32Mul),
            0x23 => Some(Self::I32DivS),
            0x24 => Some(Self::I32DivU),
            0x25 => Some(Self::I32RemS),
            0x26 => Some(Self::I32RemU),
            0x27 => Some(Self::I32And),
            0x28 => Some(Self::I32Or),
            0x29 => Some(Self::I32Xor),
            0x2A => Some(Self::I32Shl),
            0x2B => Some(Self::I32ShrU),
            0x2C => Some(Self::I32ShrS),
            0x2D => Some(Self::I32Eq),
            0x2E => Some(Self::I32Ne),
            0x2F => Some(Self::I32LtS),
            0x30 => Some(Self::I32LeS),
            0x31 => Some(Self::I32LtU),
            0x32 => Some(Self::I32LeU),
            0x33 => Some(Self::I32GtS),
            0x34 => Some(Self::I32GeS),
            0x35 => Some(Self::I32GtU),
            0x36 => Some(Self::I32GeU),
            0x37 => Some(Self::I32Clz),
            0x38 => Some(Self::I32Ctz),
            0x39 => Some(Self::I32Popcnt),

            // i64 operators
            0x40 => Some(Self::I64Add),
            0x41 => Some(Self::I64Sub),
            0x42 => Some(Self::I64Mul),
            0x43 => Some(Self::I64DivS),
            0x44 => Some(Self::I64DivU),
            0x45 => Some(Self::I64RemS),
            0x46 => Some(Self::I64RemU),
            0x47 => Some(Self::I64And),
            0x48 => Some(Self::I64Or),
            0x49 => Some(Self::I64Xor),
            0x4A => Some(Self::I64Shl),
            0x4B => Some(Self::I64ShrU),
            0x4C => Some(Self::I64ShrS),
            0x4D => Some(Self::I64Eq),
            0x4E => Some(Self::I64Ne),
            0x4F => Some(Self::I64LtS),
            0x50 => Some(Self::I64LeS),
            0x51 => Some(Self::I64LtU),
            0x52 => Some(Self::I64LeU),
            0x53 => Some(Self::I64GtS),
            0x54 => Some(Self::I64GeS),
            0x55 => Some(Self::I64GtU),
            0x56 => Some(Self::I64GeU),
            0x57 => Some(Self::I64Clz),
            0x58 => Some(Self::I64Ctz),
            0x59 => Some(Self::I64Popcnt),

            // f32 operators
            0x60 => Some(Self::F32Add),
            0x61 => Some(Self::F32Sub),
            0x62 => Some(Self::F32Mul),
            0x63 => Some(Self::F32Div),
            0x64 => Some(Self::F32Min),
            0x65 => Some(Self::F32Max),
            0x66 => Some(Self::F32Abs),
            0x67 => Some(Self::F32Neg),
            0x68 => Some(Self::F32Sqrt),
            0x69 => Some(Self::F32CopySign),
            0x6A => Some(Self::F32Eq),
            0x6B => Some(Self::F32Ne),
            0x6C => Some(Self::F32Lt),
            0x6D => Some(Self::F32Le),
            0x6E => Some(Self::F32Gt),
            0x6F => Some(Self::F32Ge),

            // f64 operators
            0x70 => Some(Self::F64Add),
            0x71 => Some(Self::F64Sub),
            0x72 => Some(Self::F64Mul),
            0x73 => Some(Self::F64Div),
            0x74 => Some(Self::F64Min),
            0x75 => Some(Self::F64Max),
            0x76 => Some(Self::F64Abs),
            0x77 => Some(Self::F64Neg),
            0x78 => Some(Self::F64Sqrt),
            0x79 => Some(Self::F64CopySign),
            0x7A => Some(Self::F64Eq),
            0x7B => Some(Self::F64Ne),
            0x7C => Some(Self::F64Lt),
            0x7D => Some(Self::F64Le),
            0x7E => Some(Self::F64Gt),
            0x7F => Some(Self::F64Ge),

            // Conversions
            0x80 => Some(Self::I32ConvertI64),
            0x81 => Some(Self::I64SConvertI32),
            0x82 => Some(Self::I64UConvertI32),
            0x83 => Some(Self::I32SConvertF64),
            0x84 => Some(Self::I32UConvertF64),
            0x85 => Some(Self::F32SConvertI32),
            0x86 => Some(Self::F32UConvertI32),
            0x87 => Some(Self::F32ConvertF64),
            0x88 => Some(Self::F64SConvertI32),
            0x89 => Some(Self::F64UConvertI32),
            0x8A => Some(Self::F64ConvertF32),

            // Memory loads
            0x90 => Some(Self::I32LoadMem8S),
            0x91 => Some(Self::I32LoadMem8U),
            0x92 => Some(Self::I32LoadMem16S),
            0x93 => Some(Self::I32LoadMem16U),
            0x94 => Some(Self::I32LoadMem),
            0x95 => Some(Self::I64LoadMem32S),
            0x96 => Some(Self::I64LoadMem32U),
            0x97 => Some(Self::I64LoadMem),
            0x98 => Some(Self::F32LoadMem),
            0x99 => Some(Self::F64LoadMem),

            // Memory stores
            0xA0 => Some(Self::I32StoreMem8),
            0xA1 => Some(Self::I32StoreMem16),
            0xA2 => Some(Self::I32StoreMem),
            0xA3 => Some(Self::I64StoreMem32),
            0xA4 => Some(Self::I64StoreMem),
            0xA5 => Some(Self::F32StoreMem),
            0xA6 => Some(Self::F64StoreMem),

            // Invalid opcodes
            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the human-readable mnemonic of the opcode (used in diagnostics)
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Block => "block",
            Self::Loop => "loop",
            Self::If => "if",
            Self::IfElse => "if_else",
            Self::While => "while",
            Self::Switch => "switch",
            Self::SwitchNf => "switch_nf",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::SetLocal => "set_local",
            Self::StoreGlobal => "store_global",
            Self::I8Const => "i8.const",
            Self::I32Const => "i32.const",
            Self::I64Const => "i64.const",
            Self::F32Const => "f32.const",
            Self::F64Const => "f64.const",
            Self::GetLocal => "get_local",
            Self::LoadGlobal => "load_global",
            Self::Ternary => "ternary",
            Self::Comma => "comma",
            Self::BoolNot => "bool_not",
            Self::CallFunction => "call_function",
            Self::CallIndirect => "call_indirect",
            Self::I32Add => "i32.add",
            Self::I32Sub => "i32.sub",
            Self::I32Mul => "i32.mul",
            Self::I32DivS => "i32.div_s",
            Self::I32DivU => "i32.div_u",
            Self::I32RemS => "i32.rem_s",
            Self::I32RemU => "i32.rem_u",
            Self::I32And => "i32.and",
            Self::I32Or => "i32.or",
            Self::I32Xor => "i32.xor",
            Self::I32Shl => "i32.shl",
            Self::I32ShrU => "i32.shr_u",
            Self::I32ShrS => "i32.shr_s",
            Self::I32Eq => "i32.eq",
            Self::I32Ne => "i32.ne",
            Self::I32LtS => "i32.lt_s",
            Self::I32LeS => "i32.le_s",
            Self::I32LtU => "i32.lt_u",
            Self::I32LeU => "i32.le_u",
            Self::I32GtS => "i32.gt_s",
            Self::I32GeS => "i32.ge_s",
            Self::I32GtU => "i32.gt_u",
            Self::I32GeU => "i32.ge_u",
            Self::I32Clz => "i32.clz",
            Self::I32Ctz => "i32.ctz",
            Self::I32Popcnt => "i32.popcnt",
            Self::I64Add => "i64.add",
            Self::I64Sub => "i64.sub",
            Self::I64Mul => "i64.mul",
            Self::I64DivS => "i64.div_s",
            Self::I64DivU => "i64.div_u",
            Self::I64RemS => "i64.rem_s",
            Self::I64RemU => "i64.rem_u",
            Self::I64And => "i64.and",
            Self::I64Or => "i64.or",
            Self::I64Xor => "i64.xor",
            Self::I64Shl => "i64.shl",
            Self::I64ShrU => "i64.shr_u",
            Self::I64ShrS => "i64.shr_s",
            Self::I64Eq => "i64.eq",
            Self::I64Ne => "i64.ne",
            Self::I64LtS => "i64.lt_s",
            Self::I64LeS => "i64.le_s",
            Self::I64LtU => "i64.lt_u",
            Self::I64LeU => "i64.le_u",
            Self::I64GtS => "i64.gt_s",
            Self::I64GeS => "i64.ge_s",
            Self::I64GtU => "i64.gt_u",
            Self::I64GeU => "i64.ge_u",
            Self::I64Clz => "i64.clz",
            Self::I64Ctz => "i64.ctz",
            Self::I64Popcnt => "i64.popcnt",
            Self::F32Add => "f32.add",
            Self::F32Sub => "f32.sub",
            Self::F32Mul => "f32.mul",
            Self::F32Div => "f32.div",
            Self::F32Min => "f32.min",
            Self::F32Max => "f32.max",
            Self::F32Abs => "f32.abs",
            Self::F32Neg => "f32.neg",
            Self::F32Sqrt => "f32.sqrt",
            Self::F32CopySign => "f32.copysign",
            Self::F32Eq => "f32.eq",
            Self::F32Ne => "f32.ne",
            Self::F32Lt => "f32.lt",
            Self::F32Le => "f32.le",
            Self::F32Gt => "f32.gt",
            Self::F32Ge => "f32.ge",
            Self::F64Add => "f64.add",
            Self::F64Sub => "f64.sub",
            Self::F64Mul => "f64.mul",
            Self::F64Div => "f64.div",
            Self::F64Min => "f64.min",
            Self::F64Max => "f64.max",
            Self::F64Abs => "f64.abs",
            Self::F64Neg => "f64.neg",
            Self::F64Sqrt => "f64.sqrt",
            Self::F64CopySign => "f64.copysign",
            Self::F64Eq => "f64.eq",
            Self::F64Ne => "f64.ne",
            Self::F64Lt => "f64.lt",
            Self::F64Le => "f64.le",
            Self::F64Gt => "f64.gt",
            Self::F64Ge => "f64.ge",
            Self::I32ConvertI64 => "i32.convert_i64",
            Self::I64SConvertI32 => "i64.convert_s_i32",
            Self::I64UConvertI32 => "i64.convert_u_i32",
            Self::I32SConvertF64 => "i32.convert_s_f64",
            Self::I32UConvertF64 => "i32.convert_u_f64",
            Self::F32SConvertI32 => "f32.convert_s_i32",
            Self::F32UConvertI32 => "f32.convert_u_i32",
            Self::F32ConvertF64 => "f32.convert_f64",
            Self::F64SConvertI32 => "f64.convert_s_i32",
            Self::F64UConvertI32 => "f64.convert_u_i32",
            Self::F64ConvertF32 => "f64.convert_f32",
            Self::I32LoadMem8S => "i32.load_mem8_s",
            Self::I32LoadMem8U => "i32.load_mem8_u",
            Self::I32LoadMem16S => "i32.load_mem16_s",
            Self::I32LoadMem16U => "i32.load_mem16_u",
            Self::I32LoadMem => "i32.load_mem",
            Self::I64LoadMem32S => "i64.load_mem32_s",
            Self::I64LoadMem32U => "i64.load_mem32_u",
            Self::I64LoadMem => "i64.load_mem",
            Self::F32LoadMem => "f32.load_mem",
            Self::F64LoadMem => "f64.load_mem",
            Self::I32StoreMem8 => "i32.store_mem8",
            Self::I32StoreMem16 => "i32.store_mem16",
            Self::I32StoreMem => "i32.store_mem",
            Self::I64StoreMem32 => "i64.store_mem32",
            Self::I64StoreMem => "i64.store_mem",
            Self::F32StoreMem => "f32.store_mem",
            Self::F64StoreMem => "f64.store_mem",
        }
    }

    /// Whether this opcode forms a statement or an expression
    pub fn kind(self) -> OpKind {
        match self {
            Self::Nop
            | Self::Block
            | Self::Loop
            | Self::If
            | Self::IfElse
            | Self::While
            | Self::Switch
            | Self::SwitchNf
            | Self::Break
            | Self::Continue
            | Self::Return
            | Self::SetLocal
            | Self::StoreGlobal => OpKind::Stmt,
            _ => OpKind::Expr,
        }
    }

    /// Whether this opcode is a linear-memory load
    pub fn is_load(self) -> bool {
        matches!(
            self,
            Self::I32LoadMem8S
                | Self::I32LoadMem8U
                | Self::I32LoadMem16S
                | Self::I32LoadMem16U
                | Self::I32LoadMem
                | Self::I64LoadMem32S
                | Self::I64LoadMem32U
                | Self::I64LoadMem
                | Self::F32LoadMem
                | Self::F64LoadMem
        )
    }

    /// Whether this opcode is a linear-memory store
    pub fn is_store(self) -> bool {
        matches!(
            self,
            Self::I32StoreMem8
                | Self::I32StoreMem16
                | Self::I32StoreMem
                | Self::I64StoreMem32
                | Self::I64StoreMem
                | Self::F32StoreMem
                | Self::F64StoreMem
        )
    }

    /// Whether this opcode touches linear memory
    pub fn is_memory_access(self) -> bool {
        self.is_load() || self.is_store()
    }

    /// Whether this opcode is a call
    pub fn is_call(self) -> bool {
        matches!(self, Self::CallFunction | Self::CallIndirect)
    }

    /// Whether this opcode operates on 64-bit integers
    pub fn is_word64(self) -> bool {
        let b = self as u8;
        (0x40..=0x5F).contains(&b)
            || matches!(
                self,
                Self::I32ConvertI64
                    | Self::I64SConvertI32
                    | Self::I64UConvertI32
                    | Self::I64LoadMem32S
                    | Self::I64LoadMem32U
                    | Self::I64LoadMem
                    | Self::I64StoreMem32
                    | Self::I64StoreMem
                    | Self::I64Const
            )
    }

    /// The memory representation accessed by a load/store opcode
    pub fn mem_type(self) -> Option<MemType> {
        match self {
            Self::I32LoadMem8S => Some(MemType::Int8),
            Self::I32LoadMem8U => Some(MemType::Uint8),
            Self::I32LoadMem16S => Some(MemType::Int16),
            Self::I32LoadMem16U => Some(MemType::Uint16),
            Self::I32LoadMem | Self::I32StoreMem => Some(MemType::Int32),
            Self::I64LoadMem32S | Self::I64StoreMem32 => Some(MemType::Int32),
            Self::I64LoadMem32U => Some(MemType::Uint32),
            Self::I64LoadMem | Self::I64StoreMem => Some(MemType::Int64),
            Self::F32LoadMem | Self::F32StoreMem => Some(MemType::Float32),
            Self::F64LoadMem | Self::F64StoreMem => Some(MemType::Float64),
            Self::I32StoreMem8 => Some(MemType::Int8),
            Self::I32StoreMem16 => Some(MemType::Int16),
            _ => None,
        }
    }

    /// The fixed signature of this opcode, or None for variadic productions
    /// (blocks, switches, calls, constants and accessors)
    pub fn sig(self) -> Option<&'static OpSig> {
        OpcodeTable::get().sig(self)
    }
}

/// Fixed parameter/return signature of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSig {
    /// Child types in decode order
    pub params: &'static [ValueType],
    /// Produced type
    pub ret: ValueType,
}

use ValueType::{F32, F64, I32, I64};

static SIG_I_II: OpSig = OpSig { params: &[I32, I32], ret: I32 };
static SIG_I_I: OpSig = OpSig { params: &[I32], ret: I32 };
static SIG_L_LL: OpSig = OpSig { params: &[I64, I64], ret: I64 };
static SIG_I_LL: OpSig = OpSig { params: &[I64, I64], ret: I32 };
static SIG_L_L: OpSig = OpSig { params: &[I64], ret: I64 };
static SIG_F_FF: OpSig = OpSig { params: &[F32, F32], ret: F32 };
static SIG_I_FF: OpSig = OpSig { params: &[F32, F32], ret: I32 };
static SIG_F_F: OpSig = OpSig { params: &[F32], ret: F32 };
static SIG_D_DD: OpSig = OpSig { params: &[F64, F64], ret: F64 };
static SIG_I_DD: OpSig = OpSig { params: &[F64, F64], ret: I32 };
static SIG_D_D: OpSig = OpSig { params: &[F64], ret: F64 };
static SIG_I_L: OpSig = OpSig { params: &[I64], ret: I32 };
static SIG_L_I: OpSig = OpSig { params: &[I32], ret: I64 };
static SIG_I_D: OpSig = OpSig { params: &[F64], ret: I32 };
static SIG_F_I: OpSig = OpSig { params: &[I32], ret: F32 };
static SIG_F_D: OpSig = OpSig { params: &[F64], ret: F32 };
static SIG_D_I: OpSig = OpSig { params: &[I32], ret: F64 };
static SIG_D_F: OpSig = OpSig { params: &[F32], ret: F64 };
static SIG_L_IL: OpSig = OpSig { params: &[I32, I64], ret: I64 };
static SIG_F_IF: OpSig = OpSig { params: &[I32, F32], ret: F32 };
static SIG_D_ID: OpSig = OpSig { params: &[I32, F64], ret: F64 };

/// Lazily-initialized opcode signature table
///
/// Initialization is idempotent and happens on first signature query;
/// callers planning parallel decodes can pre-warm it with [`OpcodeTable::warm_up`].
pub struct OpcodeTable {
    sigs: [Option<&'static OpSig>; 256],
}

static TABLE: Lazy<OpcodeTable> = Lazy::new(OpcodeTable::build);

impl OpcodeTable {
    /// Access the process-wide table
    pub fn get() -> &'static OpcodeTable {
        &TABLE
    }

    /// Force initialization ahead of any decode
    pub fn warm_up() {
        Lazy::force(&TABLE);
    }

    /// Signature of an opcode, or None for variadic productions
    pub fn sig(&self, op: Opcode) -> Option<&'static OpSig> {
        self.sigs[op as u8 as usize]
    }

    fn build() -> OpcodeTable {
        let mut sigs: [Option<&'static OpSig>; 256] = [None; 256];
        let mut set = |op: Opcode, sig: &'static OpSig| {
            sigs[op as u8 as usize] = Some(sig);
        };

        set(Opcode::BoolNot, &SIG_I_I);

        // i32 operators
        for op in [
            Opcode::I32Add,
            Opcode::I32Sub,
            Opcode::I32Mul,
            Opcode::I32DivS,
            Opcode::I32DivU,
            Opcode::I32RemS,
            Opcode::I32RemU,
            Opcode::I32And,
            Opcode::I32Or,
            Opcode::I32Xor,
            Opcode::I32Shl,
            Opcode::I32ShrU,
            Opcode::I32ShrS,
            Opcode::I32Eq,
            Opcode::I32Ne,
            Opcode::I32LtS,
            Opcode::I32LeS,
            Opcode::I32LtU,
            Opcode::I32LeU,
            Opcode::I32GtS,
            Opcode::I32GeS,
            Opcode::I32GtU,
            Opcode::I32GeU,
        ] {
            set(op, &SIG_I_II);
        }
        for op in [Opcode::I32Clz, Opcode::I32Ctz, Opcode::I32Popcnt] {
            set(op, &SIG_I_I);
        }

        // i64 operators
        for op in [
            Opcode::I64Add,
            Opcode::I64Sub,
            Opcode::I64Mul,
            Opcode::I64DivS,
            Opcode::I64DivU,
            Opcode::I64RemS,
            Opcode::I64RemU,
            Opcode::I64And,
            Opcode::I64Or,
            Opcode::I64Xor,
            Opcode::I64Shl,
            Opcode::I64ShrU,
            Opcode::I64ShrS,
        ] {
            set(op, &SIG_L_LL);
        }
        for op in [
            Opcode::I64Eq,
            Opcode::I64Ne,
            Opcode::I64LtS,
            Opcode::I64LeS,
            Opcode::I64LtU,
            Opcode::I64LeU,
            Opcode::I64GtS,
            Opcode::I64GeS,
            Opcode::I64GtU,
            Opcode::I64GeU,
        ] {
            set(op, &SIG_I_LL);
        }
        for op in [Opcode::I64Clz, Opcode::I64Ctz, Opcode::I64Popcnt] {
            set(op, &SIG_L_L);
        }

        // f32 operators
        for op in [
            Opcode::F32Add,
            Opcode::F32Sub,
            Opcode::F32Mul,
            Opcode::F32Div,
            Opcode::F32Min,
            Opcode::F32Max,
            Opcode::F32CopySign,
        ] {
            set(op, &SIG_F_FF);
        }
        for op in [Opcode::F32Abs, Opcode::F32Neg, Opcode::F32Sqrt] {
            set(op, &SIG_F_F);
        }
        for op in [
            Opcode::F32Eq,
            Opcode::F32Ne,
            Opcode::F32Lt,
            Opcode::F32Le,
            Opcode::F32Gt,
            Opcode::F32Ge,
        ] {
            set(op, &SIG_I_FF);
        }

        // f64 operators
        for op in [
            Opcode::F64Add,
            Opcode::F64Sub,
            Opcode::F64Mul,
            Opcode::F64Div,
            Opcode::F64Min,
            Opcode::F64Max,
            Opcode::F64CopySign,
        ] {
            set(op, &SIG_D_DD);
        }
        for op in [Opcode::F64Abs, Opcode::F64Neg, Opcode::F64Sqrt] {
            set(op, &SIG_D_D);
        }
        for op in [
            Opcode::F64Eq,
            Opcode::F64Ne,
            Opcode::F64Lt,
            Opcode::F64Le,
            Opcode::F64Gt,
            Opcode::F64Ge,
        ] {
            set(op, &SIG_I_DD);
        }

        // Conversions
        set(Opcode::I32ConvertI64, &SIG_I_L);
        set(Opcode::I64SConvertI32, &SIG_L_I);
        set(Opcode::I64UConvertI32, &SIG_L_I);
        set(Opcode::I32SConvertF64, &SIG_I_D);
        set(Opcode::I32UConvertF64, &SIG_I_D);
        set(Opcode::F32SConvertI32, &SIG_F_I);
        set(Opcode::F32UConvertI32, &SIG_F_I);
        set(Opcode::F32ConvertF64, &SIG_F_D);
        set(Opcode::F64SConvertI32, &SIG_D_I);
        set(Opcode::F64UConvertI32, &SIG_D_I);
        set(Opcode::F64ConvertF32, &SIG_D_F);

        // Memory loads: (index) -> value
        for op in [
            Opcode::I32LoadMem8S,
            Opcode::I32LoadMem8U,
            Opcode::I32LoadMem16S,
            Opcode::I32LoadMem16U,
            Opcode::I32LoadMem,
        ] {
            set(op, &SIG_I_I);
        }
        for op in [Opcode::I64LoadMem32S, Opcode::I64LoadMem32U, Opcode::I64LoadMem] {
            set(op, &SIG_L_I);
        }
        set(Opcode::F32LoadMem, &SIG_F_I);
        set(Opcode::F64LoadMem, &SIG_D_I);

        // Memory stores: (index, value) -> value
        for op in [Opcode::I32StoreMem8, Opcode::I32StoreMem16, Opcode::I32StoreMem] {
            set(op, &SIG_I_II);
        }
        for op in [Opcode::I64StoreMem32, Opcode::I64StoreMem] {
            set(op, &SIG_L_IL);
        }
        set(Opcode::F32StoreMem, &SIG_F_IF);
        set(Opcode::F64StoreMem, &SIG_D_ID);

        OpcodeTable { sigs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        let opcodes = [
            Opcode::Nop,
            Opcode::Block,
            Opcode::Loop,
            Opcode::While,
            Opcode::Switch,
            Opcode::SwitchNf,
            Opcode::Break,
            Opcode::Return,
            Opcode::SetLocal,
            Opcode::I8Const,
            Opcode::I32Const,
            Opcode::F64Const,
            Opcode::GetLocal,
            Opcode::Ternary,
            Opcode::CallFunction,
            Opcode::CallIndirect,
            Opcode::I32Add,
            Opcode::I32DivS,
            Opcode::I32Popcnt,
            Opcode::I64GeU,
            Opcode::F32CopySign,
            Opcode::F64Sqrt,
            Opcode::I32ConvertI64,
            Opcode::I64LoadMem32S,
            Opcode::F64StoreMem,
        ];

        for opcode in &opcodes {
            let byte = opcode.to_u8();
            let decoded = Opcode::from_u8(byte);
            assert_eq!(decoded, Some(*opcode), "Failed roundtrip for {:?}", opcode);
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x0D), None);
        assert_eq!(Opcode::from_u8(0x1C), None);
        assert_eq!(Opcode::from_u8(0x3A), None);
        assert_eq!(Opcode::from_u8(0xA7), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_kind_split() {
        assert_eq!(Opcode::Block.kind(), OpKind::Stmt);
        assert_eq!(Opcode::Return.kind(), OpKind::Stmt);
        assert_eq!(Opcode::SetLocal.kind(), OpKind::Stmt);
        assert_eq!(Opcode::GetLocal.kind(), OpKind::Expr);
        assert_eq!(Opcode::I32Add.kind(), OpKind::Expr);
        assert_eq!(Opcode::I32StoreMem.kind(), OpKind::Expr);
    }

    #[test]
    fn test_signature_table() {
        let sig = Opcode::I32Add.sig().unwrap();
        assert_eq!(sig.params, &[ValueType::I32, ValueType::I32]);
        assert_eq!(sig.ret, ValueType::I32);

        let sig = Opcode::I64LtS.sig().unwrap();
        assert_eq!(sig.params, &[ValueType::I64, ValueType::I64]);
        assert_eq!(sig.ret, ValueType::I32);

        let sig = Opcode::F64StoreMem.sig().unwrap();
        assert_eq!(sig.params, &[ValueType::I32, ValueType::F64]);
        assert_eq!(sig.ret, ValueType::F64);

        // Variadic productions carry no fixed signature
        assert!(Opcode::Block.sig().is_none());
        assert!(Opcode::CallFunction.sig().is_none());
        assert!(Opcode::I32Const.sig().is_none());
    }

    #[test]
    fn test_mem_type() {
        assert_eq!(Opcode::I32LoadMem8S.mem_type(), Some(MemType::Int8));
        assert_eq!(Opcode::I64LoadMem32U.mem_type(), Some(MemType::Uint32));
        assert_eq!(Opcode::F64StoreMem.mem_type(), Some(MemType::Float64));
        assert_eq!(Opcode::I32Add.mem_type(), None);
    }

    #[test]
    fn test_word64_detection() {
        assert!(Opcode::I64Add.is_word64());
        assert!(Opcode::I64Popcnt.is_word64());
        assert!(Opcode::I64SConvertI32.is_word64());
        assert!(Opcode::I64LoadMem.is_word64());
        assert!(!Opcode::I32Add.is_word64());
        assert!(!Opcode::F64Add.is_word64());
    }

    #[test]
    fn test_warm_up_idempotent() {
        OpcodeTable::warm_up();
        OpcodeTable::warm_up();
        assert!(Opcode::I32Add.sig().is_some());
    }
}
