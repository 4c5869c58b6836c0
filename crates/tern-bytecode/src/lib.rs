//! Tern Bytecode Definitions
//!
//! This crate provides the tree-structured bytecode instruction set, the
//! opcode signature table, function signatures, the module environment
//! consumed during function compilation, and the wire encoding utilities.

#![warn(rust_2018_idioms)]

pub mod encoder;
pub mod machine;
pub mod module;
pub mod opcode;
pub mod sig;
pub mod types;

pub use encoder::{BytecodeReader, BytecodeWriter, WireError};
pub use machine::{MachineFeatures, PointerWidth, Support};
pub use module::{CodeRef, FunctionEntry, FunctionTable, GlobalDesc, ModuleContext, ModuleEnv};
pub use opcode::{OpKind, OpSig, Opcode, OpcodeTable};
pub use sig::FuncSig;
pub use types::{MemType, ValueType};
