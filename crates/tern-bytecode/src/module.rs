//! Module environment
//!
//! The per-function core does not decode module sections itself; the
//! surrounding loader prepares a [`ModuleEnv`] with everything a function
//! body may reference: linear memory bounds, the globals area layout, the
//! signature registry, the function table, and (when compiling for real
//! execution) the module context used to raise runtime traps.
//!
//! The environment is read-only for the entire decode.

use crate::sig::FuncSig;
use crate::types::MemType;

/// Opaque pointer-sized handle to a compiled code object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRef(pub u64);

/// Layout of a single module global inside the globals area
#[derive(Debug, Clone, Copy)]
pub struct GlobalDesc {
    /// Byte offset from the globals-area base
    pub offset: u32,
    /// In-memory representation
    pub mem_type: MemType,
}

/// A function known to the module: its signature and code handle
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    /// Callee signature
    pub sig: FuncSig,
    /// Code handle bound into direct-call sites
    pub code: CodeRef,
}

/// The module's indirect-call table
///
/// Slot `i` of the underlying array holds the slot's signature index
/// tagged as a small integer; slot `i + table_size` holds the code handle
/// for the function installed there.
#[derive(Debug, Clone)]
pub struct FunctionTable {
    /// Address of the backing array
    pub address: u64,
    /// Signature index per slot
    pub slots: Vec<u16>,
}

impl FunctionTable {
    /// Number of callable slots
    pub fn size(&self) -> usize {
        self.slots.len()
    }
}

/// Handle to the host module object, required to construct the
/// runtime-throw call in trap blocks
#[derive(Debug, Clone, Copy)]
pub struct ModuleContext {
    /// Address of the module context object
    pub address: u64,
    /// Code handle of the runtime-throw stub
    pub throw_stub: CodeRef,
}

/// Read-only bindings a function body may reference
#[derive(Debug, Clone, Default)]
pub struct ModuleEnv {
    /// Linear memory start address (inclusive)
    pub mem_start: u64,
    /// Linear memory end address (exclusive)
    pub mem_end: u64,
    /// Checked (non-trapping) out-of-bounds semantics
    pub asm_js: bool,
    /// Base address of the globals area
    pub globals_base: u64,
    /// Globals by index
    pub globals: Vec<GlobalDesc>,
    /// Signature registry for indirect calls, keyed by signature index
    pub signatures: Vec<FuncSig>,
    /// Declared functions, keyed by function index
    pub functions: Vec<FunctionEntry>,
    /// Indirect-call table, if the module has one
    pub table: Option<FunctionTable>,
    /// Module context; absent in verification-only decodes
    pub context: Option<ModuleContext>,
}

impl ModuleEnv {
    /// Size of linear memory in bytes
    pub fn memory_size(&self) -> u64 {
        self.mem_end.saturating_sub(self.mem_start)
    }

    /// Signature of a directly-called function
    pub fn signature_of(&self, function_index: usize) -> Option<&FuncSig> {
        self.functions.get(function_index).map(|f| &f.sig)
    }

    /// Signature for an indirect-call signature index
    pub fn signature_of_table_slot(&self, sig_index: usize) -> Option<&FuncSig> {
        self.signatures.get(sig_index)
    }

    /// Code handle of a directly-called function
    pub fn code_of(&self, function_index: usize) -> Option<CodeRef> {
        self.functions.get(function_index).map(|f| f.code)
    }

    /// Layout entry of a global
    pub fn global(&self, index: usize) -> Option<&GlobalDesc> {
        self.globals.get(index)
    }

    /// Number of indirect-call table slots
    pub fn table_size(&self) -> usize {
        self.table.as_ref().map_or(0, |t| t.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    #[test]
    fn test_memory_size() {
        let env = ModuleEnv { mem_start: 0x1000, mem_end: 0x1020, ..Default::default() };
        assert_eq!(env.memory_size(), 32);
        assert_eq!(ModuleEnv::default().memory_size(), 0);
    }

    #[test]
    fn test_lookups() {
        let sig = FuncSig::new(vec![ValueType::I32], Some(ValueType::I32));
        let env = ModuleEnv {
            functions: vec![FunctionEntry { sig: sig.clone(), code: CodeRef(0x40) }],
            signatures: vec![sig.clone()],
            table: Some(FunctionTable { address: 0x2000, slots: vec![0, 0, 0] }),
            ..Default::default()
        };

        assert_eq!(env.signature_of(0), Some(&sig));
        assert_eq!(env.signature_of(1), None);
        assert_eq!(env.code_of(0), Some(CodeRef(0x40)));
        assert_eq!(env.signature_of_table_slot(0), Some(&sig));
        assert_eq!(env.table_size(), 3);
    }
}
