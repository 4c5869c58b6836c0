//! Per-function environment
//!
//! Scoped to one function decode: the signature, the declared locals
//! grouped by primitive type, and the module environment the body may
//! reference. Locals are numbered parameters-first, then i32 locals, then
//! f32, then f64; allocating a local appends within its type group.

use tern_bytecode::{FuncSig, ModuleEnv, ValueType};
use thiserror::Error;

/// Errors from the function-environment interface
#[derive(Debug, Error)]
pub enum EnvError {
    /// The allocation interface only accepts i32/f32/f64
    #[error("cannot allocate a local of type {0}")]
    UnsupportedLocalType(ValueType),
}

/// Per-function decode/build state
#[derive(Debug, Clone)]
pub struct FunctionEnv<'m> {
    sig: FuncSig,
    module: Option<&'m ModuleEnv>,
    local_i32_count: u16,
    local_f32_count: u16,
    local_f64_count: u16,
}

impl<'m> FunctionEnv<'m> {
    /// Environment with no declared locals
    pub fn new(sig: FuncSig, module: Option<&'m ModuleEnv>) -> Self {
        Self::with_locals(sig, module, 0, 0, 0)
    }

    /// Environment with pre-declared local counts per type group
    pub fn with_locals(
        sig: FuncSig,
        module: Option<&'m ModuleEnv>,
        local_i32_count: u16,
        local_f32_count: u16,
        local_f64_count: u16,
    ) -> Self {
        Self { sig, module, local_i32_count, local_f32_count, local_f64_count }
    }

    /// The function signature
    pub fn sig(&self) -> &FuncSig {
        &self.sig
    }

    /// The attached module environment, if any
    pub fn module(&self) -> Option<&'m ModuleEnv> {
        self.module
    }

    /// Number of parameters
    pub fn param_count(&self) -> u16 {
        self.sig.param_count() as u16
    }

    /// Parameters plus declared locals
    pub fn total_locals(&self) -> u16 {
        self.param_count() + self.local_i32_count + self.local_f32_count + self.local_f64_count
    }

    /// Declare one more local of the given type and return its index
    ///
    /// The new local is appended at the end of its type group, so locals
    /// in later groups move one index forward. i64 locals are not
    /// allocable through this interface.
    pub fn allocate_local(&mut self, ty: ValueType) -> Result<u16, EnvError> {
        let index = match ty {
            ValueType::I32 => {
                self.local_i32_count += 1;
                self.param_count() + self.local_i32_count - 1
            }
            ValueType::F32 => {
                self.local_f32_count += 1;
                self.param_count() + self.local_i32_count + self.local_f32_count - 1
            }
            ValueType::F64 => {
                self.local_f64_count += 1;
                self.param_count()
                    + self.local_i32_count
                    + self.local_f32_count
                    + self.local_f64_count
                    - 1
            }
            other => return Err(EnvError::UnsupportedLocalType(other)),
        };
        Ok(index)
    }

    /// Declared type of a local index, parameters included
    pub fn local_type(&self, index: u16) -> Option<ValueType> {
        let params = self.param_count();
        if index < params {
            return self.sig.param(index as usize);
        }
        let local = index - params;
        if local < self.local_i32_count {
            Some(ValueType::I32)
        } else if local < self.local_i32_count + self.local_f32_count {
            Some(ValueType::F32)
        } else if local < self.local_i32_count + self.local_f32_count + self.local_f64_count {
            Some(ValueType::F64)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig_ii_i() -> FuncSig {
        FuncSig::new(vec![ValueType::I32, ValueType::I32], Some(ValueType::I32))
    }

    #[test]
    fn test_params_come_first() {
        let env = FunctionEnv::with_locals(sig_ii_i(), None, 1, 1, 0);
        assert_eq!(env.param_count(), 2);
        assert_eq!(env.total_locals(), 4);
        assert_eq!(env.local_type(0), Some(ValueType::I32));
        assert_eq!(env.local_type(2), Some(ValueType::I32));
        assert_eq!(env.local_type(3), Some(ValueType::F32));
        assert_eq!(env.local_type(4), None);
    }

    #[test]
    fn test_allocation_groups_by_type() {
        let mut env = FunctionEnv::new(FuncSig::void(), None);
        let a = env.allocate_local(ValueType::I32).unwrap();
        env.allocate_local(ValueType::F32).unwrap();
        let c = env.allocate_local(ValueType::I32).unwrap();

        // A and C keep their order within the i32 group; B lives after
        // every i32 local.
        assert!(a < c);
        assert_eq!(env.local_type(a), Some(ValueType::I32));
        assert_eq!(env.local_type(c), Some(ValueType::I32));
        let first_f32 = env.param_count() + 2;
        assert_eq!(env.local_type(first_f32), Some(ValueType::F32));
        assert!(first_f32 > c);
        assert_eq!(env.total_locals(), 3);
    }

    #[test]
    fn test_i64_locals_rejected() {
        let mut env = FunctionEnv::new(FuncSig::void(), None);
        assert!(matches!(
            env.allocate_local(ValueType::I64),
            Err(EnvError::UnsupportedLocalType(ValueType::I64))
        ));
        assert!(env.allocate_local(ValueType::Stmt).is_err());
    }

    #[test]
    fn test_i64_params_still_typed() {
        let sig = FuncSig::new(vec![ValueType::I64], None);
        let env = FunctionEnv::new(sig, None);
        assert_eq!(env.local_type(0), Some(ValueType::I64));
    }
}
