//! Function signatures

use crate::types::ValueType;

/// Signature of a bytecode function: ordered parameter types and an
/// optional single return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncSig {
    params: Vec<ValueType>,
    ret: Option<ValueType>,
}

impl FuncSig {
    /// Create a signature from parameter types and an optional return type
    ///
    /// Panics if any parameter or the return type is not a value type.
    pub fn new(params: Vec<ValueType>, ret: Option<ValueType>) -> Self {
        debug_assert!(params.iter().all(|t| t.is_value()));
        debug_assert!(ret.map_or(true, |t| t.is_value()));
        Self { params, ret }
    }

    /// Signature with no parameters and no return value
    pub fn void() -> Self {
        Self { params: Vec::new(), ret: None }
    }

    /// Number of parameters
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Parameter types in declaration order
    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    /// Type of the i-th parameter
    pub fn param(&self, i: usize) -> Option<ValueType> {
        self.params.get(i).copied()
    }

    /// Return type, if the function produces a value
    pub fn ret(&self) -> Option<ValueType> {
        self.ret
    }
}

impl std::fmt::Display for FuncSig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")?;
        match self.ret {
            Some(r) => write!(f, " -> {}", r),
            None => write!(f, " -> ()"),
        }
    }
}
