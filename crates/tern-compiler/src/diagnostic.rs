//! Decode diagnostics
//!
//! Every decode failure is reported once and aborts the decode. The
//! diagnostic carries the error code, the byte offset of the offending
//! opcode, an optional secondary token offset, and a formatted message.
//! Diagnostics own their bytes and serialize cleanly across process
//! boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decode failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Opcode byte outside the instruction set
    UnknownOpcode,
    /// Opcode valid but not compilable for this target
    UnsupportedOpcode,
    /// Production ran off the end of the byte window
    Truncated,
    /// Production type does not match its context
    TypeError,
    /// Local index at or above the local count
    LocalIndexOutOfBounds,
    /// Global index outside the module's globals
    GlobalIndexOutOfBounds,
    /// Function index outside the module's functions
    FunctionIndexOutOfBounds,
    /// Break or continue depth without a matching block context
    BreakDepth,
    /// Call signature index outside the signature registry
    ArityMismatch,
    /// Module-environment-dependent opcode with no module attached
    NoMemory,
    /// Decoder-side contract violation
    InternalError,
}

impl ErrorCode {
    /// Stable identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownOpcode => "unknown_opcode",
            Self::UnsupportedOpcode => "unsupported_opcode",
            Self::Truncated => "truncated",
            Self::TypeError => "type_error",
            Self::LocalIndexOutOfBounds => "local_index_out_of_bounds",
            Self::GlobalIndexOutOfBounds => "global_index_out_of_bounds",
            Self::FunctionIndexOutOfBounds => "function_index_out_of_bounds",
            Self::BreakDepth => "break_depth",
            Self::ArityMismatch => "arity_mismatch",
            Self::NoMemory => "no_memory",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decode failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct DecodeError {
    /// Failure class
    pub code: ErrorCode,
    /// Byte offset of the offending opcode
    pub pc: usize,
    /// Secondary offset of the production's token, when relevant
    pub pt: Option<usize>,
    /// Formatted message naming the opcode and offsets
    pub message: String,
}

impl DecodeError {
    /// Create a diagnostic at `pc`
    pub fn new(code: ErrorCode, pc: usize, message: impl Into<String>) -> Self {
        Self { code, pc, pt: None, message: message.into() }
    }

    /// Attach the secondary token offset
    pub fn with_token(mut self, pt: usize) -> Self {
        self.pt = Some(pt);
        self
    }
}

/// Result of a verification-only decode, in wire-friendly form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// The body decoded and type-checked
    Ok,
    /// The first failure encountered
    Error {
        /// The diagnostic
        error: DecodeError,
    },
}

impl VerifyOutcome {
    /// Whether verification succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<Result<(), DecodeError>> for VerifyOutcome {
    fn from(result: Result<(), DecodeError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(error) => Self::Error { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message() {
        let err = DecodeError::new(ErrorCode::TypeError, 7, "i32.add @+7: expected i32, found f64");
        assert_eq!(err.to_string(), "i32.add @+7: expected i32, found f64");
    }

    #[test]
    fn test_outcome_from_result() {
        assert!(VerifyOutcome::from(Ok(())).is_ok());
        let err = DecodeError::new(ErrorCode::Truncated, 3, "truncated");
        let outcome = VerifyOutcome::from(Err(err.clone()));
        assert_eq!(outcome, VerifyOutcome::Error { error: err });
    }

    #[test]
    fn test_serializes_to_json() {
        let err = DecodeError::new(ErrorCode::BreakDepth, 12, "break @+12: depth 3 exceeds 1 open blocks")
            .with_token(13);
        let json = serde_json::to_string(&VerifyOutcome::Error { error: err }).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("\"code\":\"break_depth\""));
        assert!(json.contains("\"pc\":12"));
        assert!(json.contains("\"pt\":13"));
    }
}
