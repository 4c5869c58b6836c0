//! Bytecode encoding and decoding utilities
//!
//! This module provides tools for emitting and reading the tree bytecode
//! wire format. The writer is used by bytecode producers and by tests; the
//! reader is the byte-cursor primitive underneath the function decoder.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur while reading the wire format
#[derive(Debug, Error)]
pub enum WireError {
    /// Unexpected end of the byte window
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),
}

/// Bytecode writer for encoding tree productions
///
/// Emits opcodes and their immediates into a binary buffer. Children of a
/// production are appended by subsequent emit calls in left-to-right order.
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a signed byte
    pub fn emit_i8(&mut self, value: i8) {
        self.buffer.push(value as u8);
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit float (little-endian)
    pub fn emit_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a bare opcode byte (operators and other immediate-free opcodes)
    pub fn emit_op(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    // ===== Statements =====

    /// Emit NOP
    pub fn emit_nop(&mut self) {
        self.emit_op(Opcode::Nop);
    }

    /// Emit BLOCK with a statement count
    pub fn emit_block(&mut self, count: u8) {
        self.emit_op(Opcode::Block);
        self.emit_u8(count);
    }

    /// Emit LOOP with a statement count
    pub fn emit_loop(&mut self, count: u8) {
        self.emit_op(Opcode::Loop);
        self.emit_u8(count);
    }

    /// Emit IF (children: cond, then)
    pub fn emit_if(&mut self) {
        self.emit_op(Opcode::If);
    }

    /// Emit IF_ELSE (children: cond, then, else)
    pub fn emit_if_else(&mut self) {
        self.emit_op(Opcode::IfElse);
    }

    /// Emit WHILE (children: cond, body)
    pub fn emit_while(&mut self) {
        self.emit_op(Opcode::While);
    }

    /// Emit SWITCH with a case count (children: key, cases)
    pub fn emit_switch(&mut self, count: u8) {
        self.emit_op(Opcode::Switch);
        self.emit_u8(count);
    }

    /// Emit SWITCH_NF with a case count (children: key, cases)
    pub fn emit_switch_nf(&mut self, count: u8) {
        self.emit_op(Opcode::SwitchNf);
        self.emit_u8(count);
    }

    /// Emit BREAK with a block depth
    pub fn emit_break(&mut self, depth: u8) {
        self.emit_op(Opcode::Break);
        self.emit_u8(depth);
    }

    /// Emit CONTINUE with a block depth
    pub fn emit_continue(&mut self, depth: u8) {
        self.emit_op(Opcode::Continue);
        self.emit_u8(depth);
    }

    /// Emit RETURN (children follow the function signature)
    pub fn emit_return(&mut self) {
        self.emit_op(Opcode::Return);
    }

    /// Emit SET_LOCAL (child: value)
    pub fn emit_set_local(&mut self, index: u8) {
        self.emit_op(Opcode::SetLocal);
        self.emit_u8(index);
    }

    /// Emit STORE_GLOBAL (child: value)
    pub fn emit_store_global(&mut self, index: u8) {
        self.emit_op(Opcode::StoreGlobal);
        self.emit_u8(index);
    }

    // ===== Expressions =====

    /// Emit an i8 constant (sign-extended to i32 when decoded)
    pub fn emit_i8_const(&mut self, value: i8) {
        self.emit_op(Opcode::I8Const);
        self.emit_i8(value);
    }

    /// Emit an i32 constant
    pub fn emit_i32_const(&mut self, value: i32) {
        self.emit_op(Opcode::I32Const);
        self.emit_i32(value);
    }

    /// Emit an i64 constant
    pub fn emit_i64_const(&mut self, value: i64) {
        self.emit_op(Opcode::I64Const);
        self.emit_i64(value);
    }

    /// Emit an f32 constant
    pub fn emit_f32_const(&mut self, value: f32) {
        self.emit_op(Opcode::F32Const);
        self.emit_f32(value);
    }

    /// Emit an f64 constant
    pub fn emit_f64_const(&mut self, value: f64) {
        self.emit_op(Opcode::F64Const);
        self.emit_f64(value);
    }

    /// Emit GET_LOCAL
    pub fn emit_get_local(&mut self, index: u8) {
        self.emit_op(Opcode::GetLocal);
        self.emit_u8(index);
    }

    /// Emit LOAD_GLOBAL
    pub fn emit_load_global(&mut self, index: u8) {
        self.emit_op(Opcode::LoadGlobal);
        self.emit_u8(index);
    }

    /// Emit TERNARY (children: cond, then, else)
    pub fn emit_ternary(&mut self) {
        self.emit_op(Opcode::Ternary);
    }

    /// Emit COMMA (children: left, right)
    pub fn emit_comma(&mut self) {
        self.emit_op(Opcode::Comma);
    }

    /// Emit CALL_FUNCTION (children: args per callee signature)
    pub fn emit_call_function(&mut self, function_index: u8) {
        self.emit_op(Opcode::CallFunction);
        self.emit_u8(function_index);
    }

    /// Emit CALL_INDIRECT (children: key, then args per signature)
    pub fn emit_call_indirect(&mut self, sig_index: u8) {
        self.emit_op(Opcode::CallIndirect);
        self.emit_u8(sig_index);
    }

    /// Emit a memory load or store with its static offset
    pub fn emit_mem_op(&mut self, opcode: Opcode, offset: u32) {
        debug_assert!(opcode.is_memory_access());
        self.emit_op(opcode);
        self.emit_u32(offset);
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over a `[start, end)` bytecode window with offset-tracked reads
pub struct BytecodeReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a reader over a byte window
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether unread bytes remain
    pub fn has_more(&self) -> bool {
        self.position < self.bytes.len()
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        let b = *self
            .bytes
            .get(self.position)
            .ok_or(WireError::UnexpectedEnd(self.position))?;
        self.position += 1;
        Ok(b)
    }

    /// Read one signed byte
    pub fn read_i8(&mut self) -> Result<i8, WireError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Read a 32-bit float (little-endian)
    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_le_bytes(self.read_array::<8>()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let end = self.position + N;
        if end > self.bytes.len() {
            return Err(WireError::UnexpectedEnd(self.position));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.position..end]);
        self.position = end;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_reader_roundtrip() {
        let mut w = BytecodeWriter::new();
        w.emit_i32_const(0x1122_3344);
        w.emit_f64_const(2.5);
        w.emit_get_local(3);

        let bytes = w.into_bytes();
        let mut r = BytecodeReader::new(&bytes);

        assert_eq!(r.read_u8().unwrap(), Opcode::I32Const.to_u8());
        assert_eq!(r.read_i32().unwrap(), 0x1122_3344);
        assert_eq!(r.read_u8().unwrap(), Opcode::F64Const.to_u8());
        assert_eq!(r.read_f64().unwrap(), 2.5);
        assert_eq!(r.read_u8().unwrap(), Opcode::GetLocal.to_u8());
        assert_eq!(r.read_u8().unwrap(), 3);
        assert!(!r.has_more());
    }

    #[test]
    fn test_reader_unexpected_end() {
        let mut r = BytecodeReader::new(&[0x11, 0x01]);
        assert_eq!(r.read_u8().unwrap(), 0x11);
        let err = r.read_i32().unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEnd(1)));
    }

    #[test]
    fn test_tree_emission_order() {
        // return(get_local 0 + get_local 1)
        let mut w = BytecodeWriter::new();
        w.emit_return();
        w.emit_op(Opcode::I32Add);
        w.emit_get_local(0);
        w.emit_get_local(1);

        let bytes = w.into_bytes();
        assert_eq!(
            bytes,
            vec![
                Opcode::Return.to_u8(),
                Opcode::I32Add.to_u8(),
                Opcode::GetLocal.to_u8(),
                0,
                Opcode::GetLocal.to_u8(),
                1,
            ]
        );
    }

    #[test]
    fn test_mem_op_offset() {
        let mut w = BytecodeWriter::new();
        w.emit_mem_op(Opcode::I32LoadMem, 28);
        let bytes = w.into_bytes();
        assert_eq!(bytes[0], Opcode::I32LoadMem.to_u8());
        assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 28);
    }
}
