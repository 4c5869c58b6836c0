//! Wire-format integration tests: writer output against the opcode table

use tern_bytecode::{BytecodeReader, BytecodeWriter, OpKind, Opcode, OpcodeTable, ValueType};

#[test]
fn test_every_emitted_opcode_round_trips() {
    let mut w = BytecodeWriter::new();
    w.emit_block(2);
    w.emit_if();
    w.emit_get_local(0);
    w.emit_break(0);
    w.emit_return();
    w.emit_op(Opcode::I32Add);
    w.emit_i8_const(-5);
    w.emit_i32_const(7);

    let bytes = w.into_bytes();
    let mut r = BytecodeReader::new(&bytes);
    let mut seen = Vec::new();
    while r.has_more() {
        let byte = r.read_u8().unwrap();
        if let Some(op) = Opcode::from_u8(byte) {
            seen.push(op);
            match op {
                Opcode::Block | Opcode::Break | Opcode::GetLocal => {
                    r.read_u8().unwrap();
                }
                Opcode::I8Const => {
                    r.read_i8().unwrap();
                }
                Opcode::I32Const => {
                    r.read_i32().unwrap();
                }
                _ => {}
            }
        }
    }
    assert_eq!(
        seen,
        vec![
            Opcode::Block,
            Opcode::If,
            Opcode::GetLocal,
            Opcode::Break,
            Opcode::Return,
            Opcode::I32Add,
            Opcode::I8Const,
            Opcode::I32Const,
        ]
    );
}

#[test]
fn test_operator_signatures_are_value_typed() {
    OpcodeTable::warm_up();
    // Every byte that decodes to an expression operator outside the
    // variadic set carries a signature whose types are value types.
    for byte in 0x20..=0xAF_u8 {
        let Some(op) = Opcode::from_u8(byte) else { continue };
        assert_eq!(op.kind(), OpKind::Expr, "{:?}", op);
        let sig = op.sig().unwrap_or_else(|| panic!("{:?} missing signature", op));
        assert!(sig.ret.is_value());
        assert!(!sig.params.is_empty());
        assert!(sig.params.iter().all(|t| t.is_value()));
    }
}

#[test]
fn test_memory_opcodes_describe_their_access() {
    for byte in 0x90..=0xAF_u8 {
        let Some(op) = Opcode::from_u8(byte) else { continue };
        assert!(op.is_memory_access());
        let mem = op.mem_type().unwrap();
        let sig = op.sig().unwrap();
        if op.is_load() {
            assert_eq!(sig.params, &[ValueType::I32]);
        } else {
            assert_eq!(sig.params[0], ValueType::I32);
        }
        assert!(mem.width() <= 8);
    }
}
