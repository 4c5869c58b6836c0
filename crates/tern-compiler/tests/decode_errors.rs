//! Failure-path tests: every decode error carries its code and offsets

use tern_bytecode::{
    BytecodeWriter, FuncSig, FunctionTable, GlobalDesc, MachineFeatures, MemType, ModuleEnv,
    Opcode, ValueType,
};
use tern_compiler::{build_function_graph, verify_function_body, ErrorCode, FunctionEnv, VerifyOutcome};

fn sig_i_i() -> FuncSig {
    FuncSig::new(vec![ValueType::I32], Some(ValueType::I32))
}

fn decode_err(env: &FunctionEnv<'_>, body: &[u8]) -> tern_compiler::DecodeError {
    build_function_graph(env, MachineFeatures::host(), body).expect_err("decode should fail")
}

#[test]
fn test_unknown_opcode() {
    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, &[0xFF]);
    assert_eq!(err.code, ErrorCode::UnknownOpcode);
    assert_eq!(err.pc, 0);
    assert!(err.message.contains("0xff"));
}

#[test]
fn test_truncated_constant() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_op(Opcode::I32Const);
    w.emit_u8(0x44); // only one of four bytes

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::Truncated);
    assert_eq!(err.pc, 1);
    assert_eq!(err.pt, Some(2));
}

#[test]
fn test_missing_child_is_truncated() {
    let mut w = BytecodeWriter::new();
    w.emit_return(); // no value follows, but the signature wants one

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::Truncated);
}

#[test]
fn test_type_error_wrong_constant_type() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_f64_const(1.0);

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::TypeError);
    assert_eq!(err.pc, 1);
    assert!(err.message.contains("f64.const"));
    assert!(err.message.contains("expected i32"));
}

#[test]
fn test_type_error_statement_in_value_position() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_nop();

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::TypeError);
    assert!(err.message.contains("nop"));
}

#[test]
fn test_ternary_arm_type_mismatch() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_ternary();
    w.emit_get_local(0);
    w.emit_i8_const(1);
    w.emit_f32_const(2.0);

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::TypeError);
}

#[test]
fn test_local_index_out_of_bounds() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_get_local(5);

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::LocalIndexOutOfBounds);
    assert_eq!(err.pc, 1);
    assert_eq!(err.pt, Some(2));
}

#[test]
fn test_global_index_out_of_bounds() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_load_global(3);

    let module = ModuleEnv {
        globals: vec![GlobalDesc { offset: 0, mem_type: MemType::Int32 }],
        ..Default::default()
    };
    let env = FunctionEnv::new(sig_i_i(), Some(&module));
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::GlobalIndexOutOfBounds);
}

#[test]
fn test_memory_access_without_module_env() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_mem_op(Opcode::I32LoadMem, 0);
    w.emit_get_local(0);

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::NoMemory);
    assert!(err.message.contains("i32.load_mem"));
}

#[test]
fn test_call_without_module_env() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_call_function(0);

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::NoMemory);
}

#[test]
fn test_function_index_out_of_bounds() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_call_function(2);

    let module = ModuleEnv::default();
    let env = FunctionEnv::new(sig_i_i(), Some(&module));
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::FunctionIndexOutOfBounds);
}

#[test]
fn test_indirect_signature_index_out_of_range() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_call_indirect(2);
    w.emit_get_local(0);

    let module = ModuleEnv {
        signatures: vec![sig_i_i()],
        table: Some(FunctionTable { address: 0x8000, slots: vec![0] }),
        ..Default::default()
    };
    let env = FunctionEnv::new(sig_i_i(), Some(&module));
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::ArityMismatch);
}

#[test]
fn test_break_outside_any_block() {
    let mut w = BytecodeWriter::new();
    w.emit_break(0);

    let env = FunctionEnv::new(FuncSig::void(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::BreakDepth);
    assert_eq!(err.pc, 0);
}

#[test]
fn test_break_depth_beyond_stack() {
    let mut w = BytecodeWriter::new();
    w.emit_block(1);
    w.emit_break(1);

    let env = FunctionEnv::new(FuncSig::void(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::BreakDepth);
    assert!(err.message.contains("depth 1"));
}

#[test]
fn test_continue_targeting_non_loop() {
    let mut w = BytecodeWriter::new();
    w.emit_block(1);
    w.emit_continue(0);

    let env = FunctionEnv::new(FuncSig::void(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::BreakDepth);
    assert!(err.message.contains("not a loop"));
}

#[test]
fn test_unsupported_opcode_on_32bit_target() {
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_op(Opcode::I64Add);
    w.emit_i64_const(1);
    w.emit_i64_const(2);

    let sig = FuncSig::new(vec![], Some(ValueType::I64));
    let env = FunctionEnv::new(sig, None);
    let err = build_function_graph(&env, MachineFeatures::baseline32(), w.buffer())
        .expect_err("i64 arithmetic needs word64");
    assert_eq!(err.code, ErrorCode::UnsupportedOpcode);
    assert!(err.message.contains("i64.add"));
}

#[test]
fn test_dead_code_is_still_verified() {
    // Statements after return are unreachable but malformed bytes there
    // still fail the decode.
    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_i8_const(1);
    w.emit_get_local(9); // dead, but the index is out of bounds

    let env = FunctionEnv::new(sig_i_i(), None);
    let err = decode_err(&env, w.buffer());
    assert_eq!(err.code, ErrorCode::LocalIndexOutOfBounds);
}

#[test]
fn test_verify_outcome_round_trips_as_json() {
    let env = FunctionEnv::new(sig_i_i(), None);
    let outcome = verify_function_body(&env, MachineFeatures::host(), &[0xFF]);
    assert!(!outcome.is_ok());

    let json = serde_json::to_string(&outcome).unwrap();
    let back: VerifyOutcome = serde_json::from_str(&json).unwrap();
    assert_eq!(back, outcome);

    let mut w = BytecodeWriter::new();
    w.emit_return();
    w.emit_get_local(0);
    let ok = verify_function_body(&env, MachineFeatures::host(), w.buffer());
    assert!(ok.is_ok());
}
