//! Decode+build throughput

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use tern_bytecode::{BytecodeWriter, FuncSig, MachineFeatures, Opcode, ValueType};
use tern_compiler::{build_function_graph, FunctionEnv};

fn countdown_body() -> Vec<u8> {
    // while (local[0]) { local[0] = local[0] - 1 }; return local[0]
    let mut w = BytecodeWriter::new();
    w.emit_while();
    w.emit_get_local(0);
    w.emit_set_local(0);
    w.emit_op(Opcode::I32Sub);
    w.emit_get_local(0);
    w.emit_i8_const(1);
    w.emit_return();
    w.emit_get_local(0);
    w.into_bytes()
}

fn arithmetic_body(depth: usize) -> Vec<u8> {
    // return 1 + (1 + (1 + ...))
    let mut w = BytecodeWriter::new();
    w.emit_return();
    for _ in 0..depth {
        w.emit_op(Opcode::I32Add);
        w.emit_i8_const(1);
    }
    w.emit_i8_const(1);
    w.into_bytes()
}

fn bench_decode(c: &mut Criterion) {
    let sig = FuncSig::new(vec![ValueType::I32], Some(ValueType::I32));
    let env = FunctionEnv::new(sig, None);
    let features = MachineFeatures::host();

    let countdown = countdown_body();
    c.bench_function("decode_countdown_loop", |b| {
        b.iter(|| {
            build_function_graph(black_box(&env), features, black_box(&countdown))
                .expect("benchmark body decodes")
        })
    });

    let arith_sig = FuncSig::new(vec![], Some(ValueType::I32));
    let arith_env = FunctionEnv::new(arith_sig, None);
    let arith = arithmetic_body(256);
    c.bench_function("decode_arithmetic_chain_256", |b| {
        b.iter(|| {
            build_function_graph(black_box(&arith_env), features, black_box(&arith))
                .expect("benchmark body decodes")
        })
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
