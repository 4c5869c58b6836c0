//! Tern Compiler Front Half
//!
//! Consumes the tree-structured function bytecode and lowers it into the
//! sea-of-nodes graph IR, verifying structure and types in the same
//! single pass. Machine-code generation happens downstream of the graph.

#![warn(rust_2018_idioms)]

pub mod decoder;
pub mod diagnostic;
pub mod env;

pub use decoder::Decoder;
pub use diagnostic::{DecodeError, ErrorCode, VerifyOutcome};
pub use env::{EnvError, FunctionEnv};

use tern_bytecode::MachineFeatures;
use tern_graph::Graph;
use tracing::debug;

/// Decode one function body and build its graph
///
/// On failure the partially built graph is discarded.
pub fn build_function_graph(
    env: &FunctionEnv<'_>,
    features: MachineFeatures,
    body: &[u8],
) -> Result<Graph, DecodeError> {
    let _span = tracing::debug_span!("build_function_graph", body_len = body.len()).entered();
    let mut graph = Graph::new();
    let result = {
        let mut decoder = Decoder::new(env, features, &mut graph, body);
        decoder.decode_function_body()
    };
    match result {
        Ok(()) => {
            debug!(nodes = graph.node_count(), "function graph built");
            Ok(graph)
        }
        Err(error) => {
            debug!(code = %error.code, pc = error.pc, "decode failed");
            Err(error)
        }
    }
}

/// Verify one function body without keeping the graph
pub fn verify_function_body(
    env: &FunctionEnv<'_>,
    features: MachineFeatures,
    body: &[u8],
) -> VerifyOutcome {
    build_function_graph(env, features, body)
        .map(|_| ())
        .into()
}
