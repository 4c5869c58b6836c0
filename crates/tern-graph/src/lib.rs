//! Tern Graph IR
//!
//! A sea-of-nodes intermediate representation: data, effect, and control
//! are all explicit edges between operator nodes, and basic blocks are
//! implicit. This crate provides the node arena, the operator catalog,
//! the graph builder driven by the bytecode decoder, and the trap-block
//! helper that materializes shared runtime-trap destinations.

#![warn(rust_2018_idioms)]

pub mod builder;
pub mod graph;
pub mod operator;
pub mod pretty;
pub mod trap;

pub use builder::GraphBuilder;
pub use graph::{Graph, Node, NodeId};
pub use operator::{Binop, Operator, RuntimeStub, TrapReason, Unop};
pub use trap::TrapHelper;
