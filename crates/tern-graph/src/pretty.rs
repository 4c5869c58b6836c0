//! Graph pretty printer
//!
//! Renders the node arena one node per line, e.g.
//! `n4: Binop(I32Add)(n2, n3)`. Intended for tests and debugging output.

use crate::graph::Graph;
use crate::operator::Operator;
use std::fmt::Write;

fn operator_label(op: &Operator) -> String {
    match op {
        Operator::Start { param_count } => format!("Start[{}]", param_count),
        Operator::Int32Constant(v) => format!("Int32Constant[{}]", v),
        Operator::Int64Constant(v) => format!("Int64Constant[{}]", v),
        Operator::Float32Constant(v) => format!("Float32Constant[{}]", v),
        Operator::Float64Constant(v) => format!("Float64Constant[{}]", v),
        Operator::IntPtrConstant(v) => format!("IntPtrConstant[{:#x}]", v),
        Operator::SmiConstant(v) => format!("SmiConstant[{}]", v),
        Operator::CodeConstant(c) => format!("CodeConstant[{:#x}]", c.0),
        Operator::HeapConstant(v) => format!("HeapConstant[{:#x}]", v),
        Operator::StringConstant(s) => format!("StringConstant[{:?}]", s),
        Operator::Binop(op) => format!("Binop({:?})", op),
        Operator::Unop(op) => format!("Unop({:?})", op),
        Operator::LoadLocal(i) => format!("LoadLocal[{}]", i),
        Operator::StoreLocal(i) => format!("StoreLocal[{}]", i),
        Operator::Load(t) => format!("Load[{}]", t),
        Operator::Store(t) => format!("Store[{}]", t),
        Operator::CheckedLoad(t) => format!("CheckedLoad[{}]", t),
        Operator::CheckedStore(t) => format!("CheckedStore[{}]", t),
        Operator::Call(sig) => format!("Call[{}]", sig),
        Operator::RuntimeCall(stub) => format!("RuntimeCall[{:?}]", stub),
        Operator::Switch { case_count } => format!("Switch[{}]", case_count),
        Operator::IfValue(v) => format!("IfValue[{}]", v),
        Operator::Phi(t) => format!("Phi[{}]", t),
        other => other.name().to_string(),
    }
}

/// Render the whole graph, one node per line
pub fn print_graph(graph: &Graph) -> String {
    let mut out = String::new();
    for (id, node) in graph.iter() {
        let _ = write!(out, "{}: {}(", id, operator_label(&node.op));
        for (i, input) in node.inputs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}", input);
        }
        out.push_str(")\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Binop;

    #[test]
    fn test_print_small_graph() {
        let mut g = Graph::new();
        let a = g.new_node(Operator::Int32Constant(1), vec![]);
        let b = g.new_node(Operator::Int32Constant(2), vec![]);
        g.new_node(Operator::Binop(Binop::I32Add), vec![a, b]);

        let text = print_graph(&g);
        assert!(text.contains("n0: Int32Constant[1]()"));
        assert!(text.contains("n2: Binop(I32Add)(n0, n1)"));
    }
}
