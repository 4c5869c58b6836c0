//! Shared trap blocks
//!
//! Each trap reason gets at most one destination block per function. The
//! block is materialized on the first trap site and widened (one extra
//! merge and effect-phi input) by every later site for the same reason.
//! With a module context attached the block calls the host runtime-throw
//! stub and ends in a Throw; without one it returns a sentinel word so the
//! graph stays well-formed in verification-only decodes.

use crate::graph::{Graph, NodeId};
use crate::operator::{Operator, RuntimeStub, TrapReason};
use tern_bytecode::ModuleContext;

/// Sentinel word returned from trap blocks in verification-only decodes
pub const TRAP_SENTINEL: i32 = 0x7FF7A5;

#[derive(Debug, Clone, Copy)]
struct TrapBlock {
    merge: NodeId,
    effect_phi: NodeId,
}

/// Per-function cache of materialized trap blocks
#[derive(Debug)]
pub struct TrapHelper {
    blocks: [Option<TrapBlock>; TrapReason::COUNT],
    context: Option<ModuleContext>,
}

impl TrapHelper {
    /// Create an empty cache
    pub fn new(context: Option<ModuleContext>) -> Self {
        Self { blocks: [None; TrapReason::COUNT], context }
    }

    /// Whether a block for this reason has been materialized
    pub fn is_materialized(&self, reason: TrapReason) -> bool {
        self.blocks[reason.index()].is_some()
    }

    /// Route one trap site (a control arm plus the live effect) into the
    /// shared block for `reason`, materializing the block on first use.
    pub fn add_trap_site(
        &mut self,
        graph: &mut Graph,
        reason: TrapReason,
        control: NodeId,
        effect: NodeId,
    ) {
        if let Some(block) = self.blocks[reason.index()] {
            graph.append_merge_input(block.merge, control);
            graph.append_phi_input(block.effect_phi, effect);
            return;
        }

        let merge = graph.new_node(Operator::Merge, vec![control]);
        let effect_phi = graph.new_node(Operator::EffectPhi, vec![effect, merge]);

        let terminator = match self.context {
            Some(ctx) => {
                let code = graph.new_node(Operator::CodeConstant(ctx.throw_stub), vec![]);
                let message =
                    graph.new_node(Operator::StringConstant(reason.message()), vec![]);
                let context = graph.new_node(Operator::HeapConstant(ctx.address), vec![]);
                let call = graph.new_node(
                    Operator::RuntimeCall(RuntimeStub::ThrowTrap),
                    vec![code, message, context, effect_phi, merge],
                );
                graph.new_node(Operator::Throw, vec![call, merge])
            }
            None => {
                let sentinel = graph.new_node(Operator::Int32Constant(TRAP_SENTINEL), vec![]);
                graph.new_node(Operator::Return, vec![sentinel, effect_phi, merge])
            }
        };
        graph.add_end_input(terminator);

        self.blocks[reason.index()] = Some(TrapBlock { merge, effect_phi });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_bytecode::CodeRef;

    fn graph_with_end() -> (Graph, NodeId) {
        let mut g = Graph::new();
        let start = g.new_node(Operator::Start { param_count: 0 }, vec![]);
        g.set_start(start);
        let end = g.new_node(Operator::End, vec![]);
        g.set_end(end);
        (g, start)
    }

    #[test]
    fn test_first_site_materializes_return_block() {
        let (mut g, start) = graph_with_end();
        let mut helper = TrapHelper::new(None);
        assert!(!helper.is_materialized(TrapReason::DivByZero));

        helper.add_trap_site(&mut g, TrapReason::DivByZero, start, start);
        assert!(helper.is_materialized(TrapReason::DivByZero));

        // End collects exactly one terminator: the sentinel return
        let end = g.end().unwrap();
        assert_eq!(g.node(end).inputs.len(), 1);
        let term = g.node(g.node(end).inputs[0]);
        assert_eq!(term.op, Operator::Return);
        assert_eq!(
            g.node(term.inputs[0]).op,
            Operator::Int32Constant(TRAP_SENTINEL)
        );
    }

    #[test]
    fn test_with_context_ends_in_throw() {
        let (mut g, start) = graph_with_end();
        let ctx = ModuleContext { address: 0x1000, throw_stub: CodeRef(0x2000) };
        let mut helper = TrapHelper::new(Some(ctx));

        helper.add_trap_site(&mut g, TrapReason::MemOutOfBounds, start, start);

        let end = g.end().unwrap();
        let term = g.node(g.node(end).inputs[0]);
        assert_eq!(term.op, Operator::Throw);
        let call = g.node(term.inputs[0]);
        assert_eq!(call.op, Operator::RuntimeCall(RuntimeStub::ThrowTrap));
        // [code, message, context, effect, control]
        assert_eq!(call.inputs.len(), 5);
        assert_eq!(
            g.node(call.inputs[1]).op,
            Operator::StringConstant(TrapReason::MemOutOfBounds.message())
        );
    }

    #[test]
    fn test_later_sites_widen_block() {
        let (mut g, start) = graph_with_end();
        let mut helper = TrapHelper::new(None);

        helper.add_trap_site(&mut g, TrapReason::DivByZero, start, start);
        let end = g.end().unwrap();
        let ret = g.node(end).inputs[0];
        let merge = g.node(ret).inputs[2];
        let ephi = g.node(ret).inputs[1];
        assert_eq!(g.node(merge).inputs.len(), 1);
        assert_eq!(g.node(ephi).inputs.len(), 2);

        let c1 = g.new_node(Operator::IfTrue, vec![]);
        helper.add_trap_site(&mut g, TrapReason::DivByZero, c1, start);
        assert_eq!(g.node(merge).inputs.len(), 2);
        assert_eq!(g.node(ephi).inputs.len(), 3);
        // No second terminator was added
        assert_eq!(g.node(end).inputs.len(), 1);

        // A different reason gets its own block
        helper.add_trap_site(&mut g, TrapReason::MemOutOfBounds, c1, start);
        assert_eq!(g.node(end).inputs.len(), 2);
    }
}
