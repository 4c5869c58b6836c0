//! Node arena and graph
//!
//! Nodes are arena-allocated; an edge is an index into the arena. The
//! operator of a node is immutable after creation, but merge-family nodes
//! (`Merge`, `Loop`, `Phi`, `EffectPhi`, `End`) support input push-back so
//! trap blocks and loops can grow their join points after construction.

use crate::operator::Operator;
use rustc_hash::FxHashMap;

/// Index of a node in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A single IR node: an operator plus ordered input edges
#[derive(Debug, Clone)]
pub struct Node {
    /// The node's operator
    pub op: Operator,
    /// Ordered input edges (values, then effect, then control)
    pub inputs: Vec<NodeId>,
}

/// The function graph: an arena of nodes with a distinguished Start and End
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    start: Option<NodeId>,
    end: Option<NodeId>,
    dead: Option<NodeId>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node
    pub fn new_node(&mut self, op: Operator, inputs: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { op, inputs });
        id
    }

    /// Access a node
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Access a node mutably
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Number of nodes in the arena
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes with their ids
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// The Start node
    pub fn start(&self) -> Option<NodeId> {
        self.start
    }

    /// The End node
    pub fn end(&self) -> Option<NodeId> {
        self.end
    }

    /// Install the Start node
    pub fn set_start(&mut self, id: NodeId) {
        debug_assert!(matches!(self.node(id).op, Operator::Start { .. }));
        self.start = Some(id);
    }

    /// Install the End node
    pub fn set_end(&mut self, id: NodeId) {
        debug_assert!(matches!(self.node(id).op, Operator::End));
        self.end = Some(id);
    }

    /// Append a terminator to End
    pub fn add_end_input(&mut self, terminator: NodeId) {
        let end = self.end.expect("graph has no End node");
        self.node_mut(end).inputs.push(terminator);
    }

    /// Append a control edge to a `Merge` or `Loop`
    pub fn append_merge_input(&mut self, merge: NodeId, control: NodeId) {
        debug_assert!(matches!(
            self.node(merge).op,
            Operator::Merge | Operator::Loop
        ));
        self.node_mut(merge).inputs.push(control);
    }

    /// Append a value (or effect) edge to a `Phi` or `EffectPhi`
    ///
    /// Phi inputs end with the owning merge, so the new edge is inserted
    /// just before it.
    pub fn append_phi_input(&mut self, phi: NodeId, value: NodeId) {
        debug_assert!(matches!(
            self.node(phi).op,
            Operator::Phi(_) | Operator::EffectPhi
        ));
        let node = self.node_mut(phi);
        let merge_pos = node.inputs.len() - 1;
        node.inputs.insert(merge_pos, value);
    }

    /// The shared placeholder node for unreachable values
    pub fn dead_node(&mut self) -> NodeId {
        match self.dead {
            Some(id) => id,
            None => {
                let id = self.new_node(Operator::Dead, Vec::new());
                self.dead = Some(id);
                id
            }
        }
    }

    /// Node count per operator name; the isomorphism fingerprint used by
    /// determinism tests
    pub fn op_histogram(&self) -> FxHashMap<&'static str, usize> {
        let mut hist = FxHashMap::default();
        for node in &self.nodes {
            *hist.entry(node.op.name()).or_insert(0) += 1;
        }
        hist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Binop;

    #[test]
    fn test_arena_allocation() {
        let mut g = Graph::new();
        let a = g.new_node(Operator::Int32Constant(1), vec![]);
        let b = g.new_node(Operator::Int32Constant(2), vec![]);
        let add = g.new_node(Operator::Binop(Binop::I32Add), vec![a, b]);

        assert_eq!(g.node_count(), 3);
        assert_eq!(g.node(add).inputs, vec![a, b]);
        assert_eq!(g.node(a).op, Operator::Int32Constant(1));
    }

    #[test]
    fn test_merge_widening() {
        let mut g = Graph::new();
        let c0 = g.new_node(Operator::IfTrue, vec![]);
        let c1 = g.new_node(Operator::IfFalse, vec![]);
        let merge = g.new_node(Operator::Merge, vec![c0]);
        g.append_merge_input(merge, c1);
        assert_eq!(g.node(merge).inputs, vec![c0, c1]);
    }

    #[test]
    fn test_phi_widening_keeps_merge_last() {
        let mut g = Graph::new();
        let merge = g.new_node(Operator::Merge, vec![]);
        let v0 = g.new_node(Operator::Int32Constant(1), vec![]);
        let v1 = g.new_node(Operator::Int32Constant(2), vec![]);
        let phi = g.new_node(
            Operator::Phi(tern_bytecode::ValueType::I32),
            vec![v0, merge],
        );
        g.append_phi_input(phi, v1);
        assert_eq!(g.node(phi).inputs, vec![v0, v1, merge]);
    }

    #[test]
    fn test_dead_node_shared() {
        let mut g = Graph::new();
        let d0 = g.dead_node();
        let d1 = g.dead_node();
        assert_eq!(d0, d1);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_op_histogram() {
        let mut g = Graph::new();
        g.new_node(Operator::Int32Constant(1), vec![]);
        g.new_node(Operator::Int32Constant(2), vec![]);
        g.new_node(Operator::Merge, vec![]);
        let h = g.op_histogram();
        assert_eq!(h.get("Int32Constant"), Some(&2));
        assert_eq!(h.get("Merge"), Some(&1));
    }
}
