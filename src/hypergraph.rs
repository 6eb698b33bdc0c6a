//! Packed-forest hypergraph produced by chart parsing.
//!
//! Nodes ("or" items) live in a flat arena and are referenced by `NodeId`
//! everywhere else, so cells, dot items, and edges never hold owning
//! pointers into each other. A node is never deallocated during a parse;
//! pruning only unindexes it (`dead = true`) so that hyperedges built
//! earlier stay structurally valid.

use std::sync::Arc;

use crate::feature::{DpState, FeatureId, StateMap};
use crate::grammar::{Rule, TargetToken};
use crate::lattice::SourcePath;
use crate::vocab::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An "and" item: one rule application over a fixed tail of antecedents.
/// `cost` is the Viterbi cost of the best derivation through this edge;
/// `transition_cost` is this application's own contribution.
#[derive(Debug, Clone)]
pub struct HyperEdge {
    /// None only for the goal edge, which applies no rule.
    pub rule: Option<Arc<Rule>>,
    pub tails: Vec<NodeId>,
    pub cost: f64,
    pub transition_cost: f64,
    pub source_path: SourcePath,
}

/// An "or" item: all derivations of one (span, lhs, state) equivalence
/// class, with the Viterbi-best one distinguished.
#[derive(Debug)]
pub struct HGNode {
    pub i: usize,
    pub j: usize,
    pub lhs: Symbol,
    pub states: StateMap,
    pub edges: Vec<HyperEdge>,
    /// Index into `edges`; None only transiently during construction.
    pub best_edge: Option<usize>,
    /// Viterbi cost of the best derivation rooted here.
    pub best_cost: f64,
    /// Outside estimate from stateful features; pruning-only.
    pub estimate: f64,
    /// Set by cell pruning; dead nodes stay in the arena but are skipped
    /// by every index.
    pub dead: bool,
}

impl HGNode {
    pub fn new(i: usize, j: usize, lhs: Symbol, states: StateMap, estimate: f64) -> HGNode {
        HGNode {
            i,
            j,
            lhs,
            states,
            edges: Vec::new(),
            best_edge: None,
            best_cost: f64::INFINITY,
            estimate,
            dead: false,
        }
    }

    /// Attach an edge, updating the Viterbi best if it is cheaper.
    pub fn add_edge(&mut self, edge: HyperEdge) {
        if edge.cost < self.best_cost {
            self.best_cost = edge.cost;
            self.best_edge = Some(self.edges.len());
        }
        self.edges.push(edge);
    }

    pub fn best_edge(&self) -> &HyperEdge {
        &self.edges[self.best_edge.expect("node has no edges")]
    }

    /// Score used by beam pruning: Viterbi cost plus outside estimate.
    pub fn pruning_cost(&self) -> f64 {
        self.best_cost + self.estimate
    }

    pub fn state(&self, id: FeatureId) -> Option<&DpState> {
        crate::feature::state_for(&self.states, id)
    }

    pub fn signature(&self) -> Signature {
        Signature {
            lhs: self.lhs,
            states: self.states.clone(),
        }
    }
}

/// Node equivalence key: two nodes with equal signatures in the same span
/// are the same item and must be merged, not duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub lhs: Symbol,
    pub states: StateMap,
}

/// Flat node storage for one sentence's parse.
#[derive(Default)]
pub struct NodeArena {
    nodes: Vec<HGNode>,
}

impl NodeArena {
    pub fn alloc(&mut self, node: HGNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &HGNode {
        &self.nodes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &HGNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(k, node)| (NodeId(k as u32), node))
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut HGNode {
        &mut self.nodes[id.index()]
    }
}

impl std::ops::Index<NodeId> for NodeArena {
    type Output = HGNode;
    fn index(&self, id: NodeId) -> &HGNode {
        self.get(id)
    }
}

impl std::ops::IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut HGNode {
        self.get_mut(id)
    }
}

/// The finished parse forest: arena plus the goal node spanning the whole
/// input.
pub struct HyperGraph {
    pub arena: NodeArena,
    pub goal: NodeId,
    pub source_len: usize,
}

impl HyperGraph {
    /// Cost of the Viterbi derivation.
    pub fn best_cost(&self) -> f64 {
        self.arena[self.goal].best_cost
    }

    /// Target-side yield of the Viterbi derivation.
    pub fn viterbi_target(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        self.emit(self.goal, &mut out);
        out
    }

    fn emit(&self, id: NodeId, out: &mut Vec<Symbol>) {
        let node = &self.arena[id];
        let edge = node.best_edge();
        match &edge.rule {
            Some(rule) => {
                for tok in &rule.target {
                    match tok {
                        TargetToken::Word(w) => out.push(*w),
                        TargetToken::Nonterminal(k) => self.emit(edge.tails[*k], out),
                    }
                }
            }
            // Goal edge: pass through the single antecedent.
            None => {
                for &tail in &edge.tails {
                    self.emit(tail, out);
                }
            }
        }
    }
}
