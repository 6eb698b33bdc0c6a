//! One chart cell: the nodes proved over a single span, with signature
//! deduplication and beam-and-threshold pruning.
//!
//! Pruning is lazy. The cell keeps a worst-first heap of (score, node)
//! entries; superseded nodes are only counted dead, and their stale heap
//! entries are skipped when eventually popped. Eviction marks a node dead
//! and unindexes it but never removes it from the arena, so hyperedges
//! pointing at it remain structurally valid.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::feature::Feature;
use crate::hypergraph::{HGNode, HyperEdge, NodeArena, NodeId, Signature};
use crate::lattice::SourcePath;
use crate::vocab::Symbol;

use super::compute::{compute_final_cost, NodeResult};
use super::stats::ChartStats;

/// Cost treated as unreachable; the pruning cutoff never exceeds it.
pub const IMPOSSIBLE: f64 = 99_999.0;

/// Margin added when the beam cap tightens the cutoff to sit just above
/// the current worst survivor.
pub const EPSILON: f64 = 1e-6;

/// All live nodes of one left-hand side in a cell, in sorted-cell order.
/// This is the unit dotted rules bind to when consuming a nonterminal.
#[derive(Debug, Clone)]
pub struct SuperNode {
    pub lhs: Symbol,
    pub nodes: Vec<NodeId>,
}

struct HeapEntry {
    /// Pruning score at insertion time; may go stale if the node's
    /// Viterbi cost later improves.
    cost: f64,
    id: NodeId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.id == other.id
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    // Worst-first: the max-heap root is the most expensive node.
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.id.cmp(&other.id))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Cell {
    pub i: usize,
    pub j: usize,
    sig_index: HashMap<Signature, NodeId>,
    heap: BinaryHeap<HeapEntry>,
    dead_in_heap: usize,
    best_cost: f64,
    cutoff: f64,
    cap: usize,
    relative_threshold: f64,
    /// Best-first view plus the per-LHS grouping, rebuilt on demand.
    sorted: Option<Vec<NodeId>>,
    super_nodes: HashMap<Symbol, SuperNode>,
}

impl Cell {
    pub fn new(i: usize, j: usize, cap: usize, relative_threshold: f64) -> Cell {
        Cell {
            i,
            j,
            sig_index: HashMap::new(),
            heap: BinaryHeap::new(),
            dead_in_heap: 0,
            best_cost: IMPOSSIBLE,
            cutoff: IMPOSSIBLE,
            cap,
            relative_threshold,
            sorted: None,
            super_nodes: HashMap::new(),
        }
    }

    /// Current fail-fast threshold; candidates scoring at or above it are
    /// not worth building.
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn is_empty(&self) -> bool {
        self.sig_index.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.sig_index.len()
    }

    /// Install one scored rule application. Returns the node it landed in
    /// when that node is new (or superseding); a merge into an existing
    /// node and a fail-fast drop both return None.
    ///
    /// The return value drives the unary-closure worklist: a fresh node
    /// must be processed again, a merge must not.
    pub fn add_hyperedge(
        &mut self,
        lhs: Symbol,
        result: NodeResult,
        rule: Option<Arc<crate::grammar::Rule>>,
        tails: Vec<NodeId>,
        src_path: SourcePath,
        arena: &mut NodeArena,
        stats: &mut ChartStats,
    ) -> Option<NodeId> {
        if result.pruning_estimate >= self.cutoff {
            stats.prepruned_edges += 1;
            return None;
        }

        let edge = HyperEdge {
            rule,
            tails,
            cost: result.viterbi_cost,
            transition_cost: result.transition_cost,
            source_path: src_path,
        };
        let signature = Signature {
            lhs,
            states: result.states.clone(),
        };
        let estimate = result.pruning_estimate - result.viterbi_cost;

        let installed = match self.sig_index.get(&signature).copied() {
            None => {
                let mut node = HGNode::new(self.i, self.j, lhs, result.states, estimate);
                node.add_edge(edge);
                let id = arena.alloc(node);
                self.index_node(id, signature, result.pruning_estimate);
                stats.added_nodes += 1;
                Some(id)
            }
            Some(old_id) => {
                stats.merged_nodes += 1;
                if result.pruning_estimate < arena[old_id].pruning_cost() {
                    // Supersede: a structurally fresh node inherits the old
                    // derivations, and the old one is left dead in place.
                    let mut node =
                        HGNode::new(self.i, self.j, lhs, result.states, estimate);
                    for old_edge in arena[old_id].edges.clone() {
                        node.add_edge(old_edge);
                    }
                    node.add_edge(edge);
                    let id = arena.alloc(node);
                    arena[old_id].dead = true;
                    self.dead_in_heap += 1;
                    self.index_node(id, signature, result.pruning_estimate);
                    Some(id)
                } else {
                    arena[old_id].add_edge(edge);
                    self.sorted = None;
                    None
                }
            }
        };

        self.cutoff = (self.best_cost + self.relative_threshold).min(IMPOSSIBLE);
        self.run_pruning(arena, stats);
        installed
    }

    fn index_node(&mut self, id: NodeId, signature: Signature, score: f64) {
        self.sig_index.insert(signature, id);
        self.heap.push(HeapEntry { cost: score, id });
        if score < self.best_cost {
            self.best_cost = score;
        }
        self.sorted = None;
    }

    /// Lazy-delete eviction: pop while over the node cap or while the
    /// worst entry sits at or above the cutoff. Popped entries that were
    /// already dead only decrement the corpse counter.
    fn run_pruning(&mut self, arena: &mut NodeArena, stats: &mut ChartStats) {
        if self.dead_in_heap == self.heap.len() {
            self.heap.clear();
            self.dead_in_heap = 0;
            return;
        }
        while let Some(root) = self.heap.peek() {
            let live = self.heap.len() - self.dead_in_heap;
            if live <= self.cap && root.cost < self.cutoff {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry vanished");
            if arena[entry.id].dead {
                self.dead_in_heap -= 1;
                continue;
            }
            arena[entry.id].dead = true;
            let sig = arena[entry.id].signature();
            if self.sig_index.get(&sig) == Some(&entry.id) {
                self.sig_index.remove(&sig);
            }
            self.sorted = None;
            stats.pruned_nodes += 1;
            debug!(i = self.i, j = self.j, cost = entry.cost, "evicted node");
        }
        // Exactly at the cap: hold future insertions to just above the
        // current worst survivor.
        if self.heap.len() - self.dead_in_heap == self.cap {
            if let Some(root) = self.heap.peek() {
                self.cutoff = self.cutoff.min(root.cost + EPSILON);
            }
        }
    }

    /// Live nodes in ascending score order. Rebuilds the cached view (and
    /// the per-LHS super-nodes) if anything changed since the last call.
    pub fn sorted_nodes(&mut self, arena: &NodeArena) -> &[NodeId] {
        if self.sorted.is_none() {
            let mut ids: Vec<NodeId> = self.sig_index.values().copied().collect();
            ids.sort_by(|a, b| {
                arena[*a]
                    .pruning_cost()
                    .total_cmp(&arena[*b].pruning_cost())
                    .then_with(|| a.cmp(b))
            });
            self.super_nodes.clear();
            for &id in &ids {
                let lhs = arena[id].lhs;
                self.super_nodes
                    .entry(lhs)
                    .or_insert_with(|| SuperNode { lhs, nodes: Vec::new() })
                    .nodes
                    .push(id);
            }
            self.sorted = Some(ids);
        }
        self.sorted.as_deref().expect("just built")
    }

    /// Per-LHS grouping; valid only after `sorted_nodes`.
    pub fn super_node(&self, lhs: Symbol) -> Option<&SuperNode> {
        debug_assert!(self.sorted.is_some(), "super nodes read before sorting");
        self.super_nodes.get(&lhs)
    }

    pub fn super_nodes(&self) -> impl Iterator<Item = &SuperNode> {
        debug_assert!(self.sorted.is_some(), "super nodes read before sorting");
        self.super_nodes.values()
    }
}

/// Build the goal node from the whole-sentence cell: one edge per live
/// node carrying the goal symbol as its LHS, each charged its features'
/// final cost. Returns None when no goal-labelled node was proved.
pub fn transit_to_goal(
    final_cell: &mut Cell,
    arena: &mut NodeArena,
    features: &[Feature],
    goal_symbol: Symbol,
    source_len: usize,
    sentence_id: usize,
) -> Option<NodeId> {
    let ids: Vec<NodeId> = final_cell
        .sorted_nodes(arena)
        .iter()
        .copied()
        .filter(|&id| arena[id].lhs == goal_symbol)
        .collect();
    if ids.is_empty() {
        return None;
    }
    let mut goal = HGNode::new(0, source_len, goal_symbol, Vec::new(), 0.0);
    for id in ids {
        let final_cost =
            compute_final_cost(features, &arena[id].states, 0, source_len, sentence_id);
        goal.add_edge(HyperEdge {
            rule: None,
            tails: vec![id],
            cost: arena[id].best_cost + final_cost,
            transition_cost: final_cost,
            source_path: SourcePath::default(),
        });
    }
    debug!(edges = goal.edges.len(), cost = goal.best_cost, "goal transition");
    Some(arena.alloc(goal))
}

/// Triangular grid of lazily created cells, indexed by span.
pub struct CellGrid {
    positions: usize,
    cells: Vec<Option<Cell>>,
}

impl CellGrid {
    pub fn new(positions: usize) -> CellGrid {
        CellGrid {
            positions,
            cells: (0..positions * positions).map(|_| None).collect(),
        }
    }

    fn slot(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < j && j < self.positions);
        i * self.positions + j
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&Cell> {
        self.cells[self.slot(i, j)].as_ref()
    }

    pub fn get_mut(&mut self, i: usize, j: usize) -> Option<&mut Cell> {
        let slot = self.slot(i, j);
        self.cells[slot].as_mut()
    }

    pub fn get_or_create(
        &mut self,
        i: usize,
        j: usize,
        cap: usize,
        relative_threshold: f64,
    ) -> &mut Cell {
        let slot = self.slot(i, j);
        self.cells[slot].get_or_insert_with(|| Cell::new(i, j, cap, relative_threshold))
    }
}
