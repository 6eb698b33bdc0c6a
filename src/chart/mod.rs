//! CKY+ chart parsing over a source lattice.
//!
//! The [`Chart`] drives one sentence to completion: spans in increasing
//! width, each span expanded through per-grammar dot charts, completed
//! via cube pruning (or exhaustively), closed under unary rules, and
//! finally transitioned into a single goal node rooting the returned
//! [`HyperGraph`].

pub mod cell;
pub(crate) mod combine;
pub mod compute;
pub mod constraint;
pub mod dot_chart;
pub mod oov;
pub mod stats;

#[cfg(test)]
pub(crate) mod testutil;

#[cfg(test)]
mod tests;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, debug_span, error};

use crate::feature::Feature;
use crate::grammar::{Grammar, Rule};
use crate::hypergraph::{HyperGraph, NodeArena, NodeId};
use crate::lattice::{Lattice, SourcePath};
use crate::settings::{CombinerKind, Settings};
use crate::vocab::{self, Symbol};

use cell::{transit_to_goal, CellGrid};
use compute::compute_node_result;
use constraint::StateConstraint;
use dot_chart::DotChart;
use stats::ChartStats;

pub use oov::build_oov_grammar;

/// One sentence's parse state. Build it, call [`Chart::expand`], read the
/// statistics afterwards if wanted.
pub struct Chart<'a> {
    lattice: &'a Lattice,
    grammars: &'a [&'a dyn Grammar],
    features: &'a [Feature],
    settings: &'a Settings,
    constraint: Option<&'a StateConstraint>,
    sentence_id: usize,
    goal: Symbol,
    default_nonterminal: Symbol,
    cells: CellGrid,
    arena: NodeArena,
    stats: ChartStats,
}

impl<'a> Chart<'a> {
    pub fn new(
        lattice: &'a Lattice,
        grammars: &'a [&'a dyn Grammar],
        features: &'a [Feature],
        settings: &'a Settings,
        sentence_id: usize,
    ) -> Chart<'a> {
        Chart {
            lattice,
            grammars,
            features,
            settings,
            constraint: None,
            sentence_id,
            goal: vocab::nonterminal(&settings.search.goal_symbol),
            default_nonterminal: vocab::nonterminal(&settings.search.default_nonterminal),
            cells: CellGrid::new(lattice.source_len() + 1),
            arena: NodeArena::default(),
            stats: ChartStats::default(),
        }
    }

    /// Restrict materialized nodes to those compatible with a reference
    /// translation (forced decoding).
    pub fn with_constraint(mut self, constraint: &'a StateConstraint) -> Chart<'a> {
        self.constraint = Some(constraint);
        self
    }

    pub fn stats(&self) -> &ChartStats {
        &self.stats
    }

    /// Run the parse. Returns None when no derivation of the goal symbol
    /// covers the input, which is a normal outcome (coverage gap or
    /// aggressive pruning), not an error.
    pub fn expand(&mut self) -> Option<HyperGraph> {
        let span = debug_span!("expand", sentence_id = self.sentence_id);
        let _guard = span.enter();

        let source_len = self.lattice.source_len();
        if source_len == 0 {
            debug!(sentence_id = self.sentence_id, "empty input");
            return None;
        }
        let exempt = vec![self.goal, self.default_nonterminal];
        let mut dotcharts: Vec<DotChart<'a>> = self
            .grammars
            .iter()
            .map(|g| {
                DotChart::new(
                    *g,
                    self.lattice,
                    self.settings.search.nonterminal_matching,
                    exempt.clone(),
                    &mut self.stats,
                )
            })
            .collect();

        for width in 1..=source_len {
            for i in 0..=source_len - width {
                let j = i + width;
                if !self.lattice.has_path(i, j) {
                    continue;
                }

                for dots in &mut dotcharts {
                    dots.expand_dot_cell(self.lattice, &self.cells, i, j, &mut self.stats);
                }

                self.complete_span(&dotcharts, i, j);
                self.add_unary_nodes(i, j);

                // Sort before seeding: the dot chart reads this cell's
                // super-nodes, and later spans cube-prune against it.
                if let Some(cell) = self.cells.get_mut(i, j) {
                    cell.sorted_nodes(&self.arena);
                }
                for dots in &mut dotcharts {
                    if dots.grammar().has_rule_for_span(i, j, source_len) {
                        dots.start_dot_items(&self.cells, i, j, &mut self.stats);
                    }
                }
            }
        }

        self.stats.report(self.sentence_id);

        // An absent full-span cell and an empty one report the same way.
        let goal = match self.cells.get_mut(0, source_len) {
            Some(cell) => transit_to_goal(
                cell,
                &mut self.arena,
                self.features,
                self.goal,
                source_len,
                self.sentence_id,
            ),
            None => None,
        };
        match goal {
            Some(goal) => Some(HyperGraph {
                arena: std::mem::take(&mut self.arena),
                goal,
                source_len,
            }),
            None => {
                error!(
                    sentence_id = self.sentence_id,
                    "no goal derivation: grammar coverage gap or over-aggressive pruning"
                );
                None
            }
        }
    }

    /// Materialize a single zero-arity rule over a span, outside the
    /// normal grammar flow (manual constraints, synthetic rules).
    pub fn add_axiom(&mut self, i: usize, j: usize, rule: Arc<Rule>, src_path: SourcePath) {
        let result = compute_node_result(
            self.features,
            &rule,
            &[],
            &self.arena,
            i,
            j,
            src_path,
            self.sentence_id,
        );
        self.stats.computed_results += 1;
        let cell = self.cells.get_or_create(
            i,
            j,
            self.settings.pruning.max_nodes_per_cell,
            self.settings.pruning.relative_threshold,
        );
        cell.add_hyperedge(
            rule.lhs,
            result,
            Some(rule),
            Vec::new(),
            src_path,
            &mut self.arena,
            &mut self.stats,
        );
    }

    fn complete_span(&mut self, dotcharts: &[DotChart<'a>], i: usize, j: usize) {
        let source_len = self.lattice.source_len();
        let groups =
            combine::collect_groups(dotcharts, &self.cells, i, j, source_len);
        if groups.is_empty() {
            return;
        }
        let cell = self.cells.get_or_create(
            i,
            j,
            self.settings.pruning.max_nodes_per_cell,
            self.settings.pruning.relative_threshold,
        );
        match self.settings.search.combiner {
            CombinerKind::CubePrune => combine::cube_prune_span(
                &groups,
                cell,
                &mut self.arena,
                self.features,
                &self.settings.pruning,
                self.constraint,
                i,
                j,
                self.sentence_id,
                &mut self.stats,
            ),
            CombinerKind::Exhaustive => combine::exhaustive_span(
                &groups,
                cell,
                &mut self.arena,
                self.features,
                self.constraint,
                i,
                j,
                self.sentence_id,
                &mut self.stats,
            ),
        }
    }

    /// Worklist closure over unary rules (S -> X, NP -> NN, ...). Each
    /// newly created node re-enters the queue unless its LHS was already
    /// expanded over this span; cyclic unary grammars terminate because a
    /// repeated LHS is never re-queued, at the cost of possibly missing a
    /// cheaper derivation through a longer unary chain.
    fn add_unary_nodes(&mut self, i: usize, j: usize) {
        let Some(cell) = self.cells.get_mut(i, j) else { return };
        let mut queue: VecDeque<NodeId> =
            cell.sorted_nodes(&self.arena).iter().copied().collect();
        let mut seen_lhs: HashSet<Symbol> = HashSet::new();
        let source_len = self.lattice.source_len();

        while let Some(node_id) = queue.pop_front() {
            seen_lhs.insert(self.arena[node_id].lhs);
            for grammar in self.grammars {
                if !grammar.has_rule_for_span(i, j, source_len) {
                    continue;
                }
                let rules = grammar
                    .trie_root()
                    .match_symbol(self.arena[node_id].lhs)
                    .and_then(|t| t.rule_collection())
                    .filter(|c| c.arity() == 1)
                    .map(|c| c.sorted_rules().to_vec())
                    .unwrap_or_default();
                for rule in rules {
                    let result = compute_node_result(
                        self.features,
                        &rule,
                        &[node_id],
                        &self.arena,
                        i,
                        j,
                        SourcePath::default(),
                        self.sentence_id,
                    );
                    self.stats.computed_results += 1;
                    if let Some(constraint) = self.constraint {
                        if !constraint.permits(&result.states) {
                            continue;
                        }
                    }
                    let added = cell.add_hyperedge(
                        rule.lhs,
                        result,
                        Some(rule.clone()),
                        vec![node_id],
                        SourcePath::default(),
                        &mut self.arena,
                        &mut self.stats,
                    );
                    if let Some(new_id) = added {
                        if !seen_lhs.contains(&self.arena[new_id].lhs) {
                            queue.push_back(new_id);
                        }
                    }
                }
            }
        }
    }
}
