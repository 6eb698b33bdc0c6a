//! Earley-style dotted-rule chart, one per grammar.
//!
//! A dot item records how far a rule's source side has been matched: the
//! trie node it has reached, the antecedent super-nodes consumed so far,
//! and the accumulated lattice path cost. Rules are implicitly binarized
//! by advancing the dot one symbol at a time, either over an input
//! terminal or over a nonterminal completed in the main chart.

use tracing::trace;

use crate::grammar::{Grammar, Trie};
use crate::lattice::{Lattice, SourcePath};
use crate::settings::MatchPolicy;
use crate::vocab::{self, Symbol};

use super::cell::CellGrid;
use super::stats::ChartStats;

/// Weak reference to a super-node: resolved against the cell grid when
/// the dotted rule is completed. Holding the span and LHS instead of node
/// ids keeps dot items valid across later pruning of the referenced cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperRef {
    pub start: usize,
    pub end: usize,
    pub lhs: Symbol,
}

#[derive(Clone)]
pub struct DotNode<'g> {
    pub trie: &'g dyn Trie,
    pub antecedents: Vec<SuperRef>,
    pub src_path: SourcePath,
}

#[derive(Default)]
pub struct DotCell<'g> {
    pub nodes: Vec<DotNode<'g>>,
}

pub struct DotChart<'g> {
    grammar: &'g dyn Grammar,
    positions: usize,
    source_len: usize,
    cells: Vec<Option<DotCell<'g>>>,
    policy: MatchPolicy,
    /// Labels that must match exactly even under soft-syntactic matching.
    exempt: Vec<Symbol>,
}

impl<'g> DotChart<'g> {
    /// Build a dot chart and seed an initial item at every position the
    /// grammar applies to.
    pub fn new(
        grammar: &'g dyn Grammar,
        lattice: &Lattice,
        policy: MatchPolicy,
        exempt: Vec<Symbol>,
        stats: &mut ChartStats,
    ) -> DotChart<'g> {
        let source_len = lattice.source_len();
        let positions = source_len + 1;
        let mut chart = DotChart {
            grammar,
            positions,
            source_len,
            cells: (0..positions * positions).map(|_| None).collect(),
            policy,
            exempt,
        };
        for i in 0..source_len {
            if grammar.has_rule_for_span(i, i, source_len) {
                chart.add_dot_item(
                    grammar.trie_root(),
                    i,
                    i,
                    Vec::new(),
                    SourcePath::default(),
                    stats,
                );
            }
        }
        chart
    }

    pub fn dot_cell(&self, i: usize, j: usize) -> Option<&DotCell<'g>> {
        self.cells[i * self.positions + j].as_ref()
    }

    pub fn grammar(&self) -> &'g dyn Grammar {
        self.grammar
    }

    /// Advance dots across span (i, j): nonterminal advances for every
    /// split point strictly inside the span, then terminal advances over
    /// lattice arcs leaving position j-1.
    pub fn expand_dot_cell(
        &mut self,
        lattice: &Lattice,
        cells: &CellGrid,
        i: usize,
        j: usize,
        stats: &mut ChartStats,
    ) {
        for k in i + 1..j {
            self.extend_with_proved(i, k, j, false, cells, stats);
        }

        for arc in lattice.outgoing(j - 1) {
            let sources = match self.dot_cell(i, j - 1) {
                Some(cell) => cell.nodes.clone(),
                None => continue,
            };
            for dot in sources {
                if self.grammar.regex_terminals() {
                    let surface = vocab::word(arc.label);
                    for (pattern, child) in dot.trie.terminal_children() {
                        if regex_matches(&vocab::word(pattern), &surface) {
                            self.add_dot_item(
                                child,
                                i,
                                arc.tail,
                                dot.antecedents.clone(),
                                dot.src_path.extend(arc),
                                stats,
                            );
                        }
                    }
                } else if let Some(child) = dot.trie.match_symbol(arc.label) {
                    self.add_dot_item(
                        child,
                        i,
                        arc.tail,
                        dot.antecedents.clone(),
                        dot.src_path.extend(arc),
                        stats,
                    );
                }
            }
        }
    }

    /// Seed dot items beginning with a nonterminal just completed over
    /// (i, j). Skips childless trie nodes: a complete unary rule starting
    /// at its own span would otherwise re-derive itself forever.
    pub fn start_dot_items(
        &mut self,
        cells: &CellGrid,
        i: usize,
        j: usize,
        stats: &mut ChartStats,
    ) {
        self.extend_with_proved(i, i, j, true, cells, stats);
    }

    fn extend_with_proved(
        &mut self,
        i: usize,
        k: usize,
        j: usize,
        skip_unary: bool,
        cells: &CellGrid,
        stats: &mut ChartStats,
    ) {
        let proved: Vec<Symbol> = match cells.get(k, j) {
            Some(cell) => cell.super_nodes().map(|s| s.lhs).collect(),
            None => return,
        };
        let sources = match self.dot_cell(i, k) {
            Some(cell) => cell.nodes.clone(),
            None => return,
        };
        for dot in &sources {
            for &lhs in &proved {
                for child in self.matching_children(dot.trie, lhs) {
                    if skip_unary && !child.has_extensions() {
                        continue;
                    }
                    let mut antecedents = dot.antecedents.clone();
                    antecedents.push(SuperRef { start: k, end: j, lhs });
                    self.add_dot_item(
                        child,
                        i,
                        j,
                        antecedents,
                        dot.src_path.extend_nonterminal(),
                        stats,
                    );
                }
            }
        }
    }

    /// Trie children that accept a completed nonterminal under the active
    /// match policy.
    fn matching_children(&self, trie: &'g dyn Trie, lhs: Symbol) -> Vec<&'g dyn Trie> {
        match self.policy {
            MatchPolicy::Strict => trie.match_symbol(lhs).into_iter().collect(),
            MatchPolicy::SoftSyntactic => {
                if self.exempt.contains(&lhs) {
                    return trie.match_symbol(lhs).into_iter().collect();
                }
                trie.nonterminal_children()
                    .into_iter()
                    .filter(|(label, _)| !self.exempt.contains(label) || *label == lhs)
                    .map(|(_, child)| child)
                    .collect()
            }
        }
    }

    fn add_dot_item(
        &mut self,
        trie: &'g dyn Trie,
        i: usize,
        j: usize,
        antecedents: Vec<SuperRef>,
        src_path: SourcePath,
        stats: &mut ChartStats,
    ) {
        let slot = i * self.positions + j;
        self.cells[slot]
            .get_or_insert_with(DotCell::default)
            .nodes
            .push(DotNode {
                trie,
                antecedents,
                src_path,
            });
        stats.dot_nodes += 1;
        trace!(i, j, "added dot item");
    }
}

fn regex_matches(pattern: &str, surface: &str) -> bool {
    match regex::Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => re.is_match(surface),
        Err(_) => pattern == surface,
    }
}
