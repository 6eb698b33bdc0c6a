//! Span completion: turning completed dotted rules into chart nodes.
//!
//! Two strategies. Cube pruning keeps a best-first frontier (`cand[v]` in
//! the literature) over the (rule rank, antecedent ranks) cube of every
//! dotted rule in the span and pops lazily; the exhaustive combiner
//! scores the whole cross product and only handles rules of arity <= 2.
//! Cube pruning is an approximation by construction: a state is only
//! discovered after one of its rank-predecessors has been popped, which
//! is the published algorithm, not a defect to correct.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::feature::Feature;
use crate::grammar::Rule;
use crate::hypergraph::{NodeArena, NodeId};
use crate::lattice::SourcePath;
use crate::settings::PruningSettings;

use super::cell::{Cell, CellGrid};
use super::compute::{compute_node_result, NodeResult};
use super::constraint::StateConstraint;
use super::dot_chart::DotChart;
use super::stats::ChartStats;

/// One completed dotted rule over the span, with its antecedent node
/// lists resolved from the grid (best-first, as the sub-span cells left
/// them).
pub(crate) struct RuleGroup {
    pub rules: Vec<Arc<Rule>>,
    pub ants: Vec<Vec<NodeId>>,
    pub src_path: SourcePath,
}

impl RuleGroup {
    fn arity(&self) -> usize {
        self.ants.len()
    }
}

/// Gather every grammar's completed dotted rules over (i, j). A dot item
/// whose super-node reference was entirely pruned away resolves to
/// nothing and is dropped.
pub(crate) fn collect_groups(
    dotcharts: &[DotChart<'_>],
    cells: &CellGrid,
    i: usize,
    j: usize,
    source_len: usize,
) -> Vec<RuleGroup> {
    let mut groups = Vec::new();
    for dots in dotcharts {
        if !dots.grammar().has_rule_for_span(i, j, source_len) {
            continue;
        }
        let Some(dot_cell) = dots.dot_cell(i, j) else { continue };
        'dots: for dot in &dot_cell.nodes {
            let Some(collection) = dot.trie.rule_collection() else { continue };
            if collection.is_empty() {
                continue;
            }
            debug_assert_eq!(collection.arity(), dot.antecedents.len());
            let mut ants = Vec::with_capacity(dot.antecedents.len());
            for super_ref in &dot.antecedents {
                let nodes = cells
                    .get(super_ref.start, super_ref.end)
                    .and_then(|cell| cell.super_node(super_ref.lhs))
                    .map(|s| s.nodes.clone());
                match nodes {
                    Some(nodes) if !nodes.is_empty() => ants.push(nodes),
                    _ => {
                        debug!(i, j, "dot item lost its antecedents to pruning");
                        continue 'dots;
                    }
                }
            }
            groups.push(RuleGroup {
                rules: collection.sorted_rules().to_vec(),
                ants,
                src_path: dot.src_path,
            });
        }
    }
    groups
}

struct CubeEntry {
    estimate: f64,
    group: usize,
    /// rank 0 selects the rule, rank d+1 the d-th antecedent.
    ranks: Vec<u32>,
    rule: Arc<Rule>,
    ants: Vec<NodeId>,
    result: NodeResult,
}

impl PartialEq for CubeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.estimate == other.estimate && self.group == other.group && self.ranks == other.ranks
    }
}
impl Eq for CubeEntry {}

impl Ord for CubeEntry {
    // Reversed on estimate: BinaryHeap is a max-heap, the frontier wants
    // the cheapest candidate on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.group.cmp(&self.group))
            .then_with(|| other.ranks.cmp(&self.ranks))
    }
}
impl PartialOrd for CubeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cube-pruning span completion over all groups at once: one frontier,
/// one pop budget for the whole span.
#[allow(clippy::too_many_arguments)]
pub(crate) fn cube_prune_span(
    groups: &[RuleGroup],
    cell: &mut Cell,
    arena: &mut NodeArena,
    features: &[Feature],
    pruning: &PruningSettings,
    constraint: Option<&StateConstraint>,
    i: usize,
    j: usize,
    sentence_id: usize,
    stats: &mut ChartStats,
) {
    let mut heap: BinaryHeap<CubeEntry> = BinaryHeap::new();
    let mut visited: HashSet<(usize, Vec<u32>)> = HashSet::new();

    for (g, group) in groups.iter().enumerate() {
        if group.arity() == 0 {
            // Zero-arity rules go straight into the cell; there is no cube
            // to explore.
            for rule in &group.rules {
                let result = compute_node_result(
                    features, rule, &[], arena, i, j, group.src_path, sentence_id,
                );
                stats.computed_results += 1;
                materialize(cell, arena, rule, &[], group.src_path, result, constraint, stats);
            }
            continue;
        }
        let ranks = vec![0u32; 1 + group.arity()];
        let rule = group.rules[0].clone();
        let ants: Vec<NodeId> = group.ants.iter().map(|list| list[0]).collect();
        let result =
            compute_node_result(features, &rule, &ants, arena, i, j, group.src_path, sentence_id);
        stats.computed_results += 1;
        visited.insert((g, ranks.clone()));
        heap.push(CubeEntry {
            estimate: result.pruning_estimate,
            group: g,
            ranks,
            rule,
            ants,
            result,
        });
    }

    let mut pops = 0usize;
    while let Some(entry) = heap.pop() {
        pops += 1;
        if pruning.pop_limit > 0 && pops > pruning.pop_limit {
            stats.pop_limited_spans += 1;
            break;
        }
        stats.cube_pops += 1;

        let group = &groups[entry.group];
        let estimate = entry.estimate;
        materialize(
            cell,
            arena,
            &entry.rule,
            &entry.ants,
            group.src_path,
            entry.result,
            constraint,
            stats,
        );

        // Pops are non-decreasing; once the best falls past the fuzzed
        // cutoff the rest of the frontier cannot recover.
        if estimate >= cell.cutoff() + pruning.fuzz1 {
            stats.prepruned_fuzz1 += heap.len();
            break;
        }

        for k in 0..entry.ranks.len() {
            let mut ranks = entry.ranks.clone();
            ranks[k] += 1;
            let within = if k == 0 {
                (ranks[0] as usize) < group.rules.len()
            } else {
                (ranks[k] as usize) < group.ants[k - 1].len()
            };
            if !within || !visited.insert((entry.group, ranks.clone())) {
                continue;
            }
            let rule = group.rules[ranks[0] as usize].clone();
            let ants: Vec<NodeId> = group
                .ants
                .iter()
                .enumerate()
                .map(|(d, list)| list[ranks[d + 1] as usize])
                .collect();
            let result = compute_node_result(
                features, &rule, &ants, arena, i, j, group.src_path, sentence_id,
            );
            stats.computed_results += 1;
            if result.pruning_estimate < cell.cutoff() + pruning.fuzz2 {
                heap.push(CubeEntry {
                    estimate: result.pruning_estimate,
                    group: entry.group,
                    ranks,
                    rule,
                    ants,
                    result,
                });
            } else {
                stats.prepruned_fuzz2 += 1;
            }
        }
    }
}

/// Exhaustive span completion: score every (rule, antecedent) combination
/// of every group. Only defined for rules of arity <= 2.
#[allow(clippy::too_many_arguments)]
pub(crate) fn exhaustive_span(
    groups: &[RuleGroup],
    cell: &mut Cell,
    arena: &mut NodeArena,
    features: &[Feature],
    constraint: Option<&StateConstraint>,
    i: usize,
    j: usize,
    sentence_id: usize,
    stats: &mut ChartStats,
) {
    for group in groups {
        for rule in &group.rules {
            match group.arity() {
                0 => {
                    let result = compute_node_result(
                        features, rule, &[], arena, i, j, group.src_path, sentence_id,
                    );
                    stats.computed_results += 1;
                    materialize(cell, arena, rule, &[], group.src_path, result, constraint, stats);
                }
                1 => {
                    for &a in &group.ants[0] {
                        let ants = [a];
                        let result = compute_node_result(
                            features, rule, &ants, arena, i, j, group.src_path, sentence_id,
                        );
                        stats.computed_results += 1;
                        materialize(
                            cell, arena, rule, &ants, group.src_path, result, constraint, stats,
                        );
                    }
                }
                2 => {
                    for &a in &group.ants[0] {
                        for &b in &group.ants[1] {
                            let ants = [a, b];
                            let result = compute_node_result(
                                features, rule, &ants, arena, i, j, group.src_path, sentence_id,
                            );
                            stats.computed_results += 1;
                            materialize(
                                cell, arena, rule, &ants, group.src_path, result, constraint,
                                stats,
                            );
                        }
                    }
                }
                arity => panic!(
                    "exhaustive combination is not defined for rules of arity {arity}"
                ),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn materialize(
    cell: &mut Cell,
    arena: &mut NodeArena,
    rule: &Arc<Rule>,
    ants: &[NodeId],
    src_path: SourcePath,
    result: NodeResult,
    constraint: Option<&StateConstraint>,
    stats: &mut ChartStats,
) {
    if let Some(constraint) = constraint {
        if !constraint.permits(&result.states) {
            return;
        }
    }
    cell.add_hyperedge(
        rule.lhs,
        result,
        Some(rule.clone()),
        ants.to_vec(),
        src_path,
        arena,
        stats,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::builtin::PhraseModel;
    use crate::grammar::TargetToken;
    use crate::hypergraph::HGNode;
    use crate::settings::Settings;
    use crate::vocab;

    fn features() -> Vec<Feature> {
        vec![Feature::stateless("phrase", 1.0, PhraseModel::new(0))]
    }

    fn rule(lhs: &str, score: f32, word: &str, arity: usize) -> Arc<Rule> {
        let mut source = vec![vocab::terminal(word)];
        let mut target = vec![TargetToken::Word(vocab::terminal(word))];
        for k in 0..arity {
            source.push(vocab::nonterminal("A"));
            target.push(TargetToken::Nonterminal(k));
        }
        let mut r = Rule::new(vocab::nonterminal(lhs), source, target, vec![score]);
        r.estimated_cost = score as f64;
        Arc::new(r)
    }

    fn ant(arena: &mut NodeArena, cost: f64, tag: u64) -> NodeId {
        let mut node = HGNode::new(
            0,
            1,
            vocab::nonterminal("A"),
            vec![(0, crate::feature::DpState::Value(tag))],
            0.0,
        );
        node.best_cost = cost;
        arena.alloc(node)
    }

    #[test]
    fn axiom_group_adds_every_rule() {
        let mut arena = NodeArena::default();
        let mut stats = ChartStats::default();
        let mut cell = Cell::new(0, 1, 30, 100.0);
        let groups = vec![RuleGroup {
            rules: vec![rule("X", 1.0, "a", 0), rule("Y", 2.0, "a", 0)],
            ants: vec![],
            src_path: SourcePath::default(),
        }];
        let pruning = Settings::default().pruning;
        cube_prune_span(
            &groups, &mut cell, &mut arena, &features(), &pruning, None, 0, 1, 0, &mut stats,
        );
        // Distinct LHSs, so two nodes; no cube pops happened.
        assert_eq!(cell.live_count(), 2);
        assert_eq!(stats.cube_pops, 0);
    }

    #[test]
    fn cube_explores_whole_small_cube_and_merges() {
        let mut arena = NodeArena::default();
        let mut stats = ChartStats::default();
        let mut cell = Cell::new(0, 2, 30, 100.0);
        let a1 = ant(&mut arena, 0.5, 1);
        let a2 = ant(&mut arena, 1.5, 2);
        let groups = vec![RuleGroup {
            rules: vec![rule("X", 1.0, "a", 1), rule("X", 2.0, "a", 1)],
            ants: vec![vec![a1, a2]],
            src_path: SourcePath::default(),
        }];
        let pruning = Settings::default().pruning;
        cube_prune_span(
            &groups, &mut cell, &mut arena, &features(), &pruning, None, 0, 2, 0, &mut stats,
        );
        // All four (rule, antecedent) states popped exactly once.
        assert_eq!(stats.cube_pops, 4);
        // The stateless feature gives every candidate the same signature,
        // so the cell holds one X node with four derivations.
        assert_eq!(cell.live_count(), 1);
        let id = cell.sorted_nodes(&arena)[0];
        assert_eq!(arena[id].edges.len(), 4);
        assert_eq!(arena[id].best_cost, 1.5);
    }

    #[test]
    fn pop_limit_caps_span_work() {
        let mut arena = NodeArena::default();
        let mut stats = ChartStats::default();
        let mut cell = Cell::new(0, 2, 30, 100.0);
        let a1 = ant(&mut arena, 0.5, 1);
        let a2 = ant(&mut arena, 1.5, 2);
        let groups = vec![RuleGroup {
            rules: vec![rule("X", 1.0, "a", 1), rule("X", 2.0, "a", 1)],
            ants: vec![vec![a1, a2]],
            src_path: SourcePath::default(),
        }];
        let mut pruning = Settings::default().pruning;
        pruning.pop_limit = 1;
        cube_prune_span(
            &groups, &mut cell, &mut arena, &features(), &pruning, None, 0, 2, 0, &mut stats,
        );
        assert_eq!(stats.cube_pops, 1);
        assert_eq!(stats.pop_limited_spans, 1);
        let id = cell.sorted_nodes(&arena)[0];
        assert_eq!(arena[id].edges.len(), 1);
    }

    #[test]
    fn constraint_filters_materialization_but_not_search() {
        let mut arena = NodeArena::default();
        let mut stats = ChartStats::default();
        let mut cell = Cell::new(0, 2, 30, 100.0);
        let a1 = ant(&mut arena, 0.5, 1);
        let groups = vec![RuleGroup {
            rules: vec![rule("X", 1.0, "a", 1), rule("X", 2.0, "a", 1)],
            ants: vec![vec![a1]],
            src_path: SourcePath::default(),
        }];
        // Reference contains none of the rule words, but the stateless
        // feature set yields no ngram state, so nothing is filtered; use a
        // stateful feature to produce a foreign boundary state.
        let fs = vec![
            Feature::stateless("phrase", 1.0, PhraseModel::new(0)),
            Feature::stateful(
                "boundary",
                1.0,
                crate::feature::builtin::BoundaryWords::new(2),
            ),
        ];
        // Antecedent needs boundary state for the stateful feature.
        arena[a1].states.push((
            1,
            crate::feature::DpState::Ngram { left: vec![], right: vec![] },
        ));
        let constraint = StateConstraint::new(&["nothing", "matches"]);
        let pruning = Settings::default().pruning;
        cube_prune_span(
            &groups, &mut cell, &mut arena, &fs, &pruning, Some(&constraint), 0, 2, 0, &mut stats,
        );
        // Both states explored, neither materialized.
        assert_eq!(stats.cube_pops, 2);
        assert!(cell.is_empty());
    }

    #[test]
    fn exhaustive_covers_full_cross_product() {
        let mut arena = NodeArena::default();
        let mut stats = ChartStats::default();
        let mut cell = Cell::new(0, 2, 30, 100.0);
        let a1 = ant(&mut arena, 0.5, 1);
        let a2 = ant(&mut arena, 1.5, 2);
        let groups = vec![RuleGroup {
            rules: vec![rule("X", 1.0, "a", 2)],
            ants: vec![vec![a1, a2], vec![a1, a2]],
            src_path: SourcePath::default(),
        }];
        exhaustive_span(
            &groups, &mut cell, &mut arena, &features(), None, 0, 2, 0, &mut stats,
        );
        // 1 rule x 2 x 2 antecedents, all same signature.
        assert_eq!(cell.live_count(), 1);
        let id = cell.sorted_nodes(&arena)[0];
        assert_eq!(arena[id].edges.len(), 4);
        assert_eq!(arena[id].best_cost, 1.0 + 0.5 + 0.5);
    }

    #[test]
    #[should_panic(expected = "arity 3")]
    fn exhaustive_rejects_high_arity() {
        let mut arena = NodeArena::default();
        let mut stats = ChartStats::default();
        let mut cell = Cell::new(0, 2, 30, 100.0);
        let a1 = ant(&mut arena, 0.5, 1);
        let groups = vec![RuleGroup {
            rules: vec![rule("X", 1.0, "a", 3)],
            ants: vec![vec![a1], vec![a1], vec![a1]],
            src_path: SourcePath::default(),
        }];
        exhaustive_span(
            &groups, &mut cell, &mut arena, &features(), None, 0, 2, 0, &mut stats,
        );
    }
}
