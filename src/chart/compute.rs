//! Model scoring of one rule application over chosen antecedents.
//!
//! This is the single place where feature weights, stateless costs,
//! stateful transitions, and antecedent Viterbi costs are combined into
//! the numbers a new hyperedge and node carry.

use crate::feature::{DpState, Feature, FeatureId, ScoreContext, StateMap};
use crate::grammar::Rule;
use crate::hypergraph::{NodeArena, NodeId};
use crate::lattice::SourcePath;

/// Outcome of scoring one rule application.
#[derive(Debug)]
pub struct NodeResult {
    /// Cost contributed by this application alone.
    pub transition_cost: f64,
    /// Transition cost plus the antecedents' Viterbi costs.
    pub viterbi_cost: f64,
    /// Viterbi cost plus the stateful features' outside estimates; used
    /// only for pruning and cube ordering.
    pub pruning_estimate: f64,
    /// States produced by the stateful features, in feature-list order.
    pub states: StateMap,
}

pub fn compute_node_result(
    features: &[Feature],
    rule: &Rule,
    tails: &[NodeId],
    arena: &NodeArena,
    i: usize,
    j: usize,
    src_path: SourcePath,
    sentence_id: usize,
) -> NodeResult {
    let ctx = ScoreContext { i, j, sentence_id };
    let mut transition = 0.0;
    let mut estimate = 0.0;
    let mut states: StateMap = Vec::new();

    for (fid, feature) in features.iter().enumerate() {
        let fid = fid as FeatureId;
        match feature {
            Feature::Stateless(f) => {
                transition += f.weight * f.scorer.cost(rule, ctx, &src_path);
            }
            Feature::Stateful(f) => {
                let tail_states: Vec<&DpState> = tails
                    .iter()
                    .map(|&t| {
                        arena[t].state(fid).unwrap_or_else(|| {
                            panic!(
                                "stateful feature {:?} has no state on antecedent over ({}, {})",
                                f.name, arena[t].i, arena[t].j
                            )
                        })
                    })
                    .collect();
                let t = f.scorer.transition(rule, &tail_states, ctx, &src_path);
                transition += f.weight * t.cost;
                estimate += f.weight * t.estimate;
                states.push((fid, t.state));
            }
        }
    }

    let tail_cost: f64 = tails.iter().map(|&t| arena[t].best_cost).sum();
    let viterbi = transition + tail_cost;
    NodeResult {
        transition_cost: transition,
        viterbi_cost: viterbi,
        pruning_estimate: viterbi + estimate,
        states,
    }
}

/// One-time cost of closing out a derivation whose root carries `states`;
/// charged on the goal edge.
pub fn compute_final_cost(
    features: &[Feature],
    states: &StateMap,
    i: usize,
    j: usize,
    sentence_id: usize,
) -> f64 {
    let ctx = ScoreContext { i, j, sentence_id };
    let mut cost = 0.0;
    for (fid, feature) in features.iter().enumerate() {
        if let Feature::Stateful(f) = feature {
            if let Some(state) = crate::feature::state_for(states, fid as FeatureId) {
                cost += f.weight * f.scorer.final_cost(state, ctx);
            }
        }
    }
    cost
}
