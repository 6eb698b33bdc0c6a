//! Feature functions and their opaque dynamic-programming state.
//!
//! Statefulness is a closed two-variant split resolved when the feature
//! list is built: `Feature::Stateless` never contributes node state,
//! `Feature::Stateful` always does. Scoring code matches on the variant
//! once instead of asking each feature at every call.

pub mod builtin;

use crate::grammar::Rule;
use crate::lattice::SourcePath;
use crate::vocab::Symbol;

/// Index of a feature in the decoder's feature list. Doubles as the key
/// of per-node state maps.
pub type FeatureId = u16;

/// Opaque per-feature dynamic-programming state, compared and hashed for
/// node-signature purposes but never interpreted by the chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DpState {
    /// Boundary words of the node's target yield (n-gram style state).
    Ngram {
        left: Vec<Symbol>,
        right: Vec<Symbol>,
    },
    /// Catch-all scalar state for features that only need a small token.
    Value(u64),
}

/// Per-node state collection: (feature id, state) pairs in feature-list
/// order. Small enough that a sorted Vec beats a map.
pub type StateMap = Vec<(FeatureId, DpState)>;

/// Look up one feature's state in a node's state map.
pub fn state_for(states: &StateMap, id: FeatureId) -> Option<&DpState> {
    states
        .iter()
        .find_map(|(fid, st)| if *fid == id { Some(st) } else { None })
}

/// Everything a stateful feature reports for one rule application.
pub struct Transition {
    pub cost: f64,
    /// Future-cost estimate folded into the pruning score only.
    pub estimate: f64,
    pub state: DpState,
}

/// Span and sentence identity handed to scorers.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext {
    pub i: usize,
    pub j: usize,
    pub sentence_id: usize,
}

pub trait StatelessScorer: Send + Sync {
    fn cost(&self, rule: &Rule, ctx: ScoreContext, src_path: &SourcePath) -> f64;

    /// Context-free estimate used to pre-sort rules.
    fn estimate(&self, rule: &Rule) -> f64;
}

pub trait StatefulScorer: Send + Sync {
    /// Score one rule application and produce the resulting state.
    /// `tail_states` holds this feature's state for each antecedent, in
    /// tail order.
    fn transition(
        &self,
        rule: &Rule,
        tail_states: &[&DpState],
        ctx: ScoreContext,
        src_path: &SourcePath,
    ) -> Transition;

    /// Cost of finishing a derivation whose root carries `state`; applied
    /// once during the goal transition.
    fn final_cost(&self, state: &DpState, ctx: ScoreContext) -> f64;

    /// Context-free estimate used to pre-sort rules.
    fn estimate(&self, rule: &Rule) -> f64;
}

pub struct StatelessFeature {
    pub name: String,
    pub weight: f64,
    pub scorer: Box<dyn StatelessScorer>,
}

pub struct StatefulFeature {
    pub name: String,
    pub weight: f64,
    pub scorer: Box<dyn StatefulScorer>,
}

pub enum Feature {
    Stateless(StatelessFeature),
    Stateful(StatefulFeature),
}

impl Feature {
    pub fn stateless(
        name: &str,
        weight: f64,
        scorer: impl StatelessScorer + 'static,
    ) -> Feature {
        Feature::Stateless(StatelessFeature {
            name: name.to_string(),
            weight,
            scorer: Box::new(scorer),
        })
    }

    pub fn stateful(name: &str, weight: f64, scorer: impl StatefulScorer + 'static) -> Feature {
        Feature::Stateful(StatefulFeature {
            name: name.to_string(),
            weight,
            scorer: Box::new(scorer),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Feature::Stateless(f) => &f.name,
            Feature::Stateful(f) => &f.name,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Feature::Stateless(f) => f.weight,
            Feature::Stateful(f) => f.weight,
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self, Feature::Stateful(_))
    }

    pub(crate) fn weighted_estimate(&self, rule: &Rule) -> f64 {
        match self {
            Feature::Stateless(f) => f.weight * f.scorer.estimate(rule),
            Feature::Stateful(f) => f.weight * f.scorer.estimate(rule),
        }
    }
}
