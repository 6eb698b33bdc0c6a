//! Shared fixtures for the chart tests: small grammars, feature sets,
//! and a one-call decode helper.

use crate::chart::stats::ChartStats;
use crate::chart::Chart;
use crate::feature::builtin::{BoundaryWords, PhraseModel, SourcePathCost, WordPenalty};
use crate::feature::Feature;
use crate::grammar::{Grammar, MemoryGrammar};
use crate::hypergraph::{HGNode, HyperGraph, NodeId};
use crate::lattice::Lattice;
use crate::settings::Settings;
use crate::vocab::{self, Symbol};

/// Monotone glue grammar: the goal symbol absorbs default-nonterminal
/// items left to right at zero cost.
pub(crate) const GLUE: &str = "\
[GOAL] ||| [X,1] ||| [X,1] ||| 0.0
[GOAL] ||| [GOAL,1] [X,2] ||| [GOAL,1] [X,2] ||| 0.0";

pub(crate) fn features() -> Vec<Feature> {
    vec![
        Feature::stateless("phrase", 1.0, PhraseModel::new(0)),
        Feature::stateless("wordpenalty", 0.0, WordPenalty),
        Feature::stateless("sourcepath", 1.0, SourcePathCost),
    ]
}

pub(crate) fn features_with_boundary(order: usize) -> Vec<Feature> {
    let mut fs = features();
    fs.push(Feature::stateful("boundary", 1.0, BoundaryWords::new(order)));
    fs
}

pub(crate) fn grammar(text: &str, features: &[Feature]) -> MemoryGrammar {
    let mut g = MemoryGrammar::from_text(text).expect("test grammar parses");
    g.finalize(features);
    g
}

pub(crate) fn glue(features: &[Feature]) -> MemoryGrammar {
    grammar(GLUE, features)
}

pub(crate) fn decode(
    grammars: &[&dyn Grammar],
    sentence: &[&str],
    features: &[Feature],
    settings: &Settings,
) -> (Option<HyperGraph>, ChartStats) {
    let lattice = Lattice::from_sentence(sentence);
    let mut chart = Chart::new(&lattice, grammars, features, settings, 0);
    let hypergraph = chart.expand();
    (hypergraph, chart.stats().clone())
}

pub(crate) fn target_words(hg: &HyperGraph) -> Vec<String> {
    hg.viterbi_target().iter().map(|s| vocab::word(*s)).collect()
}

/// Live nodes with the given left-hand side, in arena order.
pub(crate) fn live_nodes_with_lhs<'a>(
    hg: &'a HyperGraph,
    lhs: &str,
) -> Vec<(NodeId, &'a HGNode)> {
    let lhs: Symbol = vocab::nonterminal(lhs);
    hg.arena
        .iter()
        .filter(|(_, node)| !node.dead && node.lhs == lhs)
        .collect()
}
