//! Per-sentence chart counters, reported once at the end of a parse.

use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChartStats {
    /// Nodes created (supersede replacements included).
    pub added_nodes: usize,
    /// Hyperedges merged into an existing node.
    pub merged_nodes: usize,
    /// Candidate edges discarded before node creation (fail-fast).
    pub prepruned_edges: usize,
    /// Live nodes evicted by beam pruning.
    pub pruned_nodes: usize,
    /// Dotted items created across all dot charts.
    pub dot_nodes: usize,
    /// Rule applications scored by the model.
    pub computed_results: usize,
    /// Cube-pruning pops actually performed.
    pub cube_pops: usize,
    /// Spans whose pop budget ran out.
    pub pop_limited_spans: usize,
    /// Frontier states abandoned when the best pop fell past the cutoff.
    pub prepruned_fuzz1: usize,
    /// Neighbor states never pushed because they scored past the cutoff.
    pub prepruned_fuzz2: usize,
}

impl ChartStats {
    pub fn report(&self, sentence_id: usize) {
        debug!(
            sentence_id,
            added = self.added_nodes,
            merged = self.merged_nodes,
            prepruned = self.prepruned_edges,
            pruned = self.pruned_nodes,
            dotted = self.dot_nodes,
            computed = self.computed_results,
            pops = self.cube_pops,
            pop_limited = self.pop_limited_spans,
            fuzz1 = self.prepruned_fuzz1,
            fuzz2 = self.prepruned_fuzz2,
            "chart statistics"
        );
    }
}
