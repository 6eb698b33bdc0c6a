//! Input lattice over source positions, plus the per-path cost accumulator.
//!
//! A plain sentence becomes a linear chain of unit arcs with zero cost.
//! Confusion networks and word lattices use `from_arcs` with explicit
//! arc costs and lengths.

use crate::vocab::{self, Symbol};

/// One labelled arc between two lattice positions.
#[derive(Debug, Clone, Copy)]
pub struct LatticeArc {
    pub label: Symbol,
    /// Start position (inclusive).
    pub head: usize,
    /// End position (exclusive); `tail - head` is the arc length.
    pub tail: usize,
    pub cost: f32,
}

/// Immutable accumulator of lattice-arc cost along one traversal path.
///
/// `extend` returns a new value; a zero-cost arc returns `self` unchanged,
/// so linear-sentence decoding never allocates path state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourcePath(f32);

impl SourcePath {
    pub fn cost(self) -> f32 {
        self.0
    }

    pub fn extend(self, arc: &LatticeArc) -> SourcePath {
        if arc.cost == 0.0 {
            self
        } else {
            SourcePath(self.0 + arc.cost)
        }
    }

    /// Nonterminal advances do not traverse a lattice arc.
    pub fn extend_nonterminal(self) -> SourcePath {
        self
    }
}

/// The input: positions `0..=source_len`, arcs between them.
pub struct Lattice {
    positions: usize,
    outgoing: Vec<Vec<LatticeArc>>,
    /// reachable[i][j] = some arc path crosses exactly (i, j).
    reachable: Vec<Vec<bool>>,
}

impl Lattice {
    /// Linear chain over a tokenized sentence; every arc has unit length
    /// and zero cost.
    pub fn from_sentence(tokens: &[&str]) -> Lattice {
        let arcs = tokens
            .iter()
            .enumerate()
            .map(|(i, tok)| LatticeArc {
                label: vocab::terminal(tok),
                head: i,
                tail: i + 1,
                cost: 0.0,
            })
            .collect();
        Lattice::from_arcs(tokens.len() + 1, arcs)
    }

    pub fn from_arcs(positions: usize, arcs: Vec<LatticeArc>) -> Lattice {
        assert!(positions >= 1, "lattice needs at least one position");
        let mut outgoing = vec![Vec::new(); positions];
        for arc in arcs {
            assert!(arc.head < arc.tail && arc.tail < positions, "bad arc span");
            outgoing[arc.head].push(arc);
        }
        let reachable = compute_reachability(positions, &outgoing);
        Lattice {
            positions,
            outgoing,
            reachable,
        }
    }

    /// Number of source positions minus one, i.e. sentence length for a
    /// linear chain.
    pub fn source_len(&self) -> usize {
        self.positions - 1
    }

    pub fn outgoing(&self, position: usize) -> &[LatticeArc] {
        &self.outgoing[position]
    }

    /// Whether any arc path leads from position `i` to position `j`.
    /// Spans with no path are skipped entirely by the chart.
    pub fn has_path(&self, i: usize, j: usize) -> bool {
        self.reachable[i][j]
    }
}

fn compute_reachability(positions: usize, outgoing: &[Vec<LatticeArc>]) -> Vec<Vec<bool>> {
    let mut reach = vec![vec![false; positions]; positions];
    for i in 0..positions {
        reach[i][i] = true;
    }
    // Arcs only go forward, so one pass per start position suffices when
    // intermediate positions are visited in increasing order.
    for i in 0..positions {
        for k in i..positions {
            if !reach[i][k] {
                continue;
            }
            for arc in &outgoing[k] {
                reach[i][arc.tail] = true;
            }
        }
    }
    reach
}
