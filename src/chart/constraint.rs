//! Forced-decoding state constraint.
//!
//! When a target reference is supplied, candidates whose n-gram boundary
//! state could not occur inside the (padded) reference are filtered out
//! before materialization. The check is a necessary condition only: it
//! never blocks search, it just keeps impossible hypotheses out of the
//! chart.

use crate::feature::{DpState, StateMap};
use crate::vocab::{self, Symbol};

pub const START_SYMBOL: &str = "<s>";
pub const STOP_SYMBOL: &str = "</s>";

pub struct StateConstraint {
    reference: Vec<Symbol>,
}

impl StateConstraint {
    /// Build a constraint over a reference translation, padded with the
    /// sentence boundary markers.
    pub fn new(reference: &[&str]) -> StateConstraint {
        let mut padded = Vec::with_capacity(reference.len() + 2);
        padded.push(vocab::terminal(START_SYMBOL));
        padded.extend(reference.iter().map(|w| vocab::terminal(*w)));
        padded.push(vocab::terminal(STOP_SYMBOL));
        StateConstraint { reference: padded }
    }

    /// Whether a node with these feature states could be part of a
    /// derivation of the reference: every n-gram state's left context
    /// must occur contiguously in the reference, its right context must
    /// occur no earlier. Non-ngram states are not constrained.
    pub fn permits(&self, states: &StateMap) -> bool {
        for (_, state) in states {
            if let DpState::Ngram { left, right } = state {
                let left_at = match find_contiguous(&self.reference, left, 0) {
                    Some(pos) => pos,
                    None => return false,
                };
                if find_contiguous(&self.reference, right, left_at).is_none() {
                    return false;
                }
            }
        }
        true
    }
}

/// First index >= `from` where `needle` occurs contiguously in `haystack`.
/// An empty needle matches anywhere.
fn find_contiguous(haystack: &[Symbol], needle: &[Symbol], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from);
    }
    if haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&pos| &haystack[pos..pos + needle.len()] == needle)
}
