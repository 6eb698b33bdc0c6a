//! Synchronous grammar access: rules, rule collections, and the trie
//! interface the chart walks during dotted-rule matching.
//!
//! The chart consumes grammars read-only through the `Grammar` and `Trie`
//! traits. `MemoryGrammar` is the in-memory implementation used for
//! loaded text grammars and the synthetic OOV grammar.

mod memory;

pub use memory::MemoryGrammar;

use std::sync::Arc;

use crate::feature::Feature;
use crate::vocab::{self, Symbol};

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("malformed rule line {line}: {reason}")]
    MalformedRule { line: usize, reason: String },
    #[error("rule target references nonterminal {index} but source has arity {arity}")]
    BadCoindex { index: usize, arity: usize },
}

/// One token on a rule's target side. Nonterminals reference the k-th
/// source nonterminal (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetToken {
    Word(Symbol),
    Nonterminal(usize),
}

/// A synchronous rule. `feature_scores` are the precomputed dense scores
/// consumed by the phrase-model feature; `estimated_cost` is filled in by
/// `MemoryGrammar::finalize` and orders rules inside a collection.
#[derive(Debug, Clone)]
pub struct Rule {
    pub lhs: Symbol,
    pub source: Vec<Symbol>,
    pub target: Vec<TargetToken>,
    pub feature_scores: Vec<f32>,
    pub arity: usize,
    pub estimated_cost: f64,
}

impl Rule {
    pub fn new(
        lhs: Symbol,
        source: Vec<Symbol>,
        target: Vec<TargetToken>,
        feature_scores: Vec<f32>,
    ) -> Rule {
        let arity = source.iter().filter(|s| s.is_nonterminal()).count();
        Rule {
            lhs,
            source,
            target,
            feature_scores,
            arity,
            estimated_cost: 0.0,
        }
    }

    /// Sum of weighted per-feature estimates; used only for sorting rules
    /// inside a collection, never for model scores.
    pub fn estimate_cost(&mut self, features: &[Feature]) {
        self.estimated_cost = features.iter().map(|f| f.weighted_estimate(self)).sum();
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] |||", vocab::word(self.lhs))?;
        for s in &self.source {
            if s.is_nonterminal() {
                write!(f, " [{}]", vocab::word(*s))?;
            } else {
                write!(f, " {}", vocab::word(*s))?;
            }
        }
        write!(f, " |||")?;
        for t in &self.target {
            match t {
                TargetToken::Word(w) => write!(f, " {}", vocab::word(*w))?,
                TargetToken::Nonterminal(k) => write!(f, " [{}]", k + 1)?,
            }
        }
        Ok(())
    }
}

/// All rules sharing one source side, pre-sorted by estimated cost.
///
/// Sorting happens once in `MemoryGrammar::finalize`; the cube-pruning
/// seed step relies on `sorted_rules()[0]` being the cheapest rule.
#[derive(Debug, Default)]
pub struct RuleCollection {
    rules: Vec<Arc<Rule>>,
    arity: usize,
    sorted: bool,
}

impl RuleCollection {
    pub(crate) fn push(&mut self, rule: Rule) {
        self.arity = rule.arity;
        self.rules.push(Arc::new(rule));
        self.sorted = false;
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in ascending estimated-cost order.
    pub fn sorted_rules(&self) -> &[Arc<Rule>] {
        debug_assert!(self.sorted, "rule collection used before finalize()");
        &self.rules
    }

    pub(crate) fn finalize(&mut self, features: &[Feature]) {
        for rule in &mut self.rules {
            Arc::make_mut(rule).estimate_cost(features);
        }
        self.rules
            .sort_by(|a, b| a.estimated_cost.total_cmp(&b.estimated_cost));
        self.sorted = true;
    }
}

/// A node in a grammar's source-side prefix trie.
pub trait Trie {
    /// Child reached by consuming `sym`, or None.
    fn match_symbol(&self, sym: Symbol) -> Option<&dyn Trie>;

    /// Rules completed exactly at this node.
    fn rule_collection(&self) -> Option<&RuleCollection>;

    /// Whether any longer source side extends past this node.
    fn has_extensions(&self) -> bool;

    /// All terminal-labelled children. Only walked under regex terminal
    /// matching, which is documented as expensive.
    fn terminal_children(&self) -> Vec<(Symbol, &dyn Trie)>;

    /// All nonterminal-labelled children. Only walked under soft-syntactic
    /// matching.
    fn nonterminal_children(&self) -> Vec<(Symbol, &dyn Trie)>;
}

pub trait Grammar: Send + Sync {
    fn trie_root(&self) -> &dyn Trie;

    /// Whether this grammar applies to the given span at all (e.g. glue
    /// grammars are unrestricted, OOV grammars cover single words).
    fn has_rule_for_span(&self, i: usize, j: usize, source_len: usize) -> bool;

    /// When true, terminal trie arcs are regular expressions matched
    /// against the token's surface string.
    fn regex_terminals(&self) -> bool {
        false
    }
}
