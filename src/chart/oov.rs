//! Synthetic grammar covering out-of-vocabulary input tokens.
//!
//! Every distinct token in the lattice gets a unary rule under the
//! default nonterminal so the chart can always cover the input. The
//! resulting grammar rides through the normal dot-chart machinery like
//! any other grammar.

use std::collections::HashSet;

use tracing::debug;

use crate::feature::Feature;
use crate::grammar::{Grammar, MemoryGrammar, Rule, TargetToken};
use crate::lattice::Lattice;
use crate::settings::OovSettings;
use crate::vocab::{self, Symbol};

/// Suffix appended to the target side when `mark_oovs` is set.
pub const OOV_MARK: &str = "_OOV";

pub fn build_oov_grammar(
    lattice: &Lattice,
    grammars: &[&dyn Grammar],
    oov: &OovSettings,
    default_nonterminal: &str,
    features: &[Feature],
) -> MemoryGrammar {
    let lhs = vocab::nonterminal(default_nonterminal);
    let mut seen: HashSet<Symbol> = HashSet::new();
    let mut grammar = MemoryGrammar::new();
    let mut rule_count = 0usize;

    for position in 0..lattice.source_len() {
        for arc in lattice.outgoing(position) {
            let word = arc.label;
            if !seen.insert(word) {
                continue;
            }
            if oov.true_oovs_only && known_to_any(grammars, word) {
                continue;
            }
            for target in targets(oov, word) {
                grammar.add_rule(Rule::new(
                    lhs,
                    vec![word],
                    vec![TargetToken::Word(target)],
                    Vec::new(),
                ));
                rule_count += 1;
            }
        }
    }

    grammar.finalize(features);
    debug!(rule_count, "built OOV grammar");
    grammar
}

fn known_to_any(grammars: &[&dyn Grammar], word: Symbol) -> bool {
    grammars.iter().any(|g| {
        g.trie_root()
            .match_symbol(word)
            .and_then(|t| t.rule_collection())
            .is_some_and(|c| !c.is_empty())
    })
}

fn targets(oov: &OovSettings, word: Symbol) -> Vec<Symbol> {
    if !oov.substitutions.is_empty() {
        return oov.substitutions.iter().map(|s| vocab::terminal(s)).collect();
    }
    if oov.mark_oovs {
        vec![vocab::terminal(&format!("{}{}", vocab::word(word), OOV_MARK))]
    } else {
        vec![word]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn rules_for(g: &MemoryGrammar, word: &str) -> Vec<String> {
        g.trie_root()
            .match_symbol(vocab::terminal(word))
            .and_then(|t| t.rule_collection())
            .map(|c| c.sorted_rules().iter().map(|r| r.to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn every_token_gets_an_identity_rule() {
        let lat = Lattice::from_sentence(&["foo", "bar", "foo"]);
        let oov = Settings::default().oov;
        let g = build_oov_grammar(&lat, &[], &oov, "X", &[]);
        assert_eq!(g.rule_count(), 2);
        assert_eq!(rules_for(&g, "foo"), vec!["[X] ||| foo ||| foo"]);
        assert_eq!(rules_for(&g, "bar"), vec!["[X] ||| bar ||| bar"]);
    }

    #[test]
    fn true_oovs_only_skips_covered_tokens() {
        let mut known = MemoryGrammar::from_text("[X] ||| foo ||| covered ||| 0.0").unwrap();
        known.finalize(&[]);
        let lat = Lattice::from_sentence(&["foo", "bar"]);
        let mut oov = Settings::default().oov;
        oov.true_oovs_only = true;
        let g = build_oov_grammar(&lat, &[&known], &oov, "X", &[]);
        assert!(rules_for(&g, "foo").is_empty());
        assert_eq!(rules_for(&g, "bar"), vec!["[X] ||| bar ||| bar"]);
    }

    #[test]
    fn mark_oovs_suffixes_target() {
        let lat = Lattice::from_sentence(&["foo"]);
        let mut oov = Settings::default().oov;
        oov.mark_oovs = true;
        let g = build_oov_grammar(&lat, &[], &oov, "X", &[]);
        assert_eq!(rules_for(&g, "foo"), vec!["[X] ||| foo ||| foo_OOV"]);
    }

    #[test]
    fn substitutions_replace_identity_targets() {
        let lat = Lattice::from_sentence(&["foo"]);
        let mut oov = Settings::default().oov;
        oov.substitutions = vec![",".to_string(), ".".to_string()];
        let g = build_oov_grammar(&lat, &[], &oov, "X", &[]);
        assert_eq!(g.rule_count(), 2);
        assert_eq!(rules_for(&g, "foo").len(), 2);
    }
}
