//! Built-in feature functions. Enough to decode and to exercise the
//! chart; heavyweight models live behind the same traits.

use crate::grammar::{Rule, TargetToken};
use crate::lattice::SourcePath;
use crate::vocab::Symbol;

use super::{DpState, ScoreContext, StatefulScorer, StatelessScorer, Transition};

/// Reads one column of a rule's dense feature scores.
pub struct PhraseModel {
    column: usize,
}

impl PhraseModel {
    pub fn new(column: usize) -> PhraseModel {
        PhraseModel { column }
    }

    fn score(&self, rule: &Rule) -> f64 {
        rule.feature_scores
            .get(self.column)
            .copied()
            .unwrap_or(0.0) as f64
    }
}

impl StatelessScorer for PhraseModel {
    fn cost(&self, rule: &Rule, _ctx: ScoreContext, _src_path: &SourcePath) -> f64 {
        self.score(rule)
    }

    fn estimate(&self, rule: &Rule) -> f64 {
        self.score(rule)
    }
}

/// Counts target-side words. Cost is the count itself; a negative weight
/// turns it into the usual brevity bonus.
pub struct WordPenalty;

impl WordPenalty {
    fn count(rule: &Rule) -> f64 {
        rule.target
            .iter()
            .filter(|t| matches!(t, TargetToken::Word(_)))
            .count() as f64
    }
}

impl StatelessScorer for WordPenalty {
    fn cost(&self, rule: &Rule, _ctx: ScoreContext, _src_path: &SourcePath) -> f64 {
        Self::count(rule)
    }

    fn estimate(&self, rule: &Rule) -> f64 {
        Self::count(rule)
    }
}

/// Charges each arc of the source path its lattice cost. On plain
/// sentences every arc is free and this contributes nothing.
pub struct SourcePathCost;

impl StatelessScorer for SourcePathCost {
    fn cost(&self, _rule: &Rule, _ctx: ScoreContext, src_path: &SourcePath) -> f64 {
        src_path.cost() as f64
    }

    fn estimate(&self, _rule: &Rule) -> f64 {
        0.0
    }
}

/// Stateful feature tracking up to `order - 1` boundary words on each side
/// of a node's target yield. Contributes no cost of its own; it exists so
/// nodes with different boundary words stay distinct in the chart, and as
/// the state plumbing a language model would attach to.
pub struct BoundaryWords {
    order: usize,
}

impl BoundaryWords {
    pub fn new(order: usize) -> BoundaryWords {
        assert!(order >= 1, "n-gram order must be at least 1");
        BoundaryWords { order }
    }
}

impl StatefulScorer for BoundaryWords {
    fn transition(
        &self,
        rule: &Rule,
        tail_states: &[&DpState],
        _ctx: ScoreContext,
        _src_path: &SourcePath,
    ) -> Transition {
        // Walk the target side left to right. `left` fills with the first
        // `keep` words of the yield and freezes once an antecedent hides
        // its middle; `right` always holds the last `keep` words seen.
        let keep = self.order - 1;
        let mut left: Vec<Symbol> = Vec::new();
        let mut right: Vec<Symbol> = Vec::new();
        let mut gap = false;

        fn emit(word: Symbol, keep: usize, gap: bool, left: &mut Vec<Symbol>, right: &mut Vec<Symbol>) {
            if !gap && left.len() < keep {
                left.push(word);
            }
            right.push(word);
            if right.len() > keep {
                right.remove(0);
            }
        }

        for tok in &rule.target {
            match tok {
                TargetToken::Word(w) => emit(*w, keep, gap, &mut left, &mut right),
                TargetToken::Nonterminal(k) => match tail_states[*k] {
                    DpState::Ngram { left: ant_left, right: ant_right } => {
                        for &w in ant_left {
                            emit(w, keep, gap, &mut left, &mut right);
                        }
                        if ant_left.len() >= keep {
                            // The antecedent may elide words between its
                            // boundaries; its right side is the exact
                            // suffix so far.
                            gap = true;
                            right.clear();
                            right.extend_from_slice(
                                &ant_right[ant_right.len().saturating_sub(keep)..],
                            );
                        }
                        // A shorter antecedent state is its entire yield,
                        // already emitted above.
                    }
                    other => panic!("boundary-words feature got foreign state {other:?}"),
                },
            }
        }
        Transition {
            cost: 0.0,
            estimate: 0.0,
            state: DpState::Ngram { left, right },
        }
    }

    fn final_cost(&self, _state: &DpState, _ctx: ScoreContext) -> f64 {
        0.0
    }

    fn estimate(&self, _rule: &Rule) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab;

    fn lex_rule(target_words: &[&str]) -> Rule {
        Rule::new(
            vocab::nonterminal("X"),
            vec![vocab::terminal("src")],
            target_words
                .iter()
                .map(|w| TargetToken::Word(vocab::terminal(w)))
                .collect(),
            vec![0.25, 1.5],
        )
    }

    #[test]
    fn phrase_model_reads_its_column() {
        let rule = lex_rule(&["a"]);
        let ctx = ScoreContext { i: 0, j: 1, sentence_id: 0 };
        assert_eq!(PhraseModel::new(0).cost(&rule, ctx, &SourcePath::default()), 0.25);
        assert_eq!(PhraseModel::new(1).cost(&rule, ctx, &SourcePath::default()), 1.5);
        // Missing column scores zero rather than erroring.
        assert_eq!(PhraseModel::new(9).cost(&rule, ctx, &SourcePath::default()), 0.0);
    }

    #[test]
    fn word_penalty_counts_only_words() {
        let mut rule = lex_rule(&["a", "b"]);
        rule.target.push(TargetToken::Nonterminal(0));
        let ctx = ScoreContext { i: 0, j: 1, sentence_id: 0 };
        assert_eq!(WordPenalty.cost(&rule, ctx, &SourcePath::default()), 2.0);
    }

    #[test]
    fn boundary_words_short_yield_shares_words() {
        let rule = lex_rule(&["the", "house"]);
        let ctx = ScoreContext { i: 0, j: 1, sentence_id: 0 };
        let t = BoundaryWords::new(3).transition(&rule, &[], ctx, &SourcePath::default());
        match t.state {
            DpState::Ngram { left, right } => {
                assert_eq!(left, vec![vocab::terminal("the"), vocab::terminal("house")]);
                assert_eq!(right, vec![vocab::terminal("the"), vocab::terminal("house")]);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn boundary_words_splices_antecedent_state() {
        // [X] -> s, target "the [X,1] house"
        let mut rule = lex_rule(&["the"]);
        rule.target.push(TargetToken::Nonterminal(0));
        rule.target.push(TargetToken::Word(vocab::terminal("house")));

        let tail = DpState::Ngram {
            left: vec![vocab::terminal("big")],
            right: vec![vocab::terminal("red")],
        };
        let ctx = ScoreContext { i: 0, j: 2, sentence_id: 0 };
        let t = BoundaryWords::new(2).transition(&rule, &[&tail], ctx, &SourcePath::default());
        match t.state {
            DpState::Ngram { left, right } => {
                assert_eq!(left, vec![vocab::terminal("the")]);
                assert_eq!(right, vec![vocab::terminal("house")]);
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(t.cost, 0.0);
    }

    #[test]
    fn boundary_words_track_trailing_words_after_a_gap() {
        // Target "[X,1] house": the antecedent saturates the left side, so
        // the trailing rule word must still end up as the right boundary.
        let mut rule = lex_rule(&[]);
        rule.target.push(TargetToken::Nonterminal(0));
        rule.target.push(TargetToken::Word(vocab::terminal("house")));

        let tail = DpState::Ngram {
            left: vec![vocab::terminal("big")],
            right: vec![vocab::terminal("red")],
        };
        let ctx = ScoreContext { i: 0, j: 2, sentence_id: 0 };
        let t = BoundaryWords::new(2).transition(&rule, &[&tail], ctx, &SourcePath::default());
        match t.state {
            DpState::Ngram { left, right } => {
                assert_eq!(left, vec![vocab::terminal("big")]);
                assert_eq!(right, vec![vocab::terminal("house")]);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn boundary_words_short_antecedent_counts_once() {
        // A one-word antecedent under order 3 carries its whole yield in
        // both boundaries; splicing it must not duplicate the word.
        let mut rule = lex_rule(&[]);
        rule.target.push(TargetToken::Nonterminal(0));
        rule.target.push(TargetToken::Word(vocab::terminal("b")));

        let tail = DpState::Ngram {
            left: vec![vocab::terminal("x")],
            right: vec![vocab::terminal("x")],
        };
        let ctx = ScoreContext { i: 0, j: 2, sentence_id: 0 };
        let t = BoundaryWords::new(3).transition(&rule, &[&tail], ctx, &SourcePath::default());
        match t.state {
            DpState::Ngram { left, right } => {
                assert_eq!(left, vec![vocab::terminal("x"), vocab::terminal("b")]);
                assert_eq!(right, vec![vocab::terminal("x"), vocab::terminal("b")]);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }
}
