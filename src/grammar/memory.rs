//! In-memory trie grammar, plus a loader for the usual text format:
//!
//! ```text
//! [X] ||| la [X,1] maison ||| the [X,1] house ||| 0.5 0.2
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::feature::Feature;
use crate::vocab::{self, Symbol};

use super::{Grammar, GrammarError, Rule, RuleCollection, TargetToken, Trie};

#[derive(Debug, Default)]
struct MemNode {
    children: HashMap<Symbol, Box<MemNode>>,
    rules: Option<RuleCollection>,
}

impl Trie for MemNode {
    fn match_symbol(&self, sym: Symbol) -> Option<&dyn Trie> {
        self.children.get(&sym).map(|c| c.as_ref() as &dyn Trie)
    }

    fn rule_collection(&self) -> Option<&RuleCollection> {
        self.rules.as_ref()
    }

    fn has_extensions(&self) -> bool {
        !self.children.is_empty()
    }

    fn terminal_children(&self) -> Vec<(Symbol, &dyn Trie)> {
        self.children
            .iter()
            .filter(|(s, _)| s.is_terminal())
            .map(|(s, c)| (*s, c.as_ref() as &dyn Trie))
            .collect()
    }

    fn nonterminal_children(&self) -> Vec<(Symbol, &dyn Trie)> {
        self.children
            .iter()
            .filter(|(s, _)| s.is_nonterminal())
            .map(|(s, c)| (*s, c.as_ref() as &dyn Trie))
            .collect()
    }
}

/// Mutable in-memory grammar: rules are inserted, then `finalize` sorts
/// every collection by estimated cost. Lookups before `finalize` are a
/// contract violation (debug-asserted in `RuleCollection`).
#[derive(Debug)]
pub struct MemoryGrammar {
    root: MemNode,
    /// Widest span this grammar applies to; None = unrestricted.
    span_limit: Option<usize>,
    regex_terminals: bool,
    rule_count: usize,
}

impl MemoryGrammar {
    pub fn new() -> MemoryGrammar {
        MemoryGrammar {
            root: MemNode::default(),
            span_limit: None,
            regex_terminals: false,
            rule_count: 0,
        }
    }

    pub fn with_span_limit(mut self, limit: usize) -> MemoryGrammar {
        self.span_limit = Some(limit);
        self
    }

    /// Terminal trie arcs become regular expressions. Intended for small
    /// grammars only: every arc is pattern-tested on each terminal advance.
    pub fn with_regex_terminals(mut self) -> MemoryGrammar {
        self.regex_terminals = true;
        self
    }

    pub fn add_rule(&mut self, rule: Rule) {
        let mut node = &mut self.root;
        for &sym in &rule.source {
            node = node.children.entry(sym).or_default();
        }
        node.rules.get_or_insert_with(RuleCollection::default).push(rule);
        self.rule_count += 1;
    }

    /// Parse the `[LHS] ||| source ||| target ||| scores` text format, one
    /// rule per line. Blank lines and `#` comments are skipped.
    pub fn from_text(text: &str) -> Result<MemoryGrammar, GrammarError> {
        let mut grammar = MemoryGrammar::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            grammar.add_rule(parse_rule_line(line, lineno + 1)?);
        }
        debug!(rule_count = grammar.rule_count, "loaded grammar");
        Ok(grammar)
    }

    /// Estimate rule costs against the feature set and sort every
    /// collection. Must be called once before the grammar is decoded with.
    pub fn finalize(&mut self, features: &[Feature]) {
        fn walk(node: &mut MemNode, features: &[Feature]) {
            if let Some(rules) = &mut node.rules {
                rules.finalize(features);
            }
            for child in node.children.values_mut() {
                walk(child, features);
            }
        }
        walk(&mut self.root, features);
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }
}

impl Default for MemoryGrammar {
    fn default() -> Self {
        MemoryGrammar::new()
    }
}

impl Grammar for MemoryGrammar {
    fn trie_root(&self) -> &dyn Trie {
        &self.root
    }

    fn has_rule_for_span(&self, i: usize, j: usize, _source_len: usize) -> bool {
        match self.span_limit {
            Some(limit) => j - i <= limit,
            None => true,
        }
    }

    fn regex_terminals(&self) -> bool {
        self.regex_terminals
    }
}

fn parse_rule_line(line: &str, lineno: usize) -> Result<Rule, GrammarError> {
    let malformed = |reason: &str| GrammarError::MalformedRule {
        line: lineno,
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = line.split("|||").map(str::trim).collect();
    if fields.len() < 3 || fields.len() > 4 {
        return Err(malformed("expected 3 or 4 ||| separated fields"));
    }

    let lhs_text = fields[0];
    if !lhs_text.starts_with('[') || !lhs_text.ends_with(']') {
        return Err(malformed("left-hand side must be bracketed"));
    }
    let lhs = vocab::nonterminal(&lhs_text[1..lhs_text.len() - 1]);

    // Source side: bracketed tokens are nonterminals, optionally coindexed
    // as [X,1]. Source nonterminal order defines the coindex numbering.
    let mut source = Vec::new();
    let mut source_nts = Vec::new();
    for tok in fields[1].split_whitespace() {
        if let Some(label) = bracketed(tok) {
            let (label, _) = split_coindex(label);
            let sym = vocab::nonterminal(label);
            source.push(sym);
            source_nts.push(sym);
        } else {
            source.push(vocab::terminal(tok));
        }
    }
    if source.is_empty() {
        return Err(malformed("empty source side"));
    }

    let mut target = Vec::new();
    let mut next_nt = 0usize;
    for tok in fields[2].split_whitespace() {
        if let Some(label) = bracketed(tok) {
            let (_, index) = split_coindex(label);
            // A bare [X] on the target side takes the next source
            // nonterminal in order; [X,k] selects explicitly.
            let k = match index {
                Some(k) if k >= 1 => k - 1,
                Some(_) => return Err(malformed("coindex must be >= 1")),
                None => {
                    let k = next_nt;
                    next_nt += 1;
                    k
                }
            };
            if k >= source_nts.len() {
                return Err(GrammarError::BadCoindex {
                    index: k + 1,
                    arity: source_nts.len(),
                });
            }
            target.push(TargetToken::Nonterminal(k));
        } else {
            target.push(TargetToken::Word(vocab::terminal(tok)));
        }
    }

    let feature_scores = if fields.len() == 4 {
        fields[3]
            .split_whitespace()
            .map(|s| s.parse::<f32>().map_err(|_| malformed("bad feature score")))
            .collect::<Result<Vec<f32>, _>>()?
    } else {
        Vec::new()
    };

    Ok(Rule::new(lhs, source, target, feature_scores))
}

fn bracketed(tok: &str) -> Option<&str> {
    if tok.len() >= 3 && tok.starts_with('[') && tok.ends_with(']') {
        Some(&tok[1..tok.len() - 1])
    } else {
        None
    }
}

/// Split `X,1` into (`X`, Some(1)); plain `X` has no coindex.
fn split_coindex(label: &str) -> (&str, Option<usize>) {
    match label.rsplit_once(',') {
        Some((name, idx)) => match idx.parse::<usize>() {
            Ok(k) => (name, Some(k)),
            Err(_) => (label, None),
        },
        None => (label, None),
    }
}
