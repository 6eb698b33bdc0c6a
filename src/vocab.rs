//! Global symbol vocabulary shared by grammars, lattices, and charts.
//!
//! Symbols are interned once and compared as plain `u32`s afterwards.
//! Nonterminals carry a tag bit so `Symbol::is_nonterminal` needs no
//! table lookup. The table is behind an `RwLock` because several charts
//! may intern concurrently from worker threads.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

const NONTERMINAL_BIT: u32 = 1 << 31;

/// An interned terminal or nonterminal symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Symbol(u32);

impl Symbol {
    pub fn is_nonterminal(self) -> bool {
        self.0 & NONTERMINAL_BIT != 0
    }

    pub fn is_terminal(self) -> bool {
        !self.is_nonterminal()
    }

    fn index(self) -> usize {
        (self.0 & !NONTERMINAL_BIT) as usize
    }
}

#[derive(Default)]
struct Table {
    by_word: HashMap<(String, bool), Symbol>,
    words: Vec<String>,
}

fn table() -> &'static RwLock<Table> {
    static TABLE: OnceLock<RwLock<Table>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(Table::default()))
}

fn intern(word: &str, nonterminal: bool) -> Symbol {
    {
        let t = table().read().expect("vocabulary lock poisoned");
        if let Some(&sym) = t.by_word.get(&(word.to_string(), nonterminal)) {
            return sym;
        }
    }
    let mut t = table().write().expect("vocabulary lock poisoned");
    // Another thread may have raced us between the read and write lock.
    if let Some(&sym) = t.by_word.get(&(word.to_string(), nonterminal)) {
        return sym;
    }
    let mut id = t.words.len() as u32;
    if nonterminal {
        id |= NONTERMINAL_BIT;
    }
    let sym = Symbol(id);
    t.words.push(word.to_string());
    t.by_word.insert((word.to_string(), nonterminal), sym);
    sym
}

/// Intern a terminal (source or target word).
pub fn terminal(word: &str) -> Symbol {
    intern(word, false)
}

/// Intern a nonterminal label, e.g. `X` or `GOAL` (no brackets).
pub fn nonterminal(label: &str) -> Symbol {
    intern(label, true)
}

/// Resolve a symbol back to its surface string.
pub fn word(sym: Symbol) -> String {
    let t = table().read().expect("vocabulary lock poisoned");
    t.words[sym.index()].clone()
}
