//! CKY+ chart decoding core for syntax-based translation.
//!
//! Parses a source lattice with synchronous grammars, combining proved
//! items through cube pruning into a packed hypergraph of translation
//! derivations.

pub mod chart;
pub mod feature;
pub mod grammar;
pub mod hypergraph;
pub mod lattice;
pub mod settings;
pub mod vocab;

pub use chart::constraint::StateConstraint;
pub use chart::{build_oov_grammar, Chart};
pub use hypergraph::HyperGraph;
pub use lattice::Lattice;
pub use settings::Settings;
