//! End-to-end chart tests: whole sentences decoded through the public
//! `Chart` entry point with small hand-built grammars.

mod cube;
