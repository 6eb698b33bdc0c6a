//! Decoder-core settings loaded from TOML.
//!
//! Default values are embedded via `include_str!("default_settings.toml")`.
//! Settings are passed by reference into each `Chart` rather than held in
//! a process-global, since concurrent sentences share one settings value
//! and tests exercise many configurations.

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub pruning: PruningSettings,
    pub search: SearchSettings,
    pub oov: OovSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PruningSettings {
    pub relative_threshold: f64,
    pub max_nodes_per_cell: usize,
    pub pop_limit: usize,
    pub fuzz1: f64,
    pub fuzz2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombinerKind {
    CubePrune,
    Exhaustive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    Strict,
    SoftSyntactic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    pub combiner: CombinerKind,
    pub nonterminal_matching: MatchPolicy,
    pub goal_symbol: String,
    pub default_nonterminal: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OovSettings {
    pub mark_oovs: bool,
    pub true_oovs_only: bool,
    pub substitutions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        parse_settings_toml(DEFAULT_SETTINGS_TOML).expect("embedded settings TOML must be valid")
    }
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_non_negative {
        ($section:ident . $field:ident) => {
            if s.$section.$field < 0.0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be non-negative".to_string(),
                });
            }
        };
    }

    check_non_negative!(pruning.relative_threshold);
    check_non_negative!(pruning.fuzz1);
    check_non_negative!(pruning.fuzz2);

    if s.pruning.max_nodes_per_cell == 0 {
        return Err(SettingsError::InvalidValue {
            field: "pruning.max_nodes_per_cell".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if s.search.goal_symbol.is_empty() {
        return Err(SettingsError::InvalidValue {
            field: "search.goal_symbol".to_string(),
            reason: "must be non-empty".to_string(),
        });
    }
    if s.search.default_nonterminal.is_empty() {
        return Err(SettingsError::InvalidValue {
            field: "search.default_nonterminal".to_string(),
            reason: "must be non-empty".to_string(),
        });
    }
    Ok(())
}
