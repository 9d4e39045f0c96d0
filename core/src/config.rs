//! Process-wide configuration.
//!
//! Constructed once from a TOML file (optionally overridden by environment
//! variables of the form `PROGNAME_SECTION_KEY`, upper-cased) and then
//! passed by reference to every component. No mutable process-wide
//! singletons — see spec.md §9 "Global configuration".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::heuristics::Action;

/// Alignment thresholds, named per spec.md §9 Open Question (c)/(d): these
/// have no documented provenance upstream and must stay configurable
/// rather than hard-coded.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AlignerConfig {
    /// Minimum Ratcliff-Obershelp ratio to accept a greedy token match.
    pub min_ratio: f64,
    /// Lower ratio threshold accepted when the left token is longer than
    /// `long_token_len`.
    pub long_token_min_ratio: f64,
    /// Left-token length above which `long_token_min_ratio` applies instead
    /// of `min_ratio`.
    pub long_token_len: usize,
    /// Moved blocks longer than this many characters are skipped during
    /// character-level alignment (defensive against re-ordering artifacts).
    pub max_moved_block_len: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_ratio: 0.7,
            long_token_min_ratio: 0.6,
            long_token_len: 4,
            max_moved_block_len: 4,
        }
    }
}

/// HMM training/decoding parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HmmConfig {
    /// Additive (Laplace) smoothing parameter alpha, must be > 0.
    pub smoothing_alpha: f64,
    /// Number of k-best candidates to generate per token.
    pub k: usize,
    /// Characters excluded from the alphabet (and purged from confusion
    /// counts), e.g. whitespace.
    pub removal_chars: Vec<char>,
    /// Configured base character set, augmented automatically with every
    /// character observed in the training corpus.
    pub character_set: Vec<char>,
    /// LRU kbest-cache capacity (entries).
    pub cache_capacity: usize,
    /// Multi-character substitution retry table: substring -> replacements.
    pub multichars: HashMap<String, Vec<String>>,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 1e-4,
            k: 4,
            removal_chars: vec![],
            character_set: ('a'..='z').chain('A'..='Z').collect(),
            cache_capacity: 100_000,
            multichars: HashMap::new(),
        }
    }
}

/// Heuristic bin -> action configuration (spec.md §6 "Heuristic settings
/// file").
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct HeuristicsConfig {
    pub bin_actions: HashMap<u8, Action>,
    /// Whether dictionary lookups (and hence bin classification) ignore case.
    pub case_insensitive: bool,
}

/// Filesystem locations of the various persisted artifacts (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResourcePaths {
    pub dictionary_dir: PathBuf,
    pub hmm_params_file: PathBuf,
    pub kbest_cache_file: PathBuf,
    pub multichar_file: PathBuf,
    pub heuristic_settings_file: PathBuf,
    pub report_file: PathBuf,
}

impl Default for ResourcePaths {
    fn default() -> Self {
        Self {
            dictionary_dir: PathBuf::from("dictionary/"),
            hmm_params_file: PathBuf::from("hmm_parameters.json"),
            kbest_cache_file: PathBuf::from("kbest_cache.bin"),
            multichar_file: PathBuf::from("multicharacter_errors.json"),
            heuristic_settings_file: PathBuf::from("settings.tsv"),
            report_file: PathBuf::from("report.txt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub language: String,
    /// Number of header lines to skip in plain-text training files.
    pub nheaderlines: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            nheaderlines: 0,
        }
    }
}

/// Top-level immutable configuration value.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub resources: ResourcePaths,
    pub aligner: AlignerConfig,
    pub hmm: HmmConfig,
    pub heuristics: HeuristicsConfig,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment-variable
    /// overrides of the form `PROGNAME_SECTION_KEY`.
    pub fn load_toml<P: AsRef<Path>>(path: P, progname: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut value: toml::Value = toml::from_str(&content)?;
        apply_env_overrides(&mut value, progname, &[]);
        let config: Config = value.try_into()?;
        Ok(config)
    }

    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Recursively walk a parsed TOML value, replacing scalar leaves whose
/// `PROGNAME_SECTION_KEY` environment variable is set.
///
/// Mirrors `original_source/CorrectOCR/config.py`'s `EnvOverride`, which
/// checks `CORRECTOCR_<section>_<key>` (all upper-case) for every lookup.
fn apply_env_overrides(value: &mut toml::Value, progname: &str, path: &[&str]) {
    if let toml::Value::Table(table) = value {
        for (key, v) in table.iter_mut() {
            let mut next_path = path.to_vec();
            next_path.push(key.as_str());
            match v {
                toml::Value::Table(_) => apply_env_overrides(v, progname, &next_path),
                _ => {
                    let env_name = format!("{}_{}", progname, next_path.join("_")).to_uppercase();
                    if let Ok(raw) = std::env::var(&env_name) {
                        *v = coerce_like(v, &raw);
                    }
                }
            }
        }
    }
}

fn coerce_like(existing: &toml::Value, raw: &str) -> toml::Value {
    match existing {
        toml::Value::Integer(_) => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .unwrap_or_else(|_| toml::Value::String(raw.to_string())),
        toml::Value::Float(_) => raw
            .parse::<f64>()
            .map(toml::Value::Float)
            .unwrap_or_else(|_| toml::Value::String(raw.to_string())),
        toml::Value::Boolean(_) => raw
            .parse::<bool>()
            .map(toml::Value::Boolean)
            .unwrap_or_else(|_| toml::Value::String(raw.to_string())),
        _ => toml::Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let cfg = Config::default();
        let s = cfg.to_toml_string().unwrap();
        let back = Config::from_toml_str(&s).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn env_override_replaces_scalar_leaf() {
        let toml_str = r#"
            [hmm]
            k = 4
            smoothing_alpha = 0.0001
        "#;
        std::env::set_var("TESTPROG_HMM_K", "7");
        let mut value: toml::Value = toml::from_str(toml_str).unwrap();
        apply_env_overrides(&mut value, "TESTPROG", &[]);
        let k = value["hmm"]["k"].as_integer().unwrap();
        assert_eq!(k, 7);
        std::env::remove_var("TESTPROG_HMM_K");
    }
}
