//! correctocr-core
//!
//! Probabilistic post-correction of OCR output: a character-level aligner
//! that turns (original, gold) pairs into a confusion table, an HMM builder
//! and beam-pruned k-best decoder trained from that table, a nine-bin
//! heuristic classifier that decides per-token whether to autocorrect or
//! defer to a human annotator, and the dictionary the classifier consults.
//!
//! Public API:
//! - `Config` - process-wide configuration, loaded from TOML plus env overrides
//! - `Dictionary` - grouped word-set membership test
//! - `aligner` - character/token-level alignment producing a confusion table
//! - `hmm` - parameter tables, trainer, and beam decoder
//! - `heuristics` - the nine-bin classifier and tuning report
//! - `Token` - the per-token record the pipeline mutates
//! - `Pipeline` - the per-document tokenize -> kbest -> bin -> autocorrect orchestrator

pub mod aligner;
pub mod alphabet;
pub mod config;
pub mod dictionary;
pub mod diff;
pub mod error;
pub mod heuristics;
pub mod hmm;
pub mod pipeline;
pub mod token;

pub use config::Config;
pub use dictionary::Dictionary;
pub use error::{CorrectOcrError, Result};
pub use hmm::{HmmBuilder, HmmParams, KBestCache};
pub use pipeline::Pipeline;
pub use token::{HeuristicAction, KBestItem, Token};
