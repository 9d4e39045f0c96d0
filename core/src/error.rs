//! Error taxonomy for the OCR correction pipeline.
//!
//! Each variant corresponds to one of the failure classes the pipeline
//! distinguishes: configuration problems and parameter-check failures abort
//! the whole invocation, alignment/decode/bin errors are scoped to a single
//! pair or token and are expected to be logged and skipped by the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorrectOcrError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HMM parameter check failed: {0}")]
    Parameter(String),

    #[error("alignment failed for pair ({left:?}, {right:?}): {reason}")]
    Alignment {
        left: String,
        right: String,
        reason: String,
    },

    #[error("decode error for word {word:?}: {reason}")]
    Decode { word: String, reason: String },

    #[error("no heuristic bin matched token {original:?}")]
    Bin { original: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Serde(String),
}

pub type Result<T> = std::result::Result<T, CorrectOcrError>;

impl CorrectOcrError {
    /// Process exit code per spec: 0 success, 1 config, 2 parameter, 3 I/O.
    /// Alignment/Decode/Bin errors are per-item and never surface as an
    /// exit code on their own; a caller that wants one (e.g. because a
    /// whole document aborted) should map it to 3.
    pub fn exit_code(&self) -> i32 {
        match self {
            CorrectOcrError::Config(_) => 1,
            CorrectOcrError::Parameter(_) => 2,
            CorrectOcrError::Alignment { .. } | CorrectOcrError::Decode { .. } | CorrectOcrError::Bin { .. } => 3,
            CorrectOcrError::Io(_) => 3,
            CorrectOcrError::Serde(_) => 3,
        }
    }
}

impl From<serde_json::Error> for CorrectOcrError {
    fn from(e: serde_json::Error) -> Self {
        CorrectOcrError::Serde(e.to_string())
    }
}

impl From<toml::de::Error> for CorrectOcrError {
    fn from(e: toml::de::Error) -> Self {
        CorrectOcrError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for CorrectOcrError {
    fn from(e: toml::ser::Error) -> Self {
        CorrectOcrError::Config(e.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for CorrectOcrError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        CorrectOcrError::Serde(e.to_string())
    }
}
