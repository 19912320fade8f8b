use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring a chain or appending to it.
///
/// Integrity problems found by verification are not errors; they are reported
/// through [`crate::verify::Verification`].
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("difficulty must be between 1 and {max}, got {got}")]
    InvalidDifficulty { got: usize, max: usize },

    #[error("mining.max_attempts must be at least 1")]
    ZeroAttemptBudget,

    #[error("unknown hash algorithm `{0}`")]
    UnknownHashAlgorithm(String),

    #[error("empty transaction batches are not accepted by this chain")]
    EmptyBatch,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error("failed to read config {}: {source}", .path.display())]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("no nonce met difficulty {difficulty} within {attempts} attempts")]
    AttemptsExhausted { attempts: u64, difficulty: usize },

    #[error("nonce space exhausted without meeting difficulty {difficulty}")]
    NonceSpaceExhausted { difficulty: usize },
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
