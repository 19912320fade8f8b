use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{block::Block, error::MiningError};

/// Number of leading `'0'` characters in a hex digest.
pub fn leading_zero_digits(hex_digest: &str) -> usize {
    hex_digest.bytes().take_while(|b| *b == b'0').count()
}

/// Difficulty predicate: the hex digest starts with `difficulty` zeros.
pub fn meets_difficulty(hex_digest: &str, difficulty: usize) -> bool {
    leading_zero_digits(hex_digest) >= difficulty
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningStrategy {
    /// Single thread, nonces tried in order.
    #[default]
    Sequential,
    /// Nonce range split across the rayon pool; first hit wins.
    Parallel,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub strategy: MiningStrategy,
    /// Give up after this many digests. `None` searches the whole nonce space.
    pub max_attempts: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MiningStats {
    pub nonce: u64,
    pub attempts: u64,
    pub elapsed: Duration,
}

impl MiningStats {
    /// Digests per second, 0.0 when mining finished too fast to time.
    pub fn hash_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Miner {
    difficulty: usize,
    config: MiningConfig,
}

impl Miner {
    pub fn new(difficulty: usize, config: MiningConfig) -> Self {
        Self { difficulty, config }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// Search nonces until the block digest meets the difficulty target.
    ///
    /// On success the block is sealed in place. On failure the block is left
    /// with whatever nonce was tried last and is not eligible for append.
    pub fn mine(&self, block: &mut Block) -> Result<MiningStats, MiningError> {
        if self.config.max_attempts == Some(0) {
            return Err(MiningError::AttemptsExhausted {
                attempts: 0,
                difficulty: self.difficulty,
            });
        }
        let started = Instant::now();
        let attempts = match self.config.strategy {
            MiningStrategy::Sequential => self.mine_sequential(block)?,
            MiningStrategy::Parallel => self.mine_parallel(block)?,
        };
        let stats = MiningStats {
            nonce: block.nonce(),
            attempts,
            elapsed: started.elapsed(),
        };
        info!(
            index = block.index(),
            nonce = stats.nonce,
            attempts = stats.attempts,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            digest = block.digest(),
            "mined block"
        );
        Ok(stats)
    }

    fn mine_sequential(&self, block: &mut Block) -> Result<u64, MiningError> {
        block.recompute_digest();
        let budget = self.config.max_attempts;
        let mut attempts = 1u64;
        while !block.meets_difficulty(self.difficulty) {
            if budget.is_some_and(|limit| attempts >= limit) {
                return Err(MiningError::AttemptsExhausted {
                    attempts,
                    difficulty: self.difficulty,
                });
            }
            let next = block
                .nonce()
                .checked_add(1)
                .ok_or(MiningError::NonceSpaceExhausted {
                    difficulty: self.difficulty,
                })?;
            block.set_nonce(next);
            block.recompute_digest();
            attempts += 1;
        }
        Ok(attempts)
    }

    fn mine_parallel(&self, block: &mut Block) -> Result<u64, MiningError> {
        let start = block.nonce();
        let end = match self.config.max_attempts {
            Some(limit) => start.saturating_add(limit),
            None => u64::MAX,
        };
        let base = block.header();
        let algorithm = block.hash_algorithm();
        let difficulty = self.difficulty;
        let tried = AtomicU64::new(0);

        debug!(index = base.index, start, end, "parallel nonce search");

        // find_any stops the remaining workers once one of them returns true
        let found = (start..end).into_par_iter().find_any(|nonce| {
            tried.fetch_add(1, Ordering::Relaxed);
            let mut header = base.clone();
            header.nonce = *nonce;
            meets_difficulty(&header.digest(algorithm), difficulty)
        });
        let attempts = tried.load(Ordering::Relaxed);

        match found {
            Some(nonce) => {
                block.set_nonce(nonce);
                block.recompute_digest();
                Ok(attempts)
            }
            None => match self.config.max_attempts {
                Some(_) => Err(MiningError::AttemptsExhausted {
                    attempts,
                    difficulty,
                }),
                None => Err(MiningError::NonceSpaceExhausted { difficulty }),
            },
        }
    }
}
