use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::{
    block::{Block, BlockSummary, Payload},
    config::{ChainConfig, PayloadMode},
    constants::{GENESIS_BATCH_RECORD, GENESIS_PREVIOUS_HASH, GENESIS_SCALAR_PAYLOAD},
    error::{LedgerError, Result},
    hash::HashAlgorithm,
    pow::{Miner, MiningStats},
    verify::{check_genesis, check_successor, Failure, Rules, Verification},
};

/// Append-only sequence of sealed blocks, genesis first.
///
/// `append` takes `&mut self`; callers sharing a chain across threads wrap it
/// in a lock.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    config: ChainConfig,
    miner: Miner,
}

impl Chain {
    pub fn new(difficulty: usize, hash_algorithm: HashAlgorithm) -> Result<Self> {
        Self::with_config(ChainConfig::new(difficulty, hash_algorithm))
    }

    /// Validate `config`, then mine and push the genesis block.
    pub fn with_config(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        let miner = Miner::new(config.difficulty, config.mining.clone());
        let mut chain = Self {
            blocks: Vec::new(),
            config,
            miner,
        };
        chain.create_genesis()?;
        Ok(chain)
    }

    fn create_genesis(&mut self) -> Result<()> {
        let payload = match self.config.payload_mode {
            PayloadMode::Batch => Payload::batch([GENESIS_BATCH_RECORD]),
            PayloadMode::Scalar => Payload::from(GENESIS_SCALAR_PAYLOAD),
        };
        let mut genesis = Block::new(
            0,
            now_millis(),
            payload,
            GENESIS_PREVIOUS_HASH,
            self.config.hash_algorithm,
        );
        self.miner.mine(&mut genesis)?;
        info!(
            digest = genesis.digest(),
            difficulty = self.config.difficulty,
            algorithm = %self.config.hash_algorithm,
            "genesis block created"
        );
        self.blocks.push(genesis);
        Ok(())
    }

    /// Mine a block carrying `payload` on top of the tip, using the chain's
    /// default hash algorithm.
    pub fn append(&mut self, payload: impl Into<Payload>) -> Result<&Block> {
        self.append_with_algorithm(payload, self.config.hash_algorithm)
    }

    /// Like [`Chain::append`], sealing this block with `algorithm`.
    pub fn append_with_algorithm(
        &mut self,
        payload: impl Into<Payload>,
        algorithm: HashAlgorithm,
    ) -> Result<&Block> {
        self.append_at(payload.into(), algorithm, now_millis())
    }

    /// Append with an explicit clock reading. A reading behind the tip is
    /// clamped up to the tip's timestamp.
    pub(crate) fn append_at(
        &mut self,
        payload: Payload,
        algorithm: HashAlgorithm,
        now: u64,
    ) -> Result<&Block> {
        let payload = self.admit(payload)?;
        let tip = self.tip();
        let mut timestamp = now;
        if timestamp < tip.timestamp() {
            warn!(
                now = timestamp,
                tip = tip.timestamp(),
                "clock is behind the tip; reusing tip timestamp"
            );
            timestamp = tip.timestamp();
        }
        let index = tip.index() + 1;
        let mut block = Block::new(index, timestamp, payload, tip.digest(), algorithm);
        let stats = self.miner.mine(&mut block)?;
        Ok(self.push(block, stats))
    }

    /// Apply the payload policy of this chain.
    fn admit(&self, payload: Payload) -> Result<Payload> {
        match (self.config.payload_mode, payload) {
            (PayloadMode::Batch, Payload::Scalar(record)) => Ok(Payload::Batch(vec![record])),
            (PayloadMode::Batch, Payload::Batch(records)) => {
                if records.is_empty() && !self.config.allow_empty_batches {
                    return Err(LedgerError::EmptyBatch);
                }
                Ok(Payload::Batch(records))
            }
            (PayloadMode::Scalar, Payload::Scalar(record)) if record.is_string() => {
                Ok(Payload::Scalar(record))
            }
            (PayloadMode::Scalar, Payload::Scalar(record)) => {
                let message = format!("scalar chains accept text records only, got {record}");
                Err(LedgerError::InvalidPayload(message))
            }
            (PayloadMode::Scalar, Payload::Batch(records)) => {
                let count = records.len();
                let message = format!("scalar chains do not accept batches ({count} records)");
                Err(LedgerError::InvalidPayload(message))
            }
        }
    }

    fn push(&mut self, block: Block, stats: MiningStats) -> &Block {
        info!(
            index = block.index(),
            records = block.payload().len(),
            hash_rate = stats.hash_rate() as u64,
            "appended block"
        );
        self.blocks.push(block);
        self.tip()
    }

    /// Replay every check from genesis to tip, stopping at the first failure.
    pub fn verify(&self) -> Verification {
        let rules = self.rules();
        let mut checked = 0;
        for (position, block) in self.blocks.iter().enumerate() {
            checked += 1;
            let outcome = match position {
                0 => check_genesis(block, rules),
                _ => check_successor(&self.blocks[position - 1], block, rules),
            };
            if let Err(violation) = outcome {
                warn!(position, kind = ?violation.kind(), %violation, "chain verification failed");
                return Verification {
                    checked,
                    failure: Some(Failure {
                        position,
                        violation,
                    }),
                };
            }
            debug!(position, "block verified");
        }
        Verification {
            checked,
            failure: None,
        }
    }

    /// Check every block against its predecessor and collect all failures.
    pub fn verify_all(&self) -> Vec<Failure> {
        let rules = self.rules();
        let genesis = self
            .blocks
            .first()
            .and_then(|g| check_genesis(g, rules).err())
            .map(|violation| Failure {
                position: 0,
                violation,
            });
        let successors = self.blocks.windows(2).enumerate().filter_map(|(i, pair)| {
            check_successor(&pair[0], &pair[1], rules)
                .err()
                .map(|violation| Failure {
                    position: i + 1,
                    violation,
                })
        });
        genesis.into_iter().chain(successors).collect()
    }

    fn rules(&self) -> Rules {
        Rules {
            difficulty: self.config.difficulty,
            payload_mode: self.config.payload_mode,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, position: usize) -> Option<&Block> {
        self.blocks.get(position)
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn tip(&self) -> &Block {
        self.blocks
            .last()
            .expect("chain always holds a genesis block")
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a constructed chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.config.hash_algorithm
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn summaries(&self) -> Vec<BlockSummary> {
        self.blocks.iter().map(Block::to_summary).collect()
    }
}

/// Hooks for simulating an attacker with write access to the chain.
#[cfg(any(test, feature = "test-support"))]
impl Chain {
    /// Mutable access to a sealed block, bypassing the append-only contract.
    pub fn tamper(&mut self, position: usize) -> Option<&mut Block> {
        self.blocks.get_mut(position)
    }

    /// Change the difficulty the chain verifies against without re-mining.
    pub fn tamper_difficulty(&mut self, difficulty: usize) {
        self.config.difficulty = difficulty;
        self.miner = Miner::new(difficulty, self.config.mining.clone());
    }

    /// Recompute the Merkle root of the block at `position` and mine it again,
    /// as an attacker with hash power would after editing it.
    pub fn reseal(&mut self, position: usize) -> Result<()> {
        let miner = self.miner.clone();
        if let Some(block) = self.blocks.get_mut(position) {
            block.update_merkle_root();
            block.set_nonce(0);
            miner.mine(block)?;
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
