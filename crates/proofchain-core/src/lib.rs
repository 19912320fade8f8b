//! Tamper-evident, append-only proof-of-work ledger.
//!
//! A [`Chain`] owns a sequence of [`Block`]s. Each block commits to its
//! predecessor's digest and to its transactions through a Merkle root, and is
//! sealed by searching for a nonce whose header digest has the configured
//! number of leading zero hex digits. [`Chain::verify`] replays every linkage,
//! integrity and proof-of-work check and reports the first failing block.
//!
//! ```
//! use proofchain_core::{Chain, HashAlgorithm, Payload};
//!
//! let mut chain = Chain::new(2, HashAlgorithm::Sha256).unwrap();
//! chain.append(Payload::batch(["alice pays bob 10", "bob pays carol 4"])).unwrap();
//! assert!(chain.verify().is_valid());
//! ```

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod pow;
pub mod verify;

pub use block::{Block, BlockHeader, BlockState, BlockSummary, Payload};
pub use chain::Chain;
pub use config::{ChainConfig, PayloadMode};
pub use error::{LedgerError, MiningError, Result};
pub use hash::HashAlgorithm;
pub use merkle::{merkle_root, MerkleProof};
pub use pow::{Miner, MiningConfig, MiningStats, MiningStrategy};
pub use verify::{Failure, Verification, Violation, ViolationKind};
