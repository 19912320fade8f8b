//! Integrity checks replayed over a chain of sealed blocks.
//!
//! Each block is checked against its predecessor in a fixed order: index,
//! linkage, Merkle root, header digest, proof-of-work, timestamp, and (for
//! scalar chains) payload type. The first failing check decides the
//! violation reported for that block.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{block::Block, config::PayloadMode, constants::GENESIS_PREVIOUS_HASH};

/// The five families of integrity failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Index discontinuity or broken previous-hash link.
    Structural,
    /// Stored digest or Merkle root differs from the recomputed value.
    Integrity,
    /// Stored digest misses the difficulty target.
    ProofOfWork,
    /// Timestamp earlier than the predecessor's.
    Temporal,
    /// Payload is not of the expected kind.
    Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    #[error("genesis index is {found}, expected 0")]
    GenesisIndex { found: u64 },

    #[error("genesis previous hash is `{found}`, expected the `0` sentinel")]
    GenesisLink { found: String },

    #[error("index {found} does not follow {previous}")]
    IndexDiscontinuity { previous: u64, found: u64 },

    #[error("previous hash {found} does not match predecessor digest {expected}")]
    BrokenLink { expected: String, found: String },

    #[error("merkle root {stored} does not match transactions (recomputed {computed})")]
    MerkleMismatch { stored: String, computed: String },

    #[error("digest {stored} does not match header (recomputed {computed})")]
    DigestMismatch { stored: String, computed: String },

    #[error("digest {digest} lacks {difficulty} leading zeros")]
    InsufficientWork { digest: String, difficulty: usize },

    #[error("timestamp {found} precedes predecessor timestamp {previous}")]
    TimestampRegression { previous: u64, found: u64 },

    #[error("payload must be {expected}, found {found}")]
    PayloadType { expected: String, found: String },
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::GenesisIndex { .. }
            | Violation::GenesisLink { .. }
            | Violation::IndexDiscontinuity { .. }
            | Violation::BrokenLink { .. } => ViolationKind::Structural,
            Violation::MerkleMismatch { .. } | Violation::DigestMismatch { .. } => {
                ViolationKind::Integrity
            }
            Violation::InsufficientWork { .. } => ViolationKind::ProofOfWork,
            Violation::TimestampRegression { .. } => ViolationKind::Temporal,
            Violation::PayloadType { .. } => ViolationKind::Type,
        }
    }
}

/// A violation located at a position in the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Position in the chain. Differs from the block's `index` field when
    /// that field has been forged.
    pub position: usize,
    pub violation: Violation,
}

/// Result of [`crate::chain::Chain::verify`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Blocks examined, including the failing one.
    pub checked: usize,
    pub failure: Option<Failure>,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failing_index(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.position)
    }

    pub fn violation(&self) -> Option<&Violation> {
        self.failure.as_ref().map(|f| &f.violation)
    }

    pub fn kind(&self) -> Option<ViolationKind> {
        self.violation().map(Violation::kind)
    }
}

/// Chain-wide parameters the checks depend on.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Rules {
    pub difficulty: usize,
    pub payload_mode: PayloadMode,
}

pub(crate) fn check_genesis(block: &Block, rules: Rules) -> Result<(), Violation> {
    if block.index() != 0 {
        return Err(Violation::GenesisIndex {
            found: block.index(),
        });
    }
    if block.previous_hash() != GENESIS_PREVIOUS_HASH {
        return Err(Violation::GenesisLink {
            found: block.previous_hash().to_string(),
        });
    }
    check_contents(block, rules)
}

pub(crate) fn check_successor(
    previous: &Block,
    current: &Block,
    rules: Rules,
) -> Result<(), Violation> {
    let expected_index = previous.index().wrapping_add(1);
    if current.index() != expected_index {
        return Err(Violation::IndexDiscontinuity {
            previous: previous.index(),
            found: current.index(),
        });
    }
    if current.previous_hash() != previous.digest() {
        return Err(Violation::BrokenLink {
            expected: previous.digest().to_string(),
            found: current.previous_hash().to_string(),
        });
    }
    check_merkle(current)?;
    check_header(current)?;
    check_work(current, rules.difficulty)?;
    if current.timestamp() < previous.timestamp() {
        return Err(Violation::TimestampRegression {
            previous: previous.timestamp(),
            found: current.timestamp(),
        });
    }
    check_payload(current, rules.payload_mode)
}

/// Checks that need only the block itself.
fn check_contents(block: &Block, rules: Rules) -> Result<(), Violation> {
    check_merkle(block)?;
    check_header(block)?;
    check_work(block, rules.difficulty)?;
    check_payload(block, rules.payload_mode)
}

fn check_merkle(block: &Block) -> Result<(), Violation> {
    let computed = block.computed_merkle_root();
    if computed != block.merkle_root() {
        return Err(Violation::MerkleMismatch {
            stored: block.merkle_root().to_string(),
            computed,
        });
    }
    Ok(())
}

fn check_header(block: &Block) -> Result<(), Violation> {
    let computed = block.header_digest();
    if computed != block.digest() {
        return Err(Violation::DigestMismatch {
            stored: block.digest().to_string(),
            computed,
        });
    }
    Ok(())
}

fn check_work(block: &Block, difficulty: usize) -> Result<(), Violation> {
    if !block.meets_difficulty(difficulty) {
        return Err(Violation::InsufficientWork {
            digest: block.digest().to_string(),
            difficulty,
        });
    }
    Ok(())
}

fn check_payload(block: &Block, mode: PayloadMode) -> Result<(), Violation> {
    if mode != PayloadMode::Scalar {
        return Ok(());
    }
    match block.payload().records() {
        [Value::String(_)] if block.payload().is_scalar() => Ok(()),
        _ => Err(Violation::PayloadType {
            expected: "a scalar text record".to_string(),
            found: describe(block),
        }),
    }
}

fn describe(block: &Block) -> String {
    let records = block.payload().records();
    if !block.payload().is_scalar() {
        return format!("a batch of {} records", records.len());
    }
    match records.first() {
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(_)) => "a boolean".to_string(),
        Some(Value::Number(_)) => "a number".to_string(),
        Some(Value::String(_)) => "a string".to_string(),
        Some(Value::Array(_)) => "an array".to_string(),
        Some(Value::Object(_)) => "an object".to_string(),
        None => "nothing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::Payload, hash::HashAlgorithm};

    const BATCH: Rules = Rules {
        difficulty: 0,
        payload_mode: PayloadMode::Batch,
    };
    const SCALAR: Rules = Rules {
        difficulty: 0,
        payload_mode: PayloadMode::Scalar,
    };

    fn block(index: u64, timestamp: u64, payload: Payload, prev: &str) -> Block {
        Block::new(index, timestamp, payload, prev, HashAlgorithm::Sha256)
    }

    #[test]
    fn kinds_are_distinguishable() {
        let cases = [
            (
                Violation::GenesisIndex { found: 1 },
                ViolationKind::Structural,
            ),
            (
                Violation::IndexDiscontinuity {
                    previous: 1,
                    found: 3,
                },
                ViolationKind::Structural,
            ),
            (
                Violation::MerkleMismatch {
                    stored: "a".into(),
                    computed: "b".into(),
                },
                ViolationKind::Integrity,
            ),
            (
                Violation::InsufficientWork {
                    digest: "f".into(),
                    difficulty: 1,
                },
                ViolationKind::ProofOfWork,
            ),
            (
                Violation::TimestampRegression {
                    previous: 2,
                    found: 1,
                },
                ViolationKind::Temporal,
            ),
            (
                Violation::PayloadType {
                    expected: "x".into(),
                    found: "y".into(),
                },
                ViolationKind::Type,
            ),
        ];
        for (violation, kind) in cases {
            assert_eq!(violation.kind(), kind, "{violation}");
        }
    }

    #[test]
    fn successor_checks_pass_for_linked_blocks() {
        let genesis = block(0, 10, Payload::batch(["g"]), GENESIS_PREVIOUS_HASH);
        let next = block(1, 10, Payload::batch(["a"]), genesis.digest());
        check_genesis(&genesis, BATCH).unwrap();
        check_successor(&genesis, &next, BATCH).unwrap();
    }

    #[test]
    fn index_is_checked_before_linkage() {
        let genesis = block(0, 10, Payload::batch(["g"]), GENESIS_PREVIOUS_HASH);
        let next = block(2, 10, Payload::batch(["a"]), "unrelated");
        let err = check_successor(&genesis, &next, BATCH).unwrap_err();
        assert_eq!(
            err,
            Violation::IndexDiscontinuity {
                previous: 0,
                found: 2
            }
        );
    }

    #[test]
    fn equal_timestamps_are_allowed() {
        let genesis = block(0, 10, Payload::batch(["g"]), GENESIS_PREVIOUS_HASH);
        let same = block(1, 10, Payload::batch(["a"]), genesis.digest());
        let earlier = block(1, 9, Payload::batch(["a"]), genesis.digest());
        check_successor(&genesis, &same, BATCH).unwrap();
        let err = check_successor(&genesis, &earlier, BATCH).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Temporal);
    }

    #[test]
    fn genesis_sentinel_is_required() {
        let genesis = block(0, 10, Payload::batch(["g"]), "00");
        let err = check_genesis(&genesis, BATCH).unwrap_err();
        assert_eq!(
            err,
            Violation::GenesisLink {
                found: "00".to_string()
            }
        );
    }

    #[test]
    fn scalar_mode_requires_text_record() {
        let text = block(0, 10, Payload::from("hello"), GENESIS_PREVIOUS_HASH);
        check_genesis(&text, SCALAR).unwrap();

        let number = block(0, 10, Payload::scalar(42), GENESIS_PREVIOUS_HASH);
        let err = check_genesis(&number, SCALAR).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Type);
        assert!(err.to_string().contains("a number"));

        let batch = block(0, 10, Payload::batch(["hello"]), GENESIS_PREVIOUS_HASH);
        let err = check_genesis(&batch, SCALAR).unwrap_err();
        assert!(err.to_string().contains("a batch of 1 records"));

        check_genesis(&number, BATCH).unwrap();
    }

    #[test]
    fn verification_accessors() {
        let ok = Verification {
            checked: 3,
            failure: None,
        };
        assert!(ok.is_valid());
        assert_eq!(ok.failing_index(), None);
        assert_eq!(ok.kind(), None);

        let bad = Verification {
            checked: 2,
            failure: Some(Failure {
                position: 1,
                violation: Violation::GenesisIndex { found: 4 },
            }),
        };
        assert!(!bad.is_valid());
        assert_eq!(bad.failing_index(), Some(1));
        assert_eq!(bad.kind(), Some(ViolationKind::Structural));
        let json = serde_json::to_value(&bad).unwrap();
        assert_eq!(json["failure"]["violation"]["violation"], "genesis_index");
    }
}
