use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    hash::{canonical_json, HashAlgorithm},
    merkle::merkle_root,
    pow::meets_difficulty,
};

/// What a block carries: one scalar record or an ordered batch of records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Scalar(Value),
    Batch(Vec<Value>),
}

impl Payload {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Payload::Scalar(value.into())
    }

    pub fn batch<I, T>(records: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Payload::Batch(records.into_iter().map(Into::into).collect())
    }

    /// Records fed to the Merkle tree. A scalar payload is a batch of one.
    pub fn records(&self) -> &[Value] {
        match self {
            Payload::Scalar(value) => std::slice::from_ref(value),
            Payload::Batch(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Payload::Scalar(_))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(records) => Payload::Batch(records),
            other => Payload::Scalar(other),
        }
    }
}

impl From<Vec<Value>> for Payload {
    fn from(records: Vec<Value>) -> Self {
        Payload::Batch(records)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Scalar(Value::from(text))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Scalar(Value::from(text))
    }
}

/// The fields a block digest commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    pub timestamp: u64,
    pub merkle_root: String,
    pub previous_hash: String,
    pub nonce: u64,
}

impl BlockHeader {
    /// Sorted-key JSON of the header fields, in the [`canonical_json`] layout.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "merkle_root": self.merkle_root,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });
        canonical_json(&value).into_bytes()
    }

    pub fn digest(&self, algorithm: HashAlgorithm) -> String {
        algorithm.hex_digest(&self.canonical_bytes())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    /// Digest does not (yet) meet the difficulty target.
    Unsealed,
    Sealed,
}

/// Display record for external callers. Not part of the integrity contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: u64,
    pub timestamp: u64,
    pub digest: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub merkle_root: String,
    pub hash_algorithm: HashAlgorithm,
    pub records: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: u64,
    payload: Payload,
    merkle_root: String,
    previous_hash: String,
    nonce: u64,
    hash_algorithm: HashAlgorithm,
    digest: String,
}

impl Block {
    /// Build an unmined block. The Merkle root and digest are computed
    /// immediately, so the block is self-consistent before mining starts.
    pub fn new(
        index: u64,
        timestamp: u64,
        payload: Payload,
        previous_hash: impl Into<String>,
        hash_algorithm: HashAlgorithm,
    ) -> Self {
        let merkle_root = merkle_root(hash_algorithm, payload.records());
        let mut block = Self {
            index,
            timestamp,
            payload,
            merkle_root,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash_algorithm,
            digest: String::new(),
        };
        block.recompute_digest();
        block
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn merkle_root(&self) -> &str {
        &self.merkle_root
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            index: self.index,
            timestamp: self.timestamp,
            merkle_root: self.merkle_root.clone(),
            previous_hash: self.previous_hash.clone(),
            nonce: self.nonce,
        }
    }

    /// Digest of the current header, without touching the stored digest.
    pub fn header_digest(&self) -> String {
        self.header().digest(self.hash_algorithm)
    }

    /// Merkle root of the current payload, without touching the stored root.
    pub fn computed_merkle_root(&self) -> String {
        merkle_root(self.hash_algorithm, self.payload.records())
    }

    /// Rehash the current header (including the current nonce) into `digest`.
    pub fn recompute_digest(&mut self) {
        self.digest = self.header_digest();
    }

    /// Re-derive `merkle_root` from the current payload. Leaves `digest` alone.
    pub fn update_merkle_root(&mut self) {
        self.merkle_root = self.computed_merkle_root();
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.digest, difficulty)
    }

    pub fn state(&self, difficulty: usize) -> BlockState {
        if self.meets_difficulty(difficulty) {
            BlockState::Sealed
        } else {
            BlockState::Unsealed
        }
    }

    pub fn to_summary(&self) -> BlockSummary {
        BlockSummary {
            index: self.index,
            timestamp: self.timestamp,
            digest: self.digest.clone(),
            previous_hash: self.previous_hash.clone(),
            nonce: self.nonce,
            merkle_root: self.merkle_root.clone(),
            hash_algorithm: self.hash_algorithm,
            records: self.payload.len(),
        }
    }

    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }
}

/// Direct field writes for simulating an attacker who edits a sealed block.
#[cfg(any(test, feature = "test-support"))]
impl Block {
    pub fn tamper_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    /// Overwrite one record of the payload. Returns false if `position` is out of range.
    pub fn tamper_record(&mut self, position: usize, record: impl Into<Value>) -> bool {
        let slot = match &mut self.payload {
            Payload::Scalar(value) if position == 0 => Some(value),
            Payload::Scalar(_) => None,
            Payload::Batch(records) => records.get_mut(position),
        };
        match slot {
            Some(slot) => {
                *slot = record.into();
                true
            }
            None => false,
        }
    }

    pub fn tamper_index(&mut self, index: u64) {
        self.index = index;
    }

    pub fn tamper_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn tamper_previous_hash(&mut self, previous_hash: impl Into<String>) {
        self.previous_hash = previous_hash.into();
    }

    pub fn tamper_merkle_root(&mut self, merkle_root: impl Into<String>) {
        self.merkle_root = merkle_root.into();
    }

    pub fn tamper_digest(&mut self, digest: impl Into<String>) {
        self.digest = digest.into();
    }
}
