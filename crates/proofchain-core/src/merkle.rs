//! Binary Merkle tree over transaction records.
//!
//! - Leaf: digest of the record's canonical bytes (raw text for string records,
//!   [`canonical_json`] for everything else).
//! - Internal node: digest of `left_hex || right_hex`, i.e. the two hex strings
//!   concatenated and hashed as UTF-8.
//!
//! Odd-length layers are padded by duplicating the last node.
//! An empty batch produces the digest of the empty byte string.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::{canonical_json, HashAlgorithm};

/// Bytes a record contributes to its leaf.
pub fn record_bytes(record: &Value) -> Cow<'_, [u8]> {
    match record {
        Value::String(text) => Cow::Borrowed(text.as_bytes()),
        other => Cow::Owned(canonical_json(other).into_bytes()),
    }
}

pub fn leaf_digest(algorithm: HashAlgorithm, record: &Value) -> String {
    algorithm.hex_digest(&record_bytes(record))
}

pub fn node_digest(algorithm: HashAlgorithm, left: &str, right: &str) -> String {
    let mut joined = String::with_capacity(left.len() + right.len());
    joined.push_str(left);
    joined.push_str(right);
    algorithm.hex_digest(joined.as_bytes())
}

pub fn empty_root(algorithm: HashAlgorithm) -> String {
    algorithm.hex_digest(b"")
}

pub fn merkle_root(algorithm: HashAlgorithm, records: &[Value]) -> String {
    if records.is_empty() {
        return empty_root(algorithm);
    }
    let mut level: Vec<String> = records
        .iter()
        .map(|r| leaf_digest(algorithm, r))
        .collect();
    while level.len() > 1 {
        level = next_layer(algorithm, &level);
    }
    level.swap_remove(0)
}

/// Every layer of the tree, leaves first and root last.
///
/// Returns a single layer holding the empty root when `records` is empty.
pub fn merkle_layers(algorithm: HashAlgorithm, records: &[Value]) -> Vec<Vec<String>> {
    if records.is_empty() {
        return vec![vec![empty_root(algorithm)]];
    }
    let mut layers = vec![records
        .iter()
        .map(|r| leaf_digest(algorithm, r))
        .collect::<Vec<_>>()];
    while let Some(last) = layers.last().filter(|l| l.len() > 1) {
        let next = next_layer(algorithm, last);
        layers.push(next);
    }
    layers
}

fn next_layer(algorithm: HashAlgorithm, layer: &[String]) -> Vec<String> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    for pair in layer.chunks(2) {
        let left = &pair[0];
        let right = pair.get(1).unwrap_or(left);
        next.push(node_digest(algorithm, left, right));
    }
    next
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One sibling on the path from a leaf to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    /// Which side the sibling sits on when the parent is formed.
    pub side: Side,
}

/// Inclusion proof for a single record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf: String,
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Build a proof for `records[leaf_index]`, or `None` if out of range.
    pub fn generate(
        algorithm: HashAlgorithm,
        records: &[Value],
        leaf_index: usize,
    ) -> Option<Self> {
        if leaf_index >= records.len() {
            return None;
        }
        let layers = merkle_layers(algorithm, records);
        let mut path = Vec::with_capacity(layers.len().saturating_sub(1));
        let mut idx = leaf_index;
        for layer in &layers[..layers.len() - 1] {
            let step = if idx.is_multiple_of(2) {
                // a missing right sibling is the duplicated node itself
                let sibling = layer.get(idx + 1).unwrap_or(&layer[idx]);
                ProofStep {
                    sibling: sibling.clone(),
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    sibling: layer[idx - 1].clone(),
                    side: Side::Left,
                }
            };
            path.push(step);
            idx /= 2;
        }
        Some(Self {
            leaf_index,
            leaf: layers[0][leaf_index].clone(),
            path,
        })
    }

    /// Fold the path and compare against `root`.
    pub fn verify(&self, algorithm: HashAlgorithm, root: &str) -> bool {
        let computed = self.path.iter().fold(self.leaf.clone(), |acc, step| match step.side {
            Side::Left => node_digest(algorithm, &step.sibling, &acc),
            Side::Right => node_digest(algorithm, &acc, &step.sibling),
        });
        computed == root
    }

    /// Check that the proof was built for `record`.
    pub fn proves(&self, algorithm: HashAlgorithm, record: &Value, root: &str) -> bool {
        self.leaf == leaf_digest(algorithm, record) && self.verify(algorithm, root)
    }
}
