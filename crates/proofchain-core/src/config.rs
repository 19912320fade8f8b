use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY},
    error::{LedgerError, Result},
    hash::HashAlgorithm,
    pow::MiningConfig,
};

/// Shape of the payload every block on a chain carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    /// Ordered batches of records, committed through the Merkle root.
    #[default]
    Batch,
    /// One text record per block.
    Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Leading zero hex digits required of every block digest, genesis included.
    pub difficulty: usize,
    pub hash_algorithm: HashAlgorithm,
    pub payload_mode: PayloadMode,
    pub allow_empty_batches: bool,
    pub mining: MiningConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            hash_algorithm: HashAlgorithm::default(),
            payload_mode: PayloadMode::default(),
            allow_empty_batches: false,
            mining: MiningConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn new(difficulty: usize, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            difficulty,
            hash_algorithm,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty == 0 || self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidDifficulty {
                got: self.difficulty,
                max: MAX_DIFFICULTY,
            });
        }
        if self.mining.max_attempts == Some(0) {
            return Err(LedgerError::ZeroAttemptBudget);
        }
        Ok(())
    }

    /// Load a JSON config file. Missing fields fall back to defaults; the
    /// result is validated before it is returned.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LedgerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ChainConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::MiningStrategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = ChainConfig::default();
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.payload_mode, PayloadMode::Batch);
        assert!(!config.allow_empty_batches);
        assert_eq!(config.mining.strategy, MiningStrategy::Sequential);
        assert_eq!(config.mining.max_attempts, None);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_difficulty() {
        for bad in [0, MAX_DIFFICULTY + 1] {
            let err = ChainConfig::new(bad, HashAlgorithm::Sha256)
                .validate()
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidDifficulty { got, .. } if got == bad));
        }
        ChainConfig::new(MAX_DIFFICULTY, HashAlgorithm::Sha256)
            .validate()
            .unwrap();
    }

    #[test]
    fn rejects_zero_attempt_budget() {
        let mut config = ChainConfig::new(2, HashAlgorithm::Sha256);
        config.mining.max_attempts = Some(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, LedgerError::ZeroAttemptBudget));
        config.mining.max_attempts = Some(1);
        config.validate().unwrap();
    }

    #[test]
    fn loads_partial_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "difficulty": 2,
                "hash_algorithm": "sha3-512",
                "mining": {{"strategy": "parallel"}}
            }}"#
        )
        .unwrap();
        let config = ChainConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha3_512);
        assert_eq!(config.payload_mode, PayloadMode::Batch);
        assert_eq!(config.mining.strategy, MiningStrategy::Parallel);
        assert_eq!(config.mining.max_attempts, None);
    }

    #[test]
    fn file_errors_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            ChainConfig::from_json_file(&missing),
            Err(LedgerError::ConfigIo { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"hash_algorithm": "md5"}}"#).unwrap();
        assert!(matches!(
            ChainConfig::from_json_file(file.path()),
            Err(LedgerError::ConfigParse(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"difficulty": 0}}"#).unwrap();
        assert!(matches!(
            ChainConfig::from_json_file(file.path()),
            Err(LedgerError::InvalidDifficulty { got: 0, .. })
        ));
    }

    #[test]
    fn serializes_with_selector_names() {
        let config = ChainConfig {
            payload_mode: PayloadMode::Scalar,
            ..ChainConfig::new(3, HashAlgorithm::Blake3)
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["hash_algorithm"], "blake3");
        assert_eq!(json["payload_mode"], "scalar");
        assert_eq!(json["mining"]["strategy"], "sequential");
    }
}
