use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use proofchain_core::{
    BlockSummary, Chain, ChainConfig, HashAlgorithm, MiningStrategy, Payload, PayloadMode,
    Verification,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "proofchain")]
#[command(about = "Build, inspect and attack a proof-of-work ledger")]
struct Cli {
    #[command(flatten)]
    opts: ChainOpts,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug, Default)]
struct ChainOpts {
    /// JSON chain config; the flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Leading zero hex digits required of each block digest
    #[arg(long, global = true)]
    difficulty: Option<usize>,
    /// sha256, sha512, sha3-256, sha3-512 or blake3
    #[arg(long, global = true)]
    algorithm: Option<HashAlgorithm>,
    /// Search nonces on all cores
    #[arg(long, global = true)]
    parallel: bool,
    /// One text record per block instead of batches
    #[arg(long, global = true)]
    scalar: bool,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a chain from sample batches and verify it
    Demo,
    /// Append one block per --data value, then verify
    Mine {
        /// Block payload; JSON arrays become batches, anything else one record
        #[arg(long = "data", required = true)]
        data: Vec<String>,
    },
    /// Build the sample chain, tamper with one block and report what verify finds
    #[cfg(feature = "tamper")]
    Tamper {
        #[arg(long, value_enum)]
        scenario: Scenario,
        /// Chain position of the attacked block
        #[arg(long, default_value_t = 2)]
        position: usize,
    },
    /// Print the digest of a string under every supported algorithm
    Hash {
        #[arg(long)]
        input: String,
    },
}

#[cfg(feature = "tamper")]
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    /// Edit a transaction, leave the Merkle root alone
    Payload,
    /// Edit a transaction and recompute the Merkle root, without re-mining
    Merkle,
    /// Point previous_hash somewhere else
    Link,
    /// Overwrite the stored digest
    Digest,
    /// Change the block index
    Index,
    /// Verify against a higher difficulty than the chain was mined with
    Difficulty,
    /// Move the timestamp before the predecessor's and re-mine
    Timestamp,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.opts)?;
    match cli.cmd {
        Command::Demo => {
            let chain = sample_chain(config)?;
            report(&chain, cli.opts.json)?;
            ensure_valid(&chain.verify())
        }
        Command::Mine { data } => {
            let mut chain = Chain::with_config(config)?;
            for raw in &data {
                let block = chain.append(parse_payload(raw))?;
                info!(index = block.index(), "mined block from --data");
            }
            report(&chain, cli.opts.json)?;
            ensure_valid(&chain.verify())
        }
        #[cfg(feature = "tamper")]
        Command::Tamper { scenario, position } => {
            let mut chain = sample_chain(config)?;
            attack(&mut chain, scenario, position)?;
            report(&chain, cli.opts.json)
        }
        Command::Hash { input } => {
            for alg in HashAlgorithm::ALL {
                println!("{:<9} {}", alg.name(), alg.hex_digest(input.as_bytes()));
            }
            Ok(())
        }
    }
}

fn load_config(opts: &ChainOpts) -> Result<ChainConfig> {
    let mut config = match &opts.config {
        Some(path) => ChainConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ChainConfig::default(),
    };
    if let Some(difficulty) = opts.difficulty {
        config.difficulty = difficulty;
    }
    if let Some(algorithm) = opts.algorithm {
        config.hash_algorithm = algorithm;
    }
    if opts.parallel {
        config.mining.strategy = MiningStrategy::Parallel;
    }
    if opts.scalar {
        config.payload_mode = PayloadMode::Scalar;
    }
    config.validate()?;
    Ok(config)
}

/// JSON arrays become batches; everything else, including text that is not
/// valid JSON, is a single record.
fn parse_payload(raw: &str) -> Payload {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(text)) => Payload::from(text),
        Ok(value @ Value::Array(_)) => Payload::from(value),
        _ => Payload::from(raw),
    }
}

fn sample_chain(config: ChainConfig) -> Result<Chain> {
    let scalar = config.payload_mode == PayloadMode::Scalar;
    let mut chain = Chain::with_config(config)?;
    let batches: [&[&str]; 3] = [
        &["A sends 10 BTC to B", "B sends 5 BTC to C", "Fee: 1 BTC"],
        &["C sends 50 BTC to D", "D sends 1 BTC to A"],
        &[
            "A buys pizza for 10000 BTC",
            "Confirmation 3",
            "Confirmation 4",
        ],
    ];
    for batch in batches {
        let payload = if scalar {
            Payload::from(batch.join("; "))
        } else {
            Payload::batch(batch.iter().copied())
        };
        chain.append(payload)?;
    }
    Ok(chain)
}

#[cfg(feature = "tamper")]
fn attack(chain: &mut Chain, scenario: Scenario, position: usize) -> Result<()> {
    if position == 0 || position >= chain.len() {
        bail!("position must be between 1 and {}", chain.len() - 1);
    }
    let predecessor_time = chain.blocks()[position - 1].timestamp();
    let difficulty = chain.difficulty();
    let Some(block) = chain.tamper(position) else {
        bail!("no block at position {position}");
    };
    match scenario {
        Scenario::Payload => {
            block.tamper_record(0, "A sends 1000 BTC to Mallory");
        }
        Scenario::Merkle => {
            block.tamper_record(0, "forged transaction");
            block.update_merkle_root();
        }
        Scenario::Link => block.tamper_previous_hash("0".repeat(9) + &"f".repeat(55)),
        Scenario::Digest => block.tamper_digest("f".repeat(64)),
        Scenario::Index => block.tamper_index(block.index() + 10),
        Scenario::Difficulty => chain.tamper_difficulty(difficulty + 8),
        Scenario::Timestamp => {
            block.tamper_timestamp(predecessor_time.saturating_sub(1));
            chain.reseal(position)?;
        }
    }
    info!(?scenario, position, "tampered with chain");
    Ok(())
}

fn report(chain: &Chain, json: bool) -> Result<()> {
    let verification = chain.verify();
    if json {
        let out = serde_json::json!({
            "difficulty": chain.difficulty(),
            "hash_algorithm": chain.hash_algorithm(),
            "blocks": chain.summaries(),
            "verification": verification,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!(
        "chain: {} blocks, difficulty {}, {}",
        chain.len(),
        chain.difficulty(),
        chain.hash_algorithm()
    );
    for summary in chain.summaries() {
        print_summary(&summary);
    }
    println!("{}", describe(&verification));
    Ok(())
}

fn print_summary(summary: &BlockSummary) {
    println!(
        "#{:<3} ts={} nonce={} records={} [{}]",
        summary.index, summary.timestamp, summary.nonce, summary.records, summary.hash_algorithm
    );
    println!("     digest: {}", summary.digest);
    println!("     prev:   {}", summary.previous_hash);
    println!("     merkle: {}", summary.merkle_root);
}

fn describe(verification: &Verification) -> String {
    match &verification.failure {
        None => format!("VALID: {} blocks verified", verification.checked),
        Some(failure) => format!(
            "INVALID at position {} ({:?}): {}",
            failure.position,
            failure.violation.kind(),
            failure.violation
        ),
    }
}

fn ensure_valid(verification: &Verification) -> Result<()> {
    if !verification.is_valid() {
        bail!("{}", describe(verification));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn quick_config() -> ChainConfig {
        ChainConfig::new(1, HashAlgorithm::Sha256)
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.json");
        let json = r#"{"difficulty": 3, "hash_algorithm": "sha512"}"#;
        fs::write(&path, json).unwrap();
        let opts = ChainOpts {
            config: Some(path),
            difficulty: Some(2),
            parallel: true,
            ..ChainOpts::default()
        };
        let config = load_config(&opts).unwrap();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.mining.strategy, MiningStrategy::Parallel);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let opts = ChainOpts {
            difficulty: Some(0),
            ..ChainOpts::default()
        };
        assert!(load_config(&opts).is_err());
    }

    #[test]
    fn payload_parsing() {
        assert_eq!(parse_payload(r#"["a","b"]"#), Payload::batch(["a", "b"]));
        assert_eq!(parse_payload("plain text"), Payload::from("plain text"));
        assert_eq!(parse_payload(r#""quoted""#), Payload::from("quoted"));
        assert_eq!(parse_payload("42"), Payload::from("42"));
    }

    #[cfg(feature = "tamper")]
    #[test]
    fn every_scenario_is_detected() {
        use proofchain_core::ViolationKind;

        let expected = [
            (Scenario::Payload, 2, ViolationKind::Integrity),
            (Scenario::Merkle, 2, ViolationKind::Integrity),
            (Scenario::Link, 2, ViolationKind::Structural),
            (Scenario::Digest, 2, ViolationKind::Integrity),
            (Scenario::Index, 2, ViolationKind::Structural),
            (Scenario::Difficulty, 0, ViolationKind::ProofOfWork),
            (Scenario::Timestamp, 3, ViolationKind::Temporal),
        ];
        for (scenario, position, kind) in expected {
            let mut chain = sample_chain(quick_config()).unwrap();
            let target = if scenario == Scenario::Timestamp {
                3
            } else {
                2
            };
            attack(&mut chain, scenario, target).unwrap();
            let outcome = chain.verify();
            assert_eq!(outcome.failing_index(), Some(position), "{scenario:?}");
            assert_eq!(outcome.kind(), Some(kind), "{scenario:?}");
        }
    }

    #[cfg(feature = "tamper")]
    #[test]
    fn attack_rejects_genesis_and_out_of_range() {
        let mut chain = sample_chain(quick_config()).unwrap();
        assert!(attack(&mut chain, Scenario::Link, 0).is_err());
        assert!(attack(&mut chain, Scenario::Link, 4).is_err());
        assert!(chain.verify().is_valid());
    }

    #[test]
    fn scalar_sample_chain_verifies() {
        let config = ChainConfig {
            payload_mode: PayloadMode::Scalar,
            ..quick_config()
        };
        let chain = sample_chain(config).unwrap();
        assert_eq!(chain.len(), 4);
        assert!(ensure_valid(&chain.verify()).is_ok());
    }
}
