//! program-ops - diagnostics for the instruction codec and execution pipeline
//!
//! Offline helpers (selectors, derived addresses, log classification) plus
//! read-only network lookups. Nothing here holds keys or submits.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use program_ops::{
    classify::{Classifier, SimulationOutcome},
    config::Config,
    derive::AddressDeriver,
    logging::init_logging,
    rpc::{ProgramRpc, SolanaRpc},
    selector::Selector,
};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "program-ops.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the 8-byte selector of an operation
    Selector {
        operation: String,
        #[arg(long, default_value = "global")]
        namespace: String,
    },

    /// Derive a program address from seeds (str:, hex: or pubkey: prefixed)
    Derive {
        #[arg(long)]
        program: String,
        #[arg(long = "seed")]
        seeds: Vec<String>,
    },

    /// Classify a simulation log file, one log line per line
    Classify { log_file: String },

    /// Fetch the status of a submitted signature
    Status { signature: String },

    /// Check whether an account exists
    Account { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json).map_err(|e| anyhow!("failed to init logging: {e}"))?;

    let config = load_config(&args.config)?;

    match args.command {
        Command::Selector {
            operation,
            namespace,
        } => {
            let selector = Selector::namespaced(&namespace, &operation);
            println!("{selector}  {:?}", selector.as_bytes());
        }
        Command::Derive { program, seeds } => {
            let program = parse_pubkey(&program)?;
            let seeds = seeds
                .iter()
                .map(|s| parse_seed(s))
                .collect::<Result<Vec<_>>>()?;
            let seed_refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();

            let derived = AddressDeriver::new()
                .derive(&seed_refs, &program)
                .context("derivation failed")?;
            println!("{} (bump {})", derived.address, derived.bump);
        }
        Command::Classify { log_file } => {
            let content = std::fs::read_to_string(&log_file)
                .with_context(|| format!("Failed to read {log_file}"))?;
            let lines: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();

            let classifier = Classifier::from_config(&config.classifier);
            match classifier.classify(&SimulationOutcome::failure(lines, None)) {
                Some(classification) => println!("{classification}"),
                None => println!("ok"),
            }
        }
        Command::Status { signature } => {
            let signature = Signature::from_str(&signature)
                .map_err(|e| anyhow!("invalid signature '{signature}': {e}"))?;
            let rpc = SolanaRpc::from_config(&config.rpc)?;
            let state = rpc.signature_state(&signature).await?;
            println!("{state:?}");
        }
        Command::Account { address } => {
            let address = parse_pubkey(&address)?;
            let rpc = SolanaRpc::from_config(&config.rpc)?;
            match rpc.account_info(&address).await? {
                Some(account) => println!(
                    "owner {} lamports {} data {} bytes",
                    account.owner,
                    account.lamports,
                    account.data.len()
                ),
                None => println!("not found"),
            }
        }
    }

    Ok(())
}

fn parse_pubkey(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| anyhow!("invalid pubkey '{s}': {e}"))
}

fn parse_seed(s: &str) -> Result<Vec<u8>> {
    if let Some(text) = s.strip_prefix("str:") {
        Ok(text.as_bytes().to_vec())
    } else if let Some(hex_str) = s.strip_prefix("hex:") {
        hex::decode(hex_str).with_context(|| format!("invalid hex seed '{hex_str}'"))
    } else if let Some(key) = s.strip_prefix("pubkey:") {
        Ok(parse_pubkey(key)?.to_bytes().to_vec())
    } else {
        bail!("seed '{s}' needs a str:, hex: or pubkey: prefix")
    }
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        let config = Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))?;
        info!(path, rpc = %config.rpc.url, "Configuration loaded");
        Ok(config)
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        dotenvy::dotenv().ok();
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_prefixes() {
        assert_eq!(parse_seed("str:vault").unwrap(), b"vault".to_vec());
        assert_eq!(parse_seed("hex:0a0b").unwrap(), vec![10, 11]);

        let key = Pubkey::new_unique();
        assert_eq!(parse_seed(&format!("pubkey:{key}")).unwrap(), key.to_bytes().to_vec());

        assert!(parse_seed("vault").is_err());
        assert!(parse_seed("hex:zz").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "program-ops",
            "derive",
            "--program",
            "11111111111111111111111111111111",
            "--seed",
            "str:a",
            "--seed",
            "hex:01",
        ])
        .unwrap();
        match args.command {
            Command::Derive { seeds, .. } => assert_eq!(seeds.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }
}
