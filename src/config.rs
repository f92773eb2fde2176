//! Configuration loading
//!
//! Settings come from a TOML file with per-field defaults. A `.env` file and
//! `PROGRAM_OPS_*` environment variables may override the RPC endpoint and
//! commitment so the same file works across clusters.

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_RPC_URL: &str = "PROGRAM_OPS_RPC_URL";
pub const ENV_COMMITMENT: &str = "PROGRAM_OPS_COMMITMENT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Rate limit (requests per second)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: u32,

    /// Skip the node's own preflight simulation; ours already ran
    #[serde(default = "default_true")]
    pub skip_preflight: bool,
}

/// What to do when simulation reports a precondition failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionPolicy {
    /// Submit anyway for the authoritative on-chain result
    #[default]
    Submit,
    /// Report the classification without spending fees
    Halt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Delay between signature status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polls per submission before the attempt counts as timed out
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Extra whole cycles allowed after a timeout or transient failure
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    #[serde(default)]
    pub precondition_policy: PreconditionPolicy,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

/// Operator-supplied markers appended to the built-in classification table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub precondition_markers: Vec<String>,

    #[serde(default)]
    pub transient_markers: Vec<String>,

    #[serde(default)]
    pub fatal_markers: Vec<String>,
}

// Default value functions
fn default_rpc_url() -> String { "http://127.0.0.1:8899".to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_rate_limit() -> u32 { 10 }
fn default_true() -> bool { true }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_max_poll_attempts() -> u32 { 60 }
fn default_retry_budget() -> u32 { 2 }
fn default_backoff_base_ms() -> u64 { 200 }
fn default_backoff_max_ms() -> u64 { 5_000 }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: default_commitment(),
            timeout_ms: default_timeout_ms(),
            rate_limit_rps: default_rate_limit(),
            skip_preflight: default_true(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            retry_budget: default_retry_budget(),
            precondition_policy: PreconditionPolicy::default(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RpcConfig {
    pub fn commitment_config(&self) -> Result<CommitmentConfig, ConfigError> {
        match self.commitment.to_ascii_lowercase().as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(ConfigError::Validation(format!(
                "unknown commitment level '{other}' (expected processed, confirmed or finalized)"
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "rpc url must be http(s), got '{}'",
                self.url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation("rpc timeout_ms must be > 0".to_string()));
        }
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::Validation("rpc rate_limit_rps must be > 0".to_string()));
        }
        self.commitment_config().map(|_| ())
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::Validation(
                "pipeline max_poll_attempts must be > 0".to_string(),
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::Validation(format!(
                "pipeline backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `PROGRAM_OPS_*` overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL).filter(|v| !v.trim().is_empty()) {
            self.rpc.url = url.trim().to_string();
        }
        if let Some(commitment) = lookup(ENV_COMMITMENT).filter(|v| !v.trim().is_empty()) {
            self.rpc.commitment = commitment.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc.validate()?;
        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pipeline.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.pipeline.precondition_policy, PreconditionPolicy::Submit);
        assert!(config.rpc.skip_preflight);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [rpc]
            url = "https://api.devnet.solana.com"
            commitment = "finalized"

            [pipeline]
            retry_budget = 5
            precondition_policy = "halt"

            [classifier]
            precondition_markers = ["vault locked"]
            "#,
        )
        .unwrap();

        assert_eq!(config.rpc.url, "https://api.devnet.solana.com");
        assert_eq!(config.rpc.timeout_ms, 30_000);
        assert_eq!(config.rpc.commitment_config().unwrap(), CommitmentConfig::finalized());
        assert_eq!(config.pipeline.retry_budget, 5);
        assert_eq!(config.pipeline.max_poll_attempts, 60);
        assert_eq!(config.pipeline.precondition_policy, PreconditionPolicy::Halt);
        assert_eq!(config.classifier.precondition_markers, vec!["vault locked"]);
        assert!(config.classifier.fatal_markers.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Config::from_toml_str("[rpc]\nurl = \"ws://node\""),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[rpc]\ncommitment = \"recent-ish\""),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[pipeline]\nmax_poll_attempts = 0"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[pipeline]\nbackoff_base_ms = 9000"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[pipeline\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_RPC_URL, " https://rpc.example.org "),
            (ENV_COMMITMENT, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.rpc.url, "https://rpc.example.org");
        assert_eq!(config.rpc.commitment, "confirmed");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\npoll_interval_ms = 250").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.poll_interval_ms, 250);

        let missing = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
