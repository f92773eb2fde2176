use super::{ProgramRpc, RpcError, SignatureState};
use crate::classify::SimulationOutcome;
use crate::config::{ConfigError, RpcConfig};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{
    client_error::Error as ClientError,
    config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::Transaction,
};
use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, trace};

/// [`ProgramRpc`] over the nonblocking Solana client
///
/// Every call waits on a shared rate limiter and an explicit timeout, so a
/// single slow or throttling node cannot stall the pipeline.
pub struct SolanaRpc {
    client: RpcClient,
    endpoint: String,
    commitment: CommitmentConfig,
    limiter: DefaultDirectRateLimiter,
    timeout: Duration,
    skip_preflight: bool,
}

impl fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment.commitment)
            .field("timeout", &self.timeout)
            .field("skip_preflight", &self.skip_preflight)
            .finish()
    }
}

impl SolanaRpc {
    pub fn from_config(config: &RpcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let commitment = config.commitment_config()?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let rps = NonZeroU32::new(config.rate_limit_rps).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client: RpcClient::new_with_timeout_and_commitment(
                config.url.clone(),
                timeout,
                commitment,
            ),
            endpoint: config.url.clone(),
            commitment,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            timeout,
            skip_preflight: config.skip_preflight,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.commitment
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    async fn call<T, F>(&self, method: &'static str, request: F) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        self.limiter.until_ready().await;
        trace!(endpoint = %self.endpoint, method, "RPC request");

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = RpcError::from_client_error(&e, &self.endpoint, self.timeout_ms());
                debug!(endpoint = %self.endpoint, method, error = %err, "RPC request failed");
                Err(err)
            }
            Err(_) => {
                debug!(endpoint = %self.endpoint, method, timeout_ms = self.timeout_ms(), "RPC request timed out");
                Err(RpcError::Timeout {
                    endpoint: self.endpoint.clone(),
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }
}

#[async_trait]
impl ProgramRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        let (hash, _last_valid_height) = self
            .call(
                "getLatestBlockhash",
                self.client.get_latest_blockhash_with_commitment(self.commitment),
            )
            .await?;
        Ok(hash)
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, RpcError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = self
            .call(
                "simulateTransaction",
                self.client.simulate_transaction_with_config(transaction, config),
            )
            .await?;

        let result = response.value;
        let raw_error = result
            .err
            .as_ref()
            .map(|err| serde_json::to_value(err).unwrap_or_else(|_| format!("{err:?}").into()));

        Ok(SimulationOutcome {
            succeeded: result.err.is_none(),
            log_lines: result.logs.unwrap_or_default(),
            raw_error,
            units_consumed: result.units_consumed,
        })
    }

    async fn submit(&self, transaction: &Transaction) -> Result<Signature, RpcError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: self.skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        self.call(
            "sendTransaction",
            self.client.send_transaction_with_config(transaction, config),
        )
        .await
    }

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState, RpcError> {
        let response = self
            .call(
                "getSignatureStatuses",
                self.client.get_signature_statuses(&[*signature]),
            )
            .await?;

        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(SignatureState::Pending),
        };
        if !status.satisfies_commitment(self.commitment) {
            return Ok(SignatureState::Pending);
        }

        Ok(match status.err {
            Some(err) => SignatureState::Errored {
                slot: status.slot,
                reason: format!("{err:?}"),
            },
            None => SignatureState::Landed { slot: status.slot },
        })
    }

    async fn account_info(&self, address: &Pubkey) -> Result<Option<Account>, RpcError> {
        let response = self
            .call(
                "getAccountInfo",
                self.client
                    .get_account_with_commitment(address, self.commitment),
            )
            .await?;
        Ok(response.value)
    }
}
