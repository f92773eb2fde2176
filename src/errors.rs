//! Error type for pipeline operations
//!
//! Classified simulation results are not errors: a halted execution is
//! returned as data. `PipelineError` covers the cases where the pipeline
//! could not reach a classification or a terminal confirmation state at all.

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::derive::DeriveError;
use crate::rpc::RpcError;
use solana_sdk::signature::Signature;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A field value the wire format cannot represent
    #[error("Encoding error: {0}")]
    Codec(#[from] CodecError),

    /// Seed bounds exceeded or no off-curve bump exists
    #[error("Derivation error: {0}")]
    Derive(#[from] DeriveError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Status polling broke off after submission; the transaction may still land
    #[error("Status polling failed for {signature}: {source}")]
    Poll {
        signature: Signature,
        #[source]
        source: RpcError,
    },

    /// Missing or mismatched signer for the assembled transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Internal invariant violation; indicates a bug
    #[error("Illegal state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl PipelineError {
    /// Check if retrying the operation might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(e) => e.is_retryable(),

            // resubmitting could apply the call twice
            Self::Poll { .. } => false,
            Self::Codec(_) => false,
            Self::Derive(_) => false,
            Self::Signing(_) => false,
            Self::IllegalTransition { .. } => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Codec(_) => "codec",
            Self::Derive(_) => "derive",
            Self::Rpc(_) => "rpc",
            Self::Poll { .. } => "poll",
            Self::Signing(_) => "signing",
            Self::IllegalTransition { .. } => "internal",
            Self::Configuration(_) => "config",
        }
    }

    /// Signature of a submitted transaction whose outcome is unknown
    pub fn submitted_signature(&self) -> Option<&Signature> {
        match self {
            Self::Poll { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub fn illegal_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::IllegalTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }
}
