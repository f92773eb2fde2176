//! Upstream RPC surface
//!
//! The pipeline only needs five calls from the network. They are expressed
//! as a trait so scenario tests can script the network with
//! [`MockRpc`](crate::test_utils::MockRpc) while production wires in
//! [`SolanaRpc`].

pub mod client;
pub mod errors;

pub use client::SolanaRpc;
pub use errors::RpcError;

use crate::classify::SimulationOutcome;
use async_trait::async_trait;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};

/// What the network currently reports for a submitted signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Unknown to the node, or not yet at the configured commitment
    Pending,
    /// Reached the commitment without error
    Landed { slot: u64 },
    /// Reached the commitment carrying an on-chain error
    Errored { slot: u64, reason: String },
}

impl SignatureState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignatureState::Pending)
    }
}

#[async_trait]
pub trait ProgramRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash, RpcError>;

    /// Dry run; a program failure is a successful call returning a failed outcome
    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, RpcError>;

    async fn submit(&self, transaction: &Transaction) -> Result<Signature, RpcError>;

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState, RpcError>;

    async fn account_info(&self, address: &Pubkey) -> Result<Option<Account>, RpcError>;
}
