//! Test utilities
//!
//! `MockRpc` is a scripted, in-memory stand-in for the network. Scripted
//! responses are consumed in order; once a script runs dry the mock falls
//! back to a successful default. Only compiled for tests or with the
//! `test_utils` feature.

#![cfg(any(test, feature = "test_utils"))]

use crate::classify::SimulationOutcome;
use crate::rpc::{ProgramRpc, RpcError, SignatureState};
use async_trait::async_trait;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::CompiledInstruction,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

type Fingerprint = (Vec<Pubkey>, Vec<CompiledInstruction>);

#[derive(Default)]
struct MockState {
    next_blockhash: u64,
    next_slot: u64,
    blockhash_errors: VecDeque<RpcError>,
    simulations: VecDeque<SimulationOutcome>,
    submit_errors: VecDeque<RpcError>,
    statuses: VecDeque<Result<SignatureState, RpcError>>,
    default_pending: bool,
    idempotent: bool,
    applied: Vec<Fingerprint>,
    rejected: HashSet<Signature>,
    accounts: HashMap<Pubkey, Account>,
    simulated: Vec<Transaction>,
    submitted: Vec<Transaction>,
    in_flight: HashSet<Signature>,
    max_in_flight: usize,
    status_queries: usize,
}

/// Scripted network for pipeline tests
#[derive(Default)]
pub struct MockRpc {
    state: Mutex<MockState>,
}

fn fingerprint(transaction: &Transaction) -> Fingerprint {
    (
        transaction.message.account_keys.clone(),
        transaction.message.instructions.clone(),
    )
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next simulation returns `outcome`
    pub async fn push_simulation(&self, outcome: SimulationOutcome) {
        self.state.lock().await.simulations.push_back(outcome);
    }

    /// Next simulation fails with these log lines and no structured error
    pub async fn push_failed_simulation(&self, logs: &[&str]) {
        let logs = logs.iter().map(|l| l.to_string()).collect();
        self.push_simulation(SimulationOutcome::failure(logs, None))
            .await;
    }

    pub async fn push_status(&self, state: SignatureState) {
        self.state.lock().await.statuses.push_back(Ok(state));
    }

    pub async fn push_statuses(&self, state: SignatureState, count: usize) {
        let mut guard = self.state.lock().await;
        for _ in 0..count {
            guard.statuses.push_back(Ok(state.clone()));
        }
    }

    pub async fn push_status_error(&self, err: RpcError) {
        self.state.lock().await.statuses.push_back(Err(err));
    }

    pub async fn push_submit_error(&self, err: RpcError) {
        self.state.lock().await.submit_errors.push_back(err);
    }

    pub async fn push_blockhash_error(&self, err: RpcError) {
        self.state.lock().await.blockhash_errors.push_back(err);
    }

    /// Unscripted status polls report `Pending` instead of `Landed`
    pub async fn set_never_lands(&self, never: bool) {
        self.state.lock().await.default_pending = never;
    }

    /// Re-simulating an already submitted instruction reports "already in use",
    /// and resubmitting it lands with an instruction error
    pub async fn set_idempotent(&self, idempotent: bool) {
        self.state.lock().await.idempotent = idempotent;
    }

    pub async fn insert_account(&self, address: Pubkey, account: Account) {
        self.state.lock().await.accounts.insert(address, account);
    }

    pub async fn submitted(&self) -> Vec<Transaction> {
        self.state.lock().await.submitted.clone()
    }

    pub async fn submit_count(&self) -> usize {
        self.state.lock().await.submitted.len()
    }

    pub async fn simulate_count(&self) -> usize {
        self.state.lock().await.simulated.len()
    }

    pub async fn status_queries(&self) -> usize {
        self.state.lock().await.status_queries
    }

    /// Blockhashes of submitted transactions, in submission order
    pub async fn submitted_blockhashes(&self) -> Vec<Hash> {
        self.state
            .lock()
            .await
            .submitted
            .iter()
            .map(|tx| tx.message.recent_blockhash)
            .collect()
    }

    pub async fn simulated_blockhashes(&self) -> Vec<Hash> {
        self.state
            .lock()
            .await
            .simulated
            .iter()
            .map(|tx| tx.message.recent_blockhash)
            .collect()
    }

    /// Most submissions ever awaiting a terminal status at once
    pub async fn max_in_flight(&self) -> usize {
        self.state.lock().await.max_in_flight
    }
}

#[async_trait]
impl ProgramRpc for MockRpc {
    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.blockhash_errors.pop_front() {
            return Err(err);
        }
        state.next_blockhash += 1;
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&state.next_blockhash.to_le_bytes());
        Ok(Hash::new_from_array(bytes))
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, RpcError> {
        let mut state = self.state.lock().await;
        state.simulated.push(transaction.clone());

        if let Some(outcome) = state.simulations.pop_front() {
            return Ok(outcome);
        }
        if state.idempotent && state.applied.contains(&fingerprint(transaction)) {
            return Ok(SimulationOutcome::failure(
                vec![
                    "Program 11111111111111111111111111111111 invoke [2]".to_string(),
                    "Allocate: account already in use".to_string(),
                    "Program 11111111111111111111111111111111 failed: custom program error: 0x0"
                        .to_string(),
                ],
                Some(serde_json::json!({"InstructionError": [0, {"Custom": 0}]})),
            ));
        }
        Ok(SimulationOutcome {
            succeeded: true,
            log_lines: vec!["Program log: ok".to_string()],
            raw_error: None,
            units_consumed: Some(1_400),
        })
    }

    async fn submit(&self, transaction: &Transaction) -> Result<Signature, RpcError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.submit_errors.pop_front() {
            return Err(err);
        }
        let signature = transaction.signatures.first().copied().unwrap_or_default();
        let applied = fingerprint(transaction);
        if state.idempotent && state.applied.contains(&applied) {
            state.rejected.insert(signature);
        }
        state.submitted.push(transaction.clone());
        state.applied.push(applied);
        state.in_flight.insert(signature);
        state.max_in_flight = state.max_in_flight.max(state.in_flight.len());
        Ok(signature)
    }

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState, RpcError> {
        let mut state = self.state.lock().await;
        state.status_queries += 1;

        let next = match state.statuses.pop_front() {
            Some(scripted) => scripted?,
            None if state.default_pending => SignatureState::Pending,
            None if state.rejected.contains(signature) => {
                state.next_slot += 1;
                SignatureState::Errored {
                    slot: state.next_slot,
                    reason: "InstructionError(0, Custom(0))".to_string(),
                }
            }
            None => {
                state.next_slot += 1;
                SignatureState::Landed {
                    slot: state.next_slot,
                }
            }
        };
        if next.is_terminal() {
            state.in_flight.remove(signature);
        }
        Ok(next)
    }

    async fn account_info(&self, address: &Pubkey) -> Result<Option<Account>, RpcError> {
        Ok(self.state.lock().await.accounts.get(address).cloned())
    }
}
