//! Execution pipeline
//!
//! Drives a built instruction through simulate → classify → submit → poll,
//! retrying whole cycles within a fixed budget.
//!
//! ## Cycle
//! 1. fetch a blockhash, sign, simulate, classify
//! 2. `Fatal` halts; `Transient` retries the cycle; `Precondition` proceeds
//!    unless [`PreconditionPolicy::Halt`] is configured
//! 3. take the fee payer's submit slot, fetch a fresh blockhash, re-sign,
//!    submit
//! 4. poll the signature at a fixed interval up to `max_poll_attempts`
//!
//! A `TimedOut` cycle is retried with a new blockhash while budget remains.
//! Its signature is still checked before the retry and in every later poll
//! round; whichever submission reaches a terminal state first is the result.
//! A `Failed` cycle is final: the chain already ruled on it.

pub mod retry;
pub mod slots;
pub mod state;

pub use crate::config::{PipelineConfig, PreconditionPolicy};
pub use retry::Backoff;
pub use slots::SubmitSlots;
pub use state::{ConfirmationState, Execution, ExecutionResult, Stage, StageTracker};

use crate::classify::{Classifier, ErrorClassification, ErrorKind, SimulationOutcome};
use crate::codec::FieldValue;
use crate::derive::{AddressDeriver, DerivedAddress};
use crate::errors::PipelineError;
use crate::instruction::{AccountRef, InstructionBuilder, InstructionDescriptor};
use crate::logging::ExecutionLogger;
use crate::observability::TraceContext;
use crate::rpc::{ProgramRpc, RpcError, SignatureState};
use retry::retry_with_backoff;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::Transaction,
};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};

/// Attempts for a single RPC read inside a cycle
const RPC_READ_ATTEMPTS: u32 = 3;

/// A signer usable from any task
pub type SharedSigner<'a> = &'a (dyn Signer + Sync);

/// Outcome of a dry run with no submission
#[derive(Debug, Clone, PartialEq)]
pub struct DryRun {
    pub outcome: SimulationOutcome,
    /// `None` when the simulation succeeded
    pub classification: Option<ErrorClassification>,
}

enum Cycle {
    Done(Execution),
    /// Retry if budget remains, otherwise return `fallback`
    Retry { reason: String, fallback: Execution },
}

enum Polled {
    Current(ConfirmationState),
    /// Index into the earlier signatures that reached a terminal state
    Earlier(usize, ConfirmationState),
}

/// A timed-out submission from an earlier cycle of the same call
struct Unresolved {
    signature: Signature,
    attempts: u32,
    precondition: Option<ErrorClassification>,
}

impl Unresolved {
    fn complete(&self, state: ConfirmationState) -> Result<Execution, PipelineError> {
        let mut result = ExecutionResult::new(self.signature, self.attempts);
        result.transition(state)?;
        Ok(Execution::Completed {
            result,
            precondition: self.precondition.clone(),
        })
    }
}

pub struct ExecutionPipeline {
    rpc: Arc<dyn ProgramRpc>,
    builder: InstructionBuilder,
    classifier: Classifier,
    deriver: Arc<AddressDeriver>,
    slots: Arc<SubmitSlots>,
    config: PipelineConfig,
    backoff: Backoff,
}

impl std::fmt::Debug for ExecutionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPipeline")
            .field("program_id", self.builder.program_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionPipeline {
    pub fn new(rpc: Arc<dyn ProgramRpc>, program_id: Pubkey, config: PipelineConfig) -> Self {
        let backoff = Backoff::new(config.backoff_base_ms, config.backoff_max_ms);
        Self {
            rpc,
            builder: InstructionBuilder::new(program_id),
            classifier: Classifier::default(),
            deriver: Arc::new(AddressDeriver::new()),
            slots: Arc::new(SubmitSlots::new()),
            config,
            backoff,
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Share one derivation cache across pipelines of the same run
    pub fn with_deriver(mut self, deriver: Arc<AddressDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    /// Share submit slots with pipelines for other programs paid by the same keys
    pub fn with_slots(mut self, slots: Arc<SubmitSlots>) -> Self {
        self.slots = slots;
        self
    }

    pub fn program_id(&self) -> &Pubkey {
        self.builder.program_id()
    }

    pub fn builder(&self) -> &InstructionBuilder {
        &self.builder
    }

    pub fn deriver(&self) -> &Arc<AddressDeriver> {
        &self.deriver
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Memoized derived address
    pub fn derive(
        &self,
        seeds: &[&[u8]],
        owning_program: &Pubkey,
    ) -> Result<DerivedAddress, PipelineError> {
        Ok(self.deriver.derive(seeds, owning_program)?)
    }

    pub async fn account_exists(&self, address: &Pubkey) -> Result<bool, PipelineError> {
        let account = retry_with_backoff("account_info", RPC_READ_ATTEMPTS, &self.backoff, || {
            self.rpc.account_info(address)
        })
        .await?;
        Ok(account.is_some())
    }

    /// Build, simulate and, if eligible, submit and confirm
    pub async fn execute(
        &self,
        operation: &str,
        accounts: Vec<AccountRef>,
        fields: &[FieldValue],
        fee_payer: SharedSigner<'_>,
    ) -> Result<Execution, PipelineError> {
        self.execute_with_signers(operation, accounts, fields, fee_payer, &[])
            .await
    }

    /// As [`execute`](Self::execute), for instructions with signers besides the payer
    pub async fn execute_with_signers(
        &self,
        operation: &str,
        accounts: Vec<AccountRef>,
        fields: &[FieldValue],
        fee_payer: SharedSigner<'_>,
        extra_signers: &[SharedSigner<'_>],
    ) -> Result<Execution, PipelineError> {
        let descriptor = self.builder.build(operation, accounts, fields)?;
        self.execute_descriptor(descriptor, fee_payer, extra_signers)
            .await
    }

    pub async fn execute_descriptor(
        &self,
        descriptor: InstructionDescriptor,
        fee_payer: SharedSigner<'_>,
        extra_signers: &[SharedSigner<'_>],
    ) -> Result<Execution, PipelineError> {
        let trace = TraceContext::new(descriptor.operation());
        let logger = ExecutionLogger::new(trace.correlation_id().clone(), descriptor.operation());
        let span = info_span!(
            "execute",
            operation = %descriptor.operation(),
            correlation_id = %trace.correlation_id(),
            payer = %fee_payer.pubkey(),
        );
        let instruction = descriptor.into_instruction();

        self.run_cycles(&instruction, fee_payer, extra_signers, &trace, &logger)
            .instrument(span)
            .await
    }

    /// Dry run only; nothing is submitted
    pub async fn simulate_only(
        &self,
        descriptor: InstructionDescriptor,
        fee_payer: SharedSigner<'_>,
        extra_signers: &[SharedSigner<'_>],
    ) -> Result<DryRun, PipelineError> {
        let instruction = descriptor.into_instruction();
        let outcome = self
            .simulate(&instruction, fee_payer, extra_signers)
            .await?;
        let classification = self.classifier.classify(&outcome);
        Ok(DryRun {
            outcome,
            classification,
        })
    }

    async fn run_cycles(
        &self,
        instruction: &Instruction,
        fee_payer: SharedSigner<'_>,
        extra_signers: &[SharedSigner<'_>],
        trace: &TraceContext,
        logger: &ExecutionLogger,
    ) -> Result<Execution, PipelineError> {
        let budget = self.config.retry_budget;
        let mut unresolved: Vec<Unresolved> = Vec::new();
        let mut cycle: u32 = 1;

        loop {
            // A timed-out submission may land late; resubmitting on top of it
            // would re-simulate against state this run created.
            if let Some(execution) = self.resolve_earlier(&unresolved, logger).await {
                return Ok(execution);
            }

            let cycle_trace = trace.cycle_span(cycle);
            let span = info_span!("cycle", cycle, span_id = %cycle_trace.span_id);
            let outcome = self
                .run_cycle(instruction, fee_payer, extra_signers, cycle, &unresolved, logger)
                .instrument(span)
                .await;

            let reason = match outcome {
                Ok(Cycle::Done(execution)) => return Ok(execution),
                Ok(Cycle::Retry { reason, fallback }) => {
                    if cycle > budget {
                        debug!(cycle, budget, "Retry budget exhausted");
                        return Ok(fallback);
                    }
                    if let Execution::Completed {
                        result,
                        precondition,
                    } = fallback
                    {
                        unresolved.push(Unresolved {
                            signature: result.signature,
                            attempts: result.attempts,
                            precondition,
                        });
                    }
                    reason
                }
                Err(e) if e.is_retryable() && cycle <= budget => e.to_string(),
                Err(e) => return Err(e),
            };

            let delay = self.backoff.delay(cycle - 1);
            logger.log_retry(cycle, budget, &reason, delay.as_millis() as u64);
            tokio::time::sleep(delay).await;
            cycle += 1;
        }
    }

    async fn run_cycle(
        &self,
        instruction: &Instruction,
        fee_payer: SharedSigner<'_>,
        extra_signers: &[SharedSigner<'_>],
        cycle: u32,
        unresolved: &[Unresolved],
        logger: &ExecutionLogger,
    ) -> Result<Cycle, PipelineError> {
        let mut stages = StageTracker::new();

        let outcome = self
            .simulate(instruction, fee_payer, extra_signers)
            .await?;
        stages.advance(Stage::Simulated)?;

        let classification = self.classifier.classify(&outcome);
        logger.log_simulated(cycle, classification.as_ref(), outcome.units_consumed);

        let precondition = match classification {
            None => None,
            Some(c) => match c.kind {
                ErrorKind::Fatal => {
                    stages.advance(Stage::Rejected)?;
                    logger.log_halted(cycle, &c);
                    return Ok(Cycle::Done(Execution::Halted(c)));
                }
                ErrorKind::Transient => {
                    stages.advance(Stage::Rejected)?;
                    return Ok(Cycle::Retry {
                        reason: c.to_string(),
                        fallback: Execution::Halted(c),
                    });
                }
                // Submission-eligible; halting is an operator opt-in
                ErrorKind::Precondition => match self.config.precondition_policy {
                    PreconditionPolicy::Submit => {
                        logger.log_precondition_submitted(&c);
                        Some(c)
                    }
                    PreconditionPolicy::Halt => {
                        logger.log_halted(cycle, &c);
                        return Ok(Cycle::Done(Execution::Halted(c)));
                    }
                },
            },
        };

        let payer = fee_payer.pubkey();
        let _slot = self.slots.acquire(&payer).await;

        let blockhash = self.fresh_blockhash().await?;
        let transaction = sign(instruction, fee_payer, extra_signers, blockhash)?;
        let signature = self.rpc.submit(&transaction).await?;
        stages.advance(Stage::Submitted)?;
        logger.log_submitted(cycle, &signature.to_string());

        let submitted_at = Instant::now();
        let earlier: Vec<Signature> = unresolved.iter().map(|u| u.signature).collect();
        let state = match self.poll(&signature, &earlier, logger).await? {
            Polled::Current(state) => state,
            Polled::Earlier(index, state) => {
                // The cycle's own submission stays unresolved; the call already applied
                let landed = &unresolved[index];
                self.log_terminal(logger, &landed.signature, &state, submitted_at);
                return Ok(Cycle::Done(landed.complete(state)?));
            }
        };
        stages.advance(state.stage())?;

        let mut result = ExecutionResult::new(signature, cycle);
        result.transition(state.clone())?;
        self.log_terminal(logger, &signature, &state, submitted_at);

        if let ConfirmationState::TimedOut { polls } = state {
            return Ok(Cycle::Retry {
                reason: format!("signature {signature} not final after {polls} polls"),
                fallback: Execution::Completed {
                    result,
                    precondition,
                },
            });
        }

        Ok(Cycle::Done(Execution::Completed {
            result,
            precondition,
        }))
    }

    fn log_terminal(
        &self,
        logger: &ExecutionLogger,
        signature: &Signature,
        state: &ConfirmationState,
        submitted_at: Instant,
    ) {
        let signature = signature.to_string();
        match state {
            ConfirmationState::Confirmed { slot } => {
                logger.log_confirmed(&signature, *slot, submitted_at.elapsed().as_millis() as u64)
            }
            ConfirmationState::Failed { reason } => logger.log_failed(&signature, reason),
            ConfirmationState::TimedOut { polls } => logger.log_timed_out(&signature, *polls),
            ConfirmationState::Pending => {}
        }
    }

    /// One status pass over earlier timed-out submissions
    async fn resolve_earlier(
        &self,
        unresolved: &[Unresolved],
        logger: &ExecutionLogger,
    ) -> Option<Execution> {
        for earlier in unresolved {
            match self.terminal_state(&earlier.signature).await {
                Ok(Some(state)) => {
                    debug!(signature = %earlier.signature, "Earlier submission reached a terminal state");
                    self.log_terminal(logger, &earlier.signature, &state, Instant::now());
                    return earlier.complete(state).ok();
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(signature = %earlier.signature, error = %e, "Status check of earlier submission failed");
                }
            }
        }
        None
    }

    async fn simulate(
        &self,
        instruction: &Instruction,
        fee_payer: SharedSigner<'_>,
        extra_signers: &[SharedSigner<'_>],
    ) -> Result<SimulationOutcome, PipelineError> {
        let blockhash = self.fresh_blockhash().await?;
        let transaction = sign(instruction, fee_payer, extra_signers, blockhash)?;
        Ok(self.rpc.simulate(&transaction).await?)
    }

    async fn fresh_blockhash(&self) -> Result<Hash, PipelineError> {
        Ok(
            retry_with_backoff("latest_blockhash", RPC_READ_ATTEMPTS, &self.backoff, || {
                self.rpc.latest_blockhash()
            })
            .await?,
        )
    }

    /// `None` while the signature is still pending
    async fn terminal_state(
        &self,
        signature: &Signature,
    ) -> Result<Option<ConfirmationState>, RpcError> {
        Ok(match self.rpc.signature_state(signature).await? {
            SignatureState::Pending => None,
            SignatureState::Landed { slot } => Some(ConfirmationState::Confirmed { slot }),
            SignatureState::Errored { reason, .. } => Some(ConfirmationState::Failed { reason }),
        })
    }

    /// Poll `signature` at a fixed interval, checking earlier submissions first
    /// in each round
    async fn poll(
        &self,
        signature: &Signature,
        earlier: &[Signature],
        logger: &ExecutionLogger,
    ) -> Result<Polled, PipelineError> {
        let max_polls = self.config.max_poll_attempts;
        let signature_str = signature.to_string();

        for poll in 1..=max_polls {
            tokio::time::sleep(self.config.poll_interval()).await;

            for (index, previous) in earlier.iter().enumerate() {
                match self.terminal_state(previous).await {
                    Ok(Some(state)) => return Ok(Polled::Earlier(index, state)),
                    Ok(None) => {}
                    Err(e) => {
                        debug!(signature = %previous, poll, error = %e, "Earlier submission status failed")
                    }
                }
            }

            match self.terminal_state(signature).await {
                Ok(Some(state)) => return Ok(Polled::Current(state)),
                Ok(None) => logger.log_poll(&signature_str, poll, max_polls),
                Err(e) if e.is_retryable() => {
                    debug!(signature = %signature_str, poll, error = %e, "Status poll failed, continuing");
                }
                Err(source) => {
                    return Err(PipelineError::Poll {
                        signature: *signature,
                        source,
                    })
                }
            }
        }

        Ok(Polled::Current(ConfirmationState::TimedOut { polls: max_polls }))
    }
}

/// Assemble and sign a single-instruction transaction paid by `fee_payer`
fn sign(
    instruction: &Instruction,
    fee_payer: SharedSigner<'_>,
    extra_signers: &[SharedSigner<'_>],
    blockhash: Hash,
) -> Result<Transaction, PipelineError> {
    let message = Message::new(std::slice::from_ref(instruction), Some(&fee_payer.pubkey()));
    let mut transaction = Transaction::new_unsigned(message);

    let mut signers: Vec<&dyn Signer> = Vec::with_capacity(extra_signers.len() + 1);
    signers.push(fee_payer);
    signers.extend(extra_signers.iter().map(|s| *s as &dyn Signer));

    transaction
        .try_sign(&signers, blockhash)
        .map_err(|e| PipelineError::Signing(e.to_string()))?;
    Ok(transaction)
}
