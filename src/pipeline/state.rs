//! Execution states and results
//!
//! One submit cycle walks `Built → Simulated → {Rejected | Submitted} →
//! {Confirmed | Failed | TimedOut}`. A retried cycle starts a fresh walk;
//! a finished one never moves again.

use crate::classify::ErrorClassification;
use crate::errors::PipelineError;
use solana_sdk::signature::Signature;

/// Position of one cycle in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Built,
    Simulated,
    Rejected,
    Submitted,
    Confirmed,
    Failed,
    TimedOut,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::Rejected | Stage::Confirmed | Stage::Failed | Stage::TimedOut
        )
    }

    pub fn can_transition_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Built, Simulated)
                | (Simulated, Rejected)
                | (Simulated, Submitted)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
                | (Submitted, TimedOut)
        )
    }
}

/// Checked walk through [`Stage`]s for one cycle
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: Stage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: Stage::Built,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn advance(&mut self, next: Stage) -> Result<Stage, PipelineError> {
        if !self.current.can_transition_to(next) {
            return Err(PipelineError::illegal_transition(self.current, next));
        }
        self.current = next;
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationState {
    Pending,
    Confirmed { slot: u64 },
    /// Landed with an on-chain error; authoritative, never retried
    Failed { reason: String },
    TimedOut { polls: u32 },
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationState::Pending)
    }

    pub fn stage(&self) -> Stage {
        match self {
            ConfirmationState::Pending => Stage::Submitted,
            ConfirmationState::Confirmed { .. } => Stage::Confirmed,
            ConfirmationState::Failed { .. } => Stage::Failed,
            ConfirmationState::TimedOut { .. } => Stage::TimedOut,
        }
    }
}

/// A submitted transaction and what became of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub signature: Signature,
    pub state: ConfirmationState,
    /// Submit cycles spent, counting this one
    pub attempts: u32,
}

impl ExecutionResult {
    pub fn new(signature: Signature, attempts: u32) -> Self {
        Self {
            signature,
            state: ConfirmationState::Pending,
            attempts,
        }
    }

    /// Move to `next`; terminal states are final
    pub fn transition(&mut self, next: ConfirmationState) -> Result<(), PipelineError> {
        if self.state.is_terminal() {
            return Err(PipelineError::illegal_transition(&self.state, &next));
        }
        self.state = next;
        Ok(())
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, ConfirmationState::Confirmed { .. })
    }
}

/// What `execute` hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// Submitted and driven to a terminal confirmation state. `precondition`
    /// is set when simulation predicted a precondition failure and the
    /// policy submitted anyway.
    Completed {
        result: ExecutionResult,
        precondition: Option<ErrorClassification>,
    },
    /// Stopped before submission
    Halted(ErrorClassification),
}

impl Execution {
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Execution::Completed { result, .. } => Some(result),
            Execution::Halted(_) => None,
        }
    }

    /// The halt reason, or the precondition a completed run was submitted past
    pub fn classification(&self) -> Option<&ErrorClassification> {
        match self {
            Execution::Completed { precondition, .. } => precondition.as_ref(),
            Execution::Halted(classification) => Some(classification),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.result().is_some_and(ExecutionResult::is_confirmed)
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Execution::Halted(_))
    }
}
