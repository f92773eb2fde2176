//! Tracing setup and structured per-execution events

use crate::classify::ErrorClassification;
use crate::observability::CorrelationId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` wins over the `verbose` default when set.
pub fn init_logging(verbose: bool, json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let default_filter = if verbose {
        "program_ops=debug,info"
    } else {
        "program_ops=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    }
}

/// Typed stage events for one `execute` call
#[derive(Debug, Clone)]
pub struct ExecutionLogger {
    correlation_id: CorrelationId,
    operation: String,
}

impl ExecutionLogger {
    pub fn new(correlation_id: CorrelationId, operation: impl Into<String>) -> Self {
        Self {
            correlation_id,
            operation: operation.into(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_simulated(&self, cycle: u32, classification: Option<&ErrorClassification>, units: Option<u64>) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            cycle,
            classification = classification.map(|c| c.kind.as_str()).unwrap_or("ok"),
            units_consumed = ?units,
            "Simulation finished"
        );
    }

    pub fn log_halted(&self, cycle: u32, classification: &ErrorClassification) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            cycle,
            kind = classification.kind.as_str(),
            marker = ?classification.marker,
            excerpt = %classification.excerpt,
            "Halted before submission"
        );
    }

    pub fn log_precondition_submitted(&self, classification: &ErrorClassification) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            marker = ?classification.marker,
            "Submitting despite simulated precondition failure"
        );
    }

    pub fn log_submitted(&self, cycle: u32, signature: &str) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            cycle,
            signature = %signature,
            "Transaction submitted"
        );
    }

    pub fn log_poll(&self, signature: &str, poll: u32, max_polls: u32) {
        tracing::trace!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            poll,
            max_polls,
            "Signature still pending"
        );
    }

    pub fn log_confirmed(&self, signature: &str, slot: u64, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            signature = %signature,
            slot,
            latency_ms,
            "Transaction confirmed"
        );
    }

    pub fn log_failed(&self, signature: &str, reason: &str) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            signature = %signature,
            reason = %reason,
            "Transaction failed on chain"
        );
    }

    pub fn log_timed_out(&self, signature: &str, polls: u32) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            signature = %signature,
            polls,
            "No terminal status within polling budget"
        );
    }

    pub fn log_retry(&self, cycle: u32, budget: u32, reason: &str, backoff_ms: u64) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            cycle,
            budget,
            reason = %reason,
            backoff_ms,
            "Retrying execution cycle"
        );
    }
}
