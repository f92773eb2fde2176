//! Program Ops - instruction codec and execution pipeline for deployed Solana programs
//!
//! Operator scripts (verification harnesses, health checks, deployment
//! managers) drive an already-deployed program through RPC. This library is
//! the shared core they call into:
//!
//! - [`codec`]: little-endian, length-prefixed argument encoding
//! - [`derive`]: program-derived address search with a run-scoped cache
//! - [`instruction`]: selector + arguments + positional accounts
//! - [`classify`]: ordered marker table sorting simulation failures
//! - [`pipeline`]: simulate, submit, poll and retry with per-payer submit slots

pub mod classify;
pub mod codec;
pub mod config;
pub mod derive;
pub mod errors;
pub mod instruction;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod rpc;
pub mod selector;
pub mod test_utils;

pub use classify::{Classifier, ErrorClassification, ErrorKind, SimulationOutcome};
pub use codec::{CodecError, FieldKind, FieldValue, WireFormat};
pub use config::Config;
pub use derive::{AddressDeriver, DeriveError, DerivedAddress};
pub use errors::PipelineError;
pub use instruction::{AccountRef, InstructionBuilder, InstructionDescriptor};
pub use pipeline::{ConfirmationState, Execution, ExecutionPipeline, ExecutionResult};
pub use rpc::{ProgramRpc, RpcError, SolanaRpc};
pub use selector::{selector_of, Selector};
