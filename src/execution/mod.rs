//! Execution of futures against the network.
//!
//! [`ExecutionEngine`] runs batches of futures concurrently. Each future's
//! network work goes through the [`TransactionTracker`], and every step is
//! journaled before it takes effect.

mod engine;
pub mod fees;
mod nonce;
mod strategy;
mod tracker;

pub use engine::ExecutionEngine;
pub use nonce::{NonceGuard, NonceManager};
pub use strategy::{strategy_for, BasicStrategy, Create2Strategy, DeploymentRequest, ExecutionStrategy};
pub use tracker::{InteractionOutcome, TransactionTracker};

use crate::artifacts::ArtifactError;
use crate::journal::JournalError;
use crate::provider::ProviderError;
use crate::resolve::ResolveError;
use alloy_primitives::U256;
use ignition_graph::FutureId;
use thiserror::Error;

/// Errors that abort a run. Failures of individual futures are journaled as
/// `FAILED` instead and are not errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("cannot resolve inputs of {future}: {source}")]
    Resolve {
        future: FutureId,
        #[source]
        source: ResolveError,
    },
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("no artifact loaded for {0}")]
    MissingArtifact(FutureId),
    #[error("fees of {future} would be {fees} wei per gas, above the configured limit")]
    FeeLimitExceeded { future: FutureId, fees: U256 },
    #[error("execution was cancelled")]
    Cancelled,
}
