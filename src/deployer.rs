//! Run orchestration.
//!
//! A run loads the deployment state from the journal, checks it against the
//! network and the current graph, and only then executes what is left:
//!
//! 1. the journal must belong to the current chain
//! 2. no future may be left FAILED or TIMEOUT by an earlier run
//! 3. every recorded future must reconcile with its declaration
//! 4. every new future must pass validation
//!
//! Any of these stops the run before a single message about execution is
//! journaled.

use crate::artifacts::{ArtifactError, ArtifactResolver, ArtifactStore};
use crate::batcher::batch;
use crate::clock::{Clock, SystemClock};
use crate::config::DeployConfig;
use crate::execution::{ExecutionEngine, ExecutionError, TransactionTracker};
use crate::journal::{Journal, JournalError, JournalMessage};
use crate::provider::{JsonRpcClient, Provider, ProviderError};
use crate::reconciliation::{reconcile, ReconciliationFailure};
use crate::resolve::{DeploymentParameters, ResolveContext};
use crate::state::{DeploymentState, DeploymentStore, ExecutionStatus, FailureReason};
use crate::validation::{validate, ValidationError};
use ignition_graph::{FutureGraph, FutureId};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DeployerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("deployment was recorded on chain {recorded} but the network is chain {current}")]
    ChainIdMismatch { recorded: u64, current: u64 },
    #[error("future {0} has no execution state")]
    NotStarted(FutureId),
    #[error("cannot wipe {future}: {dependents:?} depend on it and have execution state")]
    HasDependents {
        future: FutureId,
        dependents: Vec<FutureId>,
    },
}

/// A future that ended FAILED, with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FutureFailure {
    pub future_id: FutureId,
    pub reason: String,
}

/// How a run ended. Only unexpected conditions are errors; a deployment
/// that cannot proceed is a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentResult {
    /// Every future of the graph is SUCCESS.
    Success,
    ValidationFailed(Vec<ValidationError>),
    ReconciliationFailed(Vec<ReconciliationFailure>),
    /// Futures left FAILED or TIMEOUT by an earlier run; wipe them to retry.
    PreviousRunFailed(Vec<FutureId>),
    ExecutionFailed {
        failed: Vec<FutureFailure>,
        timed_out: Vec<FutureId>,
        /// Futures that never started because something they need did not
        /// succeed.
        held: Vec<FutureId>,
    },
    /// Stopped by the cancellation token. Started futures resume on the
    /// next run.
    Cancelled,
}

impl DeploymentResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentResult::Success)
    }
}

pub struct Deployer {
    client: JsonRpcClient,
    journal: Arc<dyn Journal>,
    resolver: Arc<dyn ArtifactResolver>,
    config: Arc<DeployConfig>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl Deployer {
    pub fn new(
        provider: Arc<dyn Provider>,
        journal: Arc<dyn Journal>,
        resolver: Arc<dyn ArtifactResolver>,
        config: DeployConfig,
    ) -> Self {
        Self {
            client: JsonRpcClient::new(provider),
            journal,
            resolver,
            config: Arc::new(config),
            clock: Arc::new(SystemClock::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Token that stops the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `graph` to completion, resuming from whatever the journal
    /// already holds.
    ///
    /// Runs that end without reaching the chain's state are reported through
    /// [`DeploymentResult`]; errors are reserved for provider and journal
    /// failures.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ignition_engine::artifacts::ArtifactMap;
    /// use ignition_engine::config::DeployConfig;
    /// use ignition_engine::journal::FileJournal;
    /// use ignition_engine::provider::DevNetwork;
    /// use ignition_engine::{Deployer, DeploymentResult};
    /// use ignition_graph::FutureGraph;
    /// use std::sync::Arc;
    ///
    /// # async fn run(graph: FutureGraph, artifacts: ArtifactMap) -> Result<(), Box<dyn std::error::Error>> {
    /// let deployer = Deployer::new(
    ///     Arc::new(DevNetwork::new(10, 42)),
    ///     Arc::new(FileJournal::open("deployments/journal.jsonl")?),
    ///     Arc::new(artifacts),
    ///     DeployConfig::default(),
    /// );
    /// match deployer.deploy(Arc::new(graph), Default::default()).await? {
    ///     DeploymentResult::Success => println!("deployed"),
    ///     other => println!("stopped early: {other:?}"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn deploy(
        &self,
        graph: Arc<FutureGraph>,
        parameters: DeploymentParameters,
    ) -> Result<DeploymentResult, DeployerError> {
        let chain_id = self.client.chain_id().await?;
        let accounts = self.client.accounts().await?;
        let store = Arc::new(DeploymentStore::load(self.journal.clone())?);

        if let Some(recorded) = store.with_state(|state| state.chain_id) {
            if recorded != chain_id {
                return Err(DeployerError::ChainIdMismatch {
                    recorded,
                    current: chain_id,
                });
            }
        }
        store.apply(JournalMessage::RunStart { chain_id })?;

        let state = store.snapshot();
        let previous = previous_run_failures(&graph, &state);
        if !previous.is_empty() {
            warn!(futures = ?previous, "earlier run left failed futures");
            return Ok(DeploymentResult::PreviousRunFailed(previous));
        }

        let artifacts = Arc::new(ArtifactStore::load(&graph, self.resolver.as_ref()).await?);

        let ctx = ResolveContext {
            accounts: &accounts,
            parameters: &parameters,
            state: &state,
            default_sender: self.config.default_sender,
        };
        let failures = reconcile(&graph, &ctx, &self.config.strategy);
        if !failures.is_empty() {
            for failure in &failures {
                warn!(future_id = %failure.future_id, failure = %failure.failure, "reconciliation failed");
            }
            return Ok(DeploymentResult::ReconciliationFailed(failures));
        }

        let errors = validate(&graph, &state, &artifacts, &parameters, &accounts);
        if !errors.is_empty() {
            return Ok(DeploymentResult::ValidationFailed(errors));
        }

        let batches = batch(&graph, &state, self.config.max_batch_size);
        info!(
            chain_id,
            futures = graph.len(),
            batches = batches.len(),
            "starting deployment"
        );

        let automining = self.client.is_automining().await;
        let tracker = TransactionTracker::new(
            self.client.clone(),
            store.clone(),
            self.clock.clone(),
            self.config.clone(),
            automining,
            self.cancel.clone(),
        );
        let engine = ExecutionEngine::new(
            graph.clone(),
            artifacts,
            store.clone(),
            tracker,
            accounts,
            parameters,
            self.config.clone(),
        );
        match engine.execute(&batches).await {
            Ok(()) => {}
            Err(ExecutionError::Cancelled) => {
                warn!("deployment cancelled");
                return Ok(DeploymentResult::Cancelled);
            }
            Err(err) => return Err(err.into()),
        }

        Ok(store.with_state(|state| outcome(&graph, state)))
    }
}

/// Journals a wipe of `future_id` so that it executes again on the next run.
///
/// Refused while any future that depends on it has execution state; those
/// must be wiped first.
pub fn wipe(journal: Arc<dyn Journal>, future_id: &str) -> Result<(), DeployerError> {
    let store = DeploymentStore::load(journal)?;
    let dependents = store.with_state(|state| {
        if state.get(future_id).is_none() {
            return Err(DeployerError::NotStarted(future_id.to_string()));
        }
        Ok(state
            .execution_states
            .values()
            .filter(|execution| execution.dependencies.contains(future_id))
            .map(|execution| execution.id.clone())
            .collect::<Vec<_>>())
    })?;
    if !dependents.is_empty() {
        return Err(DeployerError::HasDependents {
            future: future_id.to_string(),
            dependents,
        });
    }
    store.apply(JournalMessage::Wipe {
        future_id: future_id.to_string(),
    })?;
    info!(future_id, "wiped");
    Ok(())
}

fn previous_run_failures(graph: &FutureGraph, state: &DeploymentState) -> Vec<FutureId> {
    state
        .execution_states
        .values()
        .filter(|execution| {
            matches!(
                execution.status,
                ExecutionStatus::Failed | ExecutionStatus::TimedOut
            )
        })
        .filter(|execution| graph.contains(&execution.id))
        .map(|execution| execution.id.clone())
        .collect()
}

fn outcome(graph: &FutureGraph, state: &DeploymentState) -> DeploymentResult {
    let mut failed = Vec::new();
    let mut timed_out = Vec::new();
    let mut held = Vec::new();
    for future in graph.iter() {
        let id = future.id().to_string();
        match state.get(&id) {
            Some(execution) => match execution.status {
                ExecutionStatus::Success => {}
                ExecutionStatus::Failed => failed.push(FutureFailure {
                    reason: execution
                        .failure
                        .as_ref()
                        .map(FailureReason::to_string)
                        .unwrap_or_default(),
                    future_id: id,
                }),
                ExecutionStatus::TimedOut => timed_out.push(id),
                ExecutionStatus::Started => held.push(id),
            },
            None => held.push(id),
        }
    }
    if failed.is_empty() && timed_out.is_empty() && held.is_empty() {
        DeploymentResult::Success
    } else {
        DeploymentResult::ExecutionFailed {
            failed,
            timed_out,
            held,
        }
    }
}
