//! Resume-time drift detection.
//!
//! When a deployment resumes, every future with recorded history is checked
//! against its current declaration. A future that already finished must
//! resolve to exactly the inputs it ran with; anything else means the module
//! changed under an existing deployment and the run must not continue.
//!
//! Reconciliation only reads the graph and the state.

mod compare;

use crate::config::StrategyConfig;
use crate::resolve::ResolveContext;
use crate::state::{ExecutionState, ExecutionStatus};
use ignition_graph::{FutureGraph, FutureId};
use serde::Serialize;
use std::fmt;

/// A future whose recorded history no longer matches its declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationFailure {
    pub future_id: FutureId,
    pub failure: String,
}

impl fmt::Display for ReconciliationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.future_id, self.failure)
    }
}

/// Reconciles every recorded future, in id order.
///
/// `ctx` must resolve runtime values against the *current* accounts and
/// parameters; `strategy` is the strategy this run would execute with.
///
/// # Example
///
/// ```
/// use alloy_primitives::Address;
/// use ignition_engine::config::StrategyConfig;
/// use ignition_engine::journal::{FutureStartedMessage, JournalMessage};
/// use ignition_engine::reconciliation::reconcile;
/// use ignition_engine::resolve::{DeploymentParameters, ResolveContext};
/// use ignition_engine::state::{reduce, DeploymentState, ExecutionInputs, ExecutionResult};
/// use ignition_graph::{Argument, ContractAt, Future, FutureGraph, FutureType};
///
/// // An earlier run bound the token to one address.
/// let recorded = Address::repeat_byte(1);
/// let state = [
///     JournalMessage::FutureStarted(FutureStartedMessage {
///         future_id: "M#Token".to_string(),
///         future_type: FutureType::NamedArtifactContractAt,
///         strategy: StrategyConfig::Basic,
///         dependencies: vec![],
///         inputs: ExecutionInputs::ContractAt {
///             contract_name: "Token".to_string(),
///             address: recorded.to_checksum(None),
///         },
///     }),
///     JournalMessage::FutureSucceeded {
///         future_id: "M#Token".to_string(),
///         result: ExecutionResult::ContractAt { address: recorded },
///     },
/// ]
/// .iter()
/// .fold(DeploymentState::default(), reduce);
///
/// // The module now points it somewhere else.
/// let graph = FutureGraph::new(vec![Future::ContractAt(ContractAt {
///     id: "M#Token".to_string(),
///     module_id: "M".to_string(),
///     contract_name: "Token".to_string(),
///     artifact: Default::default(),
///     address: Argument::literal(Address::repeat_byte(2)),
///     dependencies: vec![],
/// })])?;
///
/// let accounts = [Address::repeat_byte(0xaa)];
/// let parameters = DeploymentParameters::new();
/// let ctx = ResolveContext {
///     accounts: &accounts,
///     parameters: &parameters,
///     state: &state,
///     default_sender: 0,
/// };
/// let failures = reconcile(&graph, &ctx, &StrategyConfig::Basic);
/// assert_eq!(failures.len(), 1);
/// assert!(failures[0].failure.contains("address changed"));
/// # Ok::<(), ignition_graph::GraphError>(())
/// ```
pub fn reconcile(
    graph: &FutureGraph,
    ctx: &ResolveContext<'_>,
    strategy: &StrategyConfig,
) -> Vec<ReconciliationFailure> {
    ctx.state
        .execution_states
        .values()
        .filter_map(|execution| reconcile_future(graph, ctx, strategy, execution).err())
        .collect()
}

/// Reconciles one recorded future against its current declaration.
pub fn reconcile_future(
    graph: &FutureGraph,
    ctx: &ResolveContext<'_>,
    strategy: &StrategyConfig,
    execution: &ExecutionState,
) -> Result<(), ReconciliationFailure> {
    let fail = |failure: String| ReconciliationFailure {
        future_id: execution.id.clone(),
        failure,
    };

    let Some(future) = graph.get(&execution.id) else {
        return Err(fail(
            "future was executed before but is no longer part of the deployment".to_string(),
        ));
    };
    if future.future_type() != execution.future_type {
        return Err(fail(format!(
            "future type changed from {} to {}",
            execution.future_type,
            future.future_type()
        )));
    }

    if execution.status == ExecutionStatus::Started {
        return Ok(());
    }

    if &execution.strategy != strategy {
        return Err(fail(format!(
            "strategy changed from {} to {}",
            describe_strategy(&execution.strategy),
            describe_strategy(strategy)
        )));
    }

    for dependency in future.dependencies() {
        if !execution.dependencies.contains(dependency) && !ctx.state.is_success(dependency) {
            return Err(fail(format!(
                "new dependency {dependency} has not been executed successfully"
            )));
        }
    }

    let current = ctx
        .inputs(future)
        .map_err(|err| fail(format!("could not resolve current inputs: {err}")))?;
    compare::inputs(&execution.inputs, &current, future.from().is_some(), ctx.accounts)
        .map_err(fail)
}

fn describe_strategy(strategy: &StrategyConfig) -> String {
    match strategy {
        StrategyConfig::Basic => "basic".to_string(),
        StrategyConfig::Create2 { salt, factory } => {
            format!("create2 (salt {salt}, factory {factory})")
        }
    }
}
