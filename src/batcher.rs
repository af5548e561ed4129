//! Execution order as a sequence of batches.
//!
//! A batch is a set of futures whose dependencies have all succeeded, so its
//! members can run concurrently. Batches are computed by topological layering
//! (Kahn's algorithm), counting only dependencies that have not yet succeeded.

use crate::state::{DeploymentState, ExecutionStatus};
use ignition_graph::{FutureGraph, FutureId};

/// Computes the ordered batches that remain to be executed.
///
/// - Futures that already succeeded never appear.
/// - Futures that failed or timed out, and everything that transitively
///   depends on them, never appear either: a dependency that is not a success
///   blocks its dependents until it is wiped.
/// - Within a layer, futures keep their declaration order. A layer larger
///   than `max_batch_size` is split into consecutive chunks.
///
/// The output depends only on the graph and the state, so repeated calls
/// return identical batches.
///
/// # Example
///
/// ```
/// use alloy_primitives::Address;
/// use ignition_engine::batcher::batch;
/// use ignition_engine::state::DeploymentState;
/// use ignition_graph::{Argument, ContractAt, Future, FutureGraph};
///
/// let at = |id: &str, dependencies: &[&str]| {
///     Future::ContractAt(ContractAt {
///         id: id.to_string(),
///         module_id: "M".to_string(),
///         contract_name: "Token".to_string(),
///         artifact: Default::default(),
///         address: Argument::literal(Address::ZERO),
///         dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
///     })
/// };
/// let graph = FutureGraph::new(vec![at("M#A", &[]), at("M#B", &["M#A"]), at("M#C", &[])])?;
///
/// let batches = batch(&graph, &DeploymentState::default(), None);
/// assert_eq!(batches, vec![vec!["M#A", "M#C"], vec!["M#B"]]);
/// # Ok::<(), ignition_graph::GraphError>(())
/// ```
pub fn batch(
    graph: &FutureGraph,
    state: &DeploymentState,
    max_batch_size: Option<usize>,
) -> Vec<Vec<FutureId>> {
    let n = graph.len();
    let status: Vec<Option<ExecutionStatus>> =
        graph.iter().map(|future| state.status(future.id())).collect();

    // Futures that can never run in this deployment state.
    let mut blocked = vec![false; n];
    for pos in 0..n {
        if matches!(
            status[pos],
            Some(ExecutionStatus::Failed) | Some(ExecutionStatus::TimedOut)
        ) {
            mark_blocked(graph, pos, &mut blocked);
        }
    }

    let done = |pos: usize| status[pos] == Some(ExecutionStatus::Success);

    let mut in_degree: Vec<usize> = (0..n)
        .map(|pos| {
            graph
                .dependency_positions(pos)
                .iter()
                .filter(|&&dep| !done(dep))
                .count()
        })
        .collect();

    // Positions come out of the graph in declaration order; keeping each
    // layer sorted by position is what makes the tie-break stable.
    let mut layer: Vec<usize> = (0..n)
        .filter(|&pos| !done(pos) && !blocked[pos] && in_degree[pos] == 0)
        .collect();

    let mut batches = Vec::new();
    while !layer.is_empty() {
        let mut next = Vec::new();
        for &pos in &layer {
            for &dependent in graph.dependent_positions(pos) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 && !blocked[dependent] && !done(dependent) {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        next.dedup();

        let ids: Vec<FutureId> = layer
            .iter()
            .map(|&pos| graph.at(pos).id().to_string())
            .collect();
        match max_batch_size {
            Some(max) if max > 0 && ids.len() > max => {
                batches.extend(ids.chunks(max).map(<[FutureId]>::to_vec));
            }
            _ => batches.push(ids),
        }

        layer = next;
    }
    batches
}

fn mark_blocked(graph: &FutureGraph, start: usize, blocked: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(pos) = stack.pop() {
        if blocked[pos] {
            continue;
        }
        blocked[pos] = true;
        stack.extend_from_slice(graph.dependent_positions(pos));
    }
}
