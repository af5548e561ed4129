//! The validated, immutable future graph.

use crate::future::Future;
use crate::types::{FutureId, FutureType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Structural problems detected while building a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("future {0} is declared more than once")]
    DuplicateFuture(FutureId),
    #[error("future {future} depends on unknown future {dependency}")]
    UnknownDependency { future: FutureId, dependency: FutureId },
    #[error("future {future} references {reference}, which is a {actual}; expected {expected}")]
    InvalidReference {
        future: FutureId,
        reference: FutureId,
        actual: FutureType,
        expected: &'static str,
    },
    #[error("dependency cycle detected involving future {0}")]
    Cycle(FutureId),
}

/// Serialized form of a graph: futures in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub futures: Vec<Future>,
}

/// An acyclic graph of futures that preserves declaration order.
///
/// Positions index `futures` in the order they were declared; dependency and
/// dependent lists are precomputed per position so schedulers can walk the
/// graph without string lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct FutureGraph {
    futures: Vec<Future>,
    index: HashMap<FutureId, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl FutureGraph {
    /// Builds a graph, validating ids, references and acyclicity.
    pub fn new(futures: Vec<Future>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(futures.len());
        for (pos, future) in futures.iter().enumerate() {
            if index.insert(future.id().to_string(), pos).is_some() {
                return Err(GraphError::DuplicateFuture(future.id().to_string()));
            }
        }

        let mut dependencies = Vec::with_capacity(futures.len());
        let mut dependents = vec![Vec::new(); futures.len()];
        for (pos, future) in futures.iter().enumerate() {
            let mut deps = Vec::new();
            for dep in future.dependencies() {
                let dep_pos = *index.get(dep).ok_or_else(|| GraphError::UnknownDependency {
                    future: future.id().to_string(),
                    dependency: dep.to_string(),
                })?;
                deps.push(dep_pos);
                dependents[dep_pos].push(pos);
            }
            dependencies.push(deps);
        }

        let graph = Self {
            futures,
            index,
            dependencies,
            dependents,
        };
        graph.check_references()?;
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_references(&self) -> Result<(), GraphError> {
        for future in &self.futures {
            let mut checks: Vec<(&str, fn(FutureType) -> bool, &'static str)> = Vec::new();
            match future {
                Future::ContractCall(f) => {
                    checks.push((&f.contract, is_contract, "a contract"));
                }
                Future::StaticCall(f) => {
                    checks.push((&f.contract, is_contract, "a contract"));
                }
                Future::EncodeFunctionCall(f) => {
                    checks.push((&f.contract, is_contract, "a contract"));
                }
                Future::ReadEventArgument(f) => {
                    checks.push((&f.emitter, is_contract, "a contract"));
                    checks.push((
                        &f.future_to_read_from,
                        has_transaction,
                        "a deployment, call or send",
                    ));
                }
                Future::ContractDeployment(f) => {
                    for lib in f.libraries.values() {
                        checks.push((lib, is_library, "a library deployment"));
                    }
                }
                Future::LibraryDeployment(f) => {
                    for lib in f.libraries.values() {
                        checks.push((lib, is_library, "a library deployment"));
                    }
                }
                Future::ContractAt(_) | Future::SendData(_) => {}
            }

            for (reference, accepts, expected) in checks {
                let actual = self.futures[self.index[reference]].future_type();
                if !accepts(actual) {
                    return Err(GraphError::InvalidReference {
                        future: future.id().to_string(),
                        reference: reference.to_string(),
                        actual,
                        expected,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..self.futures.len())
            .filter(|&pos| in_degree[pos] == 0)
            .collect();
        let mut visited = 0;
        while let Some(pos) = queue.pop_front() {
            visited += 1;
            for &dependent in &self.dependents[pos] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        if visited == self.futures.len() {
            return Ok(());
        }
        let stuck = (0..self.futures.len())
            .find(|&pos| in_degree[pos] > 0)
            .map(|pos| self.futures[pos].id().to_string())
            .unwrap_or_default();
        Err(GraphError::Cycle(stuck))
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Future> {
        self.index.get(id).map(|&pos| &self.futures[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Declaration position of a future.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn at(&self, pos: usize) -> &Future {
        &self.futures[pos]
    }

    /// Futures in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Future> {
        self.futures.iter()
    }

    /// Positions of the direct dependencies of the future at `pos`.
    pub fn dependency_positions(&self, pos: usize) -> &[usize] {
        &self.dependencies[pos]
    }

    /// Positions of the futures that directly depend on the future at `pos`.
    pub fn dependent_positions(&self, pos: usize) -> &[usize] {
        &self.dependents[pos]
    }
}

fn is_contract(ty: FutureType) -> bool {
    ty.is_contract()
}

fn is_library(ty: FutureType) -> bool {
    matches!(
        ty,
        FutureType::NamedArtifactLibraryDeployment | FutureType::LibraryDeployment
    )
}

fn has_transaction(ty: FutureType) -> bool {
    ty.has_transaction()
}

impl TryFrom<GraphDocument> for FutureGraph {
    type Error = GraphError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        FutureGraph::new(doc.futures)
    }
}

impl From<FutureGraph> for GraphDocument {
    fn from(graph: FutureGraph) -> Self {
        GraphDocument {
            futures: graph.futures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{ContractDeployment, SendData};
    use crate::types::Argument;

    fn deploy(id: &str, deps: &[&str]) -> Future {
        Future::ContractDeployment(ContractDeployment {
            id: id.to_string(),
            module_id: "M".to_string(),
            contract_name: "C".to_string(),
            artifact: Default::default(),
            constructor_args: Vec::new(),
            libraries: Default::default(),
            value: None,
            from: None,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        })
    }

    fn send(id: &str, to: &str) -> Future {
        Future::SendData(SendData {
            id: id.to_string(),
            module_id: "M".to_string(),
            to: Argument::future(to),
            data: None,
            value: None,
            from: None,
            dependencies: Vec::new(),
        })
    }

    #[test]
    fn test_graph_keeps_declaration_order() {
        let graph = FutureGraph::new(vec![deploy("b", &[]), deploy("a", &["b"])]).unwrap();
        let ids: Vec<&str> = graph.iter().map(Future::id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(graph.dependent_positions(0), &[1]);
        assert_eq!(graph.dependency_positions(1), &[0]);
    }

    #[test]
    fn test_duplicate_and_unknown_futures_rejected() {
        assert_eq!(
            FutureGraph::new(vec![deploy("a", &[]), deploy("a", &[])]).unwrap_err(),
            GraphError::DuplicateFuture("a".to_string())
        );
        assert!(matches!(
            FutureGraph::new(vec![deploy("a", &["ghost"])]).unwrap_err(),
            GraphError::UnknownDependency { .. }
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = FutureGraph::new(vec![deploy("a", &["b"]), deploy("b", &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn test_argument_references_become_edges() {
        let graph = FutureGraph::new(vec![deploy("a", &[]), send("s", "a")]).unwrap();
        assert_eq!(graph.dependency_positions(1), &[0]);
    }
}
