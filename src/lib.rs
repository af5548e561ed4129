//! Resumable execution of smart-contract deployment graphs.
//!
//! A deployment is a graph of *futures* (see [`ignition_graph`]): contract and
//! library deployments, calls, static calls, event reads and so on. This crate
//! executes such a graph against an EVM network so that a run can be
//! interrupted at any point and resumed later without repeating work.
//!
//! # Architecture
//!
//! - **Journal**: append-only history of everything a deployment did; the
//!   only persisted state
//! - **Deployment state**: the journal replayed through a pure reducer
//! - **Batcher**: splits the remaining graph into layers of independent
//!   futures
//! - **Reconciler**: on resume, refuses to continue if recorded futures no
//!   longer match their declarations
//! - **Execution engine**: drives each future to SUCCESS, FAILED or TIMEOUT
//! - **Transaction tracker**: nonces, fees, confirmation polling and fee bumps
//!
//! # Quick Start
//!
//! ```no_run
//! use ignition_engine::artifacts::ArtifactMap;
//! use ignition_engine::config::DeployConfig;
//! use ignition_engine::deployer::Deployer;
//! use ignition_engine::journal::MemoryJournal;
//! use ignition_engine::provider::DevNetwork;
//! use ignition_graph::FutureGraph;
//! use std::sync::Arc;
//!
//! # async fn run(graph: FutureGraph, artifacts: ArtifactMap) -> eyre::Result<()> {
//! // Automining in-process network with 10 funded accounts
//! let network = Arc::new(DevNetwork::new(10, 42));
//!
//! let deployer = Deployer::new(
//!     network,
//!     Arc::new(MemoryJournal::new()),
//!     Arc::new(artifacts),
//!     DeployConfig::default(),
//! );
//! let result = deployer.deploy(Arc::new(graph), Default::default()).await?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod artifacts;
pub mod batcher;
pub mod clock;
pub mod config;
pub mod deployer;
pub mod execution;
pub mod journal;
pub mod provider;
pub mod reconciliation;
pub mod resolve;
pub mod state;
pub mod status;
pub mod validation;

pub use deployer::{wipe, Deployer, DeployerError, DeploymentResult};
pub use ignition_graph;
