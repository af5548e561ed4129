//! Deployment graph model.
//!
//! A deployment is described as a set of *futures*: planned steps such as
//! deploying a contract, calling a function or reading an event argument.
//! Futures reference each other by id, which makes the whole plan an acyclic
//! graph. This crate holds the data model only; executing a graph against a
//! chain lives in `ignition-engine`.

pub mod artifact;
pub mod future;
pub mod graph;
pub mod types;

pub use artifact::{AbiConstructor, AbiEvent, AbiFunction, AbiItem, AbiParam, Artifact, LinkReference};
pub use future::{
    ArtifactSource, ContractAt, ContractCall, ContractDeployment, EncodeFunctionCall, Future,
    LibraryDeployment, ReadEventArgument, SendData, StaticCall,
};
pub use graph::{FutureGraph, GraphDocument, GraphError};
pub use types::{Argument, FutureId, FutureType, Literal, ModuleId, NameOrIndex, Sender};
