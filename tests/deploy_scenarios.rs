//! End-to-end runs against the scripted chain: fresh deployments, resumes,
//! drift detection and failures.

mod common;

use common::*;
use ignition_engine::artifacts::ArtifactMap;
use ignition_engine::batcher::batch;
use ignition_engine::clock::SimulatedClock;
use ignition_engine::config::DeployConfig;
use ignition_engine::abi::RevertReason;
use ignition_engine::journal::{FileJournal, Journal, JournalMessage, MemoryJournal};
use ignition_engine::state::{DeploymentState, ExecutionResult, ExecutionStatus, FailureReason};
use ignition_engine::{wipe, Deployer, DeployerError, DeploymentResult};
use ignition_graph::{
    Argument, ContractAt, EncodeFunctionCall, Future, FutureGraph, Literal, NameOrIndex, StaticCall,
};
use std::sync::Arc;

fn config() -> DeployConfig {
    DeployConfig {
        required_confirmations: 1,
        ..Default::default()
    }
}

fn deployer(chain: &Arc<MockChain>, journal: Arc<dyn Journal>) -> Deployer {
    Deployer::new(
        chain.clone(),
        journal,
        Arc::new(ArtifactMap::new().with(counter_artifact())),
        config(),
    )
    .with_clock(Arc::new(SimulatedClock::new()))
}

fn counter_graph(start: u64) -> Arc<FutureGraph> {
    Arc::new(
        FutureGraph::new(vec![
            deploy_counter("Counter", start),
            increment("Increment", "Counter", 5),
            read_amount("Amount", "Counter", "Increment"),
        ])
        .unwrap(),
    )
}

#[tokio::test]
async fn test_fresh_deployment_runs_in_dependency_order() {
    let chain = Arc::new(MockChain::new(3));
    emit_incremented(&chain, chain.accounts()[0], 5);
    let journal = Arc::new(MemoryJournal::new());
    let graph = counter_graph(1);

    let planned = batch(&graph, &DeploymentState::default(), None);
    assert_eq!(
        planned,
        vec![
            vec![id("Counter")],
            vec![id("Increment")],
            vec![id("Amount")]
        ]
    );

    let result = deployer(&chain, journal.clone())
        .deploy(graph, Default::default())
        .await
        .unwrap();
    assert_eq!(result, DeploymentResult::Success);

    let state = DeploymentState::load(journal.as_ref()).unwrap();
    let sender = chain.accounts()[0];
    assert_eq!(
        state.get(&id("Counter")).unwrap().result,
        Some(ExecutionResult::Deployed {
            address: sender.create(0)
        })
    );
    assert!(matches!(
        state.get(&id("Increment")).unwrap().result,
        Some(ExecutionResult::Transaction { .. })
    ));
    assert_eq!(
        state.get(&id("Amount")).unwrap().result,
        Some(ExecutionResult::EventArgument {
            value: Literal::from(5u64)
        })
    );

    let sent = chain.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, None);
    assert_eq!(sent[1].to, Some(sender.create(0)));
    assert_eq!(sent.iter().map(|tx| tx.nonce).collect::<Vec<_>>(), vec![Some(0), Some(1)]);
}

#[tokio::test]
async fn test_rerun_of_completed_deployment_sends_nothing() {
    let chain = Arc::new(MockChain::new(3));
    emit_incremented(&chain, chain.accounts()[0], 5);
    let journal = Arc::new(MemoryJournal::new());

    let first = deployer(&chain, journal.clone())
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap();
    assert!(first.is_success());
    let recorded = journal.len();
    let sent = chain.sent_count();

    let second = deployer(&chain, journal.clone())
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap();
    assert!(second.is_success());
    assert_eq!(chain.sent_count(), sent);
    // Only the run marker is added.
    assert_eq!(journal.len(), recorded + 1);
    assert!(matches!(
        journal.messages().last(),
        Some(JournalMessage::RunStart { chain_id: CHAIN_ID })
    ));
}

#[tokio::test]
async fn test_resume_continues_after_completed_futures() {
    let chain = Arc::new(MockChain::new(3));
    emit_incremented(&chain, chain.accounts()[0], 5);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");

    // A first run that only got as far as the deployment.
    let partial = Arc::new(FutureGraph::new(vec![deploy_counter("Counter", 1)]).unwrap());
    let journal = Arc::new(FileJournal::open(&path).unwrap());
    let result = deployer(&chain, journal)
        .deploy(partial, Default::default())
        .await
        .unwrap();
    assert!(result.is_success());

    let journal = Arc::new(FileJournal::open(&path).unwrap());
    let state = DeploymentState::load(journal.as_ref()).unwrap();
    assert_eq!(
        batch(&counter_graph(1), &state, None),
        vec![vec![id("Increment")], vec![id("Amount")]]
    );

    let result = deployer(&chain, journal.clone())
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap();
    assert!(result.is_success());

    let creations = chain.sent().iter().filter(|tx| tx.to.is_none()).count();
    assert_eq!(creations, 1);
    let state = DeploymentState::load(journal.as_ref()).unwrap();
    assert!(state.is_success(&id("Amount")));
}

#[tokio::test]
async fn test_changed_constructor_argument_fails_reconciliation() {
    let chain = Arc::new(MockChain::new(3));
    emit_incremented(&chain, chain.accounts()[0], 5);
    let journal = Arc::new(MemoryJournal::new());
    deployer(&chain, journal.clone())
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap();
    let sent = chain.sent_count();

    let result = deployer(&chain, journal.clone())
        .deploy(counter_graph(2), Default::default())
        .await
        .unwrap();
    let DeploymentResult::ReconciliationFailed(failures) = result else {
        panic!("expected reconciliation failure, got {result:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].future_id, id("Counter"));
    assert!(failures[0].failure.contains("constructor"), "{}", failures[0].failure);
    assert_eq!(chain.sent_count(), sent);
}

#[tokio::test]
async fn test_revert_fails_future_and_holds_dependents() {
    let chain = Arc::new(MockChain::new(3));
    emit_incremented(&chain, chain.accounts()[0], 5);
    chain.revert_on(increment_selector(), "amount too large");
    let journal = Arc::new(MemoryJournal::new());

    let result = deployer(&chain, journal.clone())
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap();
    let DeploymentResult::ExecutionFailed {
        failed,
        timed_out,
        held,
    } = result
    else {
        panic!("expected execution failure, got {result:?}");
    };
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].future_id, id("Increment"));
    assert!(failed[0].reason.contains("amount too large"));
    assert!(timed_out.is_empty());
    assert_eq!(held, vec![id("Amount")]);

    let state = DeploymentState::load(journal.as_ref()).unwrap();
    let increment = state.get(&id("Increment")).unwrap();
    assert_eq!(increment.status, ExecutionStatus::Failed);
    assert_eq!(
        increment.failure,
        Some(FailureReason::SimulationReverted {
            reason: RevertReason::Message {
                message: "amount too large".to_string()
            }
        })
    );
    // Simulation caught it, so only the deployment went out.
    assert_eq!(chain.sent_count(), 1);

    let rerun = deployer(&chain, journal.clone())
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap();
    assert_eq!(rerun, DeploymentResult::PreviousRunFailed(vec![id("Increment")]));

    chain.clear_reverts();
    wipe(journal.clone(), &id("Increment")).unwrap();
    let retried = deployer(&chain, journal.clone())
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap();
    assert_eq!(retried, DeploymentResult::Success);
}

#[tokio::test]
async fn test_static_call_encode_and_contract_at() {
    let chain = Arc::new(MockChain::new(3));
    let count = ignition_engine::abi::selector(&ignition_graph::AbiFunction {
        name: "count".to_string(),
        inputs: vec![],
        outputs: vec![],
        state_mutability: "view".to_string(),
    })
    .unwrap();
    chain.respond(
        count,
        alloy_primitives::U256::from(42u64)
            .to_be_bytes::<32>()
            .to_vec()
            .into(),
    );
    let existing = alloy_primitives::Address::repeat_byte(0x42);

    let graph = Arc::new(
        FutureGraph::new(vec![
            deploy_counter("Counter", 1),
            Future::StaticCall(StaticCall {
                id: id("Count"),
                module_id: MODULE.to_string(),
                contract: id("Counter"),
                function_name: "count".to_string(),
                args: vec![],
                name_or_index: NameOrIndex::Index(0),
                from: None,
                dependencies: vec![],
            }),
            Future::EncodeFunctionCall(EncodeFunctionCall {
                id: id("Encoded"),
                module_id: MODULE.to_string(),
                contract: id("Counter"),
                function_name: "increment".to_string(),
                args: vec![Argument::future(id("Count"))],
                dependencies: vec![],
            }),
            Future::ContractAt(ContractAt {
                id: id("Existing"),
                module_id: MODULE.to_string(),
                contract_name: "Counter".to_string(),
                artifact: Default::default(),
                address: Argument::literal(existing),
                dependencies: vec![],
            }),
        ])
        .unwrap(),
    );

    let journal = Arc::new(MemoryJournal::new());
    let result = deployer(&chain, journal.clone())
        .deploy(graph, Default::default())
        .await
        .unwrap();
    assert_eq!(result, DeploymentResult::Success);

    let state = DeploymentState::load(journal.as_ref()).unwrap();
    assert_eq!(
        state.get(&id("Count")).unwrap().result,
        Some(ExecutionResult::StaticCall {
            value: Literal::from(42u64)
        })
    );
    let Some(ExecutionResult::Encoded { data }) = &state.get(&id("Encoded")).unwrap().result
    else {
        panic!("expected encoded call data");
    };
    assert_eq!(&data[..4], &increment_selector());
    assert_eq!(data[4..], alloy_primitives::U256::from(42u64).to_be_bytes::<32>());
    assert_eq!(
        state.get(&id("Existing")).unwrap().result,
        Some(ExecutionResult::ContractAt { address: existing })
    );
    // Only the deployment is a transaction.
    assert_eq!(chain.sent_count(), 1);
}

#[tokio::test]
async fn test_unknown_function_fails_validation_before_sending() {
    let chain = Arc::new(MockChain::new(3));
    let mut call = increment("Call", "Counter", 1);
    if let Future::ContractCall(call) = &mut call {
        call.function_name = "decrement".to_string();
    }
    let graph = Arc::new(FutureGraph::new(vec![deploy_counter("Counter", 1), call]).unwrap());

    let journal = Arc::new(MemoryJournal::new());
    let result = deployer(&chain, journal.clone())
        .deploy(graph, Default::default())
        .await
        .unwrap();
    let DeploymentResult::ValidationFailed(errors) = result else {
        panic!("expected validation failure, got {result:?}");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("decrement"));
    assert_eq!(chain.sent_count(), 0);
    assert!(DeploymentState::load(journal.as_ref())
        .unwrap()
        .execution_states
        .is_empty());
}

#[tokio::test]
async fn test_journal_from_another_chain_is_rejected() {
    let chain = Arc::new(MockChain::new(3));
    let journal = Arc::new(MemoryJournal::new());
    journal.record(&JournalMessage::RunStart { chain_id: 1 }).unwrap();

    let err = deployer(&chain, journal)
        .deploy(counter_graph(1), Default::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployerError::ChainIdMismatch {
            recorded: 1,
            current: CHAIN_ID
        }
    ));
}
