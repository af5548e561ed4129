//! Deployment state: the projection of the journal.

mod reducer;
mod store;
mod types;

pub use reducer::reduce;
pub use store::DeploymentStore;
pub use types::{
    ExecutionInputs, ExecutionResult, ExecutionState, ExecutionStatus, FailureReason,
    NetworkInteraction, OnchainInteraction, SentTransaction, StaticCallInteraction,
};

use crate::journal::{Journal, JournalError, JournalMessage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every future's execution state, as rebuilt from the journal.
///
/// Absence of a future means it has not started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentState {
    pub chain_id: Option<u64>,
    pub execution_states: BTreeMap<String, ExecutionState>,
}

impl DeploymentState {
    /// Folds a message sequence from the empty state.
    pub fn replay<I>(messages: I) -> Result<Self, JournalError>
    where
        I: IntoIterator<Item = Result<JournalMessage, JournalError>>,
    {
        let mut state = DeploymentState::default();
        for message in messages {
            state = reduce(state, &message?);
        }
        Ok(state)
    }

    pub fn load(journal: &dyn Journal) -> Result<Self, JournalError> {
        Self::replay(journal.read()?)
    }

    pub fn get(&self, future_id: &str) -> Option<&ExecutionState> {
        self.execution_states.get(future_id)
    }

    pub fn status(&self, future_id: &str) -> Option<ExecutionStatus> {
        self.get(future_id).map(|s| s.status)
    }

    pub fn is_success(&self, future_id: &str) -> bool {
        self.status(future_id) == Some(ExecutionStatus::Success)
    }

    /// Ids of futures in `status`, in id order.
    pub fn with_status(&self, status: ExecutionStatus) -> impl Iterator<Item = &str> {
        self.execution_states
            .values()
            .filter(move |s| s.status == status)
            .map(|s| s.id.as_str())
    }

    /// Highest nonce recorded for `sender` in any interaction.
    pub fn max_nonce(&self, sender: alloy_primitives::Address) -> Option<u64> {
        self.execution_states
            .values()
            .flat_map(|s| s.onchain_interactions())
            .filter(|i| i.from == sender)
            .filter_map(|i| i.nonce)
            .max()
    }
}
