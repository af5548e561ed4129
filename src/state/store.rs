use super::{reduce, DeploymentState};
use crate::journal::{Journal, JournalError, JournalMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::trace;

/// Single writer for the deployment state.
///
/// Concurrent futures funnel every transition through [`DeploymentStore::apply`],
/// which records the message in the journal and only then reduces it into
/// the in-memory state. The lock spans both steps, so journal order and
/// in-memory order never diverge.
pub struct DeploymentStore {
    journal: Arc<dyn Journal>,
    state: Mutex<DeploymentState>,
}

impl DeploymentStore {
    pub fn new(journal: Arc<dyn Journal>, state: DeploymentState) -> Self {
        Self {
            journal,
            state: Mutex::new(state),
        }
    }

    /// Rebuilds the state from `journal` and wraps both.
    pub fn load(journal: Arc<dyn Journal>) -> Result<Self, JournalError> {
        let state = DeploymentState::load(journal.as_ref())?;
        Ok(Self::new(journal, state))
    }

    /// Records `message` and reduces it into the state.
    ///
    /// The journal write blocks until the record is durable. On a
    /// multi-threaded runtime the calling worker hands its other tasks to
    /// the rest of the pool for the duration; on a current-thread runtime
    /// the write simply blocks the thread.
    pub fn apply(&self, message: JournalMessage) -> Result<(), JournalError> {
        blocking(|| self.record_and_reduce(&message))
    }

    fn record_and_reduce(&self, message: &JournalMessage) -> Result<(), JournalError> {
        let mut state = self.state.lock();
        self.journal.record(message)?;
        trace!(kind = message.kind(), future_id = message.future_id(), "journaled");
        let current = std::mem::take(&mut *state);
        *state = reduce(current, message);
        Ok(())
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> DeploymentState {
        self.state.lock().clone()
    }

    /// Runs `f` against the current state without copying it.
    pub fn with_state<R>(&self, f: impl FnOnce(&DeploymentState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }
}

fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl std::fmt::Debug for DeploymentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentStore")
            .field("futures", &self.state.lock().execution_states.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{FileJournal, MemoryJournal};

    #[test]
    fn test_apply_records_before_reducing() {
        let journal = Arc::new(MemoryJournal::new());
        let store = DeploymentStore::new(journal.clone(), DeploymentState::default());
        store
            .apply(JournalMessage::RunStart { chain_id: 5 })
            .unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(store.snapshot().chain_id, Some(5));

        let reloaded = DeploymentStore::load(journal).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_apply_on_worker_threads() {
        let dir = tempfile::tempdir().unwrap();
        let journal: Arc<dyn Journal> =
            Arc::new(FileJournal::open(dir.path().join("journal.jsonl")).unwrap());
        let store = Arc::new(DeploymentStore::new(journal, DeploymentState::default()));

        let writers: Vec<_> = (1..=8u64)
            .map(|chain_id| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.apply(JournalMessage::RunStart { chain_id }).unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        // Replaying the file yields the same state, so the last write to
        // the journal was also the last one reduced.
        let reloaded = DeploymentStore::load(store.journal().clone()).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
        assert!(store.snapshot().chain_id.is_some());
    }
}
