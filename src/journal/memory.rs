use super::{Journal, JournalError, JournalIter, JournalMessage};
use parking_lot::Mutex;

/// Journal kept in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    messages: Mutex<Vec<JournalMessage>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<JournalMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Journal for MemoryJournal {
    fn record(&self, message: &JournalMessage) -> Result<(), JournalError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }

    fn read(&self) -> Result<JournalIter<'_>, JournalError> {
        let snapshot = self.messages.lock().clone();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }
}
