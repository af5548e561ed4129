//! Durable, append-only deployment history.
//!
//! The journal is the only thing persisted about a deployment. Every state
//! transition is recorded here before it is applied in memory, and the
//! deployment state is rebuilt on start-up by replaying it.

mod file;
mod memory;
mod messages;

pub use file::{FileJournal, JOURNAL_FILE};
pub use memory::MemoryJournal;
pub use messages::{FutureStartedMessage, InteractionRequest, JournalMessage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal record {line} is corrupt: {message}")]
    Corrupt { line: usize, message: String },
    #[error("failed to serialize journal message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Lazy, ordered sequence of journal messages.
pub type JournalIter<'a> = Box<dyn Iterator<Item = Result<JournalMessage, JournalError>> + Send + 'a>;

pub trait Journal: Send + Sync {
    /// Durably appends one message. Returns only once the message would
    /// survive a crash.
    fn record(&self, message: &JournalMessage) -> Result<(), JournalError>;

    /// Reads the journal from the beginning. Every call starts a fresh pass.
    fn read(&self) -> Result<JournalIter<'_>, JournalError>;
}
