//! Line-delimited JSON journal file.
//!
//! One message per line, appended and synced before `record` returns. A
//! crash can only leave a partially written last line. On reopening, a torn
//! line is discarded and a complete record missing its newline is terminated.

use super::{Journal, JournalError, JournalIter, JournalMessage};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the journal within a deployment directory.
pub const JOURNAL_FILE: &str = "journal.jsonl";

#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    writer: Mutex<File>,
}

impl FileJournal {
    /// Opens (or creates) the journal of the deployment stored in `dir`.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self, JournalError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Self::open(dir.join(JOURNAL_FILE))
    }

    /// Opens (or creates) a journal file, dropping a torn trailing record.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        let valid_len = valid_prefix_len(&content);
        if valid_len < content.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = content.len() - valid_len,
                "discarding torn journal record"
            );
            file.set_len(valid_len as u64)?;
            file.sync_data()?;
        } else if needs_terminator(&content) {
            // The record was written but its newline was not; the next
            // append would otherwise land on the same line.
            debug!(path = %path.display(), "terminating last journal record");
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        file.seek(SeekFrom::End(0))?;

        debug!(path = %path.display(), "opened journal");
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Length of the prefix made of complete, parseable lines.
///
/// Only the last line may be incomplete after a crash; corruption anywhere
/// else is reported when the journal is read.
fn valid_prefix_len(content: &[u8]) -> usize {
    let Some(last_newline) = content.iter().rposition(|b| *b == b'\n') else {
        return if is_valid_record(content) { content.len() } else { 0 };
    };
    let tail = &content[last_newline + 1..];
    if tail.is_empty() || is_valid_record(tail) {
        content.len()
    } else {
        last_newline + 1
    }
}

/// Returns true if the content ends with a record that lacks its newline.
fn needs_terminator(content: &[u8]) -> bool {
    let tail = match content.iter().rposition(|b| *b == b'\n') {
        Some(last_newline) => &content[last_newline + 1..],
        None => content,
    };
    !tail.iter().all(u8::is_ascii_whitespace)
}

fn is_valid_record(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
        || serde_json::from_slice::<JournalMessage>(line).is_ok()
}

impl Journal for FileJournal {
    fn record(&self, message: &JournalMessage) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut file = self.writer.lock();
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    fn read(&self) -> Result<JournalIter<'_>, JournalError> {
        let file = File::open(&self.path)?;
        let lines = BufReader::new(file).lines().enumerate();
        Ok(Box::new(lines.filter_map(|(index, line)| {
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(JournalError::Io(err))),
            };
            if line.trim().is_empty() {
                return None;
            }
            Some(
                serde_json::from_str(&line).map_err(|err| JournalError::Corrupt {
                    line: index + 1,
                    message: err.to_string(),
                }),
            )
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<JournalMessage> {
        vec![
            JournalMessage::RunStart { chain_id: 31337 },
            JournalMessage::Wipe {
                future_id: "M#A".to_string(),
            },
        ]
    }

    #[test]
    fn test_record_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open_dir(dir.path()).unwrap();
        for message in messages() {
            journal.record(&message).unwrap();
        }

        let first: Vec<_> = journal.read().unwrap().map(Result::unwrap).collect();
        let second: Vec<_> = journal.read().unwrap().map(Result::unwrap).collect();
        assert_eq!(first, messages());
        assert_eq!(first, second);

        drop(journal);
        let reopened = FileJournal::open_dir(dir.path()).unwrap();
        assert_eq!(reopened.read().unwrap().count(), 2);
    }

    #[test]
    fn test_torn_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        let mut content = String::new();
        content.push_str(&serde_json::to_string(&messages()[0]).unwrap());
        content.push('\n');
        content.push_str(r#"{"type":"wipe","futu"#);
        fs::write(&path, content).unwrap();

        let journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.read().unwrap().count(), 1);

        journal.record(&messages()[1]).unwrap();
        let replayed: Vec<_> = journal.read().unwrap().map(Result::unwrap).collect();
        assert_eq!(replayed, messages());
    }

    #[test]
    fn test_unterminated_last_record_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        fs::write(&path, serde_json::to_string(&messages()[0]).unwrap()).unwrap();

        let journal = FileJournal::open(&path).unwrap();
        journal.record(&messages()[1]).unwrap();
        let replayed: Vec<_> = journal.read().unwrap().map(Result::unwrap).collect();
        assert_eq!(replayed, messages());

        drop(journal);
        let reopened = FileJournal::open(&path).unwrap();
        assert_eq!(reopened.read().unwrap().count(), 2);
        assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn test_corruption_in_the_middle_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        let good = serde_json::to_string(&messages()[0]).unwrap();
        fs::write(&path, format!("{good}\nnot json\n{good}\n")).unwrap();

        let journal = FileJournal::open(&path).unwrap();
        let results: Vec<_> = journal.read().unwrap().collect();
        assert!(matches!(results[1], Err(JournalError::Corrupt { line: 2, .. })));
    }
}
