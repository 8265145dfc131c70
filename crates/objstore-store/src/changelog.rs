//! Per-backend changelog
//!
//! An append-only record of put/delete mutations. The core only writes;
//! replication owns the reader side for dirty-key discovery.

use objstore_common::{ChangeEvent, Error, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Records backend mutations
pub trait ChangeLog: Send + Sync {
    /// Append one event; records are never retracted
    fn record_change(&self, event: ChangeEvent) -> Result<()>;
}

/// In-memory changelog for tests
#[derive(Default)]
pub struct MemoryChangeLog {
    events: Mutex<Vec<ChangeEvent>>,
}

impl MemoryChangeLog {
    /// Create an empty changelog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in append order
    #[must_use]
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ChangeLog for MemoryChangeLog {
    fn record_change(&self, event: ChangeEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Append-only JSON-lines changelog file for production
pub struct FileChangeLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileChangeLog {
    /// Open (or create) the changelog file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every recorded event, in append order.
    ///
    /// Lines that fail to parse are skipped; a torn final line from a
    /// crashed writer must not poison the whole log.
    pub fn read_all(&self) -> Result<Vec<ChangeEvent>> {
        let _guard = self.file.lock();
        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ChangeEvent>(&line) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(error = %err, "skipping malformed changelog line"),
            }
        }
        Ok(events)
    }
}

impl ChangeLog for FileChangeLog {
    fn record_change(&self, event: ChangeEvent) -> Result<()> {
        let line = serde_json::to_string(&event).map_err(|e| Error::serialization(e.to_string()))?;
        let mut file = self.file.lock();
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objstore_common::ChangeOperation;

    #[test]
    fn test_memory_changelog_order() {
        let log = MemoryChangeLog::new();
        log.record_change(ChangeEvent::put("k", "1-1", 1)).unwrap();
        log.record_change(ChangeEvent::delete("k")).unwrap();
        log.record_change(ChangeEvent::put("k", "2-2", 2)).unwrap();

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].operation, ChangeOperation::Put);
        assert_eq!(events[1].operation, ChangeOperation::Delete);
        assert_eq!(events[2].operation, ChangeOperation::Put);
    }

    #[test]
    fn test_file_changelog_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.log");

        let log = FileChangeLog::open(&path).unwrap();
        log.record_change(ChangeEvent::put("a", "1-5", 5)).unwrap();
        log.record_change(ChangeEvent::delete("a")).unwrap();

        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].key, "a");
        assert_eq!(events[0].size, Some(5));
        assert_eq!(events[1].operation, ChangeOperation::Delete);

        // Reopening appends rather than truncating
        drop(log);
        let log = FileChangeLog::open(&path).unwrap();
        log.record_change(ChangeEvent::put("b", "2-3", 3)).unwrap();
        assert_eq!(log.read_all().unwrap().len(), 3);
    }

    #[test]
    fn test_file_changelog_skips_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.log");

        let log = FileChangeLog::open(&path).unwrap();
        log.record_change(ChangeEvent::put("a", "1-1", 1)).unwrap();
        drop(log);

        // Simulate a torn write from a crashed process
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"key\":\"tru").unwrap();
        drop(file);

        let log = FileChangeLog::open(&path).unwrap();
        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "a");
    }
}
