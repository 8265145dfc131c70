//! Changelog reader interface
//!
//! The replication engine owns the reader side of the changelog: backends
//! only append, the engine discovers dirty keys since its last-sync
//! watermark.

use chrono::{DateTime, Utc};
use objstore_common::{ChangeEvent, Result};
use objstore_store::{FileChangeLog, MemoryChangeLog};

/// Dirty-key discovery over a backend's changelog
pub trait ChangeFeed: Send + Sync {
    /// Events recorded strictly after `since`, in append order
    fn changes_since(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>>;
}

impl ChangeFeed for MemoryChangeLog {
    fn changes_since(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>> {
        Ok(self
            .events()
            .into_iter()
            .filter(|e| e.timestamp > since)
            .collect())
    }
}

impl ChangeFeed for FileChangeLog {
    fn changes_since(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.timestamp > since)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objstore_store::ChangeLog;

    #[test]
    fn test_memory_feed_watermark() {
        let log = MemoryChangeLog::new();
        log.record_change(ChangeEvent::put("a", "1-1", 1)).unwrap();
        let watermark = Utc::now();
        log.record_change(ChangeEvent::put("b", "2-2", 2)).unwrap();

        let events = log.changes_since(watermark).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "b");
    }

    #[test]
    fn test_file_feed_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileChangeLog::open(dir.path().join("changes.log")).unwrap();
        log.record_change(ChangeEvent::put("a", "1-1", 1)).unwrap();
        let watermark = Utc::now();
        log.record_change(ChangeEvent::delete("a")).unwrap();

        let events = log.changes_since(watermark).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "a");
    }
}
