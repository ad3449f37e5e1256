use crate::error::Result;
use crate::storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The last known OS process for a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    /// OS process identifier
    pub pid: u32,
    /// Registry name of the server
    pub server_name: String,
    /// When the process was spawned, stored as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
}

impl ProcessRecord {
    pub fn new(pid: u32, server_name: impl Into<String>) -> Self {
        Self {
            pid,
            server_name: server_name.into(),
            start_time: Utc::now(),
        }
    }
}

/// Durable mapping from server name to its last spawned process.
///
/// Nothing is cached: every call reads the document again, since other
/// invocations may have changed it. Removal helpers return the updated
/// sequence and leave persisting it to the caller.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record. A missing or malformed document reads as empty.
    pub fn load(&self) -> Vec<ProcessRecord> {
        match storage::read_json::<Vec<ProcessRecord>>(&self.path) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Identity store unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Replaces the whole document with `records`.
    pub fn save(&self, records: &[ProcessRecord]) -> Result<()> {
        storage::write_json_atomic(&self.path, records)
    }

    /// The most recently started record for `name`, if any.
    pub fn find_by_name(&self, name: &str) -> Option<ProcessRecord> {
        latest_for(&self.load(), name).cloned()
    }

    pub fn remove_by_pid(&self, pid: u32) -> Vec<ProcessRecord> {
        let mut records = self.load();
        records.retain(|r| r.pid != pid);
        records
    }

    pub fn remove_by_name(&self, name: &str) -> Vec<ProcessRecord> {
        let mut records = self.load();
        records.retain(|r| r.server_name != name);
        records
    }

    /// Stores `record`, superseding any earlier record for the same server.
    pub fn insert(&self, record: ProcessRecord) -> Result<()> {
        let mut records = self.remove_by_name(&record.server_name);
        records.push(record);
        self.save(&records)
    }
}

/// Picks the newest record for `name`; ties go to the later entry.
pub(crate) fn latest_for<'a>(records: &'a [ProcessRecord], name: &str) -> Option<&'a ProcessRecord> {
    records
        .iter()
        .filter(|r| r.server_name == name)
        .max_by_key(|r| r.start_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(pid: u32, name: &str, millis: i64) -> ProcessRecord {
        ProcessRecord {
            pid,
            server_name: name.to_string(),
            start_time: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[test]
    fn test_missing_and_malformed_documents_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("pids.json"));
        assert!(store.load().is_empty());

        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_document_shape() {
        let json = serde_json::to_value(record(42, "fetch", 1_714_564_800_000)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "pid": 42, "serverName": "fetch", "startTime": 1_714_564_800_000i64 })
        );
    }

    #[test]
    fn test_insert_supersedes_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("pids.json"));

        store.insert(record(10, "fetch", 1_000)).unwrap();
        store.insert(record(11, "other", 1_500)).unwrap();
        store.insert(record(12, "fetch", 2_000)).unwrap();

        let records = store.load();
        assert_eq!(records.len(), 2);
        assert_eq!(store.find_by_name("fetch").map(|r| r.pid), Some(12));
    }

    #[test]
    fn test_removal_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("pids.json"));
        store
            .save(&[record(10, "fetch", 1_000), record(11, "other", 1_500)])
            .unwrap();

        let remaining = store.remove_by_pid(10);
        assert_eq!(remaining, vec![record(11, "other", 1_500)]);
        assert_eq!(store.load().len(), 2);

        let remaining = store.remove_by_name("other");
        assert_eq!(remaining, vec![record(10, "fetch", 1_000)]);
    }

    #[test]
    fn test_find_by_name_prefers_newest_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("pids.json"));
        store
            .save(&[record(20, "fetch", 5_000), record(10, "fetch", 1_000)])
            .unwrap();

        assert_eq!(store.find_by_name("fetch").map(|r| r.pid), Some(20));
        assert!(store.find_by_name("ghost").is_none());
    }
}
