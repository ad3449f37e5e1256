//! Bounded, persisted history of lifecycle and error events.
//!
//! Entries are stored newest first and capped at the configured
//! `maxHistory`. Recording is gated by the user's notification settings;
//! every event is still emitted through `tracing` regardless of the gate.
use crate::config::NotificationSettings;
use crate::error::{Error, Result};
use crate::storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(Error::ConfigInvalid(format!(
                "Unknown notification type '{}'",
                other
            ))),
        }
    }
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

/// Append-only notification history backed by a JSON document.
#[derive(Debug, Clone)]
pub struct NotificationLog {
    path: PathBuf,
    settings: NotificationSettings,
}

impl NotificationLog {
    pub fn new(path: impl Into<PathBuf>, settings: NotificationSettings) -> Self {
        Self {
            path: path.into(),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    /// Records an event if its severity is enabled.
    ///
    /// Persistence failures are logged and otherwise ignored so that a
    /// notification can never change the outcome of the operation that
    /// produced it.
    pub fn record(&self, severity: Severity, message: impl Into<String>, server_name: Option<&str>) {
        let message = message.into();
        let server = server_name.unwrap_or("-");
        match severity {
            Severity::Info => tracing::info!(server_name = %server, "{}", message),
            Severity::Warning => tracing::warn!(server_name = %server, "{}", message),
            Severity::Error => tracing::error!(server_name = %server, "{}", message),
        }

        if !self.settings.accepts(severity) {
            return;
        }

        let mut entries = self.load();
        entries.insert(
            0,
            NotificationEntry {
                severity,
                message,
                timestamp: Utc::now(),
                server_name: server_name.map(str::to_string),
            },
        );
        entries.truncate(self.settings.max_history);

        if let Err(e) = storage::write_json_atomic(&self.path, &entries) {
            tracing::warn!(error = %e, "Failed to persist notification history");
        }
    }

    /// Returns up to `limit` entries, newest first.
    pub fn list(&self, limit: Option<usize>) -> Vec<NotificationEntry> {
        let mut entries = self.load();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }

    /// Discards the whole history.
    pub fn clear(&self) -> Result<()> {
        storage::write_json_atomic(&self.path, &Vec::<NotificationEntry>::new())
    }

    fn load(&self) -> Vec<NotificationEntry> {
        match storage::read_json::<Vec<NotificationEntry>>(&self.path) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Notification history unreadable, starting fresh");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(dir: &Path, settings: NotificationSettings) -> NotificationLog {
        NotificationLog::new(dir.join("notifications.json"), settings)
    }

    #[test]
    fn test_history_is_bounded_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let settings = NotificationSettings {
            max_history: 3,
            ..Default::default()
        };
        let log = log_with(dir.path(), settings);

        for i in 0..5 {
            log.record(Severity::Info, format!("event {}", i), None);
        }

        let messages: Vec<_> = log.list(None).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 4", "event 3", "event 2"]);
    }

    #[test]
    fn test_disabled_log_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = NotificationSettings {
            enabled: false,
            ..Default::default()
        };
        let log = log_with(dir.path(), settings);

        log.record(Severity::Error, "boom", Some("fetch"));
        assert!(log.list(None).is_empty());
        assert!(!log.path().exists());
    }

    #[test]
    fn test_filtered_severity_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let settings = NotificationSettings {
            types: [Severity::Error].into_iter().collect(),
            ..Default::default()
        };
        let log = log_with(dir.path(), settings);

        log.record(Severity::Info, "started", Some("fetch"));
        log.record(Severity::Error, "crashed", Some("fetch"));

        let entries = log.list(None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Error);
        assert_eq!(entries[0].server_name.as_deref(), Some("fetch"));
    }

    #[test]
    fn test_list_limit_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_with(dir.path(), NotificationSettings::default());

        log.record(Severity::Info, "one", None);
        log.record(Severity::Warning, "two", None);
        assert_eq!(log.list(Some(1))[0].message, "two");

        log.clear().unwrap();
        assert!(log.list(None).is_empty());
    }

    #[test]
    fn test_document_shape() {
        let entry = NotificationEntry {
            severity: Severity::Warning,
            message: "slow".to_string(),
            timestamp: "2024-05-01T12:00:00Z".parse().unwrap(),
            server_name: Some("fetch".to_string()),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["serverName"], "fetch");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("fatal".parse::<Severity>().is_err());
    }
}
