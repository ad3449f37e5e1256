use crate::error::Result;
use crate::notifications::Severity;
use crate::storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Default number of notifications retained.
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Which notifications are recorded and how many are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Master switch; when false nothing is recorded.
    pub enabled: bool,
    /// Maximum number of retained entries.
    pub max_history: usize,
    /// Severities that are recorded.
    pub types: BTreeSet<Severity>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history: DEFAULT_MAX_HISTORY,
            types: [Severity::Info, Severity::Warning, Severity::Error]
                .into_iter()
                .collect(),
        }
    }
}

impl NotificationSettings {
    /// Whether an entry of `severity` should be recorded.
    pub fn accepts(&self, severity: Severity) -> bool {
        self.enabled && self.types.contains(&severity)
    }
}

/// Process-wide user preferences.
///
/// Loaded once per invocation and handed to the components that need it;
/// persisted back on every [`Preferences::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Directory under which servers are installed.
    #[serde(default)]
    pub installation_dir: PathBuf,
    /// Whether installs prompt for a custom port.
    #[serde(default)]
    pub ask_for_custom_port: bool,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl Preferences {
    /// Default preferences installing into `installation_dir`.
    pub fn with_installation_dir(installation_dir: impl Into<PathBuf>) -> Self {
        Self {
            installation_dir: installation_dir.into(),
            ask_for_custom_port: false,
            last_updated: Utc::now(),
            notifications: NotificationSettings::default(),
        }
    }

    /// Loads preferences, falling back to defaults when the document is
    /// missing or unreadable.
    #[tracing::instrument(skip(path, default_installation_dir), fields(path = %path.display()))]
    pub fn load(path: &Path, default_installation_dir: &Path) -> Self {
        let mut prefs = match storage::read_json::<Preferences>(path) {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                tracing::debug!("No preferences file, using defaults");
                Self::with_installation_dir(default_installation_dir)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable preferences, using defaults");
                Self::with_installation_dir(default_installation_dir)
            }
        };

        if prefs.installation_dir.as_os_str().is_empty() {
            prefs.installation_dir = default_installation_dir.to_path_buf();
        }
        prefs
    }

    /// Writes the preferences document.
    pub fn save(&self, path: &Path) -> Result<()> {
        storage::write_json_atomic(path, self)
    }

    /// Applies `change`, stamps `last_updated` and persists.
    pub fn update(&mut self, path: &Path, change: impl FnOnce(&mut Self)) -> Result<()> {
        change(self);
        self.last_updated = Utc::now();
        self.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(&dir.path().join("preferences.json"), Path::new("/srv/mcp"));

        assert_eq!(prefs.installation_dir, PathBuf::from("/srv/mcp"));
        assert!(!prefs.ask_for_custom_port);
        assert!(prefs.notifications.enabled);
        assert_eq!(prefs.notifications.max_history, DEFAULT_MAX_HISTORY);
        assert_eq!(prefs.notifications.types.len(), 3);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(
            &path,
            r#"{ "askForCustomPort": true, "notifications": { "maxHistory": 5, "types": ["error"] } }"#,
        )
        .unwrap();

        let prefs = Preferences::load(&path, Path::new("/srv/mcp"));
        assert!(prefs.ask_for_custom_port);
        assert_eq!(prefs.installation_dir, PathBuf::from("/srv/mcp"));
        assert!(prefs.notifications.enabled);
        assert_eq!(prefs.notifications.max_history, 5);
        assert!(prefs.notifications.accepts(Severity::Error));
        assert!(!prefs.notifications.accepts(Severity::Info));
    }

    #[test]
    fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        let mut prefs = Preferences::load(&path, Path::new("/srv/mcp"));

        prefs
            .update(&path, |p| p.notifications.enabled = false)
            .unwrap();

        let reloaded = Preferences::load(&path, Path::new("/elsewhere"));
        assert!(!reloaded.notifications.enabled);
        assert_eq!(reloaded.installation_dir, PathBuf::from("/srv/mcp"));
    }
}
