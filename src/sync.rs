//! Projects the registry into consumer configuration files.
//!
//! Each host integration (Claude Desktop, Cursor, or any file path) owns
//! its own copy of an `{"mcpServers": {...}}` document. Targets are always
//! regenerated in full from the registry and never read back.
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::storage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Selection sentinel meaning every registered server.
pub const ALL_SERVERS: &str = "all-servers";

/// A consumer configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// Claude Desktop's `claude_desktop_config.json`
    Claude,
    /// Cursor's `~/.cursor/mcp.json`
    Cursor,
    /// Any other file
    Path(PathBuf),
}

impl SyncTarget {
    /// The file this target writes to.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            SyncTarget::Claude => dirs::config_dir()
                .map(|dir| dir.join("Claude").join("claude_desktop_config.json"))
                .ok_or_else(|| {
                    Error::ConfigInvalid("Cannot locate the Claude configuration directory".into())
                }),
            SyncTarget::Cursor => dirs::home_dir()
                .map(|dir| dir.join(".cursor").join("mcp.json"))
                .ok_or_else(|| Error::ConfigInvalid("Cannot locate the home directory".into())),
            SyncTarget::Path(path) => Ok(path.clone()),
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTarget::Claude => f.write_str("claude"),
            SyncTarget::Cursor => f.write_str("cursor"),
            SyncTarget::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for SyncTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "claude" | "claude-desktop" => Ok(SyncTarget::Claude),
            "cursor" => Ok(SyncTarget::Cursor),
            other => {
                if let Some(path) = other.strip_prefix("path:") {
                    return Ok(SyncTarget::Path(PathBuf::from(path)));
                }
                if other.contains(std::path::MAIN_SEPARATOR) || other.ends_with(".json") {
                    return Ok(SyncTarget::Path(PathBuf::from(other)));
                }
                Err(Error::ConfigInvalid(format!(
                    "Unknown sync target '{}' (expected claude, cursor or path:<file>)",
                    other
                )))
            }
        }
    }
}

/// What a sync wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub target: PathBuf,
    /// Servers written to the target
    pub written: Vec<String>,
    /// Requested names that are not registered
    pub skipped: Vec<String>,
}

/// Writes registry subsets to consumer files.
#[derive(Debug, Clone)]
pub struct ConfigSynchronizer {
    registry_path: PathBuf,
}

impl ConfigSynchronizer {
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
        }
    }

    /// Overwrites `target_path` with the selected servers from the current
    /// registry. Unregistered names are skipped.
    #[tracing::instrument(skip(self, target_path), fields(target = %target_path.display()))]
    pub fn sync(&self, target_path: &Path, selected: &[String]) -> Result<SyncReport> {
        let registry = Registry::load(&self.registry_path);
        if registry.is_unreadable() {
            return Err(Error::ConfigParse(format!(
                "Registry {} is unreadable; not overwriting {}",
                self.registry_path.display(),
                target_path.display()
            )));
        }

        let (document, skipped) = project(registry.config(), selected);
        for name in &skipped {
            tracing::debug!(server_name = %name, "Skipping unregistered server");
        }

        storage::write_json_atomic(target_path, &document)?;
        let written: Vec<String> = document.mcp_servers.keys().cloned().collect();
        tracing::info!(num_servers = written.len(), "Synced configuration");

        Ok(SyncReport {
            target: target_path.to_path_buf(),
            written,
            skipped,
        })
    }
}

/// Builds the reduced document for `selected`, returning it with the
/// requested names that were not found.
pub fn project(registry: &Config, selected: &[String]) -> (Config, Vec<String>) {
    if selected.iter().any(|name| name == ALL_SERVERS) {
        return (registry.clone(), Vec::new());
    }

    let mut document = Config::default();
    let mut skipped = Vec::new();
    for name in selected {
        match registry.mcp_servers.get(name) {
            Some(entry) => {
                document.mcp_servers.insert(name.clone(), entry.clone());
            }
            None => skipped.push(name.clone()),
        }
    }
    (document, skipped)
}
