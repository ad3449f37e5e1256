use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "MCP_MANAGER_HOME";

/// Locations of every document the manager persists.
///
/// All paths derive from a single data directory so tests and alternative
/// installs can point the whole manager somewhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root directory holding the documents below.
    pub data_dir: PathBuf,
    /// Server registry (`{"mcpServers": {...}}`).
    pub registry: PathBuf,
    /// Process identity store.
    pub identity: PathBuf,
    /// User preferences.
    pub preferences: PathBuf,
    /// Notification history.
    pub notifications: PathBuf,
    /// Single-writer lock file.
    pub lock: PathBuf,
}

impl Paths {
    /// Lays out the documents under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            registry: data_dir.join("config.json"),
            identity: data_dir.join("pids.json"),
            preferences: data_dir.join("preferences.json"),
            notifications: data_dir.join("notifications.json"),
            lock: data_dir.join("state.lock"),
            data_dir,
        }
    }

    /// Resolves the data directory from an explicit override, then
    /// `MCP_MANAGER_HOME`, then the platform configuration directory.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }

        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(dir)));
        }

        dirs::config_dir()
            .map(|dir| Self::new(dir.join("mcp-manager")))
            .ok_or_else(|| {
                Error::ConfigInvalid(format!(
                    "Cannot determine a configuration directory; set {}",
                    HOME_ENV
                ))
            })
    }

    /// Default directory servers are installed into.
    pub fn default_installation_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }
}
