//! Registry accessor: the single source of truth for which servers exist.
//!
//! The registry is held in memory for the duration of one command and
//! written back as a whole document on [`Registry::save`].
use crate::config::{Config, ServerConfig, validate_server_config};
use crate::error::{Error, Result};
use crate::storage;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// In-memory view of the registry document at a known path.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    config: Config,
    /// Set when the file existed but could not be parsed; such a file is
    /// never overwritten.
    unreadable: bool,
}

impl Registry {
    /// Loads the registry, treating a missing document as empty.
    ///
    /// A malformed document also loads as empty, but the registry is then
    /// read-only so the operator's file is left untouched.
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub fn load(path: &Path) -> Self {
        let path = path.to_path_buf();
        match storage::read_json::<Config>(&path) {
            Ok(config) => {
                let config = config.unwrap_or_default();
                tracing::debug!(num_servers = config.mcp_servers.len(), "Loaded registry");
                Self {
                    path,
                    config,
                    unreadable: false,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Registry unreadable, treating as empty");
                Self {
                    path,
                    config: Config::default(),
                    unreadable: true,
                }
            }
        }
    }

    /// Wraps an existing configuration; nothing is read from disk.
    pub fn from_config(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config,
            unreadable: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the backing file could not be parsed on load.
    pub fn is_unreadable(&self) -> bool {
        self.unreadable
    }

    pub fn is_empty(&self) -> bool {
        self.config.mcp_servers.is_empty()
    }

    /// Registered server names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.config.mcp_servers.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.config.mcp_servers.get(name)
    }

    /// Like [`Registry::get`], but a missing entry is [`Error::ServerNotFound`].
    pub fn require(&self, name: &str) -> Result<&ServerConfig> {
        self.get(name)
            .ok_or_else(|| Error::ServerNotFound(name.to_string()))
    }

    /// Inserts or replaces an entry after validating it.
    pub fn upsert(&mut self, name: &str, config: ServerConfig) -> Result<()> {
        validate_server_config(name, &config)?;
        self.config.mcp_servers.insert(name.to_string(), config);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<ServerConfig> {
        self.config.mcp_servers.remove(name)
    }

    /// Stamps the entry's last-run time. Returns false if `name` is unknown.
    pub fn mark_last_run(&mut self, name: &str, at: DateTime<Utc>) -> bool {
        match self.config.mcp_servers.get_mut(name) {
            Some(entry) => {
                entry.last_run = Some(at);
                true
            }
            None => false,
        }
    }

    /// Writes the whole registry document.
    pub fn save(&self) -> Result<()> {
        if self.unreadable {
            return Err(Error::Persistence(format!(
                "Refusing to overwrite unreadable registry {}",
                self.path.display()
            )));
        }
        storage::write_json_atomic(&self.path, &self.config)
    }
}
