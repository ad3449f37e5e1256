//! Configuration module for MCP Manager.
//!
//! This module handles the persisted documents that describe what is
//! installed and how the manager behaves: the server registry schema,
//! user preferences, validation, and where everything lives on disk.
//!
//! # Examples
//!
//! Loading a registry document from a file:
//!
//! ```no_run
//! use mcp_manager::config::Config;
//!
//! let config = Config::from_file("config.json").unwrap();
//! println!("Loaded configuration with {} servers", config.mcp_servers.len());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use mcp_manager::config::{Config, ServerConfig};
//!
//! let mut config = Config::default();
//! config.mcp_servers.insert(
//!     "fetch".to_string(),
//!     ServerConfig {
//!         command: "uvx".to_string(),
//!         args: vec!["mcp-server-fetch".to_string()],
//!         ..Default::default()
//!     },
//! );
//! assert!(mcp_manager::config::validate_config(&config.mcp_servers).is_ok());
//! ```
mod parser;
pub mod paths;
pub mod preferences;
pub mod validator;

pub use parser::{Config, ServerConfig};
pub use paths::Paths;
pub use preferences::{NotificationSettings, Preferences};
pub use validator::{validate_config, validate_server_config};
