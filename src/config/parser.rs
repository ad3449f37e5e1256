use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Launch configuration for a single installed MCP server.
///
/// This structure defines how to start a server process: the command to
/// execute, the arguments to pass, and optional environment variables. It
/// also carries bookkeeping the manager maintains (`last_run`) and an
/// optional declared port.
///
/// # Examples
///
/// ```
/// use mcp_manager::config::ServerConfig;
/// use std::collections::BTreeMap;
///
/// let mut env = BTreeMap::new();
/// env.insert("DEBUG".to_string(), "true".to_string());
///
/// let server_config = ServerConfig {
///     command: "node".to_string(),
///     args: vec!["/opt/mcp/servers/fetch/dist/index.js".to_string()],
///     env,
///     port: Some(3001),
///     ..Default::default()
/// };
/// assert!(server_config.last_run.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command to execute when starting the MCP server.
    /// This can be an absolute path or a command available in the PATH.
    pub command: String,

    /// Command-line arguments to pass to the server.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables to set when launching the server.
    /// These are layered over the current environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Port the server was configured to listen on, if any.
    ///
    /// Kept wide so an out-of-range value only invalidates its own entry;
    /// [`validate_server_config`](crate::config::validate_server_config)
    /// enforces `1..=65535` at start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,

    /// Reserved for a future health-check description. Preserved as-is.
    #[serde(
        default,
        rename = "healthCheck",
        skip_serializing_if = "Option::is_none"
    )]
    pub health_check: Option<Value>,

    /// When the server was last started by the manager.
    #[serde(default, rename = "lastRun", skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,

    /// Keys the manager does not interpret (`type`, `disabled`, ...),
    /// carried through every rewrite and sync untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The server registry document.
///
/// Maps unique server names to their launch configuration. The same shape
/// is written to consumer configuration files by the config synchronizer.
///
/// # JSON Schema
///
/// ```json
/// {
///   "mcpServers": {
///     "fetch": {
///       "command": "node",
///       "args": ["/opt/mcp/servers/fetch/dist/index.js"],
///       "env": { "DEBUG": "true" },
///       "port": 3001,
///       "lastRun": "2024-05-01T12:00:00Z"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Map of server names to their configurations.
    /// The key is a unique identifier for each server.
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, ServerConfig>,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON
    /// * The JSON does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claude_config() {
        let config_str = r#"{
            "mcpServers": {
                "filesystem": {
                    "command": "npx",
                    "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path/to/allowed/files"]
                }
            }
        }"#;

        let config = Config::parse_from_str(config_str).unwrap();

        assert_eq!(config.mcp_servers.len(), 1);
        let fs_config = &config.mcp_servers["filesystem"];
        assert_eq!(fs_config.command, "npx");
        assert_eq!(
            fs_config.args,
            vec![
                "-y",
                "@modelcontextprotocol/server-filesystem",
                "/path/to/allowed/files"
            ]
        );
        assert!(fs_config.env.is_empty());
        assert!(fs_config.port.is_none());
    }

    #[test]
    fn test_parse_bookkeeping_fields() {
        let config_str = r#"{
            "mcpServers": {
                "weather": {
                    "command": "node",
                    "args": ["index.js"],
                    "port": 4100,
                    "lastRun": "2024-05-01T12:00:00Z"
                }
            }
        }"#;

        let config = Config::parse_from_str(config_str).unwrap();
        let weather = &config.mcp_servers["weather"];
        assert_eq!(weather.port, Some(4100));
        assert_eq!(
            weather.last_run.map(|t| t.to_rfc3339()),
            Some("2024-05-01T12:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_out_of_range_port_parses() {
        let config_str = r#"{
            "mcpServers": {
                "good": { "command": "sleep", "args": ["100"] },
                "bad": { "command": "node", "port": 70000 },
                "negative": { "command": "node", "port": -1 }
            }
        }"#;

        let config = Config::parse_from_str(config_str).unwrap();
        assert_eq!(config.mcp_servers.len(), 3);
        assert_eq!(config.mcp_servers["bad"].port, Some(70000));
        assert_eq!(config.mcp_servers["negative"].port, Some(-1));
    }

    #[test]
    fn test_unknown_keys_survive_a_rewrite() {
        let config_str = r#"{
            "mcpServers": {
                "s": { "command": "node", "type": "stdio", "disabled": false }
            }
        }"#;

        let config = Config::parse_from_str(config_str).unwrap();
        let entry = &config.mcp_servers["s"];
        assert_eq!(entry.extra["type"], "stdio");

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "mcpServers": { "s": { "command": "node", "args": [], "type": "stdio", "disabled": false } }
            })
        );
    }

    #[test]
    fn test_empty_document_is_empty_registry() {
        let config = Config::parse_from_str("{}").unwrap();
        assert!(config.mcp_servers.is_empty());
    }

    #[test]
    fn test_optional_fields_are_omitted_on_write() {
        let mut config = Config::default();
        config.mcp_servers.insert(
            "echo".to_string(),
            ServerConfig {
                command: "sleep".to_string(),
                args: vec!["100".to_string()],
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "mcpServers": { "echo": { "command": "sleep", "args": ["100"] } } })
        );
    }
}
