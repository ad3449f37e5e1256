/// Error handling module for MCP Manager.
///
/// This module defines the error types used throughout the library.
/// Not every unusual condition is an error: starting a server that is
/// already running or stopping one that is not running are reported as
/// outcomes, and stale process records are repaired silently.
///
/// # Example
///
/// ```
/// use mcp_manager::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::ServerNotFound(name)) => println!("Server '{}' is not installed", name),
///         Err(Error::Spawn(msg)) => println!("Could not launch: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the mcp-manager library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse a persisted document.
    ///
    /// This error occurs when:
    /// - The document is not valid JSON
    /// - Required fields are missing or have the wrong type
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// A document parsed but contains values that cannot be used.
    ///
    /// This error occurs when:
    /// - A server has an empty command
    /// - A declared port is outside 1..=65535
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The named server is not present in the registry.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// The operating system refused to create the server process.
    #[error("Failed to spawn server process: {0}")]
    Spawn(String),

    /// Delivering a signal to a process failed.
    #[error("Failed to signal process: {0}")]
    Signal(String),

    /// A process-table query could not be run or answered.
    ///
    /// Callers degrade this to a conservative default rather than failing.
    #[error("Process probe failed: {0}")]
    Probe(String),

    /// Writing a document to disk failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Another invocation holds the state lock.
    #[error("State is locked by another invocation: {0}")]
    Locked(String),
}

/// Result type for mcp-manager operations.
pub type Result<T> = std::result::Result<T, Error>;
