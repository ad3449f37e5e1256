use crate::config::ServerConfig;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Validates a single server configuration
pub fn validate_server_config(name: &str, config: &ServerConfig) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server name must not be empty".to_string()));
    }

    if config.command.trim().is_empty() {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has empty command",
            name
        )));
    }

    if let Some(port) = config.port {
        if !(1..=i64::from(u16::MAX)).contains(&port) {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' declares port {} outside 1-65535",
                name, port
            )));
        }
    }

    Ok(())
}

/// Validates every entry of a registry.
///
/// An empty registry is valid: it simply means nothing is installed.
pub fn validate_config(configs: &BTreeMap<String, ServerConfig>) -> Result<()> {
    for (name, config) in configs {
        validate_server_config(name, config)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_port(port: i64) -> ServerConfig {
        ServerConfig {
            command: "node".to_string(),
            port: Some(port),
            ..Default::default()
        }
    }

    #[test]
    fn test_port_range() {
        assert!(validate_server_config("s", &with_port(1)).is_ok());
        assert!(validate_server_config("s", &with_port(65535)).is_ok());

        for port in [0, -1, 65536, 70000] {
            assert!(matches!(
                validate_server_config("s", &with_port(port)),
                Err(Error::ConfigInvalid(_))
            ));
        }
    }
}
