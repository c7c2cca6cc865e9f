//! Server configuration, read from TOML.
//!
//! ```toml
//! addr = "127.0.0.1:3000"
//! log_filter = "gatehouse=debug"
//! max_body_bytes = 65536
//! ```
//!
//! Every key is optional.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// `EnvFilter` directives; `RUST_LOG` overrides them.
    pub log_filter: String,
    /// Request bodies above this size are answered with 413.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_filter: "info".to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be greater than zero".to_owned()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be empty".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        assert_eq!(ServerConfig::from_toml_str("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn keys_override_defaults() {
        let config = ServerConfig::from_toml_str(
            r#"
            addr = "127.0.0.1:3000"
            max_body_bytes = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn zero_body_limit_is_invalid() {
        let err = ServerConfig::from_toml_str("max_body_bytes = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_values_fail_to_parse() {
        assert!(matches!(ServerConfig::from_toml_str(r#"addr = "nowhere""#), Err(ConfigError::Parse(_))));
        assert!(matches!(ServerConfig::from_toml_str("port = 1"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_io() {
        assert!(matches!(ServerConfig::load("/definitely/not/here.toml"), Err(ConfigError::Io(_))));
    }
}
