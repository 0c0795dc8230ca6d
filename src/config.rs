//! Configuration
//!
//! Configuration structures for the relay server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// TLS is enabled only when both certfile and keyfile are set
    #[serde(default)]
    pub certfile: Option<PathBuf>,
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Account name -> argon2 PHC hash, consulted by `StaticCredentials`
    #[serde(default)]
    pub accounts: HashMap<String, String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            certfile: None,
            keyfile: None,
            max_frame_bytes: default_max_frame_bytes(),
            log_level: default_log_level(),
            accounts: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Returns the certificate/key pair when TLS is configured
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.certfile, &self.keyfile) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8443);
        assert_eq!(config.max_frame_bytes, 65536);
        assert!(config.tls_paths().is_none());
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            port = 9000
            certfile = "server.crt"
            keyfile = "server.key"

            [accounts]
            alice = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.log_level, "info");
        assert!(config.tls_paths().is_some());
        assert!(config.accounts["alice"].starts_with("$argon2id$"));
    }

    #[test]
    fn test_cert_without_key_disables_tls() {
        let config = ServerConfig::from_toml(r#"certfile = "server.crt""#).unwrap();
        assert!(config.tls_paths().is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let result = ServerConfig::from_toml("port = \"not a number\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = ServerConfig::from_file("/nonexistent/relay.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
