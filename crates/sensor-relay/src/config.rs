//! Relay configuration

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address sensors connect to.
    pub listen_addr: SocketAddr,
    /// Base URL of the bridge.
    pub bridge_url: String,
    /// Per-request timeout towards the bridge; 0 disables it.
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 50001)),
            bridge_url: "http://127.0.0.1:50000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SENSOR_RELAY_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = std::env::var("SENSOR_RELAY_LISTEN_ADDR") {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
        }
        if let Ok(url) = std::env::var("SENSOR_RELAY_BRIDGE_URL") {
            self.bridge_url = url;
        }
        if let Ok(secs) = std::env::var("SENSOR_RELAY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid request_timeout_secs: {}", e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bridge_url.starts_with("http://") || self.bridge_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "bridge_url must be an http(s) URL: {:?}",
                self.bridge_url
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listen_addr = \"127.0.0.1:6000\"\nbridge_url = \"https://bridge.example\"\nrequest_timeout_secs = 0"
        )
        .unwrap();

        let config = RelayConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.bridge_url, "https://bridge.example");
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bridge_url = \"http://10.0.0.2:50000\"").unwrap();

        let config = RelayConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr, RelayConfig::default().listen_addr);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_rejects_non_http_bridge() {
        let config = RelayConfig {
            bridge_url: "bridge:50000".to_string(),
            ..RelayConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
