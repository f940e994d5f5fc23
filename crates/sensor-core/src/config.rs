//! Sensor configuration file and environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dev_eui::DevEui;
use crate::fs_owner::{DirectoryBackend, FilesystemOwnership, DEFAULT_BASE_PATH};
use crate::persistence::{ClientDataPersistenceConfig, LibraryPartition, StorageKind};
use crate::sensor_loop::CommandLoopOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub ownership: FilesystemOwnership,
    /// Directory of an application-mounted filesystem.
    pub path: Option<PathBuf>,
    /// Where the library mounts its own partition.
    pub library_base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::VfsFile,
            ownership: FilesystemOwnership::LibraryManaged,
            path: None,
            library_base_path: PathBuf::from(DEFAULT_BASE_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub dev_eui: Option<DevEui>,
    pub bridge_url: Option<String>,
    pub poll_interval_secs: u64,
    pub storage: StorageConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            dev_eui: None,
            bridge_url: None,
            poll_interval_secs: 5,
            storage: StorageConfig::default(),
        }
    }
}

impl SensorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let config: SensorConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(eui) = std::env::var("SENSOR_DEV_EUI") {
            if let Ok(eui) = eui.parse() {
                config.dev_eui = Some(eui);
            }
        }
        if let Ok(url) = std::env::var("SENSOR_BRIDGE_URL") {
            config.bridge_url = Some(url);
        }
        if let Ok(path) = std::env::var("SENSOR_STORAGE_PATH") {
            config.storage.ownership = FilesystemOwnership::ApplicationManaged;
            config.storage.path = Some(PathBuf::from(path));
        }
        if let Ok(secs) = std::env::var("SENSOR_POLL_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.poll_interval_secs = secs;
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dev_eui.is_none() {
            return Err(ConfigError::ValidationError("dev_eui is required".to_string()));
        }
        if let Some(url) = &self.bridge_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "bridge_url must be an http(s) URL, got {:?}",
                    url
                )));
            }
        }
        if self.storage.kind != StorageKind::VfsFile {
            return Err(ConfigError::ValidationError(
                "callback storage can only be configured programmatically".to_string(),
            ));
        }
        match (self.storage.ownership, &self.storage.path) {
            (FilesystemOwnership::ApplicationManaged, None) => Err(ConfigError::ValidationError(
                "application-managed storage needs a path".to_string(),
            )),
            (FilesystemOwnership::LibraryManaged, Some(_)) => Err(ConfigError::ValidationError(
                "library-managed storage does not take a path; set library_base_path instead"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn persistence_config(&self) -> Result<ClientDataPersistenceConfig, ConfigError> {
        self.validate()?;
        match (self.storage.ownership, &self.storage.path) {
            (FilesystemOwnership::ApplicationManaged, Some(path)) => {
                ClientDataPersistenceConfig::vfs_application_managed(path)
                    .map_err(|e| ConfigError::ValidationError(e.to_string()))
            }
            _ => Ok(ClientDataPersistenceConfig::vfs_library_managed_at(
                LibraryPartition::new(&self.storage.library_base_path, Box::new(DirectoryBackend)),
            )),
        }
    }

    pub fn command_loop_options(&self) -> CommandLoopOptions {
        CommandLoopOptions {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_application_managed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
dev_eui = "A1B2C3D4"
bridge_url = "http://bridge.local:50000"
poll_interval_secs = 2

[storage]
kind = "vfs"
ownership = "application"
path = "/data"
"#
        )
        .unwrap();

        let config = SensorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.dev_eui, Some(DevEui::new(0xA1B2_C3D4)));
        assert_eq!(config.storage.ownership, FilesystemOwnership::ApplicationManaged);
        assert_eq!(config.command_loop_options().poll_interval, Duration::from_secs(2));

        let persistence = config.persistence_config().unwrap();
        assert_eq!(persistence.ownership(), FilesystemOwnership::ApplicationManaged);
        assert_eq!(persistence.storage_kind(), StorageKind::VfsFile);
    }

    #[test]
    fn test_defaults_to_library_partition() {
        let config = SensorConfig {
            dev_eui: Some(DevEui::new(1)),
            ..SensorConfig::default()
        };
        assert_eq!(config.storage.library_base_path, PathBuf::from("/spiflash"));
        let persistence = config.persistence_config().unwrap();
        assert_eq!(persistence.ownership(), FilesystemOwnership::LibraryManaged);
    }

    #[test]
    fn test_validation() {
        let mut config = SensorConfig::default();
        assert!(config.validate().is_err());

        config.dev_eui = Some(DevEui::new(1));
        config.storage.ownership = FilesystemOwnership::ApplicationManaged;
        assert!(config.validate().is_err());

        config.storage.path = Some(PathBuf::from("/data"));
        assert!(config.validate().is_ok());

        config.bridge_url = Some("bridge.local".to_string());
        assert!(config.validate().is_err());

        config.bridge_url = None;
        config.storage.kind = StorageKind::Callback;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SensorConfig::load_from_file(Path::new("/nonexistent/sensor.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
