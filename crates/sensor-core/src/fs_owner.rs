//! Single-writer bookkeeping over one mount point.
//!
//! The library mounts and unmounts only a filesystem it owns. When the
//! application owns the filesystem the manager records that fact and refuses
//! to mount; unmount is a no-op.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::MountError;

/// Base path of the library's own partition.
pub const DEFAULT_BASE_PATH: &str = "/spiflash";

/// Label of the partition the library mounts at [`DEFAULT_BASE_PATH`].
pub const DEFAULT_PARTITION_LABEL: &str = "storage";

/// Who mounts and unmounts the filesystem holding client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemOwnership {
    #[serde(alias = "library")]
    LibraryManaged,
    #[serde(alias = "application")]
    ApplicationManaged,
}

impl fmt::Display for FilesystemOwnership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LibraryManaged => f.write_str("library-managed"),
            Self::ApplicationManaged => f.write_str("application-managed"),
        }
    }
}

/// Block-device driver seam.
pub trait MountBackend: Send {
    fn mount(&mut self, base_path: &Path, partition_label: &str) -> io::Result<()>;
    fn unmount(&mut self, base_path: &Path, partition_label: &str) -> io::Result<()>;
}

/// Host backend where a partition is a plain directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryBackend;

impl MountBackend for DirectoryBackend {
    fn mount(&mut self, base_path: &Path, _partition_label: &str) -> io::Result<()> {
        std::fs::create_dir_all(base_path)
    }

    fn unmount(&mut self, _base_path: &Path, _partition_label: &str) -> io::Result<()> {
        Ok(())
    }
}

enum Owner {
    Library {
        backend: Box<dyn MountBackend>,
        partition_label: String,
    },
    Application,
}

pub struct FilesystemOwnershipManager {
    base_path: PathBuf,
    owner: Owner,
    mounted: bool,
}

impl FilesystemOwnershipManager {
    /// Manager for a partition the library mounts itself.
    pub fn library_managed(
        base_path: impl Into<PathBuf>,
        partition_label: impl Into<String>,
        backend: Box<dyn MountBackend>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            owner: Owner::Library {
                backend,
                partition_label: partition_label.into(),
            },
            mounted: false,
        }
    }

    /// Manager for a filesystem the application has already mounted.
    pub fn application_managed(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            owner: Owner::Application,
            mounted: false,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn ownership(&self) -> FilesystemOwnership {
        match self.owner {
            Owner::Library { .. } => FilesystemOwnership::LibraryManaged,
            Owner::Application => FilesystemOwnership::ApplicationManaged,
        }
    }

    pub fn owns_mount(&self) -> bool {
        matches!(self.owner, Owner::Library { .. })
    }

    /// Whether the library currently holds the mount.
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn mount(&mut self) -> Result<(), MountError> {
        let Owner::Library { backend, partition_label } = &mut self.owner else {
            return Err(MountError::NotOwner(self.base_path.clone()));
        };
        if self.mounted {
            debug!("{:?} already mounted", self.base_path);
            return Ok(());
        }
        backend
            .mount(&self.base_path, partition_label)
            .map_err(|source| MountError::Backend {
                path: self.base_path.clone(),
                source,
            })?;
        self.mounted = true;
        info!("Mounted partition '{}' at {:?}", partition_label, self.base_path);
        Ok(())
    }

    pub fn unmount(&mut self) -> Result<(), MountError> {
        let Owner::Library { backend, partition_label } = &mut self.owner else {
            return Ok(());
        };
        if !self.mounted {
            return Ok(());
        }
        backend
            .unmount(&self.base_path, partition_label)
            .map_err(|source| MountError::Backend {
                path: self.base_path.clone(),
                source,
            })?;
        self.mounted = false;
        info!("Unmounted partition '{}' from {:?}", partition_label, self.base_path);
        Ok(())
    }
}

impl fmt::Debug for FilesystemOwnershipManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemOwnershipManager")
            .field("base_path", &self.base_path)
            .field("ownership", &self.ownership())
            .field("mounted", &self.mounted)
            .finish()
    }
}
