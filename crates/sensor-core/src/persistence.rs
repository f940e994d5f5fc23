//! Client-state persistence.
//!
//! A [`ClientDataPersistenceConfig`] selects one of four configurations
//! (storage kind x filesystem ownership) and carries exactly the fields that
//! configuration needs. A [`ClientStatePersistenceAdapter`] built from it
//! presents the same read/persist contract for all four.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::errors::PersistenceError;
use crate::fs_owner::{
    DirectoryBackend, FilesystemOwnership, FilesystemOwnershipManager, MountBackend,
    DEFAULT_BASE_PATH, DEFAULT_PARTITION_LABEL,
};
use crate::record::{self, STATE_FILE_NAME};

/// Opaque, engine-defined channel state.
pub type ClientStateBlob = Vec<u8>;

// ============================================================================
// Configuration
// ============================================================================

/// Where the client state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[serde(alias = "vfs")]
    VfsFile,
    Callback,
}

/// What the caller last recorded through the update callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitializationState {
    Unknown,
    NotInitialized,
    Initialized,
}

/// Durable recorder for client state, supplied by the application.
///
/// `update` must return `true` only once `state` is durably recorded; an
/// empty `state` means the client state was cleared. Any context the
/// recorder needs lives in the implementing type.
pub trait StateUpdate: Send {
    fn update(&mut self, state: &[u8]) -> bool;
}

impl<F> StateUpdate for F
where
    F: FnMut(&[u8]) -> bool + Send,
{
    fn update(&mut self, state: &[u8]) -> bool {
        self(state)
    }
}

/// State the application recorded the previous time its update callback ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSeed {
    state: InitializationState,
    latest: Option<ClientStateBlob>,
}

impl CallbackSeed {
    pub fn new(state: InitializationState, latest: Vec<u8>) -> Result<Self, PersistenceError> {
        match state {
            InitializationState::Unknown => Err(PersistenceError::InvalidConfig(
                "initialization state must be known when seeding callback storage".to_string(),
            )),
            InitializationState::NotInitialized if !latest.is_empty() => {
                Err(PersistenceError::InvalidConfig(
                    "a not-initialized seed must not carry state bytes".to_string(),
                ))
            }
            InitializationState::NotInitialized => Ok(Self::not_initialized()),
            InitializationState::Initialized if latest.is_empty() => {
                Err(PersistenceError::InvalidConfig(
                    "an initialized seed must carry the latest state bytes".to_string(),
                ))
            }
            InitializationState::Initialized => Ok(Self {
                state,
                latest: Some(latest),
            }),
        }
    }

    pub fn not_initialized() -> Self {
        Self {
            state: InitializationState::NotInitialized,
            latest: None,
        }
    }

    pub fn initialized(latest: Vec<u8>) -> Result<Self, PersistenceError> {
        Self::new(InitializationState::Initialized, latest)
    }

    pub fn state(&self) -> InitializationState {
        self.state
    }
}

/// The partition the library mounts when it owns the filesystem.
pub struct LibraryPartition {
    pub base_path: PathBuf,
    pub partition_label: String,
    pub backend: Box<dyn MountBackend>,
}

impl LibraryPartition {
    pub fn new(base_path: impl Into<PathBuf>, backend: Box<dyn MountBackend>) -> Self {
        Self {
            base_path: base_path.into(),
            partition_label: DEFAULT_PARTITION_LABEL.to_string(),
            backend,
        }
    }

    fn into_manager(self) -> FilesystemOwnershipManager {
        FilesystemOwnershipManager::library_managed(self.base_path, self.partition_label, self.backend)
    }
}

impl Default for LibraryPartition {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH, Box::new(DirectoryBackend))
    }
}

impl fmt::Debug for LibraryPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryPartition")
            .field("base_path", &self.base_path)
            .field("partition_label", &self.partition_label)
            .finish_non_exhaustive()
    }
}

/// One of the four persistence configurations.
pub enum ClientDataPersistenceConfig {
    /// State file on the library's own partition.
    VfsLibraryManaged { partition: LibraryPartition },
    /// State file in a directory of a filesystem the application mounted.
    VfsApplicationManaged { path: PathBuf },
    /// State handed to the application; the library still owns its partition.
    CallbackLibraryManaged {
        partition: LibraryPartition,
        seed: CallbackSeed,
        update: Box<dyn StateUpdate>,
    },
    /// State handed to the application; no library filesystem at all.
    /// `path` names an application-owned directory the engine may use for
    /// auxiliary files. The adapter never touches it.
    CallbackApplicationManaged {
        path: Option<PathBuf>,
        seed: CallbackSeed,
        update: Box<dyn StateUpdate>,
    },
}

impl ClientDataPersistenceConfig {
    pub fn vfs_library_managed() -> Self {
        Self::VfsLibraryManaged {
            partition: LibraryPartition::default(),
        }
    }

    pub fn vfs_library_managed_at(partition: LibraryPartition) -> Self {
        Self::VfsLibraryManaged { partition }
    }

    pub fn vfs_application_managed(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(PersistenceError::InvalidConfig(
                "application-managed storage needs a path".to_string(),
            ));
        }
        Ok(Self::VfsApplicationManaged { path })
    }

    pub fn callback_library_managed(seed: CallbackSeed, update: impl StateUpdate + 'static) -> Self {
        Self::CallbackLibraryManaged {
            partition: LibraryPartition::default(),
            seed,
            update: Box::new(update),
        }
    }

    pub fn callback_library_managed_at(
        partition: LibraryPartition,
        seed: CallbackSeed,
        update: impl StateUpdate + 'static,
    ) -> Self {
        Self::CallbackLibraryManaged {
            partition,
            seed,
            update: Box::new(update),
        }
    }

    pub fn callback_application_managed(
        seed: CallbackSeed,
        update: impl StateUpdate + 'static,
        path: Option<PathBuf>,
    ) -> Self {
        Self::CallbackApplicationManaged {
            path,
            seed,
            update: Box::new(update),
        }
    }

    pub fn storage_kind(&self) -> StorageKind {
        match self {
            Self::VfsLibraryManaged { .. } | Self::VfsApplicationManaged { .. } => StorageKind::VfsFile,
            Self::CallbackLibraryManaged { .. } | Self::CallbackApplicationManaged { .. } => {
                StorageKind::Callback
            }
        }
    }

    pub fn ownership(&self) -> FilesystemOwnership {
        match self {
            Self::VfsLibraryManaged { .. } | Self::CallbackLibraryManaged { .. } => {
                FilesystemOwnership::LibraryManaged
            }
            Self::VfsApplicationManaged { .. } | Self::CallbackApplicationManaged { .. } => {
                FilesystemOwnership::ApplicationManaged
            }
        }
    }
}

impl fmt::Debug for ClientDataPersistenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VfsLibraryManaged { partition } => f
                .debug_struct("VfsLibraryManaged")
                .field("partition", partition)
                .finish(),
            Self::VfsApplicationManaged { path } => f
                .debug_struct("VfsApplicationManaged")
                .field("path", path)
                .finish(),
            Self::CallbackLibraryManaged { partition, seed, .. } => f
                .debug_struct("CallbackLibraryManaged")
                .field("partition", partition)
                .field("seed", &seed.state)
                .finish_non_exhaustive(),
            Self::CallbackApplicationManaged { path, seed, .. } => f
                .debug_struct("CallbackApplicationManaged")
                .field("path", path)
                .field("seed", &seed.state)
                .finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// Adapter
// ============================================================================

enum Backing {
    File {
        path: PathBuf,
    },
    Callback {
        update: Box<dyn StateUpdate>,
        latest: Option<ClientStateBlob>,
    },
}

/// Uniform "read current state, persist on change" contract over one
/// persistence configuration.
///
/// Exactly one adapter should exist per backing store. Dropping the adapter
/// releases any mount the library took.
pub struct ClientStatePersistenceAdapter {
    backing: Backing,
    fs: Option<FilesystemOwnershipManager>,
    kind: StorageKind,
}

impl ClientStatePersistenceAdapter {
    pub fn new(config: ClientDataPersistenceConfig) -> Self {
        let kind = config.storage_kind();
        let (backing, fs) = match config {
            ClientDataPersistenceConfig::VfsLibraryManaged { partition } => {
                let path = partition.base_path.join(STATE_FILE_NAME);
                (Backing::File { path }, Some(partition.into_manager()))
            }
            ClientDataPersistenceConfig::VfsApplicationManaged { path } => {
                let fs = FilesystemOwnershipManager::application_managed(&path);
                (
                    Backing::File {
                        path: path.join(STATE_FILE_NAME),
                    },
                    Some(fs),
                )
            }
            ClientDataPersistenceConfig::CallbackLibraryManaged { partition, seed, update } => (
                Backing::Callback {
                    update,
                    latest: seed.latest,
                },
                Some(partition.into_manager()),
            ),
            ClientDataPersistenceConfig::CallbackApplicationManaged { path, seed, update } => (
                Backing::Callback {
                    update,
                    latest: seed.latest,
                },
                path.map(FilesystemOwnershipManager::application_managed),
            ),
        };
        Self { backing, fs, kind }
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.kind
    }

    /// Directory available to the engine for auxiliary files, if any.
    pub fn storage_dir(&self) -> Option<&Path> {
        self.fs.as_ref().map(|fs| fs.base_path())
    }

    /// Path of the state record for file-backed storage.
    pub fn state_file(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File { path } => Some(path),
            Backing::Callback { .. } => None,
        }
    }

    /// Mount the library partition or check the application's directory.
    pub fn prepare(&mut self) -> Result<(), PersistenceError> {
        let Some(fs) = self.fs.as_mut() else {
            return Ok(());
        };
        if fs.owns_mount() {
            fs.mount()?;
            return Ok(());
        }
        if matches!(self.backing, Backing::File { .. }) && !fs.base_path().is_dir() {
            return Err(PersistenceError::Precondition(format!(
                "{:?} is not a directory of a mounted filesystem",
                fs.base_path()
            )));
        }
        Ok(())
    }

    /// Release the mount if the library took one.
    pub fn flush_resources(&mut self) -> Result<(), PersistenceError> {
        if let Some(fs) = self.fs.as_mut() {
            fs.unmount()?;
        }
        Ok(())
    }

    /// True iff a current client state exists. I/O errors read as `false`.
    pub fn is_initialized(&mut self) -> bool {
        match self.load_current_state() {
            Ok(state) => state.is_some(),
            Err(e) => {
                debug!("Treating unreadable client state as not initialized: {}", e);
                false
            }
        }
    }

    pub fn load_current_state(&mut self) -> Result<Option<ClientStateBlob>, PersistenceError> {
        self.ensure_mounted()?;
        match &self.backing {
            Backing::File { path } => record::read(path),
            Backing::Callback { latest, .. } => Ok(latest.clone()),
        }
    }

    /// Persist `blob` as the current state. An empty blob clears it.
    pub fn try_persist_state(&mut self, blob: &[u8]) -> Result<(), PersistenceError> {
        self.ensure_mounted()?;
        match &mut self.backing {
            Backing::File { path } => record::write(path, blob),
            Backing::Callback { update, latest } => {
                if !update.update(blob) {
                    return Err(PersistenceError::Rejected);
                }
                *latest = if blob.is_empty() { None } else { Some(blob.to_vec()) };
                Ok(())
            }
        }
    }

    /// Boolean form of [`try_persist_state`](Self::try_persist_state).
    ///
    /// `false` means the state was not advanced; the previous state stays current.
    pub fn persist_state(&mut self, blob: &[u8]) -> bool {
        match self.try_persist_state(blob) {
            Ok(()) => {
                info!("Persisted client state ({} bytes)", blob.len());
                true
            }
            Err(PersistenceError::Rejected) => {
                error!(
                    "Update callback did not record the new client state ({} bytes). \
                     The sensor will diverge from its channel unless the same or a newer \
                     state is recorded",
                    blob.len()
                );
                false
            }
            Err(e) => {
                error!("Failed to persist client state: {}", e);
                false
            }
        }
    }

    pub fn clear_state(&mut self) -> bool {
        self.persist_state(&[])
    }

    fn ensure_mounted(&mut self) -> Result<(), PersistenceError> {
        match self.fs.as_mut() {
            Some(fs) if fs.owns_mount() && !fs.is_mounted() => {
                fs.mount()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Drop for ClientStatePersistenceAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.flush_resources() {
            warn!("Failed to release client state storage: {}", e);
        }
    }
}

impl fmt::Debug for ClientStatePersistenceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStatePersistenceAdapter")
            .field("kind", &self.kind)
            .field("fs", &self.fs)
            .finish_non_exhaustive()
    }
}

/// Whether a client state exists for `config`, without starting a session.
pub fn is_channel_initialized(config: ClientDataPersistenceConfig) -> bool {
    let mut adapter = ClientStatePersistenceAdapter::new(config);
    if let Err(e) = adapter.prepare() {
        warn!("Client state storage unavailable: {}", e);
        return false;
    }
    adapter.is_initialized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct CountingBackend {
        mounts: Arc<AtomicUsize>,
        unmounts: Arc<AtomicUsize>,
    }

    impl CountingBackend {
        fn counts(&self) -> (usize, usize) {
            (self.mounts.load(Ordering::SeqCst), self.unmounts.load(Ordering::SeqCst))
        }
    }

    impl MountBackend for CountingBackend {
        fn mount(&mut self, _: &Path, _: &str) -> io::Result<()> {
            self.mounts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn unmount(&mut self, _: &Path, _: &str) -> io::Result<()> {
            self.unmounts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_seed_validation() {
        assert!(CallbackSeed::new(InitializationState::Unknown, vec![]).is_err());
        assert!(CallbackSeed::new(InitializationState::NotInitialized, vec![1]).is_err());
        assert!(CallbackSeed::new(InitializationState::Initialized, vec![]).is_err());
        assert!(CallbackSeed::new(InitializationState::NotInitialized, vec![]).is_ok());
        let seed = CallbackSeed::initialized(vec![9]).unwrap();
        assert_eq!(seed.state(), InitializationState::Initialized);
    }

    #[test]
    fn test_application_path_required() {
        assert!(ClientDataPersistenceConfig::vfs_application_managed("").is_err());
    }

    #[test]
    fn test_config_axes() {
        let config = ClientDataPersistenceConfig::callback_application_managed(
            CallbackSeed::not_initialized(),
            |_: &[u8]| true,
            None,
        );
        assert_eq!(config.storage_kind(), StorageKind::Callback);
        assert_eq!(config.ownership(), FilesystemOwnership::ApplicationManaged);

        let config = ClientDataPersistenceConfig::vfs_library_managed();
        assert_eq!(config.storage_kind(), StorageKind::VfsFile);
        assert_eq!(config.ownership(), FilesystemOwnership::LibraryManaged);
    }

    #[test]
    fn test_callback_seed_is_returned_as_is() {
        let config = ClientDataPersistenceConfig::callback_application_managed(
            CallbackSeed::initialized(vec![7, 7]).unwrap(),
            |_: &[u8]| true,
            None,
        );
        let mut adapter = ClientStatePersistenceAdapter::new(config);
        assert!(adapter.is_initialized());
        assert_eq!(adapter.load_current_state().unwrap(), Some(vec![7, 7]));
    }

    #[test]
    fn test_prepare_rejects_missing_application_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            ClientDataPersistenceConfig::vfs_application_managed(dir.path().join("not-there")).unwrap();
        let mut adapter = ClientStatePersistenceAdapter::new(config);
        assert!(matches!(adapter.prepare(), Err(PersistenceError::Precondition(_))));
        assert!(!adapter.persist_state(&[1]));
        assert!(!dir.path().join("not-there").exists());
    }

    #[test]
    fn test_library_partition_is_mounted_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("spiflash");
        let partition = LibraryPartition::new(&base, Box::new(DirectoryBackend));
        let mut adapter =
            ClientStatePersistenceAdapter::new(ClientDataPersistenceConfig::vfs_library_managed_at(partition));
        assert!(!adapter.is_initialized());
        assert!(adapter.persist_state(b"state"));
        assert!(base.join(STATE_FILE_NAME).is_file());
        assert_eq!(adapter.storage_dir(), Some(base.as_path()));
    }

    #[test]
    fn test_flush_resources_unmounts_library_partition_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CountingBackend::default();
        let partition = LibraryPartition::new(dir.path(), Box::new(backend.clone()));
        let mut adapter =
            ClientStatePersistenceAdapter::new(ClientDataPersistenceConfig::vfs_library_managed_at(partition));

        adapter.prepare().unwrap();
        assert!(adapter.persist_state(b"state"));
        assert_eq!(backend.counts(), (1, 0));

        adapter.flush_resources().unwrap();
        assert_eq!(backend.counts(), (1, 1));
        adapter.flush_resources().unwrap();
        drop(adapter);
        assert_eq!(backend.counts(), (1, 1));
    }

    #[test]
    fn test_drop_unmounts_library_partition() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CountingBackend::default();
        let partition = LibraryPartition::new(dir.path(), Box::new(backend.clone()));
        let config = ClientDataPersistenceConfig::callback_library_managed_at(
            partition,
            CallbackSeed::not_initialized(),
            |_: &[u8]| true,
        );
        {
            let mut adapter = ClientStatePersistenceAdapter::new(config);
            assert!(adapter.persist_state(b"state"));
            assert_eq!(backend.counts(), (1, 0));
        }
        assert_eq!(backend.counts(), (1, 1));
    }

    #[test]
    fn test_application_managed_storage_is_never_mounted() {
        let dir = tempfile::tempdir().unwrap();
        let configs = vec![
            ClientDataPersistenceConfig::vfs_application_managed(dir.path()).unwrap(),
            ClientDataPersistenceConfig::callback_application_managed(
                CallbackSeed::not_initialized(),
                |_: &[u8]| true,
                Some(dir.path().to_path_buf()),
            ),
        ];
        for config in configs {
            let mut adapter = ClientStatePersistenceAdapter::new(config);
            adapter.prepare().unwrap();
            assert!(adapter.persist_state(b"state"));
            assert!(adapter.fs.as_ref().is_some_and(|fs| !fs.owns_mount() && !fs.is_mounted()));
            adapter.flush_resources().unwrap();
            drop(adapter);
            assert!(dir.path().is_dir());
        }
    }
}
