//! Error types for the sensor core.
//!
//! Persistence failures stay inside the adapter boundary and are reported to
//! the engine as a boolean; the enums here carry the detail for logging and
//! for callers that use the `try_` variants directly.

use std::path::PathBuf;
use thiserror::Error;

use crate::status::TransportStatus;

// ============================================================================
// Storage
// ============================================================================

/// Mount bookkeeping errors.
#[derive(Debug, Error)]
pub enum MountError {
    /// The application owns this filesystem; the library must not mount it.
    #[error("mount point {0:?} is owned by the application")]
    NotOwner(PathBuf),

    /// The block device or directory backing the mount failed.
    #[error("mount backend failed for {path:?}: {source}")]
    Backend {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Client-state persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Configuration rejected at construction time
    #[error("invalid persistence configuration: {0}")]
    InvalidConfig(String),

    /// Caller precondition not met (unmounted filesystem, missing directory)
    #[error("persistence precondition failed: {0}")]
    Precondition(String),

    /// Length prefix disagrees with the payload that follows it
    #[error("corrupt state record: {0}")]
    CorruptRecord(String),

    /// The update callback reported that the state was not recorded
    #[error("state update rejected by callback")]
    Rejected,

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Correlation and command loop
// ============================================================================

/// Outcome of a bridged exchange that did not yield a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The transport reported a failure status.
    #[error("transport failed: {0}")]
    Transport(TransportStatus),

    /// The transport reported success without resolving a response.
    #[error("transport returned OK without resolving a response")]
    NoResponse,

    /// The transport asked the sensor manager to stop.
    #[error("transport requested exit")]
    ExitRequested,
}

impl BridgeError {
    /// Transport status the engine observes for this error.
    pub fn status(&self) -> TransportStatus {
        match self {
            Self::Transport(status) => *status,
            Self::NoResponse => TransportStatus::NoConnection,
            Self::ExitRequested => TransportStatus::ExitLoop,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Self::ExitRequested)
    }
}

/// Command decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command id {0}")]
    Unknown(u8),
}

/// Errors raised by a protocol engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("engine failure: {0}")]
    Failed(String),
}

impl EngineError {
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Bridge(e) if e.is_exit())
    }
}

/// Errors that abort a sensor manager run.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The update callback refused a new state. The engine has moved on
    /// while the recorded state has not, so the sensor can no longer stay in
    /// step with its channel peers.
    #[error("client state was not persisted; recorded state diverges from the channel")]
    StateNotPersisted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_status() {
        assert_eq!(BridgeError::NoResponse.status(), TransportStatus::NoConnection);
        assert_eq!(BridgeError::ExitRequested.status(), TransportStatus::ExitLoop);
        assert_eq!(
            BridgeError::Transport(TransportStatus::ConnectorError).status(),
            TransportStatus::ConnectorError
        );
    }

    #[test]
    fn test_engine_error_exit() {
        let err: EngineError = BridgeError::ExitRequested.into();
        assert!(err.is_exit());
        assert!(!EngineError::Failed("x".into()).is_exit());
    }
}
