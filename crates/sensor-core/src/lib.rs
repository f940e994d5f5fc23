//! Boundary layer of a LoRaWAN sensor.
//!
//! This crate provides:
//! - Client-state persistence over four storage configurations
//! - Filesystem ownership bookkeeping for library-managed partitions
//! - A synchronous request/response correlation bridge over any transport
//! - The sensor initialization and command polling loop
//! - Status taxonomies shared with transports and relays

pub mod bridge;
pub mod command;
pub mod config;
pub mod dev_eui;
pub mod engine;
pub mod errors;
pub mod fs_owner;
pub mod persistence;
pub mod record;
pub mod sensor_loop;
pub mod status;
pub mod testing;

pub use bridge::{Exchange, Resolver, SendRequest, TransportCorrelationBridge};
pub use command::Command;
pub use config::{ConfigError, SensorConfig, StorageConfig};
pub use dev_eui::{DevEui, DEV_EUI_LEN_BYTES};
pub use engine::{CommandOutcome, ProtocolEngine, StateChange};
pub use errors::*;
pub use fs_owner::{
    DirectoryBackend, FilesystemOwnership, FilesystemOwnershipManager, MountBackend,
};
pub use persistence::{
    is_channel_initialized, CallbackSeed, ClientDataPersistenceConfig,
    ClientStateBlob, ClientStatePersistenceAdapter, InitializationState, LibraryPartition,
    StateUpdate, StorageKind,
};
pub use sensor_loop::{
    start_sensor_manager, CommandLoopOptions, LoopReport, LoopState, SensorCommandLoop,
    SensorManagerSession,
};
pub use status::{ProtocolStatus, TransportStatus};
