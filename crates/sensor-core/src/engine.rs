//! Seam between the sensor manager and the messaging protocol engine.
//!
//! The engine owns channel cryptography and message layout. The sensor
//! manager only moves its requests through an [`Exchange`] and records the
//! state changes it reports.

use crate::bridge::Exchange;
use crate::command::Command;
use crate::errors::EngineError;
use crate::persistence::ClientStateBlob;

/// Effect of an engine operation on the persisted client state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Unchanged,
    Updated(ClientStateBlob),
    Cleared,
}

impl StateChange {
    /// Blob to persist, if the state changed. `Cleared` persists the empty blob.
    pub fn blob(&self) -> Option<&[u8]> {
        match self {
            Self::Unchanged => None,
            Self::Updated(blob) => Some(blob),
            Self::Cleared => Some(&[]),
        }
    }
}

/// Result of executing one administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub state: StateChange,
    /// Request confirming execution, sent before the next poll.
    pub confirmation: Option<Vec<u8>>,
}

impl CommandOutcome {
    pub fn unchanged() -> Self {
        Self {
            state: StateChange::Unchanged,
            confirmation: None,
        }
    }
}

pub trait ProtocolEngine {
    /// Load a previously persisted client state.
    fn restore(&mut self, state: &[u8]) -> Result<(), EngineError>;

    /// Enroll the device in its channel. Returns the state to persist.
    fn enroll(&mut self, channel: &mut dyn Exchange) -> Result<ClientStateBlob, EngineError>;

    /// Request asking the bridge for the next administrative command.
    fn poll_request(&mut self) -> Result<Vec<u8>, EngineError>;

    /// Decode a poll response into a command and its arguments.
    fn decode_command(&mut self, response: &[u8]) -> Result<(Command, Vec<u8>), EngineError> {
        Ok(Command::decode(response)?)
    }

    /// Execute a command other than `NoCommand` and `ClearClientState`.
    fn execute(
        &mut self,
        command: Command,
        args: &[u8],
        channel: &mut dyn Exchange,
    ) -> Result<CommandOutcome, EngineError>;

    /// Send an application payload over the channel.
    fn send_message(
        &mut self,
        payload: &[u8],
        channel: &mut dyn Exchange,
    ) -> Result<StateChange, EngineError>;

    /// Forget all channel state.
    fn reset(&mut self);
}
