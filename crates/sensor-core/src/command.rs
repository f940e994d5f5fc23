//! Administrative commands fetched from the bridge.
//!
//! A poll response starts with a one-byte command id; the remaining bytes are
//! the command's arguments and are only meaningful to the engine.

use std::fmt;

use tracing::debug;

use crate::errors::CommandError;

pub const COMMAND_LENGTH_BYTES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    NoCommand,
    StartSendingMessages,
    SubscribeToAnnouncementLink,
    RegisterKeyloadMessage,
    PrintlnSubscriberStatus,
    ClearClientState,
}

impl Command {
    pub const fn id(self) -> u8 {
        match self {
            Self::NoCommand => 0,
            Self::StartSendingMessages => 1,
            Self::SubscribeToAnnouncementLink => 2,
            Self::RegisterKeyloadMessage => 3,
            Self::PrintlnSubscriberStatus => 4,
            Self::ClearClientState => 5,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, CommandError> {
        match id {
            0 => Ok(Self::NoCommand),
            1 => Ok(Self::StartSendingMessages),
            2 => Ok(Self::SubscribeToAnnouncementLink),
            3 => Ok(Self::RegisterKeyloadMessage),
            4 => Ok(Self::PrintlnSubscriberStatus),
            5 => Ok(Self::ClearClientState),
            other => Err(CommandError::Unknown(other)),
        }
    }

    /// Split a poll response into command and arguments.
    ///
    /// A response shorter than the command id decodes to `NoCommand`.
    pub fn decode(response: &[u8]) -> Result<(Self, Vec<u8>), CommandError> {
        if response.len() < COMMAND_LENGTH_BYTES {
            debug!("Poll response carries no command");
            return Ok((Self::NoCommand, Vec::new()));
        }
        let command = Self::from_id(response[0])?;
        Ok((command, response[COMMAND_LENGTH_BYTES..].to_vec()))
    }

    /// Command id followed by `args`.
    pub fn encode(self, args: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMAND_LENGTH_BYTES + args.len());
        out.push(self.id());
        out.extend_from_slice(args);
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoCommand => "NO_COMMAND",
            Self::StartSendingMessages => "START_SENDING_MESSAGES",
            Self::SubscribeToAnnouncementLink => "SUBSCRIBE_TO_ANNOUNCEMENT_LINK",
            Self::RegisterKeyloadMessage => "REGISTER_KEYLOAD_MESSAGE",
            Self::PrintlnSubscriberStatus => "PRINTLN_SUBSCRIBER_STATUS",
            Self::ClearClientState => "CLEAR_CLIENT_STATE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_splits_arguments() {
        let (command, args) = Command::decode(&[2, 0xAB, 0xCD]).unwrap();
        assert_eq!(command, Command::SubscribeToAnnouncementLink);
        assert_eq!(args, vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_short_response_is_no_command() {
        assert_eq!(Command::decode(&[]).unwrap(), (Command::NoCommand, Vec::new()));
    }

    #[test]
    fn test_unknown_id() {
        assert_eq!(Command::decode(&[42]), Err(CommandError::Unknown(42)));
    }

    #[test]
    fn test_encode() {
        assert_eq!(Command::ClearClientState.encode(&[]), vec![5]);
        assert_eq!(Command::StartSendingMessages.encode(b"x"), vec![1, b'x']);
    }
}
