//! Test doubles for transports, update callbacks and engines.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::{Exchange, Resolver, SendRequest};
use crate::command::Command;
use crate::engine::{CommandOutcome, ProtocolEngine, StateChange};
use crate::errors::EngineError;
use crate::persistence::{ClientStateBlob, StateUpdate};
use crate::status::{ProtocolStatus, TransportStatus};

/// One scripted answer of a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Resolve with these bytes and return `Ok`.
    Respond(Vec<u8>),
    /// Return this status without resolving.
    Fail(TransportStatus),
    /// Return `Ok` without resolving.
    Silent,
}

/// Transport answering from a script; returns `ExitLoop` once the script is exhausted.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    resolved: Arc<Mutex<Vec<ProtocolStatus>>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Requests received so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Statuses the resolver returned.
    pub fn resolved(&self) -> Vec<ProtocolStatus> {
        self.resolved.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

impl SendRequest for ScriptedTransport {
    fn send(&mut self, request: &[u8], resolver: &mut Resolver<'_>) -> TransportStatus {
        self.sent.lock().push(request.to_vec());
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(ScriptedReply::Respond(response)) => {
                let status = resolver.resolve(&response);
                self.resolved.lock().push(status);
                TransportStatus::Ok
            }
            Some(ScriptedReply::Fail(status)) => status,
            Some(ScriptedReply::Silent) => TransportStatus::Ok,
            None => TransportStatus::ExitLoop,
        }
    }
}

/// Update callback that records every state it is handed.
#[derive(Clone)]
pub struct RecordingStateUpdate {
    updates: Arc<Mutex<Vec<Vec<u8>>>>,
    accept: Arc<AtomicBool>,
}

impl RecordingStateUpdate {
    pub fn new() -> Self {
        Self {
            updates: Arc::new(Mutex::new(Vec::new())),
            accept: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Make subsequent updates report success or failure.
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// States handed to the callback, including rejected ones.
    pub fn updates(&self) -> Vec<Vec<u8>> {
        self.updates.lock().clone()
    }
}

impl Default for RecordingStateUpdate {
    fn default() -> Self {
        Self::new()
    }
}

impl StateUpdate for RecordingStateUpdate {
    fn update(&mut self, state: &[u8]) -> bool {
        self.updates.lock().push(state.to_vec());
        self.accept.load(Ordering::SeqCst)
    }
}

/// Engine whose state is a little-endian counter bumped by every state change.
///
/// Enrollment sends `b"enroll"` and adopts the response as state. Polls send
/// `b"poll"`. Executed commands send no extra traffic and are confirmed with
/// `b"confirm"` followed by the command id.
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub state: Option<ClientStateBlob>,
    pub executed: Vec<Command>,
    pub messages: Vec<Vec<u8>>,
    /// Commands whose execution fails.
    pub failing: Vec<Command>,
}

impl FakeEngine {
    fn bump(&mut self) -> ClientStateBlob {
        let counter = self
            .state
            .as_deref()
            .and_then(|s| <[u8; 8]>::try_from(s).ok())
            .map(u64::from_le_bytes)
            .unwrap_or(0);
        let next = (counter + 1).to_le_bytes().to_vec();
        self.state = Some(next.clone());
        next
    }
}

impl ProtocolEngine for FakeEngine {
    fn restore(&mut self, state: &[u8]) -> Result<(), EngineError> {
        self.state = Some(state.to_vec());
        Ok(())
    }

    fn enroll(&mut self, channel: &mut dyn Exchange) -> Result<ClientStateBlob, EngineError> {
        let response = channel.request(b"enroll")?;
        self.state = Some(response.clone());
        Ok(response)
    }

    fn poll_request(&mut self) -> Result<Vec<u8>, EngineError> {
        Ok(b"poll".to_vec())
    }

    fn execute(
        &mut self,
        command: Command,
        _args: &[u8],
        _channel: &mut dyn Exchange,
    ) -> Result<CommandOutcome, EngineError> {
        if self.failing.contains(&command) {
            return Err(EngineError::Failed(format!("{} refused", command)));
        }
        self.executed.push(command);
        let state = self.bump();
        let mut confirmation = b"confirm".to_vec();
        confirmation.push(command.id());
        Ok(CommandOutcome {
            state: StateChange::Updated(state),
            confirmation: Some(confirmation),
        })
    }

    fn send_message(
        &mut self,
        payload: &[u8],
        channel: &mut dyn Exchange,
    ) -> Result<StateChange, EngineError> {
        channel.request(payload)?;
        self.messages.push(payload.to_vec());
        Ok(StateChange::Updated(self.bump()))
    }

    fn reset(&mut self) {
        self.state = None;
    }
}
