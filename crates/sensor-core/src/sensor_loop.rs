//! Sensor initialization and command polling.
//!
//! `Unstarted -> AwaitingResponse -> {ProcessingCommand, Exiting}`.
//!
//! Everything runs on the caller's thread as one synchronous call chain:
//! the transport resolves each response before its send returns, and the
//! loop persists any state change before the next poll. The only clean
//! shutdown is a transport returning `ExitLoop`.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bridge::{Exchange, SendRequest, TransportCorrelationBridge};
use crate::command::Command;
use crate::dev_eui::DevEui;
use crate::engine::{ProtocolEngine, StateChange};
use crate::errors::{BridgeError, EngineError, SensorError};
use crate::persistence::{ClientDataPersistenceConfig, ClientStatePersistenceAdapter};

/// Default wait between polls that returned no command.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CommandLoopOptions {
    pub poll_interval: Duration,
}

impl Default for CommandLoopOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Unstarted,
    AwaitingResponse,
    ProcessingCommand,
    Exiting,
}

/// Counters of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub enrolled: bool,
    pub polls: u64,
    pub commands_executed: u64,
    pub commands_failed: u64,
}

// ============================================================================
// Session
// ============================================================================

/// Device identity, persistence and transport for one sensor manager run.
pub struct SensorManagerSession<T> {
    dev_eui: DevEui,
    persistence: ClientStatePersistenceAdapter,
    bridge: TransportCorrelationBridge<T>,
}

impl<T: SendRequest> SensorManagerSession<T> {
    pub fn new(
        dev_eui: DevEui,
        config: ClientDataPersistenceConfig,
        transport: T,
    ) -> Result<Self, SensorError> {
        let mut persistence = ClientStatePersistenceAdapter::new(config);
        persistence.prepare()?;
        Ok(Self {
            dev_eui,
            persistence,
            bridge: TransportCorrelationBridge::new(transport),
        })
    }

    pub fn dev_eui(&self) -> DevEui {
        self.dev_eui
    }

    pub fn persistence(&mut self) -> &mut ClientStatePersistenceAdapter {
        &mut self.persistence
    }

    pub fn bridge(&mut self) -> &mut TransportCorrelationBridge<T> {
        &mut self.bridge
    }

    pub fn is_initialized(&mut self) -> bool {
        self.persistence.is_initialized()
    }

    /// Restore the persisted state into `engine`, or enroll when there is none.
    ///
    /// Returns whether an enrollment took place.
    pub fn initialize<E: ProtocolEngine>(&mut self, engine: &mut E) -> Result<bool, SensorError> {
        if let Some(state) = self.persistence.load_current_state()? {
            debug!("Restoring client state of {} bytes", state.len());
            engine.restore(&state)?;
            return Ok(false);
        }
        info!("Sensor {} is not initialized, enrolling", self.dev_eui);
        let state = engine.enroll(&mut self.bridge)?;
        self.apply(StateChange::Updated(state))?;
        Ok(true)
    }

    /// Send an application payload and persist the resulting state.
    pub fn send_message<E: ProtocolEngine>(
        &mut self,
        engine: &mut E,
        payload: &[u8],
    ) -> Result<(), SensorError> {
        let change = engine.send_message(payload, &mut self.bridge)?;
        self.apply(change)
    }

    /// Persist a state change. A refused update aborts the run.
    pub fn apply(&mut self, change: StateChange) -> Result<(), SensorError> {
        let Some(blob) = change.blob() else {
            return Ok(());
        };
        if self.persistence.persist_state(blob) {
            Ok(())
        } else {
            Err(SensorError::StateNotPersisted)
        }
    }
}

impl<T> fmt::Debug for SensorManagerSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorManagerSession")
            .field("dev_eui", &self.dev_eui)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Command loop
// ============================================================================

pub struct SensorCommandLoop<E, T> {
    session: SensorManagerSession<T>,
    engine: E,
    options: CommandLoopOptions,
    state: LoopState,
    report: LoopReport,
}

impl<E: ProtocolEngine, T: SendRequest> SensorCommandLoop<E, T> {
    pub fn new(session: SensorManagerSession<T>, engine: E, options: CommandLoopOptions) -> Self {
        Self {
            session,
            engine,
            options,
            state: LoopState::Unstarted,
            report: LoopReport::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn report(&self) -> &LoopReport {
        &self.report
    }

    pub fn session(&mut self) -> &mut SensorManagerSession<T> {
        &mut self.session
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_parts(self) -> (SensorManagerSession<T>, E) {
        (self.session, self.engine)
    }

    /// Run until the transport returns `ExitLoop` or a cycle fails.
    pub fn run(&mut self) -> Result<LoopReport, SensorError> {
        match self.session.initialize(&mut self.engine) {
            Ok(enrolled) => self.report.enrolled = enrolled,
            Err(e) if is_exit(&e) => return Ok(self.exit()),
            Err(e) => {
                error!("Initialization of sensor {} failed: {}", self.session.dev_eui, e);
                return Err(e);
            }
        }

        loop {
            let request = self.engine.poll_request()?;
            self.set_state(LoopState::AwaitingResponse);
            let response = match self.session.bridge.request(&request) {
                Ok(response) => response,
                Err(BridgeError::ExitRequested) => return Ok(self.exit()),
                Err(e) => {
                    error!("Polling for the next command failed: {}", e);
                    return Err(e.into());
                }
            };
            self.report.polls += 1;

            self.set_state(LoopState::ProcessingCommand);
            let command = match self.engine.decode_command(&response) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("Ignoring undecodable poll response: {}", e);
                    (Command::NoCommand, Vec::new())
                }
            };
            match self.process(command) {
                Ok(()) => {}
                Err(e) if is_exit(&e) => return Ok(self.exit()),
                Err(e) => {
                    error!("Aborting command loop: {}", e);
                    return Err(e);
                }
            }
        }
    }

    fn process(&mut self, (command, args): (Command, Vec<u8>)) -> Result<(), SensorError> {
        match command {
            Command::NoCommand => {
                debug!("No command, waiting {:?}", self.options.poll_interval);
                if !self.options.poll_interval.is_zero() {
                    std::thread::sleep(self.options.poll_interval);
                }
                Ok(())
            }
            Command::ClearClientState => {
                info!("Clearing client state of sensor {}", self.session.dev_eui);
                self.engine.reset();
                self.session.apply(StateChange::Cleared)?;
                self.report.commands_executed += 1;
                Ok(())
            }
            command => {
                info!("Executing command {}", command);
                let outcome = match self.engine.execute(command, &args, &mut self.session.bridge) {
                    Ok(outcome) => outcome,
                    Err(EngineError::Bridge(e)) => return Err(e.into()),
                    Err(e) => {
                        error!("Command {} failed: {}", command, e);
                        self.report.commands_failed += 1;
                        return Ok(());
                    }
                };
                self.session.apply(outcome.state)?;
                if let Some(confirmation) = outcome.confirmation {
                    self.session.bridge.request(&confirmation)?;
                    debug!("Confirmed command {}", command);
                }
                self.report.commands_executed += 1;
                Ok(())
            }
        }
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            debug!("Command loop {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn exit(&mut self) -> LoopReport {
        self.set_state(LoopState::Exiting);
        info!(
            "Sensor manager exiting after {} polls, {} commands",
            self.report.polls, self.report.commands_executed
        );
        self.report.clone()
    }
}

fn is_exit(err: &SensorError) -> bool {
    match err {
        SensorError::Bridge(e) => e.is_exit(),
        SensorError::Engine(e) => e.is_exit(),
        _ => false,
    }
}

/// Run a sensor manager session until the transport asks it to stop.
///
/// Creates the session, restores or enrolls the client state, and polls for
/// commands. Returns `Ok` only on `ExitLoop`; any other transport failure
/// aborts the run with an error.
pub fn start_sensor_manager<E, T>(
    dev_eui: DevEui,
    config: ClientDataPersistenceConfig,
    transport: T,
    engine: E,
    options: CommandLoopOptions,
) -> Result<LoopReport, SensorError>
where
    E: ProtocolEngine,
    T: SendRequest,
{
    info!("Starting sensor manager for {} ({:?})", dev_eui, config);
    let session = SensorManagerSession::new(dev_eui, config, transport)?;
    SensorCommandLoop::new(session, engine, options).run()
}
