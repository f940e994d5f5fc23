//! Synchronous request/response correlation over a push-style transport.
//!
//! The engine calls [`TransportCorrelationBridge::request`]. The bridge hands
//! the request and a [`Resolver`] to the transport's send function, which
//! must call [`Resolver::resolve`] exactly once before returning if, and only
//! if, it obtained a response. Correlation is by call-stack nesting: the
//! resolver borrows the bridge's response slot for the duration of the send,
//! so it cannot outlive the call, and `&mut self` allows one outstanding
//! request at a time.

use tracing::{debug, warn};

use crate::errors::BridgeError;
use crate::status::{ProtocolStatus, TransportStatus};

/// Continuation handed to a transport for a single outstanding request.
pub struct Resolver<'a> {
    slot: &'a mut Option<Vec<u8>>,
}

impl<'a> Resolver<'a> {
    fn new(slot: &'a mut Option<Vec<u8>>) -> Self {
        Self { slot }
    }

    /// Hand the response for the outstanding request back to the engine.
    pub fn resolve(&mut self, response: &[u8]) -> ProtocolStatus {
        if self.slot.is_some() {
            warn!(
                "Response of {} bytes resolved after the request was already answered",
                response.len()
            );
            return ProtocolStatus::ResponseWithoutRequest;
        }
        if response.is_empty() {
            warn!("Received a 0 byte response; the connection was probably shut down");
            return ProtocolStatus::InternalChannelError;
        }
        debug!("Resolved response of {} bytes", response.len());
        *self.slot = Some(response.to_vec());
        ProtocolStatus::Ok
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.is_some()
    }
}

/// Caller-supplied send capability.
///
/// Whatever context the transport needs (socket, device identifier, HTTP
/// client) is owned by the implementing type. Closures with the matching
/// signature implement this trait.
pub trait SendRequest {
    fn send(&mut self, request: &[u8], resolver: &mut Resolver<'_>) -> TransportStatus;
}

impl<F> SendRequest for F
where
    F: FnMut(&[u8], &mut Resolver<'_>) -> TransportStatus,
{
    fn send(&mut self, request: &[u8], resolver: &mut Resolver<'_>) -> TransportStatus {
        self(request, resolver)
    }
}

/// Blocking round trip as seen by an engine.
pub trait Exchange {
    fn request(&mut self, request: &[u8]) -> Result<Vec<u8>, BridgeError>;
}

/// Turns a [`SendRequest`] into a blocking [`Exchange`].
#[derive(Debug)]
pub struct TransportCorrelationBridge<T> {
    transport: T,
    exchanges: u64,
}

impl<T: SendRequest> TransportCorrelationBridge<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            exchanges: 0,
        }
    }

    /// Number of requests handed to the transport so far.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: SendRequest> Exchange for TransportCorrelationBridge<T> {
    fn request(&mut self, request: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let mut slot = None;
        self.exchanges += 1;
        debug!("Sending request #{} of {} bytes", self.exchanges, request.len());
        let status = self.transport.send(request, &mut Resolver::new(&mut slot));

        match (status, slot) {
            (TransportStatus::Ok, Some(response)) => Ok(response),
            (TransportStatus::Ok, None) => {
                warn!("Transport returned OK but never resolved a response");
                Err(BridgeError::NoResponse)
            }
            (TransportStatus::ExitLoop, _) => {
                debug!("Transport requested exit");
                Err(BridgeError::ExitRequested)
            }
            (status, response) => {
                if response.is_some() {
                    warn!("Discarding resolved response because transport reported {}", status);
                }
                Err(BridgeError::Transport(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(response: &'static [u8], status: TransportStatus) -> impl SendRequest {
        move |_: &[u8], resolver: &mut Resolver<'_>| {
            assert_eq!(resolver.resolve(response), ProtocolStatus::Ok);
            status
        }
    }

    #[test]
    fn test_single_resolve_yields_response() {
        let mut bridge = TransportCorrelationBridge::new(answer(b"pong", TransportStatus::Ok));
        assert_eq!(bridge.request(b"ping").unwrap(), b"pong");
        assert_eq!(bridge.exchanges(), 1);
    }

    #[test]
    fn test_request_bytes_reach_transport() {
        let mut seen = Vec::new();
        {
            let mut bridge = TransportCorrelationBridge::new(|req: &[u8], resolver: &mut Resolver<'_>| {
                seen.push(req.to_vec());
                resolver.resolve(b"ok");
                TransportStatus::Ok
            });
            bridge.request(b"first").unwrap();
            bridge.request(b"second").unwrap();
        }
        assert_eq!(seen, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_unresolved_ok_is_transport_failure() {
        let mut bridge =
            TransportCorrelationBridge::new(|_: &[u8], _: &mut Resolver<'_>| TransportStatus::Ok);
        let err = bridge.request(b"ping").unwrap_err();
        assert_eq!(err, BridgeError::NoResponse);
        assert_eq!(err.status(), TransportStatus::NoConnection);
    }

    #[test]
    fn test_second_resolve_is_rejected() {
        let mut bridge = TransportCorrelationBridge::new(|_: &[u8], resolver: &mut Resolver<'_>| {
            assert_eq!(resolver.resolve(b"one"), ProtocolStatus::Ok);
            assert_eq!(resolver.resolve(b"two"), ProtocolStatus::ResponseWithoutRequest);
            TransportStatus::Ok
        });
        assert_eq!(bridge.request(b"ping").unwrap(), b"one");
    }

    #[test]
    fn test_empty_response_is_channel_error() {
        let mut bridge = TransportCorrelationBridge::new(|_: &[u8], resolver: &mut Resolver<'_>| {
            assert_eq!(resolver.resolve(b""), ProtocolStatus::InternalChannelError);
            assert!(!resolver.is_resolved());
            TransportStatus::Ok
        });
        assert_eq!(bridge.request(b"ping").unwrap_err(), BridgeError::NoResponse);
    }

    #[test]
    fn test_failure_status_discards_response() {
        let mut bridge =
            TransportCorrelationBridge::new(answer(b"late", TransportStatus::ConnectorError));
        assert_eq!(
            bridge.request(b"ping").unwrap_err(),
            BridgeError::Transport(TransportStatus::ConnectorError)
        );
    }

    #[test]
    fn test_exit_loop() {
        let mut bridge =
            TransportCorrelationBridge::new(|_: &[u8], _: &mut Resolver<'_>| TransportStatus::ExitLoop);
        assert!(bridge.request(b"ping").unwrap_err().is_exit());
    }
}
