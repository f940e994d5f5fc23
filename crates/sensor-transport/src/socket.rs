//! Blocking socket transport for a sensor behind a TCP proxy.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sensor_core::{DevEui, ProtocolStatus, Resolver, SendRequest, TransportStatus};
use tracing::{debug, info, warn};

use crate::framing::{FramingError, SocketFrameCodec};

/// Cooperative stop flag shared between a host application and its transport.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next send return `ExitLoop`.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Sends each request as one frame over a persistent TCP connection.
///
/// The connection is opened on first use and dropped after any I/O failure,
/// so the next send reconnects.
pub struct SocketTransport {
    addr: SocketAddr,
    dev_eui: DevEui,
    codec: SocketFrameCodec,
    read_timeout: Option<Duration>,
    shutdown: ShutdownSignal,
    stream: Option<TcpStream>,
}

impl SocketTransport {
    pub fn new(addr: SocketAddr, dev_eui: DevEui) -> Self {
        Self {
            addr,
            dev_eui,
            codec: SocketFrameCodec::default(),
            read_timeout: None,
            shutdown: ShutdownSignal::new(),
            stream: None,
        }
    }

    /// Give up on a response after `timeout`.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_codec(mut self, codec: SocketFrameCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&mut self) -> Result<&mut TcpStream, FramingError> {
        if self.stream.is_none() {
            let stream = TcpStream::connect(self.addr)?;
            stream.set_read_timeout(self.read_timeout)?;
            stream.set_nodelay(true)?;
            info!("Connected to {}", self.addr);
            self.stream = Some(stream);
        }
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(FramingError::Io(std::io::ErrorKind::NotConnected.into())),
        }
    }

    /// Write one framed request and read its response frame.
    ///
    /// Any failure here leaves the stream in an unknown position, so the
    /// caller must drop the connection.
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, FramingError> {
        let codec = self.codec;
        let stream = self.connect()?;
        stream.write_all(frame)?;
        stream.flush()?;
        codec.read_response(stream)
    }
}

impl SendRequest for SocketTransport {
    fn send(&mut self, request: &[u8], resolver: &mut Resolver<'_>) -> TransportStatus {
        if self.shutdown.is_requested() {
            debug!("Shutdown requested, not sending");
            return TransportStatus::ExitLoop;
        }
        let frame = match self.codec.encode_request(self.dev_eui, request) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Request for {} not sent: {}", self.dev_eui, e);
                return TransportStatus::ConnectorError;
            }
        };
        debug!(
            "Sending {} bytes for {} to {}: {}",
            request.len(),
            self.dev_eui,
            self.addr,
            hex::encode(request)
        );
        match self.exchange(&frame) {
            Ok(response) if response.is_empty() => {
                warn!("Proxy answered with an empty frame");
                TransportStatus::NoConnection
            }
            Ok(response) => {
                let status = resolver.resolve(&response);
                if status != ProtocolStatus::Ok {
                    warn!("Resolver returned {} for a {} byte response", status, response.len());
                }
                TransportStatus::Ok
            }
            Err(e) => {
                warn!("Exchange with {} failed: {}", self.addr, e);
                self.stream = None;
                TransportStatus::NoConnection
            }
        }
    }
}
