//! TCP connector between socket-framed sensors and the bridge.
//!
//! Each connection carries DevEUI-prefixed request frames. Every request is
//! posted to the bridge and a 2xx answer is written back as a response
//! frame. Any other answer closes the connection without a response, which
//! the sensor observes as a lost connection.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use sensor_transport::{FramingError, SocketFrameCodec};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::client::LorawanRestClient;

/// Initial receive buffer per connection.
const RECEIVE_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct Connector {
    listener: TcpListener,
    client: LorawanRestClient,
    codec: SocketFrameCodec,
}

impl Connector {
    pub async fn bind(addr: SocketAddr, client: LorawanRestClient) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            client,
            codec: SocketFrameCodec::default(),
        })
    }

    pub fn with_codec(mut self, codec: SocketFrameCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` completes.
    pub async fn run_until<S>(self, shutdown: S) -> io::Result<()>
    where
        S: Future<Output = ()>,
    {
        info!(
            "Relaying sensor connections on {} to {}",
            self.listener.local_addr()?,
            self.client.base_url()
        );
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Connector shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("Accepted sensor connection from {}", peer);
                    let client = self.client.clone();
                    let codec = self.codec;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, client, codec).await {
                            warn!("Connection from {} ended with error: {}", peer, e);
                        }
                    });
                }
            }
        }
    }

    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    client: LorawanRestClient,
    codec: SocketFrameCodec,
) -> Result<(), ConnectorError> {
    let mut buf = BytesMut::with_capacity(RECEIVE_BUFFER_SIZE);
    loop {
        while let Some((dev_eui, request)) = codec.decode_request_stream(&mut buf)? {
            debug!("Request of {} bytes from {}", request.len(), dev_eui);
            match client.post_binary_request(&request, dev_eui).await {
                Ok(response) if response.is_success() => {
                    let frame = codec.encode_response(&response.body)?;
                    stream.write_all(&frame).await?;
                }
                Ok(response) => {
                    warn!(
                        "Bridge answered {} for {}; closing connection",
                        response.status, dev_eui
                    );
                    stream.shutdown().await?;
                    return Ok(());
                }
                Err(e) => {
                    error!("Could not relay request for {}: {}", dev_eui, e);
                    stream.shutdown().await?;
                    return Ok(());
                }
            }
        }

        if stream.read_buf(&mut buf).await? == 0 {
            debug!("Sensor closed the connection");
            return Ok(());
        }
    }
}
