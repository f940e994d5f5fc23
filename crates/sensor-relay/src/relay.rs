//! Synchronous forwarding of one request to the bridge.
//!
//! [`ProxyRelay`] performs a single POST per request and reports the HTTP
//! result to a callback; [`relay_status`] is the callback that maps it onto
//! the transport contract. [`HttpTransport`] combines both into a
//! [`SendRequest`] for sensors that reach the bridge directly.
//!
//! These types block on their own current-thread runtime and must not be
//! used from inside an async task.

use std::fmt;
use std::time::Duration;

use sensor_core::{DevEui, ProtocolStatus, Resolver, SendRequest, SensorConfig, TransportStatus};
use tokio::runtime::{Builder, Runtime};
use tracing::warn;

use crate::client::{LorawanRestClient, RelayError};

/// Map a bridge answer onto the transport contract.
///
/// A 2xx status hands `body` to the resolver exactly once and yields `Ok`;
/// any other status yields `ConnectorError` without touching the resolver.
pub fn relay_status(status: u16, body: &[u8], resolver: &mut Resolver<'_>) -> TransportStatus {
    if !(200..300).contains(&status) {
        warn!(
            "Bridge answered with status {} ({})",
            status,
            ProtocolStatus::from_http_status(status)
        );
        return TransportStatus::ConnectorError;
    }
    let resolved = resolver.resolve(body);
    if resolved != ProtocolStatus::Ok {
        warn!("Resolver returned {} for bridge response", resolved);
    }
    TransportStatus::Ok
}

pub struct ProxyRelay {
    client: LorawanRestClient,
    runtime: Runtime,
}

impl ProxyRelay {
    pub fn new(bridge_url: impl Into<String>) -> Result<Self, RelayError> {
        Self::with_timeout(bridge_url, None)
    }

    pub fn with_timeout(
        bridge_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RelayError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RelayError::Runtime(e.to_string()))?;
        Ok(Self {
            client: LorawanRestClient::with_timeout(bridge_url, timeout)?,
            runtime,
        })
    }

    pub fn client(&self) -> &LorawanRestClient {
        &self.client
    }

    /// POST `request` for `dev_eui` and pass the HTTP status and body to `on_response`.
    ///
    /// Returns what `on_response` returns, or `NoConnection` when the bridge
    /// could not be reached and `on_response` was not called.
    pub fn post_binary_request<F>(&self, request: &[u8], dev_eui: DevEui, on_response: F) -> TransportStatus
    where
        F: FnOnce(u16, &[u8]) -> TransportStatus,
    {
        match self
            .runtime
            .block_on(self.client.post_binary_request(request, dev_eui))
        {
            Ok(response) => on_response(response.status, &response.body),
            Err(e) => {
                warn!("Could not reach bridge at {}: {}", self.client.base_url(), e);
                TransportStatus::NoConnection
            }
        }
    }
}

impl fmt::Debug for ProxyRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRelay")
            .field("bridge_url", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

/// Forward one request to the bridge at `bridge_url` and resolve its answer.
pub fn post_binary_request_to_bridge(
    request: &[u8],
    dev_eui: DevEui,
    bridge_url: &str,
    resolver: &mut Resolver<'_>,
) -> TransportStatus {
    match ProxyRelay::new(bridge_url) {
        Ok(relay) => relay.post_binary_request(request, dev_eui, |status, body| {
            relay_status(status, body, resolver)
        }),
        Err(e) => {
            warn!("Could not create relay for {}: {}", bridge_url, e);
            TransportStatus::ConnectorError
        }
    }
}

/// Transport for a sensor with direct HTTP access to the bridge.
#[derive(Debug)]
pub struct HttpTransport {
    relay: ProxyRelay,
    dev_eui: DevEui,
}

impl HttpTransport {
    pub fn new(relay: ProxyRelay, dev_eui: DevEui) -> Self {
        Self { relay, dev_eui }
    }

    /// Build from a sensor config that names both its DevEUI and the bridge.
    pub fn from_sensor_config(config: &SensorConfig, timeout: Option<Duration>) -> Result<Self, RelayError> {
        let dev_eui = config
            .dev_eui
            .ok_or_else(|| RelayError::Config("dev_eui is not set".to_string()))?;
        let bridge_url = config
            .bridge_url
            .as_deref()
            .ok_or_else(|| RelayError::Config("bridge_url is not set".to_string()))?;
        Ok(Self::new(ProxyRelay::with_timeout(bridge_url, timeout)?, dev_eui))
    }

    pub fn dev_eui(&self) -> DevEui {
        self.dev_eui
    }
}

impl SendRequest for HttpTransport {
    fn send(&mut self, request: &[u8], resolver: &mut Resolver<'_>) -> TransportStatus {
        self.relay
            .post_binary_request(request, self.dev_eui, |status, body| {
                relay_status(status, body, resolver)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_core::{BridgeError, Exchange, TransportCorrelationBridge};

    #[test]
    fn test_from_sensor_config_requires_bridge_url() {
        let mut config = SensorConfig {
            dev_eui: Some(DevEui::new(0xAB)),
            ..SensorConfig::default()
        };
        assert!(matches!(
            HttpTransport::from_sensor_config(&config, None),
            Err(RelayError::Config(_))
        ));

        config.bridge_url = Some("http://127.0.0.1:9".to_string());
        let transport = HttpTransport::from_sensor_config(&config, None).unwrap();
        assert_eq!(transport.dev_eui(), DevEui::new(0xAB));
        assert_eq!(transport.relay.client().base_url(), "http://127.0.0.1:9");
    }

    #[test]
    fn test_not_found_never_resolves() {
        let mut resolved = Vec::new();
        {
            let mut bridge =
                TransportCorrelationBridge::new(|_: &[u8], resolver: &mut Resolver<'_>| {
                    let status = relay_status(404, b"not found", resolver);
                    resolved.push(resolver.is_resolved());
                    status
                });
            assert_eq!(
                bridge.request(b"req").unwrap_err(),
                BridgeError::Transport(TransportStatus::ConnectorError)
            );
        }
        assert_eq!(resolved, vec![false]);
    }

    #[test]
    fn test_ok_resolves_body() {
        let mut bridge = TransportCorrelationBridge::new(|_: &[u8], resolver: &mut Resolver<'_>| {
            relay_status(200, b"B", resolver)
        });
        assert_eq!(bridge.request(b"req").unwrap(), b"B");
    }

    #[test]
    fn test_unreachable_bridge_is_no_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let relay = ProxyRelay::with_timeout(format!("http://{}", addr), Some(Duration::from_secs(5)))
            .unwrap();
        let mut called = false;
        let status = relay.post_binary_request(b"req", DevEui::new(1), |_, _| {
            called = true;
            TransportStatus::Ok
        });
        assert_eq!(status, TransportStatus::NoConnection);
        assert!(!called);
    }
}
