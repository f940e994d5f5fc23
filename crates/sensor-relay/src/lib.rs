//! Relay between sensors and the bridge's LoRaWAN REST endpoint.
//!
//! - [`ProxyRelay`] forwards one opaque request and reports the HTTP result
//! - [`HttpTransport`] lets a sensor with IP access use the relay as its transport
//! - [`Connector`] accepts socket-framed sensor connections and relays each request

pub mod client;
pub mod config;
pub mod connector;
pub mod relay;

pub use client::{LorawanRestClient, RelayError, RelayResponse, BINARY_REQUEST_PATH};
pub use config::{ConfigError, RelayConfig};
pub use connector::{Connector, ConnectorError};
pub use relay::{post_binary_request_to_bridge, relay_status, HttpTransport, ProxyRelay};
