//! Client for the bridge's LoRaWAN REST endpoint.

use std::time::Duration;

use bytes::Bytes;
use sensor_core::DevEui;
use tracing::debug;

/// Fixed path of the binary request endpoint.
pub const BINARY_REQUEST_PATH: &str = "/lorawan-rest/binary_request";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("http error: {0}")]
    Http(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("config error: {0}")]
    Config(String),
}

/// Status and body returned by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RelayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone)]
pub struct LorawanRestClient {
    base_url: String,
    client: reqwest::Client,
}

impl LorawanRestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RelayError> {
        Self::with_timeout(base_url, None)
    }

    /// Client whose requests fail after `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| RelayError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn binary_request_url(&self, dev_eui: DevEui) -> String {
        format!("{}{}?deveui={}", self.base_url, BINARY_REQUEST_PATH, dev_eui)
    }

    /// POST the opaque request bytes on behalf of `dev_eui`.
    ///
    /// Any HTTP status is returned as a response; only failing to get one is an error.
    pub async fn post_binary_request(
        &self,
        request: &[u8],
        dev_eui: DevEui,
    ) -> Result<RelayResponse, RelayError> {
        let url = self.binary_request_url(dev_eui);
        debug!("POST {} ({} bytes)", url, request.len());
        let resp = self
            .client
            .post(url)
            .body(request.to_vec())
            .send()
            .await
            .map_err(|e| RelayError::Http(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| RelayError::Http(e.to_string()))?;
        debug!("Bridge answered {} with {} bytes", status, body.len());
        Ok(RelayResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_request_url() {
        let client = LorawanRestClient::new("http://bridge.local:50000/").unwrap();
        assert_eq!(
            client.binary_request_url(DevEui::new(0x00C0_FFEE)),
            "http://bridge.local:50000/lorawan-rest/binary_request?deveui=C0FFEE"
        );
    }

    #[test]
    fn test_success_range() {
        let response = |status| RelayResponse {
            status,
            body: Bytes::new(),
        };
        assert!(response(200).is_success());
        assert!(response(299).is_success());
        assert!(!response(300).is_success());
        assert!(!response(404).is_success());
        assert!(!response(199).is_success());
    }
}
