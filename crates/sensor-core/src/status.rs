//! Status taxonomies shared between the engine, the bridge and transports.
//!
//! Two independent sets of codes exist: [`TransportStatus`] is returned by a
//! transport's send function, [`ProtocolStatus`] is returned to a transport
//! when it hands a response back through the resolver. Both carry stable
//! integer codes so they can cross a foreign-function boundary unchanged.

use std::fmt;

// ============================================================================
// Transport status
// ============================================================================

/// Result of a single send through a transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportStatus {
    /// The request was delivered and a response was handed to the resolver.
    Ok,
    /// No response is obtainable (link down, peer gone).
    NoConnection,
    /// An intermediary answered but refused or failed the request.
    ConnectorError,
    /// Cooperative shutdown request. Not a failure.
    ExitLoop,
}

impl TransportStatus {
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 1,
            Self::NoConnection => -1,
            Self::ConnectorError => -2,
            Self::ExitLoop => -100,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Ok),
            -1 => Some(Self::NoConnection),
            -2 => Some(Self::ConnectorError),
            -100 => Some(Self::ExitLoop),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoConnection => "NO_CONNECTION",
            Self::ConnectorError => "CONNECTOR_ERROR",
            Self::ExitLoop => "EXIT_LOOP",
        }
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for TransportStatus {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

impl From<TransportStatus> for i32 {
    fn from(status: TransportStatus) -> Self {
        status.code()
    }
}

// ============================================================================
// Protocol status
// ============================================================================

/// Status the resolver returns to the transport after a response was handed in.
///
/// Transports may log it but must not reinterpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolStatus {
    Ok,
    UnknownError,
    InternalFault,
    NodeUnavailable,
    BridgeUnavailable,
    /// A response arrived with no outstanding correlated request.
    ResponseWithoutRequest,
    InternalChannelError,
}

impl ProtocolStatus {
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 1,
            Self::UnknownError => -1,
            Self::InternalFault => -2,
            Self::NodeUnavailable => -3,
            Self::BridgeUnavailable => -4,
            Self::ResponseWithoutRequest => -5,
            Self::InternalChannelError => -6,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Ok),
            -1 => Some(Self::UnknownError),
            -2 => Some(Self::InternalFault),
            -3 => Some(Self::NodeUnavailable),
            -4 => Some(Self::BridgeUnavailable),
            -5 => Some(Self::ResponseWithoutRequest),
            -6 => Some(Self::InternalChannelError),
            _ => None,
        }
    }

    /// Classify an HTTP status reported by the bridge.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Ok,
            503 => Self::BridgeUnavailable,
            502 | 504 => Self::NodeUnavailable,
            500 => Self::InternalFault,
            _ => Self::UnknownError,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::UnknownError => "UNKNOWN",
            Self::InternalFault => "INTERNAL_PANIC",
            Self::NodeUnavailable => "NODE_NOT_AVAILABLE",
            Self::BridgeUnavailable => "BRIDGE_NOT_AVAILABLE",
            Self::ResponseWithoutRequest => "RESPONSE_RESOLVED_WITHOUT_REQUEST",
            Self::InternalChannelError => "RESPONSE_INTERNAL_CHANNEL_ERR",
        }
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for ProtocolStatus {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

impl From<ProtocolStatus> for i32 {
    fn from(status: ProtocolStatus) -> Self {
        status.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_codes_are_stable() {
        assert_eq!(TransportStatus::Ok.code(), 1);
        assert_eq!(TransportStatus::NoConnection.code(), -1);
        assert_eq!(TransportStatus::ConnectorError.code(), -2);
        assert_eq!(TransportStatus::ExitLoop.code(), -100);
        assert_eq!(TransportStatus::try_from(-100), Ok(TransportStatus::ExitLoop));
        assert_eq!(TransportStatus::try_from(7), Err(7));
    }

    #[test]
    fn test_protocol_codes_are_stable() {
        for code in -6..=1 {
            if code == 0 {
                assert!(ProtocolStatus::from_code(code).is_none());
                continue;
            }
            let status = ProtocolStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn test_http_classification() {
        assert_eq!(ProtocolStatus::from_http_status(200), ProtocolStatus::Ok);
        assert_eq!(ProtocolStatus::from_http_status(204), ProtocolStatus::Ok);
        assert_eq!(ProtocolStatus::from_http_status(503), ProtocolStatus::BridgeUnavailable);
        assert_eq!(ProtocolStatus::from_http_status(504), ProtocolStatus::NodeUnavailable);
        assert_eq!(ProtocolStatus::from_http_status(404), ProtocolStatus::UnknownError);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(TransportStatus::NoConnection.to_string(), "NO_CONNECTION");
        assert_eq!(
            ProtocolStatus::ResponseWithoutRequest.to_string(),
            "RESPONSE_RESOLVED_WITHOUT_REQUEST"
        );
    }
}
