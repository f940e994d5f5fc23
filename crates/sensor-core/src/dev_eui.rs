//! Device identifier used to route requests to the right sensor session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Width of the identifier on the wire.
pub const DEV_EUI_LEN_BYTES: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid DevEUI {0:?}: expected up to 16 hex digits")]
pub struct ParseDevEuiError(pub String);

/// 64-bit LoRaWAN device EUI.
///
/// Displays as upper-case hex without leading zeros, the form the bridge
/// expects in its `deveui` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevEui(u64);

impl DevEui {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(self) -> [u8; DEV_EUI_LEN_BYTES] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; DEV_EUI_LEN_BYTES]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl From<u64> for DevEui {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DevEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

impl FromStr for DevEui {
    type Err = ParseDevEuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        if digits.is_empty() || digits.len() > 16 {
            return Err(ParseDevEuiError(s.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| ParseDevEuiError(s.to_string()))
    }
}

impl Serialize for DevEui {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DevEui {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
