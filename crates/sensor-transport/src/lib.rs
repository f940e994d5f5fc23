//! Transport plumbing for sensors that reach the bridge through a TCP proxy.
//!
//! The proxy stands in for a LoRaWAN network: every request is framed with
//! the sensor's DevEUI so the proxy can route it, and the proxy answers with
//! a length-prefixed response.

pub mod framing;
pub mod socket;

pub use framing::*;
pub use socket::*;
