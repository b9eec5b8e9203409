// Message module — inbound payload types, decoding and routing

pub mod codec;
pub mod router;

pub use codec::{decode_text, decode_token, DecodeError, MAX_PAYLOAD_SIZE};
pub use router::{MessageRouter, RouteError};

use serde::Serialize;
use std::fmt;

/// Device identifier used when a write carries no `device` option
pub const UNKNOWN_DEVICE: &str = "unknown-device";

/// Where a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A GATT WriteValue on a characteristic
    GattWrite,
    /// Manufacturer data seen during a passive scan
    AdvertisementScan,
}

/// Payload shape depends on the origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Payload {
    /// Text decoded from a write
    Text(String),
    /// Opaque token decoded from manufacturer data
    Token(u32),
}

impl Payload {
    pub fn origin(&self) -> Origin {
        match self {
            Payload::Text(_) => Origin::GattWrite,
            Payload::Token(_) => Origin::AdvertisementScan,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "{}", text),
            Payload::Token(token) => write!(f, "0x{:08X}", token),
        }
    }
}

/// A routed (device, payload) event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    pub device: String,
    pub payload: Payload,
    /// Verdict of the identity check, when one ran
    pub verified: Option<bool>,
}
