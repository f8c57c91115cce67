//! Realtime device events over the vendor MQTT broker.
//!
//! Broker credentials are short-lived and fetched through the signed cloud
//! API. [`EventChannel`] keeps a connection alive across credential
//! rotations, decrypts each inbound payload and fans decoded
//! [`ChannelEvent`]s out to registered listeners.

pub mod broker;
pub mod channel;
pub mod cipher;
pub mod event;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use broker::{
    AccessConfigSource, BrokerConnection, BrokerConnector, InboundMessage, MqttConnection,
    MqttConnector, ReconnectConfig,
};
pub use channel::{ChannelState, EventChannel, EventChannelConfig, ListenerError, ListenerId};
pub use event::{ChannelEvent, Envelope, MessageDecoder};

/// Payload cipher version negotiated when fetching broker credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// AES-128-ECB with PKCS#7 padding.
    #[serde(rename = "1.0")]
    V1,
    /// AES-128-GCM with the message timestamp as associated data.
    #[serde(rename = "2.0")]
    V2,
}

impl ProtocolVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0" | "1" => Ok(Self::V1),
            "2.0" | "2" => Ok(Self::V2),
            other => Err(format!("unknown protocol version '{other}' (expected 1.0 or 2.0)")),
        }
    }
}
