// Broker message envelope and decoded event variants.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use super::{ProtocolVersion, cipher};
use crate::error::Error;
use crate::models::{AccessConfig, StatusEntry};

/// Outer JSON object of every broker message. `data` is the encrypted,
/// base64-encoded payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub protocol: Option<i64>,
    #[serde(default)]
    pub pv: Option<String>,
    pub t: u64,
    pub data: String,
    #[serde(default)]
    pub sign: Option<String>,
}

/// A decoded realtime event, discriminated by `bizCode`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// One or more status codes changed.
    Status {
        dev_id: String,
        status: Vec<StatusEntry>,
    },
    /// A device was bound to the account (`bizCode: "bindUser"`).
    Bind { dev_id: String },
    /// A device was removed (`bizCode: "delete"`).
    Delete { dev_id: String },
    /// Any other business event, passed through undecoded.
    Other {
        biz_code: Option<String>,
        payload: Value,
    },
}

impl ChannelEvent {
    /// Classify a decrypted payload.
    pub fn from_payload(payload: Value) -> Self {
        let dev_id = |v: &Value| v.get("devId").and_then(Value::as_str).map(str::to_owned);

        match payload.get("bizCode").and_then(Value::as_str) {
            Some("delete") => {
                if let Some(dev_id) = dev_id(&payload) {
                    return Self::Delete { dev_id };
                }
            }
            Some("bindUser") => {
                if let Some(dev_id) = payload.get("bizData").and_then(dev_id) {
                    return Self::Bind { dev_id };
                }
            }
            Some(_) => {}
            None => {
                let status = payload
                    .get("status")
                    .and_then(|s| Vec::<StatusEntry>::deserialize(s).ok());
                if let (Some(dev_id), Some(status)) = (dev_id(&payload), status) {
                    return Self::Status { dev_id, status };
                }
            }
        }

        Self::Other {
            biz_code: payload
                .get("bizCode")
                .and_then(Value::as_str)
                .map(str::to_owned),
            payload,
        }
    }

    /// The device this event concerns, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Status { dev_id, .. } | Self::Bind { dev_id } | Self::Delete { dev_id } => {
                Some(dev_id)
            }
            Self::Other { .. } => None,
        }
    }
}

/// Turns raw broker messages from one connection into [`ChannelEvent`]s.
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    version: ProtocolVersion,
    password: SecretString,
    topic: String,
}

impl MessageDecoder {
    pub fn new(config: &AccessConfig, version: ProtocolVersion) -> Self {
        Self {
            version,
            password: config.password.clone(),
            topic: config.source_topic.device.clone(),
        }
    }

    /// The device topic events are accepted from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Parse the envelope, decrypt `data` and classify the result.
    pub fn decode(&self, payload: &[u8]) -> Result<ChannelEvent, Error> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| Error::Decode(format!("invalid envelope: {e}")))?;
        let data = cipher::decode(
            self.version,
            &envelope.data,
            self.password.expose_secret(),
            envelope.t,
        )?;
        Ok(ChannelEvent::from_payload(data))
    }
}
