// Tuya OpenAPI response types
//
// Every endpoint wraps its payload in the `{ success, result, code, msg, t }`
// envelope. Device payloads differ slightly between the two project flavours,
// so fields default liberally and unknown keys land in `extra`.

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── Response Envelope ────────────────────────────────────────────────

/// Standard Tuya OpenAPI response envelope.
///
/// ```json
/// { "success": true, "result": { ... }, "t": 1700000000000 }
/// { "success": false, "code": 1010, "msg": "token invalid", "t": 1700000000000 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,
}

impl<T> ApiResponse<T> {
    /// Convert `success: false` into [`Error::Api`], otherwise pass through.
    pub fn ensure_success(self) -> Result<Self, Error> {
        if self.success {
            Ok(self)
        } else {
            Err(self.api_error())
        }
    }

    /// The application error described by this envelope.
    pub fn api_error(&self) -> Error {
        let msg = self.msg.as_deref().unwrap_or("request failed");
        let message = match self.code {
            Some(code) => format!("{msg} (code {code})"),
            None => msg.to_owned(),
        };
        Error::Api {
            code: self.code,
            message,
        }
    }
}

impl ApiResponse<Value> {
    /// Decode `result` into `T` without consulting `success`.
    ///
    /// A missing or `null` result on a failed envelope surfaces as the
    /// envelope's own [`Error::Api`]; a shape mismatch as
    /// [`Error::Deserialization`].
    pub fn result_as<T: DeserializeOwned>(self) -> Result<T, Error> {
        let result = match self.result {
            Some(Value::Null) | None => return Err(self.api_error()),
            Some(v) => v,
        };
        T::deserialize(&result).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: result.to_string(),
        })
    }
}

// ── Tokens ───────────────────────────────────────────────────────────

/// Token set returned by login and refresh.
///
/// Custom projects report lifetime in `expire`, Smart Home projects in
/// `expire_time`. Both are seconds, except the custom login response,
/// whose `expire` is added to the clock as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub expire: Option<i64>,
    #[serde(default)]
    pub expire_time: Option<i64>,
    /// Regional base URL chosen by the server (Smart Home login only).
    #[serde(default)]
    pub platform_url: Option<String>,
}

// ── Device ───────────────────────────────────────────────────────────

/// A single device as reported by the directory endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub functions: Vec<DeviceFunction>,
    #[serde(default)]
    pub status: Vec<StatusEntry>,
    /// Catch-all for undocumented fields (product id, icon, uuid, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One entry of a device's control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFunction {
    pub code: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    /// JSON-encoded constraints, e.g. `{"min":10,"max":1000,"scale":0,"step":1}`.
    #[serde(default)]
    pub values: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// A `(code, value)` status pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub value: StatusValue,
}

/// A status value. Booleans, numbers and strings are typed; anything else
/// is carried as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Other(Value),
}

impl Default for StatusValue {
    fn default() -> Self {
        Self::Other(Value::Null)
    }
}

impl From<StatusValue> for Value {
    fn from(v: StatusValue) -> Self {
        match v {
            StatusValue::Bool(b) => Value::Bool(b),
            StatusValue::Number(n) => Value::Number(n),
            StatusValue::String(s) => Value::String(s),
            StatusValue::Other(v) => v,
        }
    }
}

impl From<Value> for StatusValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for StatusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Control surface of a single device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceFunctions {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub functions: Vec<DeviceFunction>,
}

/// Batched function lookup entry (Smart Home projects). Devices sharing a
/// product are grouped under one entry.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchFunctions {
    #[serde(default)]
    pub devices: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub functions: Vec<DeviceFunction>,
}

/// Batched status lookup entry (custom projects).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchStatus {
    pub id: String,
    #[serde(default)]
    pub status: Vec<StatusEntry>,
}

// ── Event channel ────────────────────────────────────────────────────

/// Broker connection parameters from `open-hub/access-config`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    pub url: String,
    pub client_id: String,
    pub username: String,
    #[serde(deserialize_with = "secret")]
    pub password: SecretString,
    /// Lifetime of these credentials in seconds.
    pub expire_time: u64,
    pub source_topic: Topics,
    #[serde(default)]
    pub sink_topic: Option<Topics>,
}

fn secret<'de, D: Deserializer<'de>>(d: D) -> Result<SecretString, D::Error> {
    String::deserialize(d).map(SecretString::from)
}

/// Topic names keyed by channel kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Topics {
    #[serde(default)]
    pub device: String,
}
