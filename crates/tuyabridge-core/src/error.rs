// ── Core error types ──
//
// User-facing errors from tuyabridge-core. Consumers never see HTTP
// bodies or cipher failures directly; the `From<tuyabridge_api::Error>`
// impl translates them into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the cloud at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Bridge is not connected")]
    Disconnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// Application error code from a `success: false` envelope.
        code: Option<i64>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tuyabridge_api::Error> for CoreError {
    fn from(err: tuyabridge_api::Error) -> Self {
        use tuyabridge_api::Error as E;

        match err {
            E::Authentication { message } => CoreError::AuthenticationFailed { message },
            E::Transport(ref e) => {
                if e.is_connect() || e.is_timeout() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            E::Http { status, body } => CoreError::Api {
                message: body,
                code: None,
                status: Some(status),
            },
            E::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            E::Tls(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {reason}"),
            },
            E::Api { code, message } => CoreError::Api {
                message,
                code,
                status: None,
            },
            E::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            E::Decode(message) => CoreError::Internal(format!("Message decode failed: {message}")),
            E::ConfigFetch { message } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("broker access config: {message}"),
            },
            E::Broker(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("broker: {reason}"),
            },
        }
    }
}
