use thiserror::Error;

/// Top-level error type for the `tuyabridge-api` crate.
///
/// Grouped by failure kind: authentication, transport, application,
/// broker payload decoding, and broker connection. `tuyabridge-core`
/// maps these into domain-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login or token refresh failed (rejected credentials, HTTP failure
    /// on the auth endpoint, or a `success: false` auth response).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx HTTP status from the cloud API.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be constructed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Application ─────────────────────────────────────────────────
    /// `{ "success": false }` envelope, raised only on paths that check it.
    #[error("Cloud API error: {message}")]
    Api { code: Option<i64>, message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Event channel ───────────────────────────────────────────────
    /// A broker payload could not be decrypted or parsed.
    #[error("Message decode failed: {0}")]
    Decode(String),

    /// Fetching broker connection parameters failed. Stops the channel.
    #[error("Broker access config fetch failed: {message}")]
    ConfigFetch { message: String },

    /// Connecting to or talking with the MQTT broker failed.
    #[error("Broker connection failed: {0}")]
    Broker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_renders_message() {
        let err = Error::Api {
            code: Some(1106),
            message: "permission deny (code 1106)".into(),
        };
        assert_eq!(err.to_string(), "Cloud API error: permission deny (code 1106)");
    }
}
