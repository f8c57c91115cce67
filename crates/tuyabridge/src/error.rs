//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help
//! text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use tuyabridge_config::ConfigError;
use tuyabridge_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Tuya cloud")]
    #[diagnostic(
        code(tuyabridge::connection_failed),
        help("Check network access and the configured endpoint.\nDetails: {reason}")
    )]
    ConnectionFailed { reason: String },

    #[error("Event channel disconnected")]
    #[diagnostic(code(tuyabridge::disconnected))]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(tuyabridge::auth_failed),
        help(
            "Verify access_id/access_key and the account username/password.\n\
             Smart Home projects also need the right country_code and app_schema."
        )
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(tuyabridge::not_found),
        help("Run: tuyabridge devices to see available devices")
    )]
    NotFound { identifier: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Cloud API error: {message}")]
    #[diagnostic(code(tuyabridge::api_error))]
    Api { message: String, code: Option<i64> },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Missing setting '{field}'")]
    #[diagnostic(
        code(tuyabridge::missing_setting),
        help("Set `{field}` in {path} or export TUYABRIDGE_{env}.")
    )]
    MissingSetting {
        field: String,
        env: String,
        path: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tuyabridge::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(tuyabridge::config))]
    Config(ConfigError),

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(tuyabridge::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::MissingSetting { .. } | Self::Validation { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed {
                reason: if url.is_empty() {
                    reason
                } else {
                    format!("{url}: {reason}")
                },
            },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Disconnected => Self::Disconnected,
            CoreError::DeviceNotFound { identifier } => Self::NotFound { identifier },
            CoreError::Api {
                message,
                code,
                status,
            } => Self::Api {
                message: match status {
                    Some(s) => format!("HTTP {s}: {message}"),
                    None => message,
                },
                code,
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing { field } => Self::MissingSetting {
                field: field.into(),
                env: field.to_uppercase(),
                path: tuyabridge_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => Self::Validation {
                field: field.into(),
                reason,
            },
            other => Self::Config(other),
        }
    }
}
