//! Configuration for the tuyabridge CLI.
//!
//! Layered with `figment`: built-in defaults, then a TOML file (platform
//! config dir or an explicit path), then `TUYABRIDGE_*` environment
//! variables. [`Config::to_bridge_config`] validates the result and
//! produces the runtime `tuyabridge_core::BridgeConfig`. Nothing here
//! writes credentials back to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use tuyabridge_core::{BridgeConfig, Credentials, ProjectType, ProtocolVersion, TlsMode};

const ENV_PREFIX: &str = "TUYABRIDGE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting '{field}'")]
    Missing { field: &'static str },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config struct ───────────────────────────────────────────────────

/// Flat configuration as read from TOML and the environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default, deserialize_with = "de::opt_text")]
    pub access_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_text", skip_serializing)]
    pub access_key: Option<String>,

    #[serde(default, deserialize_with = "de::opt_text")]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "de::opt_text", skip_serializing)]
    pub password: Option<String>,

    /// Account country code; selects the regional endpoint and is sent
    /// with Smart Home logins.
    pub country_code: Option<u16>,

    /// App schema for Smart Home projects (e.g. `smartlife`, `tuyaSmart`).
    pub app_schema: Option<String>,

    #[serde(default = "default_project_type")]
    pub project_type: ProjectType,

    /// Override the OpenAPI endpoint derived from `country_code`.
    pub endpoint: Option<String>,

    #[serde(default = "default_lang")]
    pub lang: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// `1.0` or `2.0`. Defaults by project type.
    #[serde(default, deserialize_with = "de::opt_protocol_version")]
    pub protocol_version: Option<ProtocolVersion>,

    /// Extra CA certificate (PEM) for intercepting proxies.
    pub ca_cert: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_id: None,
            access_key: None,
            username: None,
            password: None,
            country_code: None,
            app_schema: None,
            project_type: default_project_type(),
            endpoint: None,
            lang: default_lang(),
            timeout: default_timeout(),
            protocol_version: None,
            ca_cert: None,
        }
    }
}

fn default_project_type() -> ProjectType {
    ProjectType::Custom
}
fn default_lang() -> String {
    "en".into()
}
fn default_timeout() -> u64 {
    30
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "tuyabridge", "tuyabridge").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("tuyabridge");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults merged with the TOML file at `path`. A missing file is
/// treated as empty.
pub fn file_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
}

/// Load from `explicit` (which must exist) or the default path, then
/// apply `TUYABRIDGE_*` environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let config = file_figment(&path)
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()?;
    Ok(config)
}

// ── Translation to runtime config ───────────────────────────────────

impl Config {
    /// Validate and build the core runtime configuration.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let credentials = Credentials {
            access_id: required(self.access_id.as_ref(), "access_id")?.clone(),
            access_key: SecretString::from(required(self.access_key.as_ref(), "access_key")?.clone()),
            username: required(self.username.as_ref(), "username")?.clone(),
            password: SecretString::from(required(self.password.as_ref(), "password")?.clone()),
            country_code: self.country_code,
            app_schema: self.app_schema.clone(),
        };

        if self.project_type == ProjectType::SmartHome {
            if self.country_code.is_none() {
                return Err(ConfigError::Validation {
                    field: "country_code",
                    reason: "required for smart_home projects".into(),
                });
            }
            required(self.app_schema.as_ref(), "app_schema")?;
        }
        if self.timeout == 0 {
            return Err(ConfigError::Validation {
                field: "timeout",
                reason: "must be at least 1 second".into(),
            });
        }

        let mut config = BridgeConfig::new(credentials, self.project_type);
        if let Some(ref raw) = self.endpoint {
            let url = url::Url::parse(raw).map_err(|e| ConfigError::Validation {
                field: "endpoint",
                reason: format!("invalid URL '{raw}': {e}"),
            })?;
            config = config.with_endpoint(url);
        }
        if let Some(version) = self.protocol_version {
            config.protocol_version = version;
        }
        if let Some(ref ca) = self.ca_cert {
            config.tls = TlsMode::CustomCa(ca.clone());
        }
        config.lang.clone_from(&self.lang);
        config.timeout = Duration::from_secs(self.timeout);
        Ok(config)
    }
}

fn required<'a>(value: Option<&'a String>, field: &'static str) -> Result<&'a String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { field })
}

// ── Lenient deserializers ───────────────────────────────────────────
//
// Environment values are typed by content, so `TUYABRIDGE_PASSWORD=1234`
// arrives as a number and `TUYABRIDGE_PROTOCOL_VERSION=2.0` as a float.

mod de {
    use super::{Deserialize, Deserializer, ProtocolVersion};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
    }

    impl Scalar {
        fn into_text(self) -> String {
            match self {
                Self::Text(s) => s,
                Self::Int(n) => n.to_string(),
                Self::Float(f) => f.to_string(),
            }
        }
    }

    pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_text))
    }

    pub fn opt_protocol_version<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<ProtocolVersion>, D::Error> {
        let Some(raw) = Option::<Scalar>::deserialize(d)? else {
            return Ok(None);
        };
        let text = match raw {
            // 2.0 renders as "2"
            Scalar::Float(f) => format!("{f:.1}"),
            other => other.into_text(),
        };
        text.parse().map(Some).map_err(serde::de::Error::custom)
    }
}
