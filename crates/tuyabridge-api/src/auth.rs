use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// Which Tuya cloud project flavour the credentials belong to.
///
/// The two flavours authenticate differently and expose the device
/// directory under different path families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    /// Custom development project: direct user login against the vendor
    /// API (`/v1.0/iot-03/...`), SHA-256 password, refresh-token renewal.
    Custom,
    /// Smart Home PaaS project: federated login for Tuya Smart / Smart Life
    /// app accounts (`/v1.0/iot-01/...`), MD5 password, server-chosen
    /// platform URL.
    SmartHome,
}

impl ProjectType {
    /// The login endpoint path.
    pub fn login_path(self) -> &'static str {
        match self {
            Self::Custom => "/v1.0/iot-03/users/login",
            Self::SmartHome => "/v1.0/iot-01/associated-users/actions/authorized-login",
        }
    }

    /// Whether `path` is one of the endpoints used to obtain a token.
    ///
    /// Requests to these paths must never trigger a token refresh.
    pub fn is_bootstrap_path(self, path: &str) -> bool {
        match self {
            Self::Custom => path.starts_with("/v1.0/token") || path == self.login_path(),
            Self::SmartHome => path.starts_with(self.login_path()),
        }
    }

    /// Path prefix for single-device endpoints (info, functions, status,
    /// commands).
    pub fn device_prefix(self) -> &'static str {
        match self {
            Self::Custom => "/v1.0/iot-03/devices",
            Self::SmartHome => "/v1.0/devices",
        }
    }

    /// The default payload cipher version negotiated with the broker.
    pub fn default_protocol_version(self) -> crate::mq::ProtocolVersion {
        match self {
            Self::Custom => crate::mq::ProtocolVersion::V2,
            Self::SmartHome => crate::mq::ProtocolVersion::V1,
        }
    }
}

/// Account and project credentials, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_id: String,
    pub access_key: SecretString,
    pub username: String,
    pub password: SecretString,
    /// Phone country code of the account (e.g. `1`, `49`, `86`).
    pub country_code: Option<u16>,
    /// App schema for federated login: `"smartlife"` or `"tuyaSmart"`.
    pub app_schema: Option<String>,
}

// ── Regional endpoints ───────────────────────────────────────────────

/// Tuya data-center regions with a public OpenAPI endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    China,
    America,
    Europe,
    India,
}

// Phone country codes served by the EU data center.
const EUROPE_CODES: &[u16] = &[
    7, 30, 31, 32, 33, 34, 36, 39, 40, 41, 43, 44, 45, 46, 47, 48, 49, 90, 212, 213, 216, 218,
    220, 221, 222, 223, 224, 225, 226, 227, 228, 229, 230, 231, 232, 233, 234, 235, 236, 237,
    238, 239, 240, 241, 242, 243, 244, 245, 246, 248, 249, 250, 251, 252, 253, 254, 255, 256,
    257, 258, 260, 261, 262, 263, 264, 265, 266, 267, 268, 269, 290, 291, 297, 298, 299, 350,
    351, 352, 353, 354, 355, 356, 357, 358, 359, 370, 371, 372, 373, 374, 375, 376, 377, 378,
    379, 380, 381, 382, 383, 385, 386, 387, 389, 420, 421, 423, 961, 962, 963, 964, 965, 966,
    967, 968, 970, 971, 972, 973, 974, 975, 976, 977, 992, 993, 994, 995, 996, 998,
];

impl Region {
    /// Resolve the data-center region for a phone country code.
    ///
    /// Unknown codes and an absent code fall back to the Americas
    /// endpoint.
    pub fn from_country_code(code: Option<u16>) -> Self {
        match code {
            Some(86) => Self::China,
            Some(91) => Self::India,
            Some(c) if EUROPE_CODES.contains(&c) => Self::Europe,
            _ => Self::America,
        }
    }

    /// The OpenAPI base URL for this region.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::China => "https://openapi.tuyacn.com",
            Self::America => "https://openapi.tuyaus.com",
            Self::Europe => "https://openapi.tuyaeu.com",
            Self::India => "https://openapi.tuyain.com",
        }
    }

    /// The endpoint as a parsed [`Url`].
    pub fn endpoint_url(self) -> Url {
        // Endpoints are compile-time constants known to parse.
        #[allow(clippy::expect_used)]
        Url::parse(self.endpoint()).expect("static endpoint URL")
    }
}
