// ── Runtime bridge configuration ──
//
// Describes *how* to reach the cloud: credentials, project variant and
// connection tuning. Never touches disk; the CLI builds a `BridgeConfig`
// through `tuyabridge-config` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use tuyabridge_api::{Credentials, ProjectType, ProtocolVersion, Region, TlsMode};

/// Configuration for a single cloud session.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub credentials: Credentials,
    pub project_type: ProjectType,
    /// OpenAPI base URL. Smart Home logins may replace it with the
    /// account's regional platform URL.
    pub endpoint: Url,
    /// Value of the `lang` header.
    pub lang: String,
    pub tls: TlsMode,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Payload cipher version for the realtime channel.
    pub protocol_version: ProtocolVersion,
    /// Capacity of the queue between the channel listener and the router.
    pub event_queue: usize,
}

impl BridgeConfig {
    /// Defaults for everything but the credentials. The endpoint is
    /// derived from the account's country code.
    pub fn new(credentials: Credentials, project_type: ProjectType) -> Self {
        let region = Region::from_country_code(credentials.country_code);
        Self {
            credentials,
            project_type,
            endpoint: region.endpoint_url(),
            lang: "en".into(),
            tls: TlsMode::default(),
            timeout: Duration::from_secs(30),
            protocol_version: project_type.default_protocol_version(),
            event_queue: 256,
        }
    }

    /// Replace the endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(
            Credentials {
                access_id: String::new(),
                access_key: SecretString::from(String::new()),
                username: String::new(),
                password: SecretString::from(String::new()),
                country_code: None,
                app_schema: None,
            },
            ProjectType::Custom,
        )
    }
}
