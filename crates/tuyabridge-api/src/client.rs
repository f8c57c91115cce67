// Signed HTTP client for the Tuya OpenAPI.
//
// Every call goes through `request`, which renews the token when needed,
// signs the request and decodes the `{ success, result, ... }` envelope.
// `success: false` is returned to the caller, never raised here.

use indexmap::IndexMap;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{Credentials, ProjectType};
use crate::error::Error;
use crate::models::{ApiResponse, TokenGrant};
use crate::session::{AuthState, SessionManager, hash_password};
use crate::sign::Signer;
use crate::transport::TransportConfig;

const DEV_LANG: &str = "rust";
const DEV_CHANNEL: &str = "tuyabridge";
const DEV_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Query parameters, signed and sent in insertion order.
pub type Query = IndexMap<String, String>;

/// Build a [`Query`] from string pairs.
pub fn query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Query
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Async client for the Tuya OpenAPI.
///
/// Owns exactly one [`SessionManager`]. Share it behind an `Arc`.
pub struct CloudClient {
    http: reqwest::Client,
    signer: Signer,
    session: SessionManager,
    credentials: Credentials,
    lang: String,
}

impl CloudClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client against `endpoint` using the given transport settings.
    pub fn new(
        credentials: Credentials,
        project: ProjectType,
        endpoint: Url,
        lang: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::from_reqwest(credentials, project, endpoint, lang, http))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(
        credentials: Credentials,
        project: ProjectType,
        endpoint: Url,
        lang: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let signer = Signer::new(
            credentials.access_id.clone(),
            credentials.access_key.clone(),
        );
        Self {
            http,
            signer,
            session: SessionManager::new(project, endpoint),
            credentials,
            lang: lang.into(),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn project(&self) -> ProjectType {
        self.session.project()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Log in with the configured account and store the token set.
    ///
    /// On failure the session is left as it was and
    /// [`Error::Authentication`] is returned.
    pub async fn login(&self) -> Result<(), Error> {
        let _guard = self.session.lock_refresh().await;
        self.login_locked().await
    }

    /// Renew the token if a request to `path` needs it.
    ///
    /// Concurrent callers that observe the same expiry trigger a single
    /// renewal: the freshness check is repeated under the refresh lock.
    pub async fn ensure_fresh(&self, path: &str) -> Result<(), Error> {
        if !self.session.needs_refresh(path, now_ms()) {
            return Ok(());
        }

        let _guard = self.session.lock_refresh().await;
        if !self.session.needs_refresh(path, now_ms()) {
            return Ok(());
        }

        self.session.invalidate_access_token();
        let refresh_token = self.session.current().refresh_token.clone();
        match self.project() {
            ProjectType::Custom if !refresh_token.is_empty() => {
                self.refresh_locked(&refresh_token).await
            }
            _ => self.login_locked().await,
        }
    }

    async fn login_locked(&self) -> Result<(), Error> {
        let project = self.project();
        self.session.set_state(AuthState::Authenticating);
        info!(?project, username = %self.credentials.username, "logging in");

        let password = hash_password(project, self.credentials.password.expose_secret());
        let body = match project {
            ProjectType::Custom => json!({
                "username": self.credentials.username,
                "password": password,
            }),
            ProjectType::SmartHome => json!({
                "country_code": self.credentials.country_code,
                "username": self.credentials.username,
                "password": password,
                "schema": self.credentials.app_schema,
            }),
        };

        let result = async {
            let grant: TokenGrant = self
                .send_signed(Method::POST, project.login_path(), None, Some(&body))
                .await?
                .ensure_success()?
                .result_as()?;
            self.session.apply_login(&grant, now_ms())
        }
        .await;

        result.map_err(|e| {
            self.session.set_state(AuthState::Failed);
            warn!(error = %e, "login failed");
            auth_error(e)
        })
    }

    async fn refresh_locked(&self, refresh_token: &str) -> Result<(), Error> {
        self.session.set_state(AuthState::Refreshing);
        debug!("refreshing access token");

        let result = async {
            let path = format!("/v1.0/token/{refresh_token}");
            let grant: TokenGrant = self
                .send_signed(Method::GET, &path, None, None)
                .await?
                .ensure_success()?
                .result_as()?;
            self.session.apply_refresh(&grant, now_ms());
            Ok::<_, Error>(())
        }
        .await;

        result.map_err(|e| {
            self.session.set_state(AuthState::Failed);
            warn!(error = %e, "token refresh failed");
            auth_error(e)
        })
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Issue a signed request and return the decoded envelope.
    ///
    /// Non-2xx statuses become [`Error::Http`]; a `success: false` body is
    /// returned as-is.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&Query>,
        body: Option<&Value>,
    ) -> Result<ApiResponse, Error> {
        self.ensure_fresh(path).await?;
        self.send_signed(method, path, query, body).await
    }

    /// Sign and send without touching the token. Used by login and
    /// refresh themselves.
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        query: Option<&Query>,
        body: Option<&Value>,
    ) -> Result<ApiResponse, Error> {
        let session = self.session.current();
        let body = body.map(serde_json::to_string).transpose().map_err(|e| {
            Error::Deserialization {
                message: format!("failed to encode request body: {e}"),
                body: String::new(),
            }
        })?;
        let timestamp = now_ms();
        let signature = self.signer.sign(
            method.as_str(),
            path,
            query,
            body.as_deref(),
            &session.access_token,
            timestamp,
        );

        let url = session.endpoint.join(path)?;
        debug!(%method, path, "cloud request");

        let mut headers = HeaderMap::new();
        headers.insert("t", header_value(&timestamp.to_string())?);
        headers.insert("client_id", header_value(self.signer.access_id())?);
        headers.insert("nonce", header_value(self.signer.nonce())?);
        headers.insert("signature-headers", HeaderValue::from_static("client_id"));
        headers.insert("sign", header_value(&signature.sign)?);
        headers.insert("sign_method", HeaderValue::from_static("HMAC-SHA256"));
        let mut token = header_value(&session.access_token)?;
        token.set_sensitive(true);
        headers.insert("access_token", token);
        headers.insert("lang", header_value(&self.lang)?);
        headers.insert("dev_lang", HeaderValue::from_static(DEV_LANG));
        headers.insert("dev_channel", HeaderValue::from_static(DEV_CHANNEL));
        headers.insert("devversion", HeaderValue::from_static(DEV_VERSION));

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(q) = query {
            builder = builder.query(&q.iter().collect::<Vec<_>>());
        }
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        let resp = builder.send().await?;
        handle_response(resp).await
    }

    pub async fn get(&self, path: &str, query: Option<&Query>) -> Result<ApiResponse, Error> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse, Error> {
        self.request(Method::POST, path, None, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, Error> {
        self.request(Method::DELETE, path, None, None).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response(resp: reqwest::Response) -> Result<ApiResponse, Error> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body,
        }
    })
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::Authentication {
        message: format!("invalid header value: {e}"),
    })
}

fn auth_error(e: Error) -> Error {
    match e {
        Error::Authentication { .. } => e,
        other => Error::Authentication {
            message: other.to_string(),
        },
    }
}
