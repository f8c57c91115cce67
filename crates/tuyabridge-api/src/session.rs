// Token lifecycle for a single cloud session.
//
// The session is swapped atomically so signed requests can read the
// current token without locking. Renewal is serialized by `refresh_lock`;
// callers re-check freshness after acquiring it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::debug;
use url::Url;

use crate::auth::ProjectType;
use crate::error::Error;
use crate::models::TokenGrant;

/// Renew this long before the recorded expiry.
pub const REFRESH_MARGIN_MS: i64 = 60_000;

/// Authentication lifecycle, observable through [`SessionManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    Failed,
}

/// The current token set plus the base URL requests are issued against.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub uid: String,
    /// Absolute expiry in epoch milliseconds. Zero when never authenticated.
    pub expires_at_ms: i64,
    pub endpoint: Url,
}

impl Session {
    fn empty(endpoint: Url) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: String::new(),
            uid: String::new(),
            expires_at_ms: 0,
            endpoint,
        }
    }
}

/// Owns the one [`Session`] of a cloud client.
pub struct SessionManager {
    project: ProjectType,
    current: ArcSwap<Session>,
    refresh_lock: Mutex<()>,
    state: watch::Sender<AuthState>,
}

impl SessionManager {
    pub fn new(project: ProjectType, endpoint: Url) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            project,
            current: ArcSwap::from_pointee(Session::empty(endpoint)),
            refresh_lock: Mutex::new(()),
            state,
        }
    }

    pub fn project(&self) -> ProjectType {
        self.project
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Arc<Session> {
        self.current.load_full()
    }

    pub fn access_token(&self) -> String {
        self.current.load().access_token.clone()
    }

    pub fn uid(&self) -> String {
        self.current.load().uid.clone()
    }

    pub fn endpoint(&self) -> Url {
        self.current.load().endpoint.clone()
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: AuthState) {
        self.state.send_replace(state);
    }

    /// Replace the session wholesale.
    pub fn set(&self, session: Session) {
        self.current.store(Arc::new(session));
    }

    /// Whether a request to `path` at `now_ms` must renew the token first.
    pub fn needs_refresh(&self, path: &str, now_ms: i64) -> bool {
        if self.project.is_bootstrap_path(path) {
            return false;
        }
        self.current.load().expires_at_ms - REFRESH_MARGIN_MS <= now_ms
    }

    /// Serialize renewals. Hold the guard across the re-check and refresh.
    pub async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }

    /// Clear the access token ahead of a renewal attempt. Requests signed
    /// meanwhile carry an empty token.
    pub fn invalidate_access_token(&self) {
        self.current.rcu(|s| {
            let mut next = Session::clone(s);
            next.access_token.clear();
            next
        });
    }

    /// Store the result of a successful login.
    pub fn apply_login(&self, grant: &TokenGrant, now_ms: i64) -> Result<(), Error> {
        let expires_at_ms = match self.project {
            // Custom login reports `expire` and it is added unscaled.
            ProjectType::Custom => now_ms + grant.expire.unwrap_or_default(),
            ProjectType::SmartHome => now_ms + grant.expire_time.unwrap_or_default() * 1000,
        };

        let endpoint = match grant.platform_url.as_deref() {
            Some(url) if self.project == ProjectType::SmartHome && !url.is_empty() => {
                debug!(endpoint = url, "switching to server-assigned platform url");
                Url::parse(url)?
            }
            _ => self.endpoint(),
        };

        self.store_grant(grant, expires_at_ms, endpoint);
        Ok(())
    }

    /// Store the result of a successful refresh-token exchange.
    pub fn apply_refresh(&self, grant: &TokenGrant, now_ms: i64) {
        let lifetime = grant.expire.or(grant.expire_time).unwrap_or_default();
        self.store_grant(grant, now_ms + lifetime * 1000, self.endpoint());
    }

    fn store_grant(&self, grant: &TokenGrant, expires_at_ms: i64, endpoint: Url) {
        self.set(Session {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            uid: grant.uid.clone(),
            expires_at_ms,
            endpoint,
        });
        self.set_state(AuthState::Authenticated);
    }
}

/// Hash the account password the way the project's login endpoint expects:
/// lower-case hex SHA-256 for custom projects, MD5 for Smart Home.
pub fn hash_password(project: ProjectType, password: &str) -> String {
    match project {
        ProjectType::Custom => hex::encode(Sha256::digest(password.as_bytes())),
        ProjectType::SmartHome => hex::encode(Md5::digest(password.as_bytes())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manager(project: ProjectType) -> SessionManager {
        SessionManager::new(project, Url::parse("https://openapi.tuyaus.com").unwrap())
    }

    fn grant() -> TokenGrant {
        TokenGrant {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            uid: "u1".into(),
            expire: Some(7200),
            expire_time: Some(7200),
            platform_url: None,
        }
    }

    #[test]
    fn fresh_session_needs_no_refresh() {
        let m = manager(ProjectType::Custom);
        m.apply_refresh(&grant(), 1_000_000);
        let expires = m.current().expires_at_ms;
        assert_eq!(expires, 1_000_000 + 7_200_000);

        assert!(!m.needs_refresh("/v1.0/iot-03/devices", expires - REFRESH_MARGIN_MS - 1));
        assert!(m.needs_refresh("/v1.0/iot-03/devices", expires - REFRESH_MARGIN_MS));
    }

    #[test]
    fn bootstrap_paths_never_refresh() {
        let m = manager(ProjectType::Custom);
        assert!(!m.needs_refresh("/v1.0/token/rt", i64::MAX));
        assert!(m.needs_refresh("/v1.0/iot-03/devices", 0));
    }

    #[test]
    fn custom_login_adds_expire_unscaled() {
        let m = manager(ProjectType::Custom);
        m.apply_login(&grant(), 5_000).unwrap();
        assert_eq!(m.current().expires_at_ms, 5_000 + 7200);
        assert_eq!(m.state(), AuthState::Authenticated);
    }

    #[test]
    fn smart_home_login_switches_endpoint() {
        let m = manager(ProjectType::SmartHome);
        let mut g = grant();
        g.platform_url = Some("https://openapi.tuyaeu.com".into());
        m.apply_login(&g, 5_000).unwrap();

        let s = m.current();
        assert_eq!(s.endpoint.as_str(), "https://openapi.tuyaeu.com/");
        assert_eq!(s.expires_at_ms, 5_000 + 7_200_000);
        assert_eq!(s.uid, "u1");
    }

    #[test]
    fn invalidate_keeps_refresh_token() {
        let m = manager(ProjectType::Custom);
        m.apply_refresh(&grant(), 0);
        m.invalidate_access_token();
        let s = m.current();
        assert_eq!(s.access_token, "");
        assert_eq!(s.refresh_token, "rt");
    }

    #[test]
    fn password_hashes() {
        assert_eq!(
            hash_password(ProjectType::Custom, "abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hash_password(ProjectType::SmartHome, "abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }
}
