//! Auth configuration and shared state.

use anyhow::{ensure, Result};
use std::sync::Arc;

use super::api_keys::ApiKeyManager;
use super::rate_limit::RateLimiter;
use super::sessions::SessionManager;
use super::user_store::UserStore;

const DEFAULT_COOKIE_NAME: &str = "gardisto_session";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SESSION_RENEWAL_SECONDS: i64 = 60 * 60;
const DEFAULT_KEY_SWEEP_INTERVAL_SECONDS: u64 = 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    cookie_name: String,
    session_ttl_seconds: i64,
    session_renewal_seconds: i64,
    key_sweep_interval_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_renewal_seconds: DEFAULT_SESSION_RENEWAL_SECONDS,
            key_sweep_interval_seconds: DEFAULT_KEY_SWEEP_INTERVAL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: String) -> Self {
        self.cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_renewal_seconds(mut self, seconds: i64) -> Self {
        self.session_renewal_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_key_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.key_sweep_interval_seconds = seconds;
        self
    }

    /// Reject configurations where sessions could expire between renewals.
    ///
    /// # Errors
    /// Returns an error when the renewal threshold is not strictly smaller
    /// than the TTL, or either value is non-positive.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.session_ttl_seconds > 0,
            "session TTL must be positive"
        );
        ensure!(
            self.session_renewal_seconds > 0,
            "session renewal threshold must be positive"
        );
        ensure!(
            self.session_renewal_seconds < self.session_ttl_seconds,
            "session renewal threshold must be smaller than the session TTL"
        );
        Ok(())
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_renewal_seconds(&self) -> i64 {
        self.session_renewal_seconds
    }

    #[must_use]
    pub fn key_sweep_interval_seconds(&self) -> u64 {
        self.key_sweep_interval_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    sessions: SessionManager,
    api_keys: ApiKeyManager,
    users: UserStore,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        sessions: SessionManager,
        api_keys: ApiKeyManager,
        users: UserStore,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            sessions,
            api_keys,
            users,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn api_keys(&self) -> &ApiKeyManager {
        &self.api_keys
    }

    #[must_use]
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AuthConfig, DEFAULT_COOKIE_NAME, DEFAULT_SESSION_RENEWAL_SECONDS,
        DEFAULT_SESSION_TTL_SECONDS,
    };

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://gardisto.dev".to_string());
        assert_eq!(config.cookie_name(), DEFAULT_COOKIE_NAME);
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(
            config.session_renewal_seconds(),
            DEFAULT_SESSION_RENEWAL_SECONDS
        );
        assert!(config.session_cookie_secure());

        let config = config
            .with_cookie_name("sid".to_string())
            .with_session_ttl_seconds(600)
            .with_session_renewal_seconds(60)
            .with_key_sweep_interval_seconds(30);
        assert_eq!(config.cookie_name(), "sid");
        assert_eq!(config.session_ttl_seconds(), 600);
        assert_eq!(config.session_renewal_seconds(), 60);
        assert_eq!(config.key_sweep_interval_seconds(), 30);
    }

    #[test]
    fn insecure_frontend_disables_secure_cookie() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn validate_rejects_renewal_at_or_above_ttl() {
        let config = AuthConfig::new("https://gardisto.dev".to_string())
            .with_session_ttl_seconds(3600)
            .with_session_renewal_seconds(3600);
        assert!(config.validate().is_err());

        let config = config.with_session_renewal_seconds(3599);
        assert!(config.validate().is_ok());

        let config = config.with_session_renewal_seconds(0);
        assert!(config.validate().is_err());
    }
}
