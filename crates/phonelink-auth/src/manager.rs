//! OAuth token lifecycle manager.
//!
//! Owns the cached credential, mirrors it to a [`TokenStore`], and refreshes
//! it proactively once its remaining lifetime drops to
//! [`REFRESH_THRESHOLD`]. Concurrent callers that find a stale credential
//! share a single refresh.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use phonelink_core::{AccessTokenProvider, AuthError, Clock, CredentialRecord};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::store::TokenStore;

/// Remaining lifetime at or below which a credential is refreshed.
pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// Scopes requested during authorization.
pub const REQUIRED_SCOPES: [&str; 4] = [
    "phone:read:list_call_logs",
    "phone:read:call_log",
    "phone:read:list_recordings",
    "phone:read:call_recording",
];

const DEFAULT_OAUTH_BASE_URL: &str = "https://zoom.us/oauth";
const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth application settings.
#[derive(Clone)]
pub struct OAuthConfig {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URI registered with the vendor.
    pub redirect_uri: String,
    /// Base URL hosting the `authorize` and `token` endpoints.
    pub oauth_base_url: String,
    /// Scopes requested during authorization.
    pub scopes: Vec<String>,
    /// Timeout for token endpoint requests.
    pub request_timeout: Duration,
}

impl OAuthConfig {
    /// Creates a configuration against the production OAuth host.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            scopes: REQUIRED_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            request_timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    /// Points the authorize and token endpoints at another host.
    #[must_use]
    pub fn with_oauth_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.oauth_base_url = base_url.into();
        self
    }

    /// Overrides the token request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Authorization endpoint URL.
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.oauth_base_url.trim_end_matches('/'))
    }

    /// Token endpoint URL.
    pub fn token_endpoint(&self) -> String {
        format!("{}/token", self.oauth_base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("oauth_base_url", &self.oauth_base_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Deserialize, Default)]
struct TokenErrorBody {
    reason: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl TokenErrorBody {
    fn into_reason(self, status: reqwest::StatusCode) -> String {
        self.reason
            .or(self.error_description)
            .or(self.error)
            .unwrap_or_else(|| format!("token endpoint returned HTTP {}", status.as_u16()))
    }
}

enum Grant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

impl Grant<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::AuthorizationCode(_) => "authorization_code",
            Self::RefreshToken(_) => "refresh_token",
        }
    }

    fn rejected(&self, reason: String) -> AuthError {
        match self {
            Self::AuthorizationCode(_) => AuthError::invalid_code(reason),
            Self::RefreshToken(_) => AuthError::refresh_failed(reason),
        }
    }
}

/// Token lifecycle manager.
pub struct TokenManager {
    config: OAuthConfig,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<CredentialRecord>>,
    refresh_guard: Mutex<()>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.config)
            .field("cached", &self.cached_record().is_some())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager with an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NetworkError`] if the HTTP client cannot be built.
    pub fn new(
        config: OAuthConfig,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("phonelink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            store,
            clock,
            cached: RwLock::new(None),
            refresh_guard: Mutex::new(()),
        })
    }

    /// Vendor authorization URL carrying `state` and the required scopes.
    pub fn authorization_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&scope={}",
            self.config.authorize_endpoint(),
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(&scope),
        );
        debug!(state_len = state.len(), "built authorization url");
        url
    }

    /// Exchanges an authorization code for a credential, then persists and
    /// caches it.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCode`] on vendor rejection,
    /// [`AuthError::NetworkError`] on transport failure and
    /// [`AuthError::Storage`] if the credential cannot be persisted.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<CredentialRecord, AuthError> {
        let response = self.request_token(Grant::AuthorizationCode(code)).await?;
        let record = CredentialRecord::issued(
            response.access_token,
            response.refresh_token.unwrap_or_default(),
            response.expires_in,
            self.clock.now_utc(),
        );

        self.persist(&record).await?;
        info!(expires_at = %record.expires_at, "authorization code exchanged");
        Ok(record)
    }

    /// Refreshes the current credential.
    ///
    /// Loads from the store when nothing is cached.
    ///
    /// # Errors
    ///
    /// [`AuthError::RefreshFailed`] when no refresh token is available or
    /// the vendor rejects the grant.
    #[instrument(skip_all)]
    pub async fn refresh_credential(&self) -> Result<CredentialRecord, AuthError> {
        let _guard = self.refresh_guard.lock().await;
        self.refresh_locked().await
    }

    /// Returns a valid access token, refreshing when close to expiry.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenExpired`] when no credential is stored; refresh
    /// errors are passed through.
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        let record = self
            .current_record()
            .await?
            .ok_or_else(|| AuthError::token_expired("no stored credential, authorization required"))?;

        if !record.needs_refresh(self.clock.now_utc(), REFRESH_THRESHOLD) {
            return Ok(record.access_token);
        }

        let _guard = self.refresh_guard.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(record) = self.cached_record() {
            if !record.needs_refresh(self.clock.now_utc(), REFRESH_THRESHOLD) {
                debug!("credential refreshed by concurrent caller");
                return Ok(record.access_token);
            }
        }

        debug!("credential within refresh threshold, refreshing");
        Ok(self.refresh_locked().await?.access_token)
    }

    /// True when a credential is cached and outside the refresh threshold.
    pub fn is_authenticated(&self) -> bool {
        self.cached_record()
            .is_some_and(|record| !record.needs_refresh(self.clock.now_utc(), REFRESH_THRESHOLD))
    }

    /// Remaining lifetime of the cached credential, if any.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.cached_record().map(|record| record.remaining(self.clock.now_utc()))
    }

    /// Loads the stored credential into the cache.
    ///
    /// # Errors
    ///
    /// [`AuthError::Storage`] if the store cannot be read.
    pub async fn load_credential(&self) -> Result<Option<CredentialRecord>, AuthError> {
        let record = self.store.load().await?;
        match &record {
            Some(record) => info!(expires_at = %record.expires_at, "loaded stored credential"),
            None => debug!("no stored credential"),
        }
        self.set_cached(record.clone());
        Ok(record)
    }

    /// Drops the cached credential and clears the store.
    ///
    /// Store failures are logged, not returned.
    pub async fn logout(&self) {
        self.set_cached(None);
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear token store during logout");
        }
        info!("logged out");
    }

    async fn current_record(&self) -> Result<Option<CredentialRecord>, AuthError> {
        match self.cached_record() {
            Some(record) => Ok(Some(record)),
            None => self.load_credential().await,
        }
    }

    async fn refresh_locked(&self) -> Result<CredentialRecord, AuthError> {
        let current = self
            .current_record()
            .await
            .map_err(|e| AuthError::refresh_failed(e.to_string()))?
            .filter(CredentialRecord::has_refresh_token)
            .ok_or_else(|| AuthError::refresh_failed("no refresh token available"))?;

        let response = self.request_token(Grant::RefreshToken(&current.refresh_token)).await?;
        let refresh_token = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or(current.refresh_token);
        let record = CredentialRecord::issued(
            response.access_token,
            refresh_token,
            response.expires_in,
            self.clock.now_utc(),
        );

        self.persist(&record).await?;
        info!(expires_at = %record.expires_at, "credential refreshed");
        Ok(record)
    }

    async fn request_token(&self, grant: Grant<'_>) -> Result<TokenResponse, AuthError> {
        let mut form = vec![("grant_type", grant.name())];
        match &grant {
            Grant::AuthorizationCode(code) => {
                form.push(("code", *code));
                form.push(("redirect_uri", self.config.redirect_uri.as_str()));
            },
            Grant::RefreshToken(token) => form.push(("refresh_token", *token)),
        }

        let response = self
            .http
            .post(self.config.token_endpoint())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<TokenErrorBody>().await.unwrap_or_default();
            let reason = body.into_reason(status);
            warn!(grant = grant.name(), status = status.as_u16(), reason = %reason, "token request rejected");
            return Err(grant.rejected(reason));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| grant.rejected(format!("malformed token response: {e}")))
    }

    async fn persist(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        self.store.save(record).await?;
        self.set_cached(Some(record.clone()));
        Ok(())
    }

    fn cached_record(&self) -> Option<CredentialRecord> {
        self.cached.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_cached(&self, record: Option<CredentialRecord>) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = record;
    }
}

#[async_trait]
impl AccessTokenProvider for TokenManager {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.get_access_token().await
    }
}

#[cfg(test)]
mod tests {
    use phonelink_core::TestClock;

    use super::*;
    use crate::store::InMemoryTokenStore;

    fn manager(store: Arc<InMemoryTokenStore>, clock: TestClock) -> TokenManager {
        let config = OAuthConfig::new("client id", "secret", "http://localhost:3000/oauth/callback")
            .with_oauth_base_url("http://127.0.0.1:9/oauth/");
        TokenManager::new(config, store, Arc::new(clock)).expect("manager")
    }

    #[test]
    fn endpoints_strip_trailing_slash() {
        let config = OAuthConfig::new("id", "secret", "http://cb").with_oauth_base_url("http://h/oauth/");

        assert_eq!(config.authorize_endpoint(), "http://h/oauth/authorize");
        assert_eq!(config.token_endpoint(), "http://h/oauth/token");
    }

    #[test]
    fn authorization_url_encodes_parameters() {
        let manager = manager(Arc::new(InMemoryTokenStore::new()), TestClock::new());
        let url = manager.authorization_url("st ate");

        assert!(url.starts_with("http://127.0.0.1:9/oauth/authorize?response_type=code"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Foauth%2Fcallback"));
        assert!(url.contains("state=st%20ate"));
        assert!(url.contains(
            "scope=phone%3Aread%3Alist_call_logs%20phone%3Aread%3Acall_log%20\
             phone%3Aread%3Alist_recordings%20phone%3Aread%3Acall_recording"
        ));
    }

    #[test]
    fn debug_hides_client_secret() {
        let config = OAuthConfig::new("id", "top-secret", "http://cb");

        assert!(!format!("{config:?}").contains("top-secret"));
    }

    #[tokio::test]
    async fn no_stored_credential_means_token_expired() {
        let manager = manager(Arc::new(InMemoryTokenStore::new()), TestClock::new());

        let err = manager.get_access_token().await.expect_err("should fail");

        assert!(matches!(err, AuthError::TokenExpired { .. }));
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let clock = TestClock::new();
        let record = CredentialRecord::issued("AT", "", 60, clock.now_utc());
        let manager = manager(Arc::new(InMemoryTokenStore::with_record(record)), clock);

        let err = manager.refresh_credential().await.expect_err("should fail");

        assert!(matches!(err, AuthError::RefreshFailed { .. }));
    }

    #[tokio::test]
    async fn is_authenticated_tracks_threshold() {
        let clock = TestClock::new();
        let record = CredentialRecord::issued("AT", "RT", 3600, clock.now_utc());
        let manager = manager(Arc::new(InMemoryTokenStore::with_record(record)), clock.clone());

        manager.load_credential().await.expect("load");
        assert!(manager.is_authenticated());
        assert_eq!(manager.time_until_expiry(), Some(Duration::from_secs(3600)));

        clock.advance(Duration::from_secs(45 * 60));
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn logout_clears_cache_and_store() {
        let clock = TestClock::new();
        let store = Arc::new(InMemoryTokenStore::with_record(CredentialRecord::issued(
            "AT",
            "RT",
            3600,
            clock.now_utc(),
        )));
        let manager = manager(store.clone(), clock);
        manager.load_credential().await.expect("load");

        manager.logout().await;

        assert!(!manager.is_authenticated());
        assert!(manager.time_until_expiry().is_none());
        assert!(store.load().await.expect("load").is_none());
    }
}
