//! REST client with bounded retry and classified errors.
//!
//! Every request runs through the same loop: send, return on success,
//! otherwise wait and retry while the [`RetryPolicy`] allows it, and finally
//! classify the failure into an [`ApiError`]. Waits go through the injected
//! [`Clock`] so tests never sleep on the wall clock.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use bytes::Bytes;
use phonelink_core::{ApiError, Clock};
use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    Method, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::{classify::extract_retry_after_seconds, classify_response, RetryPolicy};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL prefixed to every request path.
    pub base_url: String,
    /// Per-request timeout for regular calls.
    pub request_timeout: Duration,
    /// Per-request timeout for binary downloads.
    pub download_timeout: Duration,
    /// Retry policy applied to every call.
    pub retry_policy: RetryPolicy,
    /// User agent header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.zoom.us/v2".to_string(),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(300),
            retry_policy: RetryPolicy::default(),
            user_agent: concat!("phonelink/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Default configuration against `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Overrides the configured timeout for this call.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sets the timeout for this call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Binary response body.
#[derive(Debug, Clone)]
pub struct Download {
    /// Raw bytes.
    pub bytes: Bytes,
    /// Content type reported by the server.
    pub content_type: Option<String>,
}

/// Vendor REST client.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    auth_token: RwLock<Option<String>>,
}

impl ApiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NetworkError`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ApiError::network("failed to build HTTP client", Some(e.to_string())))?;

        Ok(Self { http, config, clock, auth_token: RwLock::new(None) })
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sets the bearer token used on subsequent calls.
    pub fn set_auth_token(&self, token: impl Into<String>) {
        *self.auth_token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Removes the bearer token.
    pub fn clear_auth_token(&self) {
        *self.auth_token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// True when a bearer token is set.
    pub fn has_auth_token(&self) -> bool {
        self.auth_token.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Issues a GET and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns the classified failure once retries are exhausted.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(Method::GET, path, None, options, self.config.request_timeout)
            .await?;
        decode_json(response, path).await
    }

    /// Issues a POST with a JSON body and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] if `body` cannot be encoded, or the
    /// classified failure once retries are exhausted.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let encoded = serde_json::to_vec(body)
            .map(Bytes::from)
            .map_err(|e| ApiError::validation(format!("failed to encode request body: {e}"), vec![]))?;

        let response = self
            .execute(Method::POST, path, Some(encoded), options, self.config.request_timeout)
            .await?;
        decode_json(response, path).await
    }

    /// Downloads a binary resource using the download timeout.
    ///
    /// # Errors
    ///
    /// Returns the classified failure once retries are exhausted.
    pub async fn download(&self, path: &str, options: &RequestOptions) -> Result<Download, ApiError> {
        let response = self
            .execute(Method::GET, path, None, options, self.config.download_timeout)
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::network(format!("failed to read download from {path}"), Some(e.to_string())))?;

        debug!(path, size = bytes.len(), "download complete");
        Ok(Download { bytes, content_type })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        options: &RequestOptions,
        default_timeout: Duration,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let timeout = options.timeout.unwrap_or(default_timeout);
        let policy = &self.config.retry_policy;
        let mut attempt = 0u32;

        loop {
            let span = info_span!("api_request", method = %method, path, attempt);

            let response = self
                .send_once(&method, &url, body.clone(), options, timeout)
                .instrument(span)
                .await
                .map_err(|e| {
                    warn!(method = %method, path, attempt, error = %e, "request failed without response");
                    ApiError::network(format!("{method} {path} failed"), Some(e.to_string()))
                })?;

            let status = response.status();
            if status.is_success() {
                debug!(method = %method, path, attempt, status = status.as_u16(), "request succeeded");
                return Ok(response);
            }

            let headers = response.headers().clone();
            let body_bytes = response.bytes().await.unwrap_or_default();

            if policy.should_retry(attempt, status.as_u16()) {
                let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                    extract_retry_after_seconds(&headers, self.clock.now_utc()).map(Duration::from_secs)
                } else {
                    None
                };
                let delay = policy.delay_for(attempt, retry_after);

                warn!(
                    method = %method,
                    path,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    status = status.as_u16(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying request"
                );

                self.clock.sleep(delay).await;
                attempt += 1;
                continue;
            }

            let error = classify_response(status, &headers, &body_bytes, path, self.clock.now_utc());
            warn!(method = %method, path, status = status.as_u16(), kind = %error.kind(), "request failed");
            return Err(error);
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<Bytes>,
        options: &RequestOptions,
        timeout: Duration,
    ) -> reqwest::Result<Response> {
        let mut request = self.http.request(method.clone(), url).timeout(timeout);

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }

        let token = self.auth_token.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }

        request.send().await
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::network(format!("failed to read response from {path}"), Some(e.to_string())))?;

    let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(body).map_err(|e| {
        warn!(path, status = status.as_u16(), error = %e, "response body did not decode");
        ApiError::server(format!("invalid response body: {e}"), status.as_u16())
    })
}
