//! Service configuration.

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use phonelink_auth::OAuthConfig;
use phonelink_client::{ClientConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "phonelink.toml";

/// Environment variable names and the fields they set.
const ENV_KEYS: [(&str, &str); 16] = [
    ("ZOOM_CLIENT_ID", "client_id"),
    ("ZOOM_CLIENT_SECRET", "client_secret"),
    ("ZOOM_REDIRECT_URI", "redirect_uri"),
    ("ZOOM_API_BASE_URL", "api_base_url"),
    ("ZOOM_OAUTH_BASE_URL", "oauth_base_url"),
    ("WEBHOOK_HOST", "webhook_host"),
    ("WEBHOOK_PORT", "webhook_port"),
    ("ZOOM_WEBHOOK_SECRET_TOKEN", "webhook_secret_token"),
    ("OAUTH_CALLBACK_PORT", "oauth_callback_port"),
    ("TOKEN_FILE", "token_file"),
    ("MAX_RETRIES", "max_retries"),
    ("RETRY_BASE_DELAY_MS", "retry_base_delay_ms"),
    ("RETRY_MAX_DELAY_MS", "retry_max_delay_ms"),
    ("REQUEST_TIMEOUT_SECONDS", "request_timeout_seconds"),
    ("DOWNLOAD_TIMEOUT_SECONDS", "download_timeout_seconds"),
    ("RUST_LOG", "rust_log"),
];

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`phonelink.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use phonelink_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Webhooks on {}:{}", config.webhook_host, config.webhook_port);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    // OAuth
    /// OAuth client id.
    ///
    /// Environment variable: `ZOOM_CLIENT_ID`
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret.
    ///
    /// Environment variable: `ZOOM_CLIENT_SECRET`
    #[serde(default)]
    pub client_secret: String,
    /// Redirect URI registered with the vendor.
    ///
    /// Environment variable: `ZOOM_REDIRECT_URI`
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// REST API base URL.
    ///
    /// Environment variable: `ZOOM_API_BASE_URL`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// OAuth host serving `authorize` and `token`.
    ///
    /// Environment variable: `ZOOM_OAUTH_BASE_URL`
    #[serde(default = "default_oauth_base_url")]
    pub oauth_base_url: String,

    // Webhooks
    /// Webhook server bind host.
    ///
    /// Environment variable: `WEBHOOK_HOST`
    #[serde(default = "default_webhook_host")]
    pub webhook_host: String,
    /// Webhook server bind port.
    ///
    /// Environment variable: `WEBHOOK_PORT`
    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,
    /// Secret token used to sign deliveries.
    ///
    /// Environment variable: `ZOOM_WEBHOOK_SECRET_TOKEN`
    #[serde(default)]
    pub webhook_secret_token: String,

    // Authorization
    /// Local port of the OAuth callback server.
    ///
    /// Environment variable: `OAUTH_CALLBACK_PORT`
    #[serde(default = "default_oauth_callback_port")]
    pub oauth_callback_port: u16,
    /// Credential file.
    ///
    /// Environment variable: `TOKEN_FILE`
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    // Client
    /// Retries after the first attempt.
    ///
    /// Environment variable: `MAX_RETRIES`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    ///
    /// Environment variable: `RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECONDS`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Download timeout in seconds.
    ///
    /// Environment variable: `DOWNLOAD_TIMEOUT_SECONDS`
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,

    // Logging
    /// Log filter used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, `phonelink.toml`, and environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment(CONFIG_FILE))
    }

    /// Layered sources reading the TOML file at `path`.
    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::raw().filter_map(|key| {
                ENV_KEYS
                    .iter()
                    .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                    .map(|(_, field)| (*field).into())
            }))
    }

    /// Extract and validate from `figment`.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Retry policy for the API client.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// API client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            download_timeout: Duration::from_secs(self.download_timeout_seconds),
            retry_policy: self.to_retry_policy(),
            ..ClientConfig::default()
        }
    }

    /// OAuth configuration for the token manager.
    pub fn to_oauth_config(&self) -> OAuthConfig {
        OAuthConfig::new(&self.client_id, &self.client_secret, &self.redirect_uri)
            .with_oauth_base_url(&self.oauth_base_url)
            .with_request_timeout(Duration::from_secs(self.request_timeout_seconds))
    }

    /// Webhook server socket address.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form an address.
    pub fn webhook_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.webhook_host, self.webhook_port);
        SocketAddr::from_str(&addr_str).context("Invalid webhook address")
    }

    /// Loopback address of the OAuth callback server.
    pub fn oauth_callback_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.oauth_callback_port))
    }

    /// Client id with all but the first four characters masked.
    pub fn client_id_masked(&self) -> String {
        let prefix: String = self.client_id.chars().take(4).collect();
        if self.client_id.chars().count() <= 4 {
            return "***".to_string();
        }
        format!("{prefix}***")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.webhook_port == 0 {
            anyhow::bail!("webhook_port must be greater than 0");
        }

        if self.oauth_callback_port == 0 {
            anyhow::bail!("oauth_callback_port must be greater than 0");
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms cannot exceed retry_max_delay_ms");
        }

        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be greater than 0");
        }

        if self.download_timeout_seconds == 0 {
            anyhow::bail!("download_timeout_seconds must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            api_base_url: default_api_base_url(),
            oauth_base_url: default_oauth_base_url(),
            webhook_host: default_webhook_host(),
            webhook_port: default_webhook_port(),
            webhook_secret_token: String::new(),
            oauth_callback_port: default_oauth_callback_port(),
            token_file: default_token_file(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            request_timeout_seconds: default_request_timeout(),
            download_timeout_seconds: default_download_timeout(),
            rust_log: default_log_level(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id_masked())
            .field("redirect_uri", &self.redirect_uri)
            .field("api_base_url", &self.api_base_url)
            .field("oauth_base_url", &self.oauth_base_url)
            .field("webhook_host", &self.webhook_host)
            .field("webhook_port", &self.webhook_port)
            .field("oauth_callback_port", &self.oauth_callback_port)
            .field("token_file", &self.token_file)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("download_timeout_seconds", &self.download_timeout_seconds)
            .field("rust_log", &self.rust_log)
            .finish_non_exhaustive()
    }
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/oauth/callback".to_string()
}

fn default_api_base_url() -> String {
    "https://api.zoom.us/v2".to_string()
}

fn default_oauth_base_url() -> String {
    "https://zoom.us/oauth".to_string()
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_port() -> u16 {
    3001
}

fn default_oauth_callback_port() -> u16 {
    3000
}

fn default_token_file() -> PathBuf {
    PathBuf::from(".tokens.json")
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}
