//! Phonelink service.
//!
//! Loads configuration, restores the stored credential, serves the webhook
//! receiver, and runs the OAuth callback server when no valid credential is
//! available.

use std::sync::Arc;

use anyhow::{Context, Result};
use phonelink_api::{
    shutdown_signal, start_server, AppState, CallbackOutcome, Config, DispatchQueue, LoggingSubscriber,
    OAuthCallbackServer, DEFAULT_CALLBACK_TIMEOUT,
};
use phonelink_auth::{FileTokenStore, TokenManager};
use phonelink_core::{Clock, EventCategory, RealClock};
use tracing::{error, info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_tracing(&config.rust_log);

    info!(
        client_id = %config.client_id_masked(),
        token_file = %config.token_file.display(),
        webhook_port = config.webhook_port,
        "configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let store = Arc::new(FileTokenStore::new(&config.token_file));
    let tokens = Arc::new(
        TokenManager::new(config.to_oauth_config(), store, clock.clone())
            .context("Failed to create token manager")?,
    );

    if let Err(e) = tokens.load_credential().await {
        warn!(error = %e, "stored credential could not be loaded");
    }

    if tokens.is_authenticated() {
        info!(expires_in_secs = tokens.time_until_expiry().map(|d| d.as_secs()), "stored credential is valid");
    } else {
        spawn_authorization(tokens.clone(), &config);
    }

    if config.webhook_secret_token.is_empty() {
        warn!("webhook secret token is not set; every delivery will be rejected");
    }

    let queue = Arc::new(DispatchQueue::new(clock.clone()));
    for category in EventCategory::ALL {
        queue.subscribe(category, Arc::new(LoggingSubscriber));
    }

    let state = AppState::new(queue, config.webhook_secret_token.clone(), clock);
    let addr = config.webhook_addr()?;

    start_server(state, addr, shutdown_signal())
        .await
        .with_context(|| format!("Webhook server on {addr} failed"))?;

    info!("phonelink shutdown complete");
    Ok(())
}

/// Logs the authorization URL and waits for the redirect in the background.
fn spawn_authorization(tokens: Arc<TokenManager>, config: &Config) {
    let state = Uuid::new_v4().to_string();
    let addr = config.oauth_callback_addr();

    info!(url = %tokens.authorization_url(&state), "open this URL to authorize");

    tokio::spawn(async move {
        let server = OAuthCallbackServer::new(tokens).with_expected_state(state);
        match server.wait_for_callback(addr, DEFAULT_CALLBACK_TIMEOUT).await {
            Ok(CallbackOutcome::Authorized) => info!("authorization complete"),
            Ok(CallbackOutcome::Failed(reason)) => warn!(reason = %reason, "authorization failed"),
            Err(e) => error!(error = %e, addr = %addr, "failed to start OAuth callback server"),
        }
    });
}

/// Initializes tracing from `RUST_LOG`, falling back to `default_filter`.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info,phonelink=debug,tower_http=debug"));

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
