//! One-shot HTTP server receiving the OAuth redirect.
//!
//! The server runs until the first callback outcome arrives or the timeout
//! elapses, then shuts itself down.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use phonelink_auth::TokenManager;
use tokio::{net::TcpListener, sync::oneshot};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::oauth::{oauth_callback, oauth_health, CallbackState};
pub use crate::handlers::oauth::CallbackOutcome;

/// How long to wait for the user to complete authorization.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const TIMEOUT_MESSAGE: &str = "Authentication timeout. Please try again.";

/// Router serving `/oauth/callback` and `/health`.
pub fn callback_router(state: CallbackState) -> Router {
    Router::new()
        .route("/oauth/callback", get(oauth_callback))
        .route("/health", get(oauth_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Waits for a single OAuth redirect and exchanges its code.
pub struct OAuthCallbackServer {
    tokens: Arc<TokenManager>,
    expected_state: Option<String>,
}

impl OAuthCallbackServer {
    /// Creates a server exchanging codes through `tokens`.
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens, expected_state: None }
    }

    /// Rejects callbacks whose `state` differs from `state`.
    pub fn with_expected_state(mut self, state: impl Into<String>) -> Self {
        self.expected_state = Some(state.into());
        self
    }

    /// Binds `addr` and waits for the first callback.
    ///
    /// # Errors
    ///
    /// Returns the bind error when the address is unavailable.
    pub async fn wait_for_callback(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<CallbackOutcome, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        self.wait_for_callback_on(listener, timeout).await
    }

    /// Serves on an already bound listener until the first callback.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener address cannot be read or the
    /// server fails.
    pub async fn wait_for_callback_on(
        &self,
        listener: TcpListener,
        timeout: Duration,
    ) -> Result<CallbackOutcome, std::io::Error> {
        let local_addr = listener.local_addr()?;
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState::new(self.tokens.clone(), self.expected_state.clone(), outcome_tx);
        let app = callback_router(state);

        info!(addr = %local_addr, "OAuth callback server listening");

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = match tokio::time::timeout(timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => CallbackOutcome::Failed("Callback server stopped unexpectedly".to_string()),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "OAuth callback timed out");
                CallbackOutcome::Failed(TIMEOUT_MESSAGE.to_string())
            },
        };

        let _ = shutdown_tx.send(());
        match server.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "OAuth callback server task failed"),
        }

        info!(addr = %local_addr, "OAuth callback server stopped");
        Ok(outcome)
    }
}

impl std::fmt::Debug for OAuthCallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCallbackServer")
            .field("expected_state", &self.expected_state.is_some())
            .finish_non_exhaustive()
    }
}
