//! OAuth redirect handlers.
//!
//! The vendor redirects the user's browser here with an authorization code.
//! The code is exchanged for a credential and the first outcome is reported
//! to whoever is waiting on the callback server.

use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use phonelink_auth::TokenManager;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{error, info, instrument, warn};

/// Result of a completed authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Code exchanged and credential stored.
    Authorized,
    /// Authorization failed or timed out.
    Failed(String),
}

/// Query parameters of the OAuth redirect.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Anti-CSRF state echoed by the vendor.
    pub state: Option<String>,
    /// Error code when the user denied access.
    pub error: Option<String>,
    /// Human-readable error detail.
    pub error_description: Option<String>,
}

/// State shared by the callback handlers.
#[derive(Clone)]
pub struct CallbackState {
    tokens: Arc<TokenManager>,
    expected_state: Option<String>,
    outcome: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

impl CallbackState {
    /// Creates state reporting the first outcome on `outcome`.
    pub fn new(
        tokens: Arc<TokenManager>,
        expected_state: Option<String>,
        outcome: oneshot::Sender<CallbackOutcome>,
    ) -> Self {
        Self { tokens, expected_state, outcome: Arc::new(Mutex::new(Some(outcome))) }
    }

    fn report(&self, outcome: CallbackOutcome) {
        let sender = self.outcome.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            // Receiver gone means the server already stopped waiting.
            let _ = sender.send(outcome);
        }
    }
}

/// Handles the OAuth redirect.
#[instrument(name = "oauth_callback", skip_all, fields(has_code = params.code.is_some()))]
pub async fn oauth_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        let reason = params.error_description.unwrap_or(error);
        warn!(reason = %reason, "authorization denied");
        state.report(CallbackOutcome::Failed(reason.clone()));
        return page(StatusCode::BAD_REQUEST, "Authorization failed", &reason);
    }

    if let Some(expected) = &state.expected_state {
        if params.state.as_deref() != Some(expected.as_str()) {
            warn!("authorization state mismatch");
            let reason = "State parameter mismatch".to_string();
            state.report(CallbackOutcome::Failed(reason.clone()));
            return page(StatusCode::BAD_REQUEST, "Authorization failed", &reason);
        }
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        let reason = "No authorization code received".to_string();
        state.report(CallbackOutcome::Failed(reason.clone()));
        return page(StatusCode::BAD_REQUEST, "Authorization failed", &reason);
    };

    match state.tokens.exchange_code(&code).await {
        Ok(_) => {
            info!("authorization completed");
            state.report(CallbackOutcome::Authorized);
            page(
                StatusCode::OK,
                "Authorization successful",
                "You can close this window and return to the application.",
            )
        },
        Err(e) => {
            error!(error = %e, "authorization code exchange failed");
            state.report(CallbackOutcome::Failed(e.to_string()));
            page(StatusCode::INTERNAL_SERVER_ERROR, "Authorization failed", &e.to_string())
        },
    }
}

/// Liveness endpoint of the callback server.
pub async fn oauth_health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "oauth-callback" }))
}

fn page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n<p>{message}</p>\n</body>\n</html>\n",
        title = escape_html(title),
        message = escape_html(message),
    );
    (status, Html(body)).into_response()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#39;y&#39;"
        );
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(escape_html("access_denied"), "access_denied");
    }
}
