//! Webhook delivery handler.
//!
//! Every delivery is verified against the raw body before anything else
//! happens. Endpoint validation challenges are answered on the same request;
//! all other events are enqueued and acknowledged without waiting for
//! subscribers.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use phonelink_core::{event_types, WebhookEvent};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    crypto::{encrypt_plain_token, verify_request},
    queue::EnqueueOutcome,
    state::AppState,
};

/// Header carrying the `v0=<hex>` signature.
pub const SIGNATURE_HEADER: &str = "x-zm-signature";

/// Header carrying the unix-seconds request timestamp.
pub const TIMESTAMP_HEADER: &str = "x-zm-request-timestamp";

/// Response to an endpoint validation challenge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    /// Token sent by the vendor.
    pub plain_token: String,
    /// Hex HMAC-SHA256 of the plain token.
    pub encrypted_token: String,
}

/// Receives a webhook delivery.
///
/// Returns 401 when verification fails, 500 when a verified body cannot be
/// parsed, and 200 otherwise. Duplicate events are acknowledged like new
/// ones.
#[instrument(
    name = "receive_webhook",
    skip_all,
    fields(
        content_length = body.len(),
        has_signature = headers.contains_key(SIGNATURE_HEADER),
        has_timestamp = headers.contains_key(TIMESTAMP_HEADER),
    )
)]
pub async fn receive_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    debug!("webhook request received");

    let signature = header_str(&headers, SIGNATURE_HEADER);
    let timestamp = header_str(&headers, TIMESTAMP_HEADER);

    if let Err(e) =
        verify_request(&state.webhook_secret, signature, timestamp, &body, state.clock.unix_seconds())
    {
        warn!(error = %e, "webhook verification failed");
        return error_response(StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "verified webhook body is not valid JSON");
            return internal_error();
        },
    };

    if let Some(plain_token) = challenge_token(&value) {
        return answer_challenge(&state, plain_token);
    }

    let event: WebhookEvent = match serde_json::from_value(value) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "verified webhook body is not an event");
            return internal_error();
        },
    };

    match state.queue.handle_event(event) {
        EnqueueOutcome::Queued { identity, queue_len } => {
            debug!(identity = %identity, queue_len, "webhook accepted");
        },
        EnqueueOutcome::Duplicate { identity } => {
            info!(identity = %identity, "duplicate webhook acknowledged");
        },
    }

    (StatusCode::OK, Json(json!({ "status": "received" }))).into_response()
}

fn answer_challenge(state: &AppState, plain_token: &str) -> Response {
    match encrypt_plain_token(&state.webhook_secret, plain_token) {
        Ok(encrypted_token) => {
            info!("answered endpoint validation challenge");
            (
                StatusCode::OK,
                Json(ChallengeResponse { plain_token: plain_token.to_string(), encrypted_token }),
            )
                .into_response()
        },
        Err(e) => {
            error!(error = %e, "failed to answer endpoint validation challenge");
            internal_error()
        },
    }
}

/// Plain token of an endpoint validation event; `None` for other events or
/// a challenge without a token.
fn challenge_token(value: &Value) -> Option<&str> {
    if value.get("event").and_then(Value::as_str) != Some(event_types::URL_VALIDATION) {
        return None;
    }
    value.pointer("/payload/plainToken").and_then(Value::as_str)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
