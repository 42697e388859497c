//! Maps non-success responses onto the [`ApiError`] taxonomy.
//!
//! Classification happens once, here, at the HTTP boundary.

use chrono::{DateTime, Utc};
use phonelink_core::{ApiError, ValidationDetail};
use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    StatusCode,
};
use serde::Deserialize;

/// Wait applied when a 429 carries no usable Retry-After header.
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ValidationDetail>,
    #[serde(default)]
    required_scopes: Option<Vec<String>>,
}

/// Classifies a non-success response for the request to `path`.
pub fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    path: &str,
    now: DateTime<Utc>,
) -> ApiError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed.message.filter(|m| !m.is_empty()).unwrap_or_else(|| {
        status
            .canonical_reason()
            .map_or_else(|| format!("Request failed with status {}", status.as_u16()), str::to_string)
    });

    match status.as_u16() {
        400 => ApiError::validation(message, parsed.errors),
        401 => ApiError::auth(message),
        403 => ApiError::permission(message, parsed.required_scopes),
        404 => ApiError::not_found(message, "unknown", path),
        429 => ApiError::rate_limited(
            message,
            extract_retry_after_seconds(headers, now).unwrap_or(DEFAULT_RETRY_AFTER_SECONDS),
        ),
        code => ApiError::server(message, code),
    }
}

/// Reads the Retry-After header as delta-seconds or an HTTP-date.
///
/// Returns `None` when the header is absent. An unparseable value, or a
/// date already in the past, yields [`DEFAULT_RETRY_AFTER_SECONDS`].
pub fn extract_retry_after_seconds(headers: &HeaderMap, now: DateTime<Utc>) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok().map(str::trim)?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    let seconds = DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
        .filter(|retry_at| *retry_at > now)
        .and_then(|retry_at| (retry_at - now).to_std().ok())
        .map_or(DEFAULT_RETRY_AFTER_SECONDS, |wait| wait.as_secs());

    Some(seconds)
}
