//! Webhook request signing and verification.
//!
//! Deliveries are signed as `v0=` + hex(HMAC-SHA256(secret,
//! `v0:{timestamp}:{body}`)) and carry the timestamp in a separate header.
//! Verification rejects missing headers, timestamps more than
//! [`TIMESTAMP_TOLERANCE_SECS`] away from now, and signature mismatches.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signature scheme version prefix.
pub const SIGNATURE_VERSION: &str = "v0";

/// Maximum allowed distance between the request timestamp and now.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

/// Reasons a delivery fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Signature header missing or empty.
    #[error("signature header missing")]
    MissingSignature,

    /// Timestamp header missing or empty.
    #[error("timestamp header missing")]
    MissingTimestamp,

    /// Timestamp header is not an integer.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Timestamp outside the replay window.
    #[error("timestamp outside tolerance ({skew_seconds}s from now)")]
    StaleTimestamp {
        /// Absolute distance from now in seconds.
        skew_seconds: i64,
    },

    /// Signature header is not `v0=<hex>`.
    #[error("invalid signature format")]
    InvalidFormat,

    /// Computed signature does not match.
    #[error("signature verification failed")]
    VerificationFailed,

    /// No usable secret configured.
    #[error("invalid secret key")]
    InvalidSecret,
}

/// Hex-encoded HMAC-SHA256 of `payload`.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidSecret`] for an empty secret.
pub fn generate_hmac_hex(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::InvalidSecret);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature header value for a delivery.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidSecret`] for an empty secret.
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut message = Vec::with_capacity(SIGNATURE_VERSION.len() + timestamp.len() + body.len() + 2);
    message.extend_from_slice(SIGNATURE_VERSION.as_bytes());
    message.push(b':');
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b':');
    message.extend_from_slice(body);

    Ok(format!("{SIGNATURE_VERSION}={}", generate_hmac_hex(&message, secret)?))
}

/// Challenge response token for endpoint URL validation.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidSecret`] for an empty secret.
pub fn encrypt_plain_token(secret: &str, plain_token: &str) -> Result<String, SignatureError> {
    generate_hmac_hex(plain_token.as_bytes(), secret)
}

/// Verifies signature and timestamp headers against the raw body.
///
/// `now` is the current time in unix seconds.
///
/// # Errors
///
/// Returns the first check that failed.
pub fn verify_request(
    secret: &str,
    signature: Option<&str>,
    timestamp: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let signature = signature.filter(|s| !s.is_empty()).ok_or(SignatureError::MissingSignature)?;
    let timestamp = timestamp.filter(|t| !t.is_empty()).ok_or(SignatureError::MissingTimestamp)?;

    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_string()))?;
    let skew_seconds = now.saturating_sub(sent_at).saturating_abs();
    if skew_seconds > TIMESTAMP_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp { skew_seconds });
    }

    if !signature.starts_with("v0=") {
        return Err(SignatureError::InvalidFormat);
    }

    let expected = compute_signature(secret, timestamp, body)?;
    if timing_safe_eq(signature, &expected) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

/// Constant-time comparison; length mismatch returns early.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
