//! Error taxonomy for token lifecycle and vendor API calls.
//!
//! [`AuthError`] covers the OAuth flow; [`ApiError`] is the single error
//! type every vendor API call surfaces. Token failures reaching the HTTP
//! client are folded into [`ApiError::Auth`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures in the OAuth token lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Authorization code rejected by the vendor.
    #[error("invalid authorization code: {message}")]
    InvalidCode {
        /// Vendor-supplied reason, when present.
        message: String,
    },

    /// No usable credential; the caller must re-authorize.
    #[error("token expired: {message}")]
    TokenExpired {
        /// Human-readable explanation.
        message: String,
    },

    /// Refresh grant failed or no refresh token was available.
    #[error("token refresh failed: {message}")]
    RefreshFailed {
        /// Vendor-supplied reason or local cause.
        message: String,
    },

    /// Transport-level failure reaching the token endpoint.
    #[error("network error: {message}")]
    NetworkError {
        /// Transport error description.
        message: String,
    },

    /// Credential store could not be read or written.
    #[error("token storage error: {message}")]
    Storage {
        /// Storage error description.
        message: String,
    },
}

impl AuthError {
    /// Creates an invalid-code error.
    pub fn invalid_code(message: impl Into<String>) -> Self {
        Self::InvalidCode { message: message.into() }
    }

    /// Creates a token-expired error.
    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::TokenExpired { message: message.into() }
    }

    /// Creates a refresh-failed error.
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::RefreshFailed { message: message.into() }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Returns the error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidCode { message }
            | Self::TokenExpired { message }
            | Self::RefreshFailed { message }
            | Self::NetworkError { message }
            | Self::Storage { message } => message,
        }
    }
}

/// Field-level validation problem reported by the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetail {
    /// Offending field name.
    #[serde(default)]
    pub field: String,
    /// Problem description.
    #[serde(default)]
    pub message: String,
}

/// Classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request rejected as malformed (HTTP 400).
    Validation,
    /// Missing or rejected credentials (HTTP 401 or token failure).
    Auth,
    /// Insufficient scopes (HTTP 403).
    Permission,
    /// Resource does not exist (HTTP 404).
    NotFound,
    /// Request quota exhausted (HTTP 429).
    RateLimited,
    /// Vendor-side or unexpected failure.
    Server,
    /// Transport failure with no HTTP response.
    Network,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Server => "server",
            Self::Network => "network",
        };
        f.write_str(name)
    }
}

/// Classified failure of a vendor API call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP 400.
    #[error("validation error: {message}")]
    Validation {
        /// Vendor message.
        message: String,
        /// Per-field problems, when supplied.
        details: Vec<ValidationDetail>,
    },

    /// HTTP 401, or no usable access token.
    #[error("authentication error: {message}")]
    Auth {
        /// Vendor message or token failure description.
        message: String,
    },

    /// HTTP 403.
    #[error("permission denied: {message}")]
    Permission {
        /// Vendor message.
        message: String,
        /// Scopes the vendor says are required, when supplied.
        required_scopes: Option<Vec<String>>,
    },

    /// HTTP 404.
    #[error("{resource_type} {resource_id} not found: {message}")]
    NotFound {
        /// Vendor message.
        message: String,
        /// Kind of resource requested.
        resource_type: String,
        /// Identifier of the resource requested.
        resource_id: String,
    },

    /// HTTP 429 after retries were exhausted.
    #[error("rate limited: {message} (retry after {retry_after_seconds}s)")]
    RateLimited {
        /// Vendor message.
        message: String,
        /// Seconds the vendor asked callers to wait.
        retry_after_seconds: u64,
    },

    /// 5xx or any other unexpected response.
    #[error("server error (HTTP {status_code}): {message}")]
    ServerError {
        /// Vendor message.
        message: String,
        /// HTTP status received.
        status_code: u16,
    },

    /// No HTTP response was received.
    #[error("network error: {message}")]
    NetworkError {
        /// Error description.
        message: String,
        /// Underlying transport error text.
        cause: Option<String>,
    },
}

impl ApiError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>, details: Vec<ValidationDetail>) -> Self {
        Self::Validation { message: message.into(), details }
    }

    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    /// Creates a permission error.
    pub fn permission(message: impl Into<String>, required_scopes: Option<Vec<String>>) -> Self {
        Self::Permission { message: message.into(), required_scopes }
    }

    /// Creates a not-found error.
    pub fn not_found(
        message: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Creates a rate-limited error.
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self::RateLimited { message: message.into(), retry_after_seconds }
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>, status_code: u16) -> Self {
        Self::ServerError { message: message.into(), status_code }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>, cause: Option<String>) -> Self {
        Self::NetworkError { message: message.into(), cause }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::ServerError { .. } => ErrorKind::Server,
            Self::NetworkError { .. } => ErrorKind::Network,
        }
    }

    /// Returns the message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Auth { message }
            | Self::Permission { message, .. }
            | Self::NotFound { message, .. }
            | Self::RateLimited { message, .. }
            | Self::ServerError { message, .. }
            | Self::NetworkError { message, .. } => message,
        }
    }

    /// Returns the HTTP status associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Validation { .. } => Some(400),
            Self::Auth { .. } => Some(401),
            Self::Permission { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::ServerError { status_code, .. } => Some(*status_code),
            Self::NetworkError { .. } => None,
        }
    }

    /// Returns the vendor-requested wait for rate-limited errors.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds, .. } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// Re-tags a not-found error with the resource the caller asked for.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_resource(self, resource_type: &str, resource_id: &str) -> Self {
        match self {
            Self::NotFound { message, .. } => Self::NotFound {
                message,
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
            },
            other => other,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth { message: err.to_string() }
    }
}
