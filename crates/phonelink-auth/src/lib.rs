//! OAuth token lifecycle for the vendor phone API.
//!
//! [`TokenManager`] performs the authorization-code and refresh grants,
//! caches the resulting [`phonelink_core::CredentialRecord`], and persists
//! it through a [`TokenStore`] so that restarts keep the session.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod manager;
pub mod store;

pub use manager::{OAuthConfig, TokenManager, REFRESH_THRESHOLD, REQUIRED_SCOPES};
pub use store::{FileTokenStore, InMemoryTokenStore, StoreError, TokenStore};
