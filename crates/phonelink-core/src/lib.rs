//! Core domain types shared by the telephony integration crates.
//!
//! Provides the credential record, webhook event model, the unified error
//! taxonomy surfaced to API callers, and the clock abstraction every
//! time-dependent component is built on. All other crates depend on these
//! types so that the token manager, HTTP client and webhook receiver speak
//! the same language.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod time;
pub mod token;

pub use error::{ApiError, AuthError, ErrorKind, ValidationDetail};
pub use models::{event_types, EventCategory, WebhookEvent};
pub use time::{Clock, RealClock, TestClock};
pub use token::{AccessTokenProvider, CredentialRecord};
