//! Resilient REST client for the vendor phone API.
//!
//! [`ApiClient`] issues requests with a bounded retry loop driven by a
//! [`RetryPolicy`] and reports failures as classified
//! [`phonelink_core::ApiError`]s. [`PhoneApi`] layers the call-log and
//! recording operations on top, pulling bearer tokens from an
//! [`phonelink_core::AccessTokenProvider`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod client;
pub mod phone;
pub mod retry;

pub use classify::{classify_response, extract_retry_after_seconds, DEFAULT_RETRY_AFTER_SECONDS};
pub use client::{ApiClient, ClientConfig, Download, RequestOptions};
pub use phone::{CallLogPage, CallLogQuery, PhoneApi, RecordingPage, PAGE_DELAY};
pub use retry::RetryPolicy;
