//! HTTP request handlers.
//!
//! - `webhook` - signed webhook deliveries and endpoint validation
//! - `health` - liveness probe
//! - `oauth` - OAuth redirect target used during first-time authorization

pub mod health;
pub mod oauth;
pub mod webhook;

pub use health::health_check;
pub use oauth::{oauth_callback, oauth_health};
pub use webhook::receive_webhook;
