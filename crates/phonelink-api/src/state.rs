//! Shared state for the webhook router.

use std::sync::Arc;

use phonelink_core::Clock;

use crate::queue::DispatchQueue;

/// State handed to every webhook handler.
#[derive(Clone)]
pub struct AppState {
    /// Queue receiving verified events.
    pub queue: Arc<DispatchQueue>,
    /// Secret token used to verify signatures and answer challenges.
    pub webhook_secret: Arc<str>,
    /// Time source for the replay window.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates state from its parts.
    pub fn new(queue: Arc<DispatchQueue>, webhook_secret: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, webhook_secret: Arc::from(webhook_secret.into()), clock }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("queue", &self.queue)
            .field("webhook_secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}
