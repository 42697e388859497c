//! Subscriber side of the dispatch queue.
//!
//! Subscribers register per [`phonelink_core::EventCategory`] and are called
//! once for every matching event, in registration order. A failing or
//! panicking subscriber does not affect its siblings or later events.

use std::{fmt, future::Future};

use async_trait::async_trait;
use phonelink_core::WebhookEvent;
use thiserror::Error;
use tracing::info;

/// Failure reported by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubscriberError {
    message: String,
}

impl SubscriberError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for SubscriberError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Receiver of dispatched webhook events.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Handles one event.
    async fn handle(&self, event: &WebhookEvent) -> Result<(), SubscriberError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "subscriber"
    }
}

/// Adapts an async closure into an [`EventSubscriber`].
pub struct FnSubscriber<F> {
    name: String,
    handler: F,
}

impl<F> FnSubscriber<F> {
    /// Wraps `handler` under `name`.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self { name: name.into(), handler }
    }
}

impl<F> fmt::Debug for FnSubscriber<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSubscriber").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> EventSubscriber for FnSubscriber<F>
where
    F: Fn(WebhookEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SubscriberError>> + Send,
{
    async fn handle(&self, event: &WebhookEvent) -> Result<(), SubscriberError> {
        (self.handler)(event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Logs every event it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSubscriber;

#[async_trait]
impl EventSubscriber for LoggingSubscriber {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), SubscriberError> {
        info!(
            event_type = %event.event_type,
            category = ?event.category(),
            account_id = %event.account_id,
            call_id = event.call_id().as_deref(),
            call_log_id = event.call_log_id().as_deref(),
            "phone event"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use serde_json::json;

    use super::*;

    fn event() -> WebhookEvent {
        WebhookEvent::new("phone.callee_missed", 1, "acct", json!({ "call_id": "C1" }))
    }

    #[tokio::test]
    async fn fn_subscriber_invokes_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscriber = FnSubscriber::new("counter", move |event: WebhookEvent| {
            let counter = counter.clone();
            async move {
                assert_eq!(event.call_id().as_deref(), Some("C1"));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        subscriber.handle(&event()).await.expect("handled");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(subscriber.name(), "counter");
    }

    #[tokio::test]
    async fn logging_subscriber_accepts_events() {
        assert!(LoggingSubscriber.handle(&event()).await.is_ok());
    }

    #[test]
    fn anyhow_errors_keep_context() {
        let err: SubscriberError = anyhow::anyhow!("db down").context("store call").into();

        assert_eq!(err.message(), "store call: db down");
    }
}
