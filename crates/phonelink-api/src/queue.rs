//! In-memory FIFO dispatch queue with deduplication.
//!
//! Verified events are enqueued synchronously and drained asynchronously.
//! At most one drain runs at a time; events enqueued while a drain is
//! active are picked up by that drain. Each event's identity is recorded
//! in a bounded [`DedupSet`] once its subscribers have run, so a repeated
//! delivery of the same identity is dropped.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use phonelink_core::{Clock, EventCategory, WebhookEvent};
use tracing::{debug, error, info, warn};

use crate::{
    dedup::{DedupSet, DEFAULT_DEDUP_CAPACITY},
    subscriber::{EventSubscriber, FnSubscriber, SubscriberError},
};

/// Event waiting for dispatch.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    /// The verified event.
    pub event: WebhookEvent,
    /// Deduplication identity.
    pub identity: String,
    /// When the event was enqueued.
    pub received_at: DateTime<Utc>,
}

/// Result of offering an event to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the queue.
    Queued {
        /// Event identity.
        identity: String,
        /// Queue length after appending.
        queue_len: usize,
    },
    /// Identity already processed; dropped.
    Duplicate {
        /// Event identity.
        identity: String,
    },
}

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<QueuedEvent>,
    processed: DedupSet,
}

type SubscriberList = Vec<Arc<dyn EventSubscriber>>;

/// Deduplicating FIFO queue feeding registered subscribers.
pub struct DispatchQueue {
    state: Mutex<QueueState>,
    subscribers: RwLock<HashMap<EventCategory, SubscriberList>>,
    draining: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("queue_len", &self.queue_len())
            .field("processed_count", &self.processed_count())
            .field("draining", &self.is_draining())
            .finish_non_exhaustive()
    }
}

impl DispatchQueue {
    /// Creates a queue remembering the default number of identities.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_dedup_capacity(clock, DEFAULT_DEDUP_CAPACITY)
    }

    /// Creates a queue remembering at most `capacity` identities.
    pub fn with_dedup_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                processed: DedupSet::with_capacity(capacity),
            }),
            subscribers: RwLock::new(HashMap::new()),
            draining: AtomicBool::new(false),
            clock,
        }
    }

    /// Registers a subscriber for `category`.
    pub fn subscribe(&self, category: EventCategory, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let list = subscribers.entry(category).or_default();
        list.push(subscriber);
        debug!(category = %category, total = list.len(), "subscriber registered");
    }

    /// Registers an async closure for `category`.
    pub fn subscribe_fn<F, Fut>(&self, category: EventCategory, name: impl Into<String>, handler: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SubscriberError>> + Send + 'static,
    {
        self.subscribe(category, Arc::new(FnSubscriber::new(name, handler)));
    }

    /// Number of subscribers registered for `category`.
    pub fn subscriber_count(&self, category: EventCategory) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .map_or(0, Vec::len)
    }

    /// Appends `event` unless its identity was already processed.
    pub fn enqueue(&self, event: WebhookEvent) -> EnqueueOutcome {
        let identity = event.identity();
        let mut state = self.lock_state();

        if state.processed.contains(&identity) {
            debug!(identity = %identity, "duplicate event dropped");
            return EnqueueOutcome::Duplicate { identity };
        }

        state.pending.push_back(QueuedEvent {
            event,
            identity: identity.clone(),
            received_at: self.clock.now_utc(),
        });
        let queue_len = state.pending.len();
        debug!(identity = %identity, queue_len, "event queued");

        EnqueueOutcome::Queued { identity, queue_len }
    }

    /// Enqueues `event` and starts a background drain when it was queued.
    ///
    /// Returns without waiting for subscribers. Must be called from within a
    /// tokio runtime.
    pub fn handle_event(self: &Arc<Self>, event: WebhookEvent) -> EnqueueOutcome {
        info!(
            event_type = %event.event_type,
            event_ts = event.event_timestamp,
            account_id = %event.account_id,
            "webhook event received"
        );

        let outcome = self.enqueue(event);
        if matches!(outcome, EnqueueOutcome::Queued { .. }) {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.drain().await });
        }
        outcome
    }

    /// Dispatches queued events until the queue is empty.
    ///
    /// Returns immediately if another drain is active.
    pub async fn drain(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            while let Some(queued) = self.next_pending() {
                self.dispatch(&queued).await;
                self.mark_processed(&queued.identity);
            }

            self.draining.store(false, Ordering::Release);

            // An enqueue between the last pop and the release above would
            // otherwise wait for the next delivery.
            if self.queue_len() == 0 {
                return;
            }
        }
    }

    /// Events waiting for dispatch.
    pub fn queue_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Identities currently remembered as processed.
    pub fn processed_count(&self) -> usize {
        self.lock_state().processed.len()
    }

    /// True while a drain is running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    fn next_pending(&self) -> Option<QueuedEvent> {
        let mut state = self.lock_state();
        while let Some(queued) = state.pending.pop_front() {
            if state.processed.contains(&queued.identity) {
                debug!(identity = %queued.identity, "already processed, skipping");
                continue;
            }
            return Some(queued);
        }
        None
    }

    fn mark_processed(&self, identity: &str) {
        let evicted = self.lock_state().processed.insert(identity);
        if evicted > 0 {
            debug!(evicted, "evicted oldest processed identities");
        }
    }

    async fn dispatch(&self, queued: &QueuedEvent) {
        let event = &queued.event;
        let Some(category) = event.category() else {
            debug!(event_type = %event.event_type, "unhandled event type");
            return;
        };

        let subscribers: SubscriberList = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .cloned()
            .unwrap_or_default();

        debug!(
            identity = %queued.identity,
            category = %category,
            subscribers = subscribers.len(),
            "dispatching event"
        );

        for subscriber in subscribers {
            match AssertUnwindSafe(subscriber.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    error!(
                        subscriber = subscriber.name(),
                        identity = %queued.identity,
                        error = %e,
                        "subscriber failed"
                    );
                },
                Err(_) => {
                    warn!(subscriber = subscriber.name(), identity = %queued.identity, "subscriber panicked");
                },
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use phonelink_core::{event_types, TestClock};
    use serde_json::json;

    use super::*;

    fn queue() -> DispatchQueue {
        DispatchQueue::new(Arc::new(TestClock::new()))
    }

    fn completed(call_log_id: &str) -> WebhookEvent {
        WebhookEvent::new(
            event_types::CALLEE_CALL_HISTORY_COMPLETED,
            1,
            "acct",
            json!({ "call_log_id": call_log_id }),
        )
    }

    fn counting(queue: &DispatchQueue, category: EventCategory) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        queue.subscribe_fn(category, "counter", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        count
    }

    #[tokio::test]
    async fn duplicate_identity_dispatched_once() {
        let queue = queue();
        let count = counting(&queue, EventCategory::CallCompleted);

        queue.enqueue(completed("L1"));
        queue.enqueue(completed("L1"));
        queue.drain().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(queue.enqueue(completed("L1")), EnqueueOutcome::Duplicate {
            identity: "phone.callee_call_history_completed:L1".to_string()
        });
        assert_eq!(queue.processed_count(), 1);
    }

    #[tokio::test]
    async fn events_dispatch_in_fifo_order() {
        let queue = queue();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        queue.subscribe_fn(EventCategory::CallCompleted, "recorder", move |event: WebhookEvent| {
            let sink = sink.clone();
            async move {
                sink.lock().expect("lock").push(event.call_log_id().unwrap_or_default().into_owned());
                Ok(())
            }
        });

        for id in ["L1", "L2", "L3"] {
            queue.enqueue(completed(id));
        }
        queue.drain().await;

        assert_eq!(*seen.lock().expect("lock"), vec!["L1", "L2", "L3"]);
        assert_eq!(queue.queue_len(), 0);
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn failing_and_panicking_subscribers_are_isolated() {
        let queue = queue();
        queue.subscribe_fn(EventCategory::CallCompleted, "failing", |_| async {
            Err(SubscriberError::new("boom"))
        });
        queue.subscribe_fn(EventCategory::CallCompleted, "panicking", |event: WebhookEvent| async move {
            assert!(event.call_log_id().is_none(), "subscriber bug");
            Ok(())
        });
        let count = counting(&queue, EventCategory::CallCompleted);

        queue.enqueue(completed("L1"));
        queue.enqueue(completed("L2"));
        queue.drain().await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(queue.processed_count(), 2);
    }

    #[tokio::test]
    async fn routes_by_category() {
        let queue = queue();
        let completed_count = counting(&queue, EventCategory::CallCompleted);
        let ringing_count = counting(&queue, EventCategory::Ringing);

        queue.enqueue(WebhookEvent::new(event_types::CALLEE_RINGING, 5, "acct", json!({ "call_id": "C1" })));
        queue.enqueue(WebhookEvent::new(
            event_types::CALLER_CALL_HISTORY_COMPLETED,
            6,
            "acct",
            json!({ "call_log_id": "L9" }),
        ));
        queue.drain().await;

        assert_eq!(ringing_count.load(Ordering::SeqCst), 1);
        assert_eq!(completed_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unhandled_event_types_are_still_marked_processed() {
        let queue = queue();

        queue.enqueue(WebhookEvent::new("phone.sms_received", 42, "acct", json!({})));
        queue.drain().await;

        assert_eq!(queue.processed_count(), 1);
        assert!(matches!(
            queue.enqueue(WebhookEvent::new("phone.sms_received", 42, "acct", json!({}))),
            EnqueueOutcome::Duplicate { .. }
        ));
    }

    #[tokio::test]
    async fn processed_identities_are_bounded() {
        let queue = DispatchQueue::with_dedup_capacity(Arc::new(TestClock::new()), 2);

        for id in ["L1", "L2", "L3"] {
            queue.enqueue(completed(id));
        }
        queue.drain().await;

        assert_eq!(queue.processed_count(), 2);
        assert!(matches!(queue.enqueue(completed("L1")), EnqueueOutcome::Queued { .. }));
    }

    #[tokio::test]
    async fn subscriber_counts_per_category() {
        let queue = queue();
        counting(&queue, EventCategory::Missed);
        counting(&queue, EventCategory::Missed);

        assert_eq!(queue.subscriber_count(EventCategory::Missed), 2);
        assert_eq!(queue.subscriber_count(EventCategory::Ended), 0);
    }

    #[tokio::test]
    async fn handle_event_drains_in_background() {
        let queue = Arc::new(queue());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        queue.subscribe_fn(EventCategory::Ended, "notify", move |event: WebhookEvent| {
            let tx = tx.clone();
            async move {
                if let Some(tx) = tx.lock().expect("lock").take() {
                    let _ = tx.send(event.identity());
                }
                Ok(())
            }
        });

        let outcome =
            queue.handle_event(WebhookEvent::new(event_types::CALLEE_ENDED, 9, "acct", json!({ "call_id": "C7" })));

        assert!(matches!(outcome, EnqueueOutcome::Queued { queue_len: 1, .. }));
        let identity = tokio::time::timeout(std::time::Duration::from_secs(5), rx)
            .await
            .expect("dispatched in time")
            .expect("sender kept");
        assert_eq!(identity, "phone.callee_ended:C7");
    }

    #[tokio::test]
    async fn concurrent_drain_returns_immediately() {
        let queue = queue();
        queue.draining.store(true, Ordering::Release);
        queue.enqueue(completed("L1"));

        queue.drain().await;

        assert_eq!(queue.queue_len(), 1);
    }
}
