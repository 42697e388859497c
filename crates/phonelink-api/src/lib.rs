//! Inbound HTTP surface: webhook receiver, event dispatch and OAuth callback.
//!
//! Deliveries are verified with [`crypto::verify_request`], deduplicated and
//! queued by [`DispatchQueue`], and drained to [`EventSubscriber`]s in the
//! background so the sender is acknowledged immediately.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod callback;
pub mod config;
pub mod crypto;
pub mod dedup;
pub mod handlers;
pub mod queue;
pub mod server;
pub mod state;
pub mod subscriber;

pub use callback::{CallbackOutcome, OAuthCallbackServer, DEFAULT_CALLBACK_TIMEOUT};
pub use config::Config;
pub use dedup::{DedupSet, DEFAULT_DEDUP_CAPACITY};
pub use queue::{DispatchQueue, EnqueueOutcome, QueuedEvent};
pub use server::{create_router, shutdown_signal, start_server};
pub use state::AppState;
pub use subscriber::{EventSubscriber, FnSubscriber, LoggingSubscriber, SubscriberError};
