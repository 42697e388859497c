//! Webhook event model and event-type routing categories.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type strings delivered by the vendor.
pub mod event_types {
    /// Challenge-response handshake for endpoint ownership.
    pub const URL_VALIDATION: &str = "endpoint.url_validation";
    /// Call history record finalized on the callee side.
    pub const CALLEE_CALL_HISTORY_COMPLETED: &str = "phone.callee_call_history_completed";
    /// Call history record finalized on the caller side.
    pub const CALLER_CALL_HISTORY_COMPLETED: &str = "phone.caller_call_history_completed";
    /// Incoming call is ringing.
    pub const CALLEE_RINGING: &str = "phone.callee_ringing";
    /// Incoming call was answered.
    pub const CALLEE_ANSWERED: &str = "phone.callee_answered";
    /// Incoming call was missed.
    pub const CALLEE_MISSED: &str = "phone.callee_missed";
    /// Call ended.
    pub const CALLEE_ENDED: &str = "phone.callee_ended";
}

/// Subscriber routing category derived from an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Caller or callee call history completed.
    CallCompleted,
    /// Callee ringing.
    Ringing,
    /// Callee answered.
    Answered,
    /// Callee missed.
    Missed,
    /// Call ended.
    Ended,
}

impl EventCategory {
    /// All categories, in declaration order.
    pub const ALL: [EventCategory; 5] =
        [Self::CallCompleted, Self::Ringing, Self::Answered, Self::Missed, Self::Ended];

    /// Maps a vendor event type to its category.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            event_types::CALLEE_CALL_HISTORY_COMPLETED
            | event_types::CALLER_CALL_HISTORY_COMPLETED => Some(Self::CallCompleted),
            event_types::CALLEE_RINGING => Some(Self::Ringing),
            event_types::CALLEE_ANSWERED => Some(Self::Answered),
            event_types::CALLEE_MISSED => Some(Self::Missed),
            event_types::CALLEE_ENDED => Some(Self::Ended),
            _ => None,
        }
    }

    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallCompleted => "call_completed",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::Missed => "missed",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified webhook delivery.
///
/// Deserializes from the vendor envelope
/// `{"event", "event_ts", "payload": {"account_id", "object"}}`; the
/// `object` is kept as opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEvent", into = "WireEvent")]
pub struct WebhookEvent {
    /// Vendor event type, e.g. `phone.callee_ringing`.
    pub event_type: String,
    /// Event timestamp as sent by the vendor.
    pub event_timestamp: i64,
    /// Account the event belongs to.
    pub account_id: String,
    /// Event body.
    pub payload: Value,
}

impl WebhookEvent {
    /// Creates an event from its parts.
    pub fn new(
        event_type: impl Into<String>,
        event_timestamp: i64,
        account_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            event_timestamp,
            account_id: account_id.into(),
            payload,
        }
    }

    /// Call-log identifier embedded in the payload, if any.
    pub fn call_log_id(&self) -> Option<Cow<'_, str>> {
        self.payload_id("call_log_id")
    }

    /// Call identifier embedded in the payload, if any.
    pub fn call_id(&self) -> Option<Cow<'_, str>> {
        self.payload_id("call_id")
    }

    /// Routing category, `None` for unhandled event types.
    pub fn category(&self) -> Option<EventCategory> {
        EventCategory::from_event_type(&self.event_type)
    }

    /// Deterministic identity used for deduplication.
    ///
    /// Prefers the call-log id, then the call id, then the event timestamp.
    pub fn identity(&self) -> String {
        match self.call_log_id().or_else(|| self.call_id()) {
            Some(id) => format!("{}:{id}", self.event_type),
            None => format!("{}:{}", self.event_type, self.event_timestamp),
        }
    }

    /// Reads an identifier that the vendor may send as a string or a number.
    fn payload_id(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.payload.get(key)? {
            Value::String(value) if !value.is_empty() => Some(Cow::Borrowed(value.as_str())),
            Value::Number(value) => Some(Cow::Owned(value.to_string())),
            _ => None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WireEvent {
    event: String,
    #[serde(default)]
    event_ts: i64,
    #[serde(default)]
    payload: WirePayload,
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct WirePayload {
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    object: Value,
}

impl From<WireEvent> for WebhookEvent {
    fn from(wire: WireEvent) -> Self {
        Self {
            event_type: wire.event,
            event_timestamp: wire.event_ts,
            account_id: wire.payload.account_id,
            payload: wire.payload.object,
        }
    }
}

impl From<WebhookEvent> for WireEvent {
    fn from(event: WebhookEvent) -> Self {
        Self {
            event: event.event_type,
            event_ts: event.event_timestamp,
            payload: WirePayload { account_id: event.account_id, object: event.payload },
        }
    }
}
