#![no_main]

//! Fuzz target for webhook event parsing.
//!
//! Arbitrary bodies must either fail to parse or yield an event whose
//! identity is prefixed by its event type.

use libfuzzer_sys::fuzz_target;
use phonelink_core::WebhookEvent;

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = serde_json::from_slice::<WebhookEvent>(data) {
        let identity = event.identity();
        assert!(identity.starts_with(&event.event_type));
        let _ = event.category();
        let _ = serde_json::to_vec(&event);
    }
});
