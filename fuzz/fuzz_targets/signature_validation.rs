#![no_main]

//! Fuzz target for webhook signature verification.
//!
//! Splits the input into secret, signature header, timestamp header and body
//! and checks that verification never panics and never accepts a signature
//! that was not produced with the same secret, timestamp and body.

use libfuzzer_sys::fuzz_target;
use phonelink_api::crypto::{compute_signature, verify_request, SignatureError};

const NOW: i64 = 1_700_000_000;

fuzz_target!(|data: &[u8]| {
    let mut parts = data.splitn(4, |b| *b == b'\n');
    let secret = String::from_utf8_lossy(parts.next().unwrap_or_default()).into_owned();
    let signature = String::from_utf8_lossy(parts.next().unwrap_or_default()).into_owned();
    let timestamp = String::from_utf8_lossy(parts.next().unwrap_or_default()).into_owned();
    let body = parts.next().unwrap_or_default();

    let result = verify_request(&secret, Some(&signature), Some(&timestamp), body, NOW);
    if result.is_ok() {
        let expected = compute_signature(&secret, &timestamp, body).expect("verified secret is usable");
        assert_eq!(signature, expected);
    }

    // A freshly computed signature always verifies inside the window.
    let fresh_ts = NOW.to_string();
    match compute_signature(&secret, &fresh_ts, body) {
        Ok(fresh) => assert_eq!(verify_request(&secret, Some(&fresh), Some(&fresh_ts), body, NOW), Ok(())),
        Err(e) => assert_eq!(e, SignatureError::InvalidSecret),
    }
});
