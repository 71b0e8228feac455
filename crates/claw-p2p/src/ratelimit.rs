//! Anti-spam (§4.9): issuers are rate-limited by nonce-advance rate per
//! wall-clock window and by bytes; events with manifestly future
//! timestamps are delayed, not rejected.

use std::collections::HashMap;

use claw_core::constants::{
    MAX_FUTURE_TS_SKEW_MS, RATE_LIMIT_MAX_BYTES_PER_WINDOW, RATE_LIMIT_MAX_EVENTS_PER_WINDOW,
    RATE_LIMIT_WINDOW_SECS,
};
use claw_core::error::ClawError;
use claw_core::types::{Did, Timestamp};

struct Window {
    started_at: Timestamp,
    events: u32,
    bytes: u64,
}

/// Per-issuer sliding-window counters for events and bytes observed over
/// gossip. Distinct from the validation pipeline's nonce-ordering buffer —
/// this is a pure volume cap, independent of whether events are in order.
#[derive(Default)]
pub struct IssuerRateLimiter {
    windows: HashMap<Did, Window>,
}

impl IssuerRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event of `event_bytes` length from `issuer` at `now`,
    /// resetting the window if it has elapsed. Returns `RateLimited` if
    /// either the event-count or byte budget for the current window is
    /// exceeded.
    pub fn check_and_record(&mut self, issuer: &Did, now: Timestamp, event_bytes: u64) -> Result<(), ClawError> {
        let window = self.windows.entry(issuer.clone()).or_insert_with(|| Window {
            started_at: now,
            events: 0,
            bytes: 0,
        });

        if now - window.started_at >= RATE_LIMIT_WINDOW_SECS * 1000 {
            window.started_at = now;
            window.events = 0;
            window.bytes = 0;
        }

        if window.events >= RATE_LIMIT_MAX_EVENTS_PER_WINDOW || window.bytes + event_bytes > RATE_LIMIT_MAX_BYTES_PER_WINDOW {
            return Err(ClawError::RateLimited(issuer.0.clone()));
        }

        window.events += 1;
        window.bytes += event_bytes;
        Ok(())
    }
}

/// Whether `ts` is far enough ahead of `now` that the event should be
/// delayed rather than processed immediately (§4.9).
pub fn is_future_skewed(ts: Timestamp, now: Timestamp) -> bool {
    ts - now > MAX_FUTURE_TS_SKEW_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_within_budget_are_accepted() {
        let mut rl = IssuerRateLimiter::new();
        let issuer = Did("did:claw:ztest".into());
        for _ in 0..RATE_LIMIT_MAX_EVENTS_PER_WINDOW {
            rl.check_and_record(&issuer, 1_000, 10).unwrap();
        }
        assert!(rl.check_and_record(&issuer, 1_000, 10).is_err());
    }

    #[test]
    fn window_resets_after_elapsing() {
        let mut rl = IssuerRateLimiter::new();
        let issuer = Did("did:claw:ztest".into());
        for _ in 0..RATE_LIMIT_MAX_EVENTS_PER_WINDOW {
            rl.check_and_record(&issuer, 1_000, 10).unwrap();
        }
        let later = 1_000 + RATE_LIMIT_WINDOW_SECS * 1000 + 1;
        assert!(rl.check_and_record(&issuer, later, 10).is_ok());
    }

    #[test]
    fn byte_budget_is_enforced() {
        let mut rl = IssuerRateLimiter::new();
        let issuer = Did("did:claw:ztest".into());
        assert!(rl.check_and_record(&issuer, 1_000, RATE_LIMIT_MAX_BYTES_PER_WINDOW + 1).is_err());
    }

    #[test]
    fn far_future_timestamp_is_flagged() {
        assert!(is_future_skewed(100_000, 1_000));
        assert!(!is_future_skewed(1_500, 1_000));
    }
}
