//! Per-user rate limiting for conversation requests
//!
//! Prevents a single user from flooding the bot with generation
//! requests, each of which costs a remote inference call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

/// Sliding-window rate limiter keyed by user ID.
///
/// Each user gets an ascending list of accepted request instants.
/// Timestamps older than the window are pruned from the front on
/// every check, so the list never holds more than `max_requests`
/// entries plus the one being considered.
pub struct RateLimiter {
    /// User ID -> accepted request instants, ascending
    windows: Mutex<HashMap<Id<UserMarker>, Vec<Instant>>>,
    window: Duration,
    max_requests: usize,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `window` - Length of the sliding window
    /// * `max_requests` - Maximum accepted requests per window per user
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    /// Check whether a request at `now` is allowed for the given user.
    ///
    /// Accepting records `now` against the user's window; rejecting
    /// leaves the window untouched. Callers must supply non-decreasing
    /// instants per user, otherwise old entries may outlive the window.
    pub fn allow(&self, user_id: Id<UserMarker>, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let timestamps = windows.entry(user_id).or_default();

        if let Some(cutoff) = now.checked_sub(self.window) {
            let expired = timestamps.iter().take_while(|&&t| t < cutoff).count();
            timestamps.drain(..expired);
        }

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64) -> Id<UserMarker> {
        Id::new(id)
    }

    #[test]
    fn test_allows_within_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 5);
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow(user(1), now));
        }
    }

    #[test]
    fn test_blocks_over_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        let now = Instant::now();

        assert!(limiter.allow(user(1), now));
        assert!(limiter.allow(user(1), now));
        assert!(!limiter.allow(user(1), now));
    }

    #[test]
    fn test_window_slides_past_old_requests() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();

        assert!(limiter.allow(user(1), t0));
        assert!(limiter.allow(user(1), t0 + Duration::from_secs(10)));
        assert!(!limiter.allow(user(1), t0 + Duration::from_secs(20)));
        // t0 has fallen out of the trailing 60s window by t0+61
        assert!(limiter.allow(user(1), t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_rejection_does_not_consume_quota() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let t0 = Instant::now();

        assert!(limiter.allow(user(1), t0));
        // Rejected attempts must not extend the window
        for i in 1..10 {
            assert!(!limiter.allow(user(1), t0 + Duration::from_secs(i)));
        }
        assert!(limiter.allow(user(1), t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_separate_users() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert!(limiter.allow(user(1), now));
        assert!(limiter.allow(user(2), now));
        assert!(!limiter.allow(user(1), now));
        assert!(!limiter.allow(user(2), now));
    }

    #[test]
    fn test_zero_max_requests_rejects_everything() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 0);
        assert!(!limiter.allow(user(1), Instant::now()));
    }
}
