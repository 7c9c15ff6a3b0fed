//! Token-bucket rate limiter.
//!
//! Refill happens in full floating-point precision (fractional seconds), so
//! sub-second intervals still accrue a proportional fraction of a token
//! instead of being rounded away.

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct State {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket: `rate` tokens accrue per second up to `capacity`.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(state: &mut State, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(capacity);
        state.last_refill = now;
    }

    /// Try to consume a single token.
    pub fn allow(&self) -> bool {
        self.allow_n(1.0)
    }

    /// Try to consume `n` tokens atomically.
    pub fn allow_n(&self, n: f64) -> bool {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        Self::refill(&mut state, self.rate, self.capacity);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Current token count, after refilling.
    pub fn tokens(&self) -> f64 {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        Self::refill(&mut state, self.rate, self.capacity);
        state.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn starts_full_and_allows_up_to_capacity() {
        let limiter = RateLimiter::new(1.0, 5.0);
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(100.0, 1.0);
        assert!(limiter.allow());
        assert!(!limiter.allow());
        sleep(Duration::from_millis(20));
        assert!(limiter.allow());
    }

    #[test]
    fn allow_n_consumes_multiple_tokens() {
        let limiter = RateLimiter::new(1.0, 10.0);
        assert!(limiter.allow_n(5.0));
        assert!(limiter.allow_n(5.0));
        assert!(!limiter.allow_n(1.0));
    }

    #[test]
    fn tokens_reports_refilled_value_without_consuming() {
        let limiter = RateLimiter::new(1.0, 5.0);
        limiter.allow_n(5.0);
        assert!((limiter.tokens() - 0.0).abs() < 0.01);
    }

    #[test]
    fn over_a_window_at_most_capacity_plus_rate_times_window_succeed() {
        // Testable property 7: over window T starting full with capacity C,
        // at most C + floor(T*rate) allow() calls succeed.
        let rate = 50.0;
        let capacity = 5.0;
        let limiter = RateLimiter::new(rate, capacity);
        let window = Duration::from_millis(100);
        let start = Instant::now();
        let mut successes = 0u64;
        while start.elapsed() < window {
            if limiter.allow() {
                successes += 1;
            }
        }
        let bound = capacity + (window.as_secs_f64() * rate).floor();
        assert!(
            (successes as f64) <= bound + 1.0,
            "successes={successes} bound={bound}"
        );
    }
}
