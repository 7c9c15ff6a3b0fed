//! Name-scoped three-state circuit breaker.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::error::{Severity, StructuredError};

const HALF_OPEN_MAX: u32 = 5;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Read-only snapshot of a circuit breaker's state.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
}

/// A circuit breaker guarding a single named dependency.
pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a call is currently allowed. Probing an `Open` breaker past
    /// its reset timeout transitions it to `HalfOpen` as a side effect.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(Duration::MAX, |t| t.elapsed());
                if elapsed > self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => inner.half_open_successes < HALF_OPEN_MAX,
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= HALF_OPEN_MAX {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.max_failures {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Run `f` if the breaker allows it, recording the outcome. Fails fast
    /// with `circuit_breaker_open` if the breaker is not currently allowing
    /// requests.
    pub fn execute<T>(&self, f: impl FnOnce() -> Result<T, StructuredError>) -> Result<T, StructuredError> {
        if !self.allow_request() {
            return Err(StructuredError::new(
                "circuit_breaker_open",
                format!("circuit breaker '{}' is open", self.name),
                Severity::Medium,
            )
            .with_retryable(true));
        }
        match f() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker lock poisoned").state
    }

    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock().expect("circuit breaker lock poisoned");
        CircuitStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("svc", 3, Duration::from_secs(60));
        for _ in 0..2 {
            let _ = breaker.execute::<()>(|| Err(StructuredError::new("x", "boom", Severity::Medium)));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = breaker.execute::<()>(|| Err(StructuredError::new("x", "boom", Severity::Medium)));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn open_blocks_requests_until_timeout() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_millis(30));
        let _ = breaker.execute::<()>(|| Err(StructuredError::new("x", "boom", Severity::Medium)));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
        std::thread::sleep(Duration::from_millis(50));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_millis(10));
        let _ = breaker.execute::<()>(|| Err(StructuredError::new("x", "boom", Severity::Medium)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow_request());
        for _ in 0..HALF_OPEN_MAX {
            let _ = breaker.execute::<()>(|| Ok(()));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_millis(10));
        let _ = breaker.execute::<()>(|| Err(StructuredError::new("x", "boom", Severity::Medium)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow_request());
        let _ = breaker.execute::<()>(|| Err(StructuredError::new("x", "boom again", Severity::Medium)));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn execute_fails_fast_with_circuit_breaker_open_when_not_allowed() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_secs(60));
        let _ = breaker.execute::<()>(|| Err(StructuredError::new("x", "boom", Severity::Medium)));
        let result = breaker.execute(|| Ok(()));
        let err = result.unwrap_err();
        assert_eq!(err.code, "circuit_breaker_open");
        assert!(err.is_retryable());
    }
}
