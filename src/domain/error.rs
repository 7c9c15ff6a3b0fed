//! Structured error model.
//!
//! Every failure that crosses a component boundary in this crate is a
//! [`StructuredError`]: a stable code, a human message, a severity, a
//! retryability verdict, an optional cause chain, and a free-form details
//! bag. Severity and retryability can be inferred from a message when the
//! caller does not know them up front (e.g. text coming back from a shell
//! predicate or an agent's stdout).

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity classification for a [`StructuredError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Words whose presence in a message forces `is_retryable` to `false`,
/// regardless of any other signal.
const NON_RETRYABLE_WORDS: &[&str] = &[
    "permission denied",
    "unauthorized",
    "forbidden",
    "not found",
    "invalid argument",
    "bad request",
    "conflict",
];

/// Words whose presence in a message forces `is_retryable` to `true`.
const RETRYABLE_WORDS: &[&str] = &[
    "timeout",
    "connection refused",
    "connection reset",
    "temporary failure",
    "service unavailable",
    "too many requests",
    "internal server error",
    "bad gateway",
    "gateway timeout",
];

/// Classify the severity of a raw message using the taxonomy's text-match
/// rules. A `None` message (no error at all) classifies as [`Severity::Low`].
#[must_use]
pub fn classify(message: Option<&str>) -> Severity {
    let Some(message) = message else {
        return Severity::Low;
    };
    let lower = message.to_lowercase();
    if ["panic", "fatal", "deadlock"].iter().any(|w| lower.contains(w)) {
        Severity::Critical
    } else if ["timeout", "connection refused", "permission denied", "not found"]
        .iter()
        .any(|w| lower.contains(w))
    {
        Severity::High
    } else if ["invalid", "failed to", "cannot"].iter().any(|w| lower.contains(w)) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// A structured, chainable error with stable code, severity and
/// retryability classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub retryable: Option<bool>,
    pub cause: Option<Box<StructuredError>>,
    pub context: Option<String>,
    pub details: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub stack: String,
}

impl StructuredError {
    /// Construct a new error, capturing the current stack.
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            retryable: None,
            cause: None,
            context: None,
            details: HashMap::new(),
            timestamp: Utc::now(),
            stack: Backtrace::force_capture().to_string(),
        }
    }

    /// Construct an error from a raw message, inferring severity and
    /// retryability via [`classify`] and [`infer_retryable`].
    pub fn from_message(code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let severity = classify(Some(&message));
        let retryable = infer_retryable(&message);
        Self::new(code, message, severity).with_retryable(retryable)
    }

    #[must_use]
    pub fn with_cause(mut self, cause: StructuredError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub const fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// The cause chain, innermost error last.
    pub fn unwrap_cause(&self) -> Option<&StructuredError> {
        self.cause.as_deref()
    }

    /// Whether the operation that produced this error should be retried.
    ///
    /// An explicit `retryable` flag always wins; otherwise the message is
    /// matched against the non-retryable and retryable wordlists, in that
    /// order, defaulting to `false`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if let Some(flag) = self.retryable {
            return flag;
        }
        infer_retryable(&self.message)
    }
}

fn infer_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    if NON_RETRYABLE_WORDS.iter().any(|w| lower.contains(w)) {
        return false;
    }
    if RETRYABLE_WORDS.iter().any(|w| lower.contains(w)) {
        return true;
    }
    false
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(context) = &self.context {
            write!(f, " (context: {context})")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " caused by: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StructuredError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// A bounded ring buffer of recent errors. Oldest entries are dropped once
/// capacity is exceeded. Thread-safe.
pub struct ErrorCollector {
    capacity: usize,
    errors: std::sync::RwLock<std::collections::VecDeque<StructuredError>>,
}

impl ErrorCollector {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            errors: std::sync::RwLock::new(std::collections::VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, error: StructuredError) {
        let mut errors = self.errors.write().expect("error collector lock poisoned");
        if errors.len() >= self.capacity {
            errors.pop_front();
        }
        errors.push_back(error);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.read().expect("error collector lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All currently retained errors, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StructuredError> {
        self.errors.read().expect("error collector lock poisoned").iter().cloned().collect()
    }

    #[must_use]
    pub fn filter_by_severity(&self, min_severity: Severity) -> Vec<StructuredError> {
        self.snapshot().into_iter().filter(|e| e.severity >= min_severity).collect()
    }

    pub fn clear(&self) {
        self.errors.write().expect("error collector lock poisoned").clear();
    }

    /// Drop the oldest half of the retained errors, keeping the capacity
    /// tracking intact. Used by the housekeeping loop to trim an overfull
    /// collector without fully clearing it.
    pub fn trim_to_half(&self) {
        let mut errors = self.errors.write().expect("error collector lock poisoned");
        let target = errors.len() / 2;
        while errors.len() > target {
            errors.pop_front();
        }
    }
}

/// An unbounded accumulator of errors for a single run, reduced to a
/// single aggregate [`StructuredError`] at the end.
#[derive(Default)]
pub struct ErrorAggregator {
    errors: Vec<StructuredError>,
}

impl ErrorAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: StructuredError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[StructuredError] {
        &self.errors
    }

    /// Reduce the accumulated errors into a single aggregate error:
    /// `None` if empty, the sole error if there is exactly one, otherwise a
    /// new error at the highest severity seen, whose message concatenates
    /// every constituent message with `; ` and whose details carry
    /// `error_count`.
    #[must_use]
    pub fn to_error(&self) -> Option<StructuredError> {
        match self.errors.len() {
            0 => None,
            1 => Some(self.errors[0].clone()),
            _ => {
                let severity = self
                    .errors
                    .iter()
                    .map(|e| e.severity)
                    .max()
                    .unwrap_or(Severity::Critical);
                let message = self
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                Some(
                    StructuredError::new("aggregate_error", message, severity)
                        .with_detail("error_count", self.errors.len() as u64),
                )
            }
        }
    }
}
