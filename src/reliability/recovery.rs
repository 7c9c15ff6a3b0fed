//! Panic-trapping recovery envelope.
//!
//! `safe_execute` is the single seam every task body and agent call passes
//! through before its result reaches the error collector: it turns a panic
//! into a `Critical` structured error instead of unwinding past the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use crate::domain::error::{Severity, StructuredError};

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `f`, trapping any panic. Returns `(recovered, error)`:
/// - `f` panics: `(true, Some(Critical "panic_recovered" error))`.
/// - `f` returns `Err`: `(false, Some(error))`.
/// - `f` returns `Ok`: `(false, None)`.
pub fn safe_execute<F>(f: F) -> (bool, Option<StructuredError>)
where
    F: FnOnce() -> Result<(), StructuredError> + std::panic::UnwindSafe,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => (false, None),
        Ok(Err(err)) => (false, Some(err)),
        Err(panic) => {
            let detail = panic_payload_to_string(&panic);
            error!(panic = %detail, "recovered from panic in safe_execute");
            let err = StructuredError::new("panic_recovered", "task panicked", Severity::Critical)
                .with_detail("panic", detail)
                .with_retryable(false);
            (true, Some(err))
        }
    }
}

/// Launch `f` on its own tokio task with the same panic trap, fire-and-forget.
/// Any panic or error is logged but not propagated to the caller.
pub fn safe_go<F>(f: F)
where
    F: FnOnce() -> Result<(), StructuredError> + std::panic::UnwindSafe + Send + 'static,
{
    tokio::spawn(async move {
        let (recovered, err) = safe_execute(f);
        if let Some(err) = err {
            error!(recovered, code = %err.code, message = %err.message, "safe_go task failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_passes_through_untouched() {
        let (recovered, err) = safe_execute(|| Ok(()));
        assert!(!recovered);
        assert!(err.is_none());
    }

    #[test]
    fn error_passes_through_untouched() {
        let (recovered, err) = safe_execute(|| {
            Err(StructuredError::new("boom", "bad", Severity::High))
        });
        assert!(!recovered);
        assert_eq!(err.unwrap().code, "boom");
    }

    #[test]
    fn panic_is_converted_to_critical_error() {
        let (recovered, err) = safe_execute(|| -> Result<(), StructuredError> {
            panic!("kaboom");
        });
        assert!(recovered);
        let err = err.unwrap();
        assert_eq!(err.code, "panic_recovered");
        assert_eq!(err.severity, Severity::Critical);
        assert_eq!(err.details.get("panic").unwrap(), "kaboom");
    }

    #[tokio::test]
    async fn safe_go_does_not_propagate_panics() {
        safe_go(|| -> Result<(), StructuredError> { panic!("async kaboom") });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
