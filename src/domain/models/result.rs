//! Per-attempt task outcomes.

use std::time::Duration;

use serde::Serialize;

use crate::domain::error::StructuredError;

/// Terminal status of a task that reached the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
    Unchanged,
    DryRun,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Unchanged => "unchanged",
            Self::DryRun => "dry_run",
        }
    }

    /// Statuses that satisfy a dependency gate (a dependent task proceeds).
    /// Only `Success` and `Skipped` qualify; a dependency that finished
    /// `Unchanged`, `Failed`, or `DryRun` causes dependents to be skipped.
    #[must_use]
    pub const fn satisfies_dependency(self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }
}

/// One `TaskResult` is produced per task that reached the runner, even if
/// it was ultimately skipped.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_name: String,
    pub status: TaskStatus,
    pub duration: Duration,
    pub error: Option<StructuredError>,
}

impl TaskResult {
    #[must_use]
    pub const fn new(task_name: String, status: TaskStatus, duration: Duration, error: Option<StructuredError>) -> Self {
        Self { task_name, status, duration, error }
    }
}
