//! Task group domain model: a named bundle of tasks sharing a workdir policy.

use std::path::PathBuf;
use std::sync::Arc;

use super::result::TaskResult;
use super::task::{DelegationTarget, Task};

/// How a group's workdir is materialised before the run.
#[derive(Debug, Clone)]
pub enum WorkdirPolicy {
    /// Use this path as-is; never removed automatically.
    Fixed(PathBuf),
    /// Remove the path if it exists, then create it fresh.
    CreateFresh(PathBuf),
    /// A fresh temporary directory, removed at group end.
    Ephemeral,
}

/// The aggregate outcome of a group run, handed to the cleanup predicate.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub success: bool,
    pub error: Option<crate::domain::error::StructuredError>,
    pub results: Vec<TaskResult>,
}

/// A predicate deciding whether to remove the group's workdir after a run.
pub type CleanupPredicate = Arc<dyn Fn(&GroupOutcome) -> bool + Send + Sync>;

/// A named bundle of tasks with a shared workdir policy and delegation
/// default.
#[derive(Clone)]
pub struct TaskGroup {
    pub name: String,
    pub description: Option<String>,
    pub tasks: Vec<Task>,
    pub delegate_default: Option<DelegationTarget>,
    pub workdir_policy: WorkdirPolicy,
    pub cleanup_predicate: Option<CleanupPredicate>,
}

impl TaskGroup {
    #[must_use]
    pub fn new(name: impl Into<String>, workdir_policy: WorkdirPolicy) -> Self {
        Self {
            name: name.into(),
            description: None,
            tasks: Vec::new(),
            delegate_default: None,
            workdir_policy,
            cleanup_predicate: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks = tasks.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_delegate_default(mut self, target: DelegationTarget) -> Self {
        self.delegate_default = Some(target);
        self
    }

    #[must_use]
    pub fn with_cleanup_predicate(mut self, predicate: CleanupPredicate) -> Self {
        self.cleanup_predicate = Some(predicate);
        self
    }

    #[must_use]
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
