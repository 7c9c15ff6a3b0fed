//! Task domain model: a uniquely-named unit of work within a group.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::ports::TaskBody;

/// A guard evaluated before an attempt (`run_if`/`abort_if`).
#[derive(Clone)]
pub enum Predicate {
    /// Evaluated via the task's body (`evaluate_predicate`).
    Closure,
    /// A shell command; exit code zero is truthy.
    ShellCommand(String),
}

/// Where a task's execution is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationTarget {
    /// Resolve `name` via the injected `AgentResolver`.
    AgentName(String),
    /// Connect directly, bypassing the resolver.
    DirectAddress(String),
}

/// A uniquely-named unit of work within a [`crate::domain::models::TaskGroup`].
#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub body: Arc<dyn TaskBody>,
    pub dependencies: Vec<String>,
    pub retries: u32,
    pub timeout: Option<Duration>,
    pub run_if: Option<Predicate>,
    pub abort_if: Option<Predicate>,
    pub delegate_to: Option<DelegationTarget>,
    pub workdir_override: Option<PathBuf>,
    pub effective_user: Option<String>,
    pub params: HashMap<String, String>,
    pub produces: Vec<String>,
    pub consumes: Vec<String>,
}

impl Task {
    #[must_use]
    pub fn new(name: impl Into<String>, body: Arc<dyn TaskBody>) -> Self {
        Self {
            name: name.into(),
            body,
            dependencies: Vec::new(),
            retries: 0,
            timeout: None,
            run_if: None,
            abort_if: None,
            delegate_to: None,
            workdir_override: None,
            effective_user: None,
            params: HashMap::new(),
            produces: Vec::new(),
            consumes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_run_if(mut self, predicate: Predicate) -> Self {
        self.run_if = Some(predicate);
        self
    }

    #[must_use]
    pub fn with_abort_if(mut self, predicate: Predicate) -> Self {
        self.abort_if = Some(predicate);
        self
    }

    #[must_use]
    pub fn with_delegation(mut self, target: DelegationTarget) -> Self {
        self.delegate_to = Some(target);
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_produces(mut self, globs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.produces = globs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_consumes(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.consumes = names.into_iter().map(Into::into).collect();
        self
    }
}
