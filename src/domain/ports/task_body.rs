//! The seam between the runner and whatever evaluates a task's actual work.
//!
//! The embedded scripting host, native-closure bodies, and agent-side
//! evaluation are all concrete implementations of the same trait; the
//! runner knows only this interface.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::error::StructuredError;
use crate::domain::models::SharedSession;

/// Which hook point is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    PreExec,
    PostExec,
    OnSuccess,
    OnFailure,
}

/// Everything a task body needs to evaluate a predicate, run the command,
/// or run a hook: the injected keys plus the user's parameter map, the
/// outputs of this task's dependencies, and the group's shared session for
/// cooperative state that doesn't flow along an explicit dependency edge.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_name: String,
    pub group_name: String,
    pub workdir: std::path::PathBuf,
    pub params: HashMap<String, String>,
    pub dependency_outputs: HashMap<String, TaskOutput>,
    pub session: Arc<SharedSession>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            task_name: String::new(),
            group_name: String::new(),
            workdir: std::path::PathBuf::new(),
            params: HashMap::new(),
            dependency_outputs: HashMap::new(),
            session: Arc::new(SharedSession::new(std::path::PathBuf::new())),
        }
    }
}

/// The typed output a task body produces. `changed = false` is the signal
/// the runner treats as an idempotent no-op (`TaskStatus::Unchanged`).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TaskOutput {
    pub changed: bool,
    pub details: HashMap<String, Value>,
}

impl TaskOutput {
    #[must_use]
    pub fn changed() -> Self {
        Self { changed: true, details: HashMap::new() }
    }

    #[must_use]
    pub fn unchanged() -> Self {
        Self { changed: false, details: HashMap::new() }
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// The result of a hook invocation: success flag, human message, and
/// whatever output table the hook wants folded into the task's output.
pub type HookResult = (bool, String, TaskOutput);

/// The seam a task's actual behaviour is implemented against.
pub trait TaskBody: Send + Sync {
    /// Evaluate a predicate (`run_if`/`abort_if`) against the context.
    fn evaluate_predicate(&self, ctx: &TaskContext) -> Result<bool, StructuredError>;

    /// Run the task's command.
    fn run_command(&self, ctx: &TaskContext) -> Result<TaskOutput, StructuredError>;

    /// Run one of the task's hooks, if present. Absent hooks are treated as
    /// an automatic success with no output.
    fn run_hook(&self, kind: HookKind, ctx: &TaskContext) -> Result<HookResult, StructuredError>;
}

type PredicateFn = dyn Fn(&TaskContext) -> Result<bool, StructuredError> + Send + Sync;
type CommandFn = dyn Fn(&TaskContext) -> Result<TaskOutput, StructuredError> + Send + Sync;
type HookFn = dyn Fn(&TaskContext) -> Result<HookResult, StructuredError> + Send + Sync;

/// A [`TaskBody`] built from plain Rust closures, for embedding tasks
/// directly in host code instead of routing through a scripting host or a
/// remote agent. Hooks and the predicate default to an automatic pass.
pub struct ClosureTaskBody {
    command: Box<CommandFn>,
    predicate: Option<Box<PredicateFn>>,
    hooks: HashMap<HookKind, Box<HookFn>>,
}

impl ClosureTaskBody {
    pub fn new(command: impl Fn(&TaskContext) -> Result<TaskOutput, StructuredError> + Send + Sync + 'static) -> Self {
        Self { command: Box::new(command), predicate: None, hooks: HashMap::new() }
    }

    #[must_use]
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&TaskContext) -> Result<bool, StructuredError> + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub fn with_hook(
        mut self,
        kind: HookKind,
        hook: impl Fn(&TaskContext) -> Result<HookResult, StructuredError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(kind, Box::new(hook));
        self
    }
}

impl TaskBody for ClosureTaskBody {
    fn evaluate_predicate(&self, ctx: &TaskContext) -> Result<bool, StructuredError> {
        self.predicate.as_ref().map_or(Ok(true), |predicate| predicate(ctx))
    }

    fn run_command(&self, ctx: &TaskContext) -> Result<TaskOutput, StructuredError> {
        (self.command)(ctx)
    }

    fn run_hook(&self, kind: HookKind, ctx: &TaskContext) -> Result<HookResult, StructuredError> {
        self.hooks.get(&kind).map_or_else(|| Ok((true, String::new(), TaskOutput::default())), |hook| hook(ctx))
    }
}

#[cfg(test)]
mod closure_body_tests {
    use super::*;

    #[test]
    fn runs_command_closure() {
        let body = ClosureTaskBody::new(|_ctx| Ok(TaskOutput::changed().with_detail("ran", true)));
        let output = body.run_command(&TaskContext::default()).unwrap();
        assert!(output.changed);
        assert_eq!(output.details.get("ran"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn missing_predicate_defaults_to_true() {
        let body = ClosureTaskBody::new(|_ctx| Ok(TaskOutput::unchanged()));
        assert!(body.evaluate_predicate(&TaskContext::default()).unwrap());
    }

    #[test]
    fn predicate_closure_is_honoured() {
        let body = ClosureTaskBody::new(|_ctx| Ok(TaskOutput::unchanged())).with_predicate(|_ctx| Ok(false));
        assert!(!body.evaluate_predicate(&TaskContext::default()).unwrap());
    }

    #[test]
    fn missing_hook_defaults_to_automatic_success() {
        let body = ClosureTaskBody::new(|_ctx| Ok(TaskOutput::unchanged()));
        let (ok, _, _) = body.run_hook(HookKind::PreExec, &TaskContext::default()).unwrap();
        assert!(ok);
    }

    #[test]
    fn registered_hook_runs() {
        let body = ClosureTaskBody::new(|_ctx| Ok(TaskOutput::unchanged()))
            .with_hook(HookKind::PostExec, |_ctx| Ok((false, "rejected".to_string(), TaskOutput::default())));
        let (ok, message, _) = body.run_hook(HookKind::PostExec, &TaskContext::default()).unwrap();
        assert!(!ok);
        assert_eq!(message, "rejected");
    }
}
