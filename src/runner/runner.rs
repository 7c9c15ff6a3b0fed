//! The task runner: per-group workdir materialisation, schedule
//! resolution, per-task retries with backoff, local/remote dispatch and
//! artifact hand-off.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::agent::{AgentClient, AgentPayload};
use crate::core::GlobalCore;
use crate::dag;
use crate::domain::error::{Severity, StructuredError};
use crate::domain::models::{
    DelegationTarget, GroupOutcome, Predicate, SharedSession, Task, TaskGroup, TaskResult, TaskStatus, WorkdirPolicy,
};
use crate::domain::ports::{HookKind, TaskBody, TaskContext, TaskOutput};
use crate::transport;

use super::artifacts::{consume_artifact, produce_artifacts};
use super::summary::{aggregate_error, render_summary};

/// One of the four choices an interactive operator can make before a task
/// runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    Run,
    Skip,
    Abort,
    Continue,
}

/// Injected by the host application to ask an operator whether a task
/// should run. Absent a handler, every task runs without prompting.
pub trait PromptHandler: Send + Sync {
    fn ask(&self, group_name: &str, task_name: &str) -> PromptDecision;
}

/// The outcome of a run across every selected group.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcomes: Vec<GroupOutcome>,
    pub table: String,
    pub error: Option<StructuredError>,
}

#[derive(Default)]
struct RunState {
    results: Vec<TaskResult>,
    outputs: HashMap<String, TaskOutput>,
    statuses: HashMap<String, TaskStatus>,
    running: HashSet<String>,
}

/// What execute-with-retries produced for one task, before the caller
/// decides the final [`TaskStatus`].
enum AttemptOutcome {
    Completed { output: TaskOutput },
    Skipped,
}

/// Drives group/task scheduling. One instance is reused across a whole
/// run (all selected groups); per-run state is reset at the start of each
/// group, since dependency names only have meaning within a single group.
pub struct TaskRunner {
    core: Arc<GlobalCore>,
    agent_client: AgentClient,
    prompt: Option<Arc<dyn PromptHandler>>,
    state: std::sync::Mutex<RunState>,
}

impl TaskRunner {
    #[must_use]
    pub fn new(core: Arc<GlobalCore>, agent_client: AgentClient) -> Self {
        Self { core, agent_client, prompt: None, state: std::sync::Mutex::new(RunState::default()) }
    }

    #[must_use]
    pub fn with_prompt_handler(mut self, handler: Arc<dyn PromptHandler>) -> Self {
        self.prompt = Some(handler);
        self
    }

    /// Run every selected group (in order) and return the rendered summary
    /// plus run-level aggregate error.
    ///
    /// # Errors
    /// Propagates a group's DAG-resolution failure (`cyclic_dependency`,
    /// `task_not_found`) or an interactive `aborted_by_user` decision; both
    /// stop the whole run immediately.
    pub async fn run(&self, groups: &[TaskGroup], targets: &[String]) -> Result<RunSummary, StructuredError> {
        let mut outcomes = Vec::with_capacity(groups.len());
        let mut all_results = Vec::new();

        for group in groups {
            let outcome = self.run_group(group, targets).await?;
            all_results.extend(outcome.results.clone());
            outcomes.push(outcome);
        }

        let table = render_summary(&all_results);
        let error = aggregate_error(&all_results);
        Ok(RunSummary { outcomes, table, error })
    }

    /// Run every task in `group` reachable from `targets` (empty = every
    /// task), in dependency order.
    ///
    /// # Errors
    /// `cyclic_dependency` / `task_not_found` from schedule resolution, or
    /// `aborted_by_user` if the interactive prompt handler requests an
    /// abort. Individual task failures are *not* returned here; they are
    /// recorded in the returned [`GroupOutcome`].
    pub async fn run_group(&self, group: &TaskGroup, targets: &[String]) -> Result<GroupOutcome, StructuredError> {
        {
            let mut state = self.state.lock().expect("runner state lock poisoned");
            *state = RunState::default();
        }

        let workdir = materialize_workdir(&group.workdir_policy)?;
        let artifacts_dir = artifacts_directory(&group.name)?;
        let session = Arc::new(SharedSession::new(workdir.clone()));

        let task_map: HashMap<String, Task> = group.tasks.iter().map(|t| (t.name.clone(), t.clone())).collect();
        let schedule = dag::resolve(&task_map, targets)?;

        let mut prompts_disabled = false;

        for task_name in &schedule {
            let task = task_map.get(task_name).expect("scheduled task exists in task map");

            if !self.dependencies_satisfied(task, &task_map) {
                self.record(task_name.clone(), TaskStatus::Skipped, Duration::ZERO, None);
                continue;
            }

            if let Some(handler) = &self.prompt {
                if !prompts_disabled {
                    match handler.ask(&group.name, task_name) {
                        PromptDecision::Skip => {
                            self.record(task_name.clone(), TaskStatus::Skipped, Duration::ZERO, None);
                            continue;
                        }
                        PromptDecision::Abort => {
                            return Err(StructuredError::new(
                                "aborted_by_user",
                                format!("run aborted by user before task '{task_name}'"),
                                Severity::High,
                            )
                            .with_retryable(false));
                        }
                        PromptDecision::Continue => prompts_disabled = true,
                        PromptDecision::Run => {}
                    }
                }
            }

            let task_workdir = match resolve_task_workdir(task, &workdir) {
                Ok(dir) => dir,
                Err(err) => {
                    self.record(task_name.clone(), TaskStatus::Failed, Duration::ZERO, Some(err));
                    continue;
                }
            };

            if let Some(err) = self.consume_artifacts(task, &artifacts_dir, &task_workdir) {
                self.record(task_name.clone(), TaskStatus::Failed, Duration::ZERO, Some(err));
                continue;
            }

            let ctx = TaskContext {
                task_name: task.name.clone(),
                group_name: group.name.clone(),
                workdir: task_workdir.clone(),
                params: task.params.clone(),
                dependency_outputs: self.collect_dependency_outputs(task),
                session: Arc::clone(&session),
            };

            let start = Instant::now();
            let outcome = self.execute_with_retries(group, task, ctx.clone()).await;
            let duration = start.elapsed();

            match outcome {
                Ok(AttemptOutcome::Skipped) => {
                    self.record(task_name.clone(), TaskStatus::Skipped, duration, None);
                }
                Ok(AttemptOutcome::Completed { output }) => {
                    let status = if output.changed { TaskStatus::Success } else { TaskStatus::Unchanged };
                    self.store_output(task_name.clone(), output.clone());
                    self.record(task_name.clone(), status, duration, None);
                    self.fire_on_success(task, &ctx, &output);
                    if let Err(err) = produce_artifacts(&task_workdir, &task.produces, &artifacts_dir) {
                        warn!(task = %task_name, error = %err, "failed to produce artifacts");
                    }
                }
                Err(err) => {
                    self.record(task_name.clone(), TaskStatus::Failed, duration, Some(err.clone()));
                    self.fire_on_failure(task, &ctx, &err);
                }
            }
        }

        let results = self.state.lock().expect("runner state lock poisoned").results.clone();
        let error = aggregate_error(&results);
        let success = error.is_none();
        let outcome = GroupOutcome { success, error, results };

        let should_remove = group.cleanup_predicate.as_ref().map_or_else(
            || !matches!(&group.workdir_policy, WorkdirPolicy::Fixed(_)),
            |predicate| predicate(&outcome),
        );
        if should_remove {
            if let Err(e) = std::fs::remove_dir_all(&workdir) {
                warn!(workdir = %workdir.display(), error = %e, "failed to remove group workdir");
            }
        }

        Ok(outcome)
    }

    /// Fan `tasks` out across the async runtime with no dependency gating,
    /// running each task's local command against a shared `input` table
    /// and joining on every submission before returning. The explicit
    /// counterpart to the sequential, dependency-gated group loop.
    pub async fn run_tasks_parallel(
        &self,
        tasks: &[Task],
        input: &HashMap<String, TaskOutput>,
    ) -> Vec<Result<TaskOutput, StructuredError>> {
        let session = Arc::new(SharedSession::new(std::env::temp_dir()));
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            self.state.lock().expect("runner state lock poisoned").running.insert(task.name.clone());

            let task = task.clone();
            let input = input.clone();
            let session = Arc::clone(&session);
            let handle = tokio::task::spawn_blocking(move || {
                let ctx = TaskContext {
                    task_name: task.name.clone(),
                    group_name: "parallel".to_string(),
                    workdir: std::env::temp_dir(),
                    params: task.params.clone(),
                    dependency_outputs: input,
                    session,
                };
                local_attempt(&task, &ctx)
            });
            handles.push((task.name.clone(), handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| {
                Err(StructuredError::new("panic_recovered", e.to_string(), Severity::Critical).with_retryable(false))
            });
            self.state.lock().expect("runner state lock poisoned").running.remove(&name);
            results.push(result);
        }
        results
    }

    async fn execute_with_retries(
        &self,
        group: &TaskGroup,
        task: &Task,
        ctx: TaskContext,
    ) -> Result<AttemptOutcome, StructuredError> {
        let context_tag = format!("task_{}_{}", group.name, task.name);
        let envelope = Arc::clone(&self.core);
        let core = Arc::clone(&self.core);
        let agent_client = &self.agent_client;
        let mut task = task.clone();
        if task.delegate_to.is_none() {
            task.delegate_to = group.delegate_default.clone();
        }

        envelope.execute_with_recovery_async(
            async move {
                if let Some(predicate) = &task.abort_if {
                    if evaluate_predicate(predicate, &task.body, &ctx).await? {
                        return Err(StructuredError::new(
                            "aborted_by_predicate",
                            format!("abort_if matched for task '{}'", task.name),
                            Severity::High,
                        )
                        .with_retryable(false));
                    }
                }

                if let Some(predicate) = &task.run_if {
                    if !evaluate_predicate(predicate, &task.body, &ctx).await? {
                        return Ok(AttemptOutcome::Skipped);
                    }
                }

                let mut last_err: Option<StructuredError> = None;
                for attempt in 0..=task.retries {
                    if attempt > 0 {
                        let backoff = if attempt <= 3 {
                            Duration::from_secs(u64::from(attempt))
                        } else {
                            Duration::from_secs(u64::from(attempt) * u64::from(attempt))
                        };
                        warn!(task = %task.name, attempt, backoff_secs = backoff.as_secs(), "retrying task");
                        tokio::time::sleep(backoff).await;
                    }

                    let timeout_dur = task.timeout.unwrap_or_else(|| core.config().timeouts.default_task_timeout());
                    let budget = core.config().timeouts.agent_call_budget();

                    let outcome = tokio::time::timeout(timeout_dur, single_attempt(agent_client, &task, &ctx, budget)).await;
                    match outcome {
                        Ok(Ok(output)) => return Ok(AttemptOutcome::Completed { output }),
                        Ok(Err(err)) => last_err = Some(err),
                        Err(_) => {
                            last_err = Some(
                                StructuredError::new(
                                    "timeout_exceeded",
                                    format!("task '{}' exceeded {}s", task.name, timeout_dur.as_secs()),
                                    Severity::High,
                                )
                                .with_retryable(true),
                            );
                        }
                    }
                }

                Err(last_err
                    .unwrap_or_else(|| StructuredError::new("task_failed", "task failed with no recorded error", Severity::High)))
            },
            &context_tag,
        )
        .await
    }

    fn dependencies_satisfied(&self, task: &Task, task_map: &HashMap<String, Task>) -> bool {
        let state = self.state.lock().expect("runner state lock poisoned");
        task.dependencies.iter().all(|dep| {
            if !task_map.contains_key(dep) {
                return true;
            }
            state.statuses.get(dep).is_some_and(|status| status.satisfies_dependency())
        })
    }

    fn collect_dependency_outputs(&self, task: &Task) -> HashMap<String, TaskOutput> {
        let state = self.state.lock().expect("runner state lock poisoned");
        task.dependencies.iter().filter_map(|dep| state.outputs.get(dep).map(|o| (dep.clone(), o.clone()))).collect()
    }

    fn consume_artifacts(&self, task: &Task, artifacts_dir: &Path, workdir: &Path) -> Option<StructuredError> {
        for name in &task.consumes {
            if let Err(err) = consume_artifact(artifacts_dir, name, workdir) {
                return Some(err);
            }
        }
        None
    }

    fn record(&self, task_name: String, status: TaskStatus, duration: Duration, error: Option<StructuredError>) {
        let mut state = self.state.lock().expect("runner state lock poisoned");
        state.statuses.insert(task_name.clone(), status);
        state.results.push(TaskResult::new(task_name, status, duration, error));
    }

    fn store_output(&self, task_name: String, output: TaskOutput) {
        self.state.lock().expect("runner state lock poisoned").outputs.insert(task_name, output);
    }

    /// Invoke `on_success` with this task's own output folded into the
    /// dependency-output table under its own name, per the convention a
    /// hook uses to read "what I just produced".
    fn fire_on_success(&self, task: &Task, ctx: &TaskContext, output: &TaskOutput) {
        let mut hook_ctx = ctx.clone();
        hook_ctx.dependency_outputs.insert(task.name.clone(), output.clone());
        if let Err(err) = task.body.run_hook(HookKind::OnSuccess, &hook_ctx) {
            warn!(task = %task.name, error = %err, "on_success hook failed");
        }
    }

    /// Invoke `on_failure` with the error folded into the param map under
    /// `error_code`/`error_message`.
    fn fire_on_failure(&self, task: &Task, ctx: &TaskContext, error: &StructuredError) {
        let mut hook_ctx = ctx.clone();
        hook_ctx.params.insert("error_code".to_string(), error.code.clone());
        hook_ctx.params.insert("error_message".to_string(), error.message.clone());
        if let Err(err) = task.body.run_hook(HookKind::OnFailure, &hook_ctx) {
            warn!(task = %task.name, error = %err, "on_failure hook failed");
        }
    }
}

async fn evaluate_predicate(predicate: &Predicate, body: &Arc<dyn TaskBody>, ctx: &TaskContext) -> Result<bool, StructuredError> {
    match predicate {
        Predicate::Closure => body.evaluate_predicate(ctx),
        Predicate::ShellCommand(command) => {
            let status = tokio::process::Command::new("bash")
                .arg("-c")
                .arg(command)
                .current_dir(&ctx.workdir)
                .status()
                .await
                .map_err(|e| {
                    StructuredError::new("predicate_exec_failed", e.to_string(), Severity::High).with_retryable(false)
                })?;
            Ok(status.success())
        }
    }
}

async fn single_attempt(
    agent_client: &AgentClient,
    task: &Task,
    ctx: &TaskContext,
    budget: Duration,
) -> Result<TaskOutput, StructuredError> {
    match &task.delegate_to {
        Some(target) => remote_attempt(agent_client, target, task, ctx, budget).await,
        None => local_attempt(task, ctx),
    }
}

/// Local single attempt: a fresh context per call means nothing leaks
/// between attempts. `pre_exec` -> command -> `post_exec`, in order.
fn local_attempt(task: &Task, ctx: &TaskContext) -> Result<TaskOutput, StructuredError> {
    let (ok, message, _) = task.body.run_hook(HookKind::PreExec, ctx)?;
    if !ok {
        return Err(StructuredError::new("task_failed", message, Severity::High));
    }

    let mut output = task.body.run_command(ctx)?;

    let (ok, message, hook_output) = task.body.run_hook(HookKind::PostExec, ctx)?;
    if !ok {
        return Err(StructuredError::new("task_failed", message, Severity::High));
    }
    output.details.extend(hook_output.details);

    Ok(output)
}

/// Remote single attempt: archive the workdir, ship it plus the task's
/// self-contained manifest to the resolved agent address, then extract the
/// returned workspace back over the workdir. No local hooks run here; they
/// run agent-side.
async fn remote_attempt(
    agent_client: &AgentClient,
    target: &DelegationTarget,
    task: &Task,
    ctx: &TaskContext,
    budget: Duration,
) -> Result<TaskOutput, StructuredError> {
    let address = match target {
        DelegationTarget::AgentName(name) => agent_client.resolve(name)?,
        DelegationTarget::DirectAddress(address) => agent_client.resolve(address)?,
    };

    let workspace = transport::archive(&ctx.workdir)?;
    let manifest = serialize_task_manifest(task, ctx)?;

    let payload = AgentPayload {
        task_name: task.name.clone(),
        group_name: ctx.group_name.clone(),
        serialized_script: manifest,
        workspace,
        effective_user: task.effective_user.clone().unwrap_or_default(),
    };

    let output_text = agent_client.execute_on_agent(&address, &payload, budget, &ctx.workdir).await?;
    Ok(TaskOutput::changed().with_detail("agent_output", output_text))
}

/// The task body itself is a native Rust closure and cannot cross the
/// wire; what ships to the agent is a JSON manifest of the portable parts
/// (name, params, dependency outputs) for the agent's own host to
/// interpret. The wire field is still named `lua_script` for compatibility
/// with the agent protocol's framing, not because this core embeds a
/// scripting language.
fn serialize_task_manifest(task: &Task, ctx: &TaskContext) -> Result<String, StructuredError> {
    let manifest = serde_json::json!({
        "task_name": task.name,
        "group_name": ctx.group_name,
        "params": task.params,
        "produces": task.produces,
        "consumes": task.consumes,
        "dependency_outputs": ctx.dependency_outputs,
    });
    serde_json::to_string(&manifest)
        .map_err(|e| StructuredError::new("manifest_encode_failed", e.to_string(), Severity::High).with_retryable(false))
}

fn materialize_workdir(policy: &WorkdirPolicy) -> Result<PathBuf, StructuredError> {
    match policy {
        WorkdirPolicy::Fixed(path) => {
            std::fs::create_dir_all(path).map_err(workdir_failed)?;
            Ok(path.clone())
        }
        WorkdirPolicy::CreateFresh(path) => {
            if path.exists() {
                std::fs::remove_dir_all(path).map_err(workdir_failed)?;
            }
            std::fs::create_dir_all(path).map_err(workdir_failed)?;
            Ok(path.clone())
        }
        WorkdirPolicy::Ephemeral => {
            let dir = std::env::temp_dir().join(format!("sloth-runner-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).map_err(workdir_failed)?;
            Ok(dir)
        }
    }
}

/// A task's own `workdir_override` takes precedence over the group
/// workdir; materialise it (create if absent) rather than assuming it
/// already exists.
fn resolve_task_workdir(task: &Task, group_workdir: &Path) -> Result<PathBuf, StructuredError> {
    match &task.workdir_override {
        Some(path) => {
            std::fs::create_dir_all(path).map_err(workdir_failed)?;
            Ok(path.clone())
        }
        None => Ok(group_workdir.to_path_buf()),
    }
}

fn workdir_failed(e: std::io::Error) -> StructuredError {
    StructuredError::new("workdir_init_failed", e.to_string(), Severity::High).with_retryable(false)
}

fn artifacts_directory(group_name: &str) -> Result<PathBuf, StructuredError> {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let dir = PathBuf::from("artifacts").join(group_name).join(timestamp);
    std::fs::create_dir_all(&dir).map_err(workdir_failed)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::CoreConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBody {
        attempts_to_fail: usize,
        calls: AtomicUsize,
        changed: bool,
    }

    impl ScriptedBody {
        fn always_succeeds(changed: bool) -> Self {
            Self { attempts_to_fail: 0, calls: AtomicUsize::new(0), changed }
        }

        fn fails_then_succeeds(attempts_to_fail: usize) -> Self {
            Self { attempts_to_fail, calls: AtomicUsize::new(0), changed: true }
        }
    }

    impl TaskBody for ScriptedBody {
        fn evaluate_predicate(&self, _ctx: &TaskContext) -> Result<bool, StructuredError> {
            Ok(true)
        }

        fn run_command(&self, _ctx: &TaskContext) -> Result<TaskOutput, StructuredError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.attempts_to_fail {
                return Err(StructuredError::new("task_failed", "timeout exceeded", Severity::High).with_retryable(true));
            }
            Ok(if self.changed { TaskOutput::changed() } else { TaskOutput::unchanged() })
        }

        fn run_hook(&self, _kind: HookKind, _ctx: &TaskContext) -> Result<crate::domain::ports::HookResult, StructuredError> {
            Ok((true, String::new(), TaskOutput::default()))
        }
    }

    struct WritesFileBody {
        file_name: &'static str,
    }
    impl TaskBody for WritesFileBody {
        fn evaluate_predicate(&self, _ctx: &TaskContext) -> Result<bool, StructuredError> {
            Ok(true)
        }
        fn run_command(&self, ctx: &TaskContext) -> Result<TaskOutput, StructuredError> {
            std::fs::write(ctx.workdir.join(self.file_name), b"hi").expect("write into task workdir");
            Ok(TaskOutput::changed())
        }
        fn run_hook(&self, _kind: HookKind, _ctx: &TaskContext) -> Result<crate::domain::ports::HookResult, StructuredError> {
            Ok((true, String::new(), TaskOutput::default()))
        }
    }

    struct RejectingPreExec;
    impl TaskBody for RejectingPreExec {
        fn evaluate_predicate(&self, _ctx: &TaskContext) -> Result<bool, StructuredError> {
            Ok(true)
        }
        fn run_command(&self, _ctx: &TaskContext) -> Result<TaskOutput, StructuredError> {
            Ok(TaskOutput::changed())
        }
        fn run_hook(&self, kind: HookKind, _ctx: &TaskContext) -> Result<crate::domain::ports::HookResult, StructuredError> {
            if kind == HookKind::PreExec {
                return Ok((false, "pre_exec rejected".to_string(), TaskOutput::default()));
            }
            Ok((true, String::new(), TaskOutput::default()))
        }
    }

    fn test_core() -> Arc<GlobalCore> {
        let mut config = CoreConfig::default();
        config.worker_pool.workers = 1;
        config.monitoring.metrics_interval_secs = 3600;
        config.monitoring.gc_interval_secs = 3600;
        config.timeouts.default_task_timeout_secs = 5;
        crate::core::GlobalCore::new(config)
    }

    fn runner() -> TaskRunner {
        TaskRunner::new(test_core(), AgentClient::new(None))
    }

    fn group_with(tasks: Vec<Task>, workdir: PathBuf) -> TaskGroup {
        TaskGroup::new("g", WorkdirPolicy::CreateFresh(workdir)).with_tasks(tasks)
    }

    #[tokio::test]
    async fn linear_chain_runs_in_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = Task::new("a", Arc::new(ScriptedBody::always_succeeds(true)));
        let b = Task::new("b", Arc::new(ScriptedBody::always_succeeds(true))).with_dependencies(["a"]);
        let c = Task::new("c", Arc::new(ScriptedBody::always_succeeds(true))).with_dependencies(["b"]);
        let group = group_with(vec![a, b, c], dir.path().join("work"));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].task_name, "a");
        assert_eq!(outcome.results[2].task_name, "c");
        assert!(outcome.results.iter().all(|r| r.status == TaskStatus::Success));
    }

    #[tokio::test]
    async fn cycle_fails_with_cyclic_dependency_and_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let a = Task::new("a", Arc::new(ScriptedBody::always_succeeds(true))).with_dependencies(["b"]);
        let b = Task::new("b", Arc::new(ScriptedBody::always_succeeds(true))).with_dependencies(["a"]);
        let group = group_with(vec![a, b], dir.path().join("work"));

        let err = runner().run_group(&group, &[]).await.unwrap_err();
        assert_eq!(err.code, "cyclic_dependency");
    }

    #[tokio::test]
    async fn retries_eventually_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let t = Task::new("t", Arc::new(ScriptedBody::fails_then_succeeds(2))).with_retries(2);
        let group = group_with(vec![t], dir.path().join("work"));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        assert_eq!(outcome.results[0].status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn dependency_failure_skips_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let a = Task::new("a", Arc::new(ScriptedBody::fails_then_succeeds(usize::MAX)));
        let b = Task::new("b", Arc::new(ScriptedBody::always_succeeds(true))).with_dependencies(["a"]);
        let group = group_with(vec![a, b], dir.path().join("work"));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        let a_result = outcome.results.iter().find(|r| r.task_name == "a").unwrap();
        let b_result = outcome.results.iter().find(|r| r.task_name == "b").unwrap();
        assert_eq!(a_result.status, TaskStatus::Failed);
        assert_eq!(b_result.status, TaskStatus::Skipped);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn idempotent_task_records_unchanged_and_still_fires_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let t = Task::new("t", Arc::new(ScriptedBody::always_succeeds(false)));
        let group = group_with(vec![t], dir.path().join("work"));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        assert_eq!(outcome.results[0].status, TaskStatus::Unchanged);
    }

    #[tokio::test]
    async fn failing_pre_exec_hook_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let t = Task::new("t", Arc::new(RejectingPreExec));
        let group = group_with(vec![t], dir.path().join("work"));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        assert_eq!(outcome.results[0].status, TaskStatus::Failed);
    }

    #[test]
    fn glob_match_is_exposed_for_produces_patterns() {
        assert!(crate::runner::glob_match("*.log", "run.log"));
    }

    #[tokio::test]
    async fn task_without_delegation_inherits_group_delegate_default() {
        let dir = tempfile::tempdir().unwrap();
        let t = Task::new("t", Arc::new(ScriptedBody::always_succeeds(true))).with_retries(0);
        let group = group_with(vec![t], dir.path().join("work"))
            .with_delegate_default(DelegationTarget::DirectAddress("127.0.0.1:1".to_string()));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        let result = &outcome.results[0];
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error.as_ref().unwrap().code, "agent_connect_failed");
    }

    #[tokio::test]
    async fn task_level_delegation_overrides_group_default() {
        let dir = tempfile::tempdir().unwrap();
        let t = Task::new("t", Arc::new(ScriptedBody::always_succeeds(true)))
            .with_retries(0)
            .with_delegation(DelegationTarget::DirectAddress("127.0.0.1:2".to_string()));
        let group = group_with(vec![t], dir.path().join("work"))
            .with_delegate_default(DelegationTarget::DirectAddress("127.0.0.1:1".to_string()));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        let result = &outcome.results[0];
        let address = result.error.as_ref().unwrap().details.get("agent_address").and_then(|v| v.as_str());
        assert_eq!(address, Some("127.0.0.1:2"));
    }

    #[tokio::test]
    async fn workdir_override_is_materialised_and_used_instead_of_group_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let override_dir = dir.path().join("override-only");
        let mut t = Task::new("t", Arc::new(WritesFileBody { file_name: "out.txt" })).with_produces(["*.txt"]);
        t.workdir_override = Some(override_dir.clone());
        let group = group_with(vec![t], dir.path().join("shared-work"));

        let outcome = runner().run_group(&group, &[]).await.unwrap();
        assert!(outcome.success);
        assert!(override_dir.join("out.txt").exists());
        assert!(!dir.path().join("shared-work").join("out.txt").exists());
    }
}
