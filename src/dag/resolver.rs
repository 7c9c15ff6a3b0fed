//! Target-list expansion and deterministic topological ordering.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::error::{Severity, StructuredError};
use crate::domain::models::Task;

fn task_not_found(name: &str) -> StructuredError {
    StructuredError::new("task_not_found", format!("task '{name}' not found"), Severity::High)
        .with_retryable(false)
}

fn cyclic_dependency(name: &str) -> StructuredError {
    StructuredError::new(
        "cyclic_dependency",
        format!("cyclic dependency re-entering task '{name}'"),
        Severity::Critical,
    )
    .with_retryable(false)
}

/// Expand `targets` into the full set of tasks that must run: every
/// requested target plus its transitive dependencies. An empty `targets`
/// schedules every task in `tasks`. A target naming a task absent from
/// `tasks` fails with `task_not_found`.
fn expand_targets(tasks: &HashMap<String, Task>, targets: &[String]) -> Result<BTreeSet<String>, StructuredError> {
    if targets.is_empty() {
        return Ok(tasks.keys().cloned().collect());
    }

    let mut scheduled = BTreeSet::new();
    let mut queue: Vec<String> = Vec::new();

    for target in targets {
        if !tasks.contains_key(target) {
            return Err(task_not_found(target));
        }
        queue.push(target.clone());
    }

    while let Some(name) = queue.pop() {
        if !scheduled.insert(name.clone()) {
            continue;
        }
        if let Some(task) = tasks.get(&name) {
            for dep in &task.dependencies {
                if tasks.contains_key(dep) {
                    queue.push(dep.clone());
                }
            }
        }
    }

    Ok(scheduled)
}

/// Topologically order `scheduled` tasks from `tasks`: name-sorted
/// depth-first post-order, deterministic for any given DAG. Dependencies
/// outside `scheduled` are silently ignored (the runner decides how to
/// treat them by status).
fn visit_order(tasks: &HashMap<String, Task>, scheduled: &BTreeSet<String>) -> Result<Vec<String>, StructuredError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut on_stack: HashSet<String> = HashSet::new();
    let mut output = Vec::new();

    fn visit(
        name: &str,
        tasks: &HashMap<String, Task>,
        scheduled: &BTreeSet<String>,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        output: &mut Vec<String>,
    ) -> Result<(), StructuredError> {
        if on_stack.contains(name) {
            return Err(cyclic_dependency(name));
        }
        if visited.contains(name) {
            return Ok(());
        }

        on_stack.insert(name.to_string());
        if let Some(task) = tasks.get(name) {
            let mut deps: Vec<&String> = task
                .dependencies
                .iter()
                .filter(|d| scheduled.contains(d.as_str()))
                .collect();
            deps.sort();
            for dep in deps {
                visit(dep, tasks, scheduled, visited, on_stack, output)?;
            }
        }
        on_stack.remove(name);
        visited.insert(name.to_string());
        output.push(name.to_string());
        Ok(())
    }

    for name in scheduled {
        visit(name, tasks, scheduled, &mut visited, &mut on_stack, &mut output)?;
    }

    Ok(output)
}

/// Resolve a schedule for `tasks`, optionally restricted to `targets` (and
/// their transitive dependencies). Returns a deterministic, dependency-safe
/// execution order.
///
/// # Errors
/// `task_not_found` if a target names a task absent from `tasks`;
/// `cyclic_dependency` if the scheduled subgraph contains a cycle.
pub fn resolve(tasks: &HashMap<String, Task>, targets: &[String]) -> Result<Vec<String>, StructuredError> {
    let scheduled = expand_targets(tasks, targets)?;
    visit_order(tasks, &scheduled)
}
