//! Rendering the post-run table and computing the aggregate error.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::error::{Severity, StructuredError};
use crate::domain::models::{TaskResult, TaskStatus};

/// Prefixes, in priority order, that mark a line as a root-cause message
/// from a common external tool rather than a wrapper/context line.
const ROOT_CAUSE_PREFIXES: &[&str] = &["useradd:", "apt:", "systemctl:", "rpc error:"];

/// Extract the root-cause line from a (possibly multi-line) error message:
/// the first line starting with a known tool prefix, or else the last
/// non-empty line.
#[must_use]
pub fn root_cause(message: &str) -> &str {
    let lines: Vec<&str> = message.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    for line in &lines {
        if ROOT_CAUSE_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            return line;
        }
    }
    lines.last().copied().unwrap_or_else(|| message.trim())
}

/// Render a `task | status | duration | error` table for a run's results.
#[must_use]
pub fn render_summary(results: &[TaskResult]) -> String {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Task").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Duration").add_attribute(Attribute::Bold),
        Cell::new("Error").add_attribute(Attribute::Bold),
    ]);

    for result in results {
        let status_cell = Cell::new(result.status.as_str()).fg(status_color(result.status));
        let error_text = result.error.as_ref().map_or_else(|| "-".to_string(), |e| root_cause(&e.message).to_string());

        table.add_row(vec![
            Cell::new(&result.task_name),
            status_cell,
            Cell::new(format!("{:.2}s", result.duration.as_secs_f64())),
            Cell::new(error_text),
        ]);
    }

    table.to_string()
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Success => Color::Green,
        TaskStatus::Unchanged => Color::Cyan,
        TaskStatus::Skipped => Color::Yellow,
        TaskStatus::Failed => Color::Red,
        TaskStatus::DryRun => Color::Magenta,
    }
}

/// Build the run-level aggregate error from every `Failed` result, or
/// `None` if nothing failed. The message enumerates each failed task with
/// its extracted root cause; `details["failed_tasks"]` lists the names.
#[must_use]
pub fn aggregate_error(results: &[TaskResult]) -> Option<StructuredError> {
    let failed: Vec<&TaskResult> = results.iter().filter(|r| r.status == TaskStatus::Failed).collect();
    if failed.is_empty() {
        return None;
    }

    let mut lines = Vec::with_capacity(failed.len());
    let mut names = Vec::with_capacity(failed.len());
    for result in &failed {
        let cause = result.error.as_ref().map_or("unknown error", |e| root_cause(&e.message));
        lines.push(format!("{}: {cause}", result.task_name));
        names.push(result.task_name.clone());
    }

    let mut error = StructuredError::new("task_failed", lines.join("\n"), Severity::High).with_retryable(false);
    error = error.with_detail("failed_tasks", names);
    Some(error)
}
