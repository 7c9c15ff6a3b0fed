//! Artifact hand-off between a group's persistent `artifacts/<group>/<ts>/`
//! directory and a task's workdir, plus the glob matching `produces` needs.
//!
//! No crate in the corpus declares a `glob` dependency, so pattern matching
//! here is a small hand-rolled `*`/`?` matcher, in the same no-dependency
//! spirit as the relative-path handling in the workspace archiver.

use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::domain::error::{Severity, StructuredError};

/// Match `candidate` against a shell-style glob `pattern` supporting `*`
/// (zero or more characters) and `?` (exactly one character). No character
/// classes, no path-separator awareness: a `*` matches across `/` too.
#[must_use]
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = candidate.chars().collect();
    matches_from(&p, 0, &c, 0)
}

fn matches_from(p: &[char], pi: usize, c: &[char], ci: usize) -> bool {
    if pi == p.len() {
        return ci == c.len();
    }
    match p[pi] {
        '*' => matches_from(p, pi + 1, c, ci) || (ci < c.len() && matches_from(p, pi, c, ci + 1)),
        '?' => ci < c.len() && matches_from(p, pi + 1, c, ci + 1),
        ch => ci < c.len() && c[ci] == ch && matches_from(p, pi + 1, c, ci + 1),
    }
}

fn artifact_missing(name: &str, artifacts_dir: &Path) -> StructuredError {
    StructuredError::new(
        "artifact_missing",
        format!("artifact '{name}' not found in {}", artifacts_dir.display()),
        Severity::High,
    )
    .with_retryable(false)
}

fn copy_failed(e: io::Error) -> StructuredError {
    StructuredError::new("artifact_copy_failed", e.to_string(), Severity::High).with_retryable(true)
}

/// Copy `<artifacts_dir>/<name>` into `workdir/<name>`. Fails with
/// `artifact_missing` if the source does not exist.
pub fn consume_artifact(artifacts_dir: &Path, name: &str, workdir: &Path) -> Result<(), StructuredError> {
    let source = artifacts_dir.join(name);
    if !source.exists() {
        return Err(artifact_missing(name, artifacts_dir));
    }
    let dest = workdir.join(name);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(copy_failed)?;
    }
    std::fs::copy(&source, &dest).map_err(copy_failed)?;
    Ok(())
}

/// For each glob in `patterns`, copy matching files under `workdir` into
/// `artifacts_dir`, flattened to their basename. A no-op if `patterns` is
/// empty.
pub fn produce_artifacts(workdir: &Path, patterns: &[String], artifacts_dir: &Path) -> Result<(), StructuredError> {
    if patterns.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(artifacts_dir).map_err(copy_failed)?;

    let entries = WalkDir::new(workdir)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| copy_failed(io::Error::other(e)))?;

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(workdir)
            .expect("walked entry is under workdir")
            .to_string_lossy()
            .replace('\\', "/");

        if patterns.iter().any(|pattern| glob_match(pattern, &relative)) {
            let dest = artifacts_dir.join(entry.file_name());
            std::fs::copy(entry.path(), &dest).map_err(copy_failed)?;
        }
    }

    Ok(())
}
