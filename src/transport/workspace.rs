//! Workspace archive: serialize a directory into a byte stream and
//! reconstruct it at the far end, preserving file mode.
//!
//! Entries are ordered by a depth-first walk, sorted by name within each
//! directory, so archives are reproducible given identical inputs.

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::domain::error::{Severity, StructuredError};

const ENTRY_DIR: u8 = 0;
const ENTRY_FILE: u8 = 1;

const PERMISSION_MASK: u32 = 0o7777;

/// Depth-first, name-sorted walk of `source_dir`, streaming each entry as a
/// header (relative path, mode, size, type) followed by the file's bytes.
///
/// # Errors
/// Returns `workspace_archive_failed` on any I/O failure.
pub fn archive(source_dir: &Path) -> Result<Vec<u8>, StructuredError> {
    let mut out = Vec::new();
    let entries = sorted_entries(source_dir).map_err(archive_failed)?;

    for entry in entries {
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .expect("walked entry is under source_dir")
            .to_string_lossy()
            .replace('\\', "/");
        if relative.is_empty() {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| archive_failed(e.into()))?;
        let mode = metadata.permissions().mode() & PERMISSION_MASK;

        if metadata.is_dir() {
            write_header(&mut out, &relative, mode, 0, ENTRY_DIR);
        } else if metadata.is_file() {
            let mut buf = Vec::new();
            fs::File::open(entry.path())
                .and_then(|mut f| f.read_to_end(&mut buf))
                .map_err(archive_failed)?;
            write_header(&mut out, &relative, mode, buf.len() as u64, ENTRY_FILE);
            out.extend_from_slice(&buf);
        }
        // Symlinks and other special files are not walked into archivable
        // entries; archive() only ever produces dir/file headers.
    }

    Ok(out)
}

fn sorted_entries(source_dir: &Path) -> io::Result<Vec<walkdir::DirEntry>> {
    let mut entries: Vec<walkdir::DirEntry> = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(io::Error::other)?;
    entries.retain(|e| e.path() != source_dir);
    Ok(entries)
}

fn write_header(out: &mut Vec<u8>, path: &str, mode: u32, size: u64, entry_type: u8) {
    let path_bytes = path.as_bytes();
    out.push(entry_type);
    out.extend_from_slice(&(path_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(path_bytes);
    out.extend_from_slice(&mode.to_be_bytes());
    out.extend_from_slice(&size.to_be_bytes());
}

fn archive_failed(source: io::Error) -> StructuredError {
    StructuredError::new("workspace_archive_failed", source.to_string(), Severity::High).with_retryable(true)
}

fn extract_failed(message: impl Into<String>) -> StructuredError {
    StructuredError::new("workspace_extract_failed", message.into(), Severity::High).with_retryable(true)
}

/// Reconstruct a directory tree from a byte stream produced by [`archive`]
/// into `dest_dir`. Rejects entries whose relative path would escape
/// `dest_dir` after joining, and entry types other than dir/file.
///
/// # Errors
/// Returns `workspace_extract_failed` on I/O failure, a path-traversal
/// attempt, or `unsupported_entry_type` for a type byte this reader does
/// not recognise.
pub fn extract(mut bytes: &[u8], dest_dir: &Path) -> Result<(), StructuredError> {
    fs::create_dir_all(dest_dir).map_err(|e| extract_failed(e.to_string()))?;

    while !bytes.is_empty() {
        let entry_type = read_u8(&mut bytes)?;
        let path_len = read_u32(&mut bytes)? as usize;
        let path_bytes = read_n(&mut bytes, path_len)?;
        let relative = String::from_utf8(path_bytes.to_vec())
            .map_err(|e| extract_failed(format!("non-utf8 path in archive: {e}")))?;
        let mode = read_u32(&mut bytes)?;
        let size = read_u64(&mut bytes)? as usize;

        let target = safe_join(dest_dir, &relative)?;

        match entry_type {
            ENTRY_DIR => {
                fs::create_dir_all(&target).map_err(|e| extract_failed(e.to_string()))?;
                set_mode(&target, mode)?;
            }
            ENTRY_FILE => {
                let data = read_n(&mut bytes, size)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| extract_failed(e.to_string()))?;
                }
                let mut file = fs::File::create(&target).map_err(|e| extract_failed(e.to_string()))?;
                file.write_all(data).map_err(|e| extract_failed(e.to_string()))?;
                set_mode(&target, mode)?;
            }
            other => {
                return Err(StructuredError::new(
                    "unsupported_entry_type",
                    format!("archive entry type {other} is not supported"),
                    Severity::High,
                )
                .with_retryable(false));
            }
        }
    }

    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<(), StructuredError> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| extract_failed(e.to_string()))
}

/// Join `dest_dir` with `relative`, rejecting any path that escapes
/// `dest_dir` once resolved.
fn safe_join(dest_dir: &Path, relative: &str) -> Result<PathBuf, StructuredError> {
    let joined = dest_dir.join(relative);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(extract_failed(format!(
                        "archive entry '{relative}' escapes destination directory"
                    )));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if !normalized.starts_with(dest_dir) {
        return Err(extract_failed(format!(
            "archive entry '{relative}' escapes destination directory"
        )));
    }
    Ok(normalized)
}

fn read_u8(bytes: &mut &[u8]) -> Result<u8, StructuredError> {
    let chunk = read_n(bytes, 1)?;
    Ok(chunk[0])
}

fn read_u32(bytes: &mut &[u8]) -> Result<u32, StructuredError> {
    let chunk = read_n(bytes, 4)?;
    Ok(u32::from_be_bytes(chunk.try_into().expect("4 bytes")))
}

fn read_u64(bytes: &mut &[u8]) -> Result<u64, StructuredError> {
    let chunk = read_n(bytes, 8)?;
    Ok(u64::from_be_bytes(chunk.try_into().expect("8 bytes")))
}

fn read_n<'a>(bytes: &mut &'a [u8], n: usize) -> Result<&'a [u8], StructuredError> {
    if bytes.len() < n {
        return Err(extract_failed("truncated archive stream"));
    }
    let (chunk, rest) = bytes.split_at(n);
    *bytes = rest;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(path: &Path, contents: &[u8], mode: u32) {
        fs::write(path, contents).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn archive_then_extract_round_trips_files_and_mode() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("nested")).unwrap();
        write_file(&src.path().join("a.txt"), b"hello", 0o644);
        write_file(&src.path().join("nested/b.txt"), b"world", 0o755);

        let bytes = archive(src.path()).unwrap();

        let dest = tempdir().unwrap();
        extract(&bytes, dest.path()).unwrap();

        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dest.path().join("nested/b.txt")).unwrap(), b"world");
        let mode = fs::metadata(dest.path().join("a.txt")).unwrap().permissions().mode() & PERMISSION_MASK;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn archive_is_deterministic_given_identical_inputs() {
        let src = tempdir().unwrap();
        write_file(&src.path().join("z.txt"), b"1", 0o644);
        write_file(&src.path().join("a.txt"), b"2", 0o644);

        let first = archive(src.path()).unwrap();
        let second = archive(src.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn extract_rejects_path_traversal() {
        let mut out = Vec::new();
        write_header(&mut out, "../escape.txt", 0o644, 5, ENTRY_FILE);
        out.extend_from_slice(b"hello");

        let dest = tempdir().unwrap();
        let result = extract(&out, dest.path());
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, "workspace_extract_failed");
    }

    #[test]
    fn extract_rejects_unsupported_entry_type() {
        let mut out = Vec::new();
        write_header(&mut out, "link", 0o644, 0, 99);

        let dest = tempdir().unwrap();
        let result = extract(&out, dest.path());
        assert_eq!(result.unwrap_err().code, "unsupported_entry_type");
    }

    #[test]
    fn archive_extract_archive_is_stable() {
        let src = tempdir().unwrap();
        write_file(&src.path().join("a.txt"), b"stable", 0o644);
        let first = archive(src.path()).unwrap();

        let dest = tempdir().unwrap();
        extract(&first, dest.path()).unwrap();
        let second = archive(dest.path()).unwrap();
        assert_eq!(first, second);
    }
}
