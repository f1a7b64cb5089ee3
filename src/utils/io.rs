//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read file contents with standardized error handling.
///
/// Wraps `fs::read_to_string` with consistent `Error::internal_io` formatting.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Replace a file's content atomically: write `<name>.tmp` beside it, then rename.
///
/// Readers see the old content or the new content, never a truncated file. A
/// symlinked target is resolved first so the link itself survives. When the
/// temp write fails the temp file is removed and the target is left as it was.
pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let invalid = || {
        Error::internal_io(
            format!("Invalid path: {}", target.display()),
            Some(operation.to_string()),
        )
    };
    let parent = target.parent().ok_or_else(invalid)?;
    let filename = target.file_name().ok_or_else(invalid)?;
    let tmp_path = parent.join(format!("{}.tmp", filename.to_string_lossy()));

    if let Err(e) = fs::write(&tmp_path, content) {
        if tmp_path.is_file() {
            let _ = fs::remove_file(&tmp_path);
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some(format!("{} (write temp)", operation)),
        ));
    }

    fs::rename(&tmp_path, &target).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::internal_io(e.to_string(), Some(format!("{} (rename)", operation)))
    })
}

/// Remove a file or a whole directory tree.
pub fn remove_path(path: &Path, operation: &str) -> Result<()> {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Recursively copy `source` into `target`, overwriting existing files.
///
/// Returns the number of files copied.
pub fn copy_dir_recursive(source: &Path, target: &Path) -> Result<usize> {
    fs::create_dir_all(target).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", target.display())))
    })?;

    let entries = fs::read_dir(source).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("list {}", source.display())))
    })?;

    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read entry in {}", source.display())))
        })?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            copied += copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| {
                Error::internal_io(
                    e.to_string(),
                    Some(format!("copy {} -> {}", from.display(), to.display())),
                )
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Count the files under `dir`, recursively.
pub fn count_files(dir: &Path) -> Result<usize> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("list {}", dir.display())))
    })?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read entry in {}", dir.display())))
        })?;
        let path = entry.path();
        if path.is_dir() {
            count += count_files(&path)?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}
