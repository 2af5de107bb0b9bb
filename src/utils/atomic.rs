//! Atomic file operations
//!
//! This module provides utilities for write-then-rename sequences so a
//! reader never observes a partially written file.
//!
//! # Pattern
//!
//! 1. Write to `<final>.tmp`
//! 2. Call sync_all() to flush to disk
//! 3. Run an optional pre-commit step (e.g. delete the source)
//! 4. Rename the temp file to the final path
//!
//! A crash leaves at most one incomplete file, always recognisable by
//! its `.tmp` suffix.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Suffix used for in-progress files
pub const TMP_EXTENSION: &str = ".tmp";

/// Temp path for `path`: the full file name with `.tmp` appended
///
/// Unlike `with_extension`, this keeps existing extensions intact
/// (`a.log.gz` becomes `a.log.gz.tmp`).
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(TMP_EXTENSION);
    PathBuf::from(name)
}

/// Final path for a temp path, or `None` if it has no `.tmp` suffix
pub fn final_path_for(tmp: &Path) -> Option<PathBuf> {
    let name = tmp.to_str()?;
    name.strip_suffix(TMP_EXTENSION).map(PathBuf::from)
}

/// Atomically write content using a writer function
///
/// # Example
///
/// ```ignore
/// atomic_write_with("out/archive.log.gz", |file| {
///     file.write_all(b"payload")
/// })?;
/// ```
pub fn atomic_write_with<P, F>(path: P, write_fn: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> io::Result<()>,
{
    atomic_write_then(path, write_fn, || Ok(()))
}

/// Like [`atomic_write_with`], running `before_commit` between the sync
/// of the temp file and the final rename
///
/// If `before_commit` fails, the fully written temp file is left in place
/// and the error is returned.
pub fn atomic_write_then<P, F, C>(path: P, write_fn: F, before_commit: C) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> io::Result<()>,
    C: FnOnce() -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = tmp_path_for(path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(&temp_path)?;
    if let Err(e) = write_fn(&mut file) {
        drop(file);
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    file.sync_all()?;
    drop(file);

    before_commit()?;

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// List leftover temp files in `dir` whose name ends with `suffix`
///
/// `suffix` must itself end in `.tmp` (e.g. `.gz.tmp`).
pub fn list_temp_files<P: AsRef<Path>>(dir: P, suffix: &str) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut found = Vec::new();

    if !dir.exists() {
        return Ok(found);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(suffix))
            .unwrap_or(false);

        if matches && entry.file_type()?.is_file() {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

/// Rename a complete temp file to its final name
pub fn commit_temp(tmp: &Path) -> io::Result<PathBuf> {
    let final_path = final_path_for(tmp).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a temp file: {}", tmp.display()),
        )
    })?;
    fs::rename(tmp, &final_path)?;
    Ok(final_path)
}
