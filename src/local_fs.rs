//! Capability-scoped access to files on the operator's machine.
//!
//! Every helper opens the parent directory through `cap-std` and then works
//! relative to it, so callers pass ordinary UTF-8 paths.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while touching local files.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LocalFsError {
    /// Raised when the path has no final component.
    #[error("{path} does not name a file")]
    NotAFile {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

fn split(path: &Utf8Path) -> Result<(&Utf8Path, &str), LocalFsError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| LocalFsError::NotAFile {
        path: path.to_path_buf(),
    })?;
    Ok((parent, file_name))
}

fn io_error(path: &Utf8Path, err: &io::Error) -> LocalFsError {
    LocalFsError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Returns `true` when `path` exists and is a regular file.
///
/// A parent that cannot be opened as a directory holds no file to find.
///
/// # Errors
///
/// Returns [`LocalFsError::Io`] when the parent opens but the entry's
/// metadata cannot be read.
pub fn is_file(path: &Utf8Path) -> Result<bool, LocalFsError> {
    let Ok((parent, file_name)) = split(path) else {
        return Ok(false);
    };
    let Ok(dir) = Dir::open_ambient_dir(parent, ambient_authority()) else {
        return Ok(false);
    };
    match dir.metadata(file_name) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            Ok(false)
        }
        Err(err) => Err(io_error(path, &err)),
    }
}

/// Reads `path` into a string.
///
/// # Errors
///
/// Returns [`LocalFsError`] when the file cannot be opened or read.
pub fn read_to_string(path: &Utf8Path) -> Result<String, LocalFsError> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    dir.read_to_string(file_name)
        .map_err(|err| io_error(path, &err))
}

/// Writes `contents` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`LocalFsError`] when the parent directory cannot be opened or the
/// write fails.
pub fn write(path: &Utf8Path, contents: impl AsRef<[u8]>) -> Result<(), LocalFsError> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    dir.write(file_name, contents)
        .map_err(|err| io_error(path, &err))
}

/// Removes the file at `path`.
///
/// # Errors
///
/// Returns [`LocalFsError`] when the file cannot be removed.
pub fn remove_file(path: &Utf8Path) -> Result<(), LocalFsError> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    dir.remove_file(file_name)
        .map_err(|err| io_error(path, &err))
}
