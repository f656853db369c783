//! Error types for file-cache and hash-store operations.

use std::path::Path;

/// Errors arising from filesystem stats or hash-store IO.
///
/// Invariant violations (conflicting absolute path compositions, impossible
/// canonicalization states) are *not* represented here — those are bugs and
/// abort via panic, distinct from this recoverable universe.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Filesystem stat or hash-store IO failure.
    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },

    /// The entity exists but is not a regular file where one was required.
    #[error("not a file: {path}")]
    NotAFile { path: String },

    /// No modification time is available — the file does not exist yet.
    #[error("no modification time for {path}")]
    NoModTime { path: String },
}

impl FsError {
    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
