//! Error types for traversal.

use trellis_fs::FsError;
use trellis_value::ValueError;

/// Errors arising while resolving and building targets.
///
/// "A pattern does not apply here" is never an error — applicability is
/// a normal boolean outcome. These are real failures, aggregated per
/// join point and reported one frame at a time.
#[derive(Debug, thiserror::Error)]
pub enum TraverseError {
    /// No rule, no pattern, and no existing file for the target.
    #[error("target not found: {target} (project {project})")]
    NotFound { project: String, target: String },

    /// Value coercion or expansion failed while resolving the target.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Filesystem stat or hash-store IO failure.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// A dispatched sub-build could not be joined.
    #[error("join failure for {target}: {message}")]
    Join { target: String, message: String },
}
