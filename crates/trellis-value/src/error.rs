//! Error types for value coercion, expansion, and pattern operations.
//!
//! "This pattern does not apply" is deliberately *not* an error: matching
//! returns `Ok(None)` for it. Errors here are real failures — bad
//! coercions, delegation cycles, IO surfaced from the file layer.

use trellis_fs::FsError;

/// Errors arising from value operations.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// A value cannot be coerced to the requested scalar type.
    #[error("cannot coerce {from} to {to}: {text:?}")]
    Coerce {
        from: &'static str,
        to: &'static str,
        text: String,
    },

    /// The value is not file-like, so it has no modification time.
    #[error("no modification time for {what}")]
    NoModTime { what: String },

    /// Revealing a delegate produced the delegate itself — a cycle.
    #[error("self-delegation: {name} resolves back to itself")]
    SelfDelegation { name: String },

    /// An explicitly unimplemented operation (regexp patterns, glob
    /// stenciling).
    #[error("not implemented: {what}")]
    Unimplemented { what: String },

    /// A pattern or glob could not be compiled for matching.
    #[error("bad pattern {pattern:?}: {message}")]
    BadPattern { pattern: String, message: String },

    /// Stenciling ran out of stems before the pattern was satisfied.
    #[error("pattern {pattern:?} needs {need} stems, have {have}")]
    StemUnderflow {
        pattern: String,
        need: usize,
        have: usize,
    },

    /// An executable target signalled early exit while being revealed.
    #[error("break{}: {message}", .pos.as_deref().map(|p| format!(" at {p}")).unwrap_or_default())]
    Break {
        message: String,
        pos: Option<String>,
    },

    /// Filesystem state surfaced through a file-like value.
    #[error(transparent)]
    Fs(#[from] FsError),
}
