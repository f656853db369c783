//! # Trellis fs
//!
//! Filesystem identity for the trellis build core: a process-wide cache
//! that de-duplicates files reachable through aliased path compositions,
//! and a persistent store of recipe-content hashes used by the staleness
//! decision.
//!
//! ```text
//! Stub (dir, sub, name)  ← one composed spelling of a path
//!     │  canonicalize
//! FileRecord             ← shared stat state, keyed by canonical path
//!     │
//! FileHandle             ← a Value-facing alias of one record
//!
//! RecipeHashStore        ← "did the instructions change" persistence
//! ```

pub mod cache;
pub mod error;
pub mod hashstore;

pub use cache::{FileCache, FileHandle, FileRecord, FileState, Stub, stamped_mtime};
pub use error::FsError;
pub use hashstore::RecipeHashStore;
