//! # Trellis traverse
//!
//! Prerequisite-graph traversal for the trellis build core: resolve a
//! target through the project chain, bring its prerequisites up to date
//! concurrently, decide staleness, and run the recipe.
//!
//! ```text
//! Traversal              ← project chain + recipe executor + hash store
//!     │ fork per prerequisite
//! Frame                  ← per-target state; newer-facts flow upward
//!     │ join
//! staleness decision     ← absent ∥ newer prereq ∥ rebuilt below ∥
//!     │                    recipe text changed
//! Program::execute       ← the recipe runs, breakers abort the branch
//! ```
//!
//! Loading rule tables and executing recipes live behind the [`Project`]
//! and [`Program`] traits; the engine owns only the walk.

pub mod breaker;
pub mod engine;
pub mod error;
pub mod frame;
pub mod joingroup;
pub mod project;

pub use breaker::Breaker;
pub use engine::{TraverseReport, Traversal};
pub use error::TraverseError;
pub use frame::{Frame, UpdatedRecord};
pub use joingroup::JoinGroup;
pub use project::{ExecContext, Program, Project, RuleEntry, StemmedEntry};
