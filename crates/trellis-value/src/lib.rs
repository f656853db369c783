//! # Trellis value
//!
//! The dynamically-typed value model of the trellis build core: a closed
//! sum of expression variants with one uniform contract — render,
//! coerce, compare, probe existence, and lazily **expand** under a mode
//! bitmask.
//!
//! ## Architecture
//!
//! ```text
//! Value(Arc<Kind>)       ← shared immutable nodes; ptr identity matters
//!     │
//! Expand bitmask         ← reveal / disclose / invoke / normalize / pair
//!     │
//! Closure ──disclose──▶ Delegate ──reveal──▶ concrete Value
//!     │                      (scope chain decides what names mean)
//! Pattern / stencil      ← %-wildcards, globs, path matching
//! ```
//!
//! Expansion is idempotent and identity-preserving: a fully-expanded
//! value comes back as the same allocation, so "did anything change" is
//! one pointer comparison.

pub mod closure;
pub mod error;
pub mod expand;
pub mod ord;
pub mod path;
pub mod pattern;
pub mod scope;
pub mod value;

pub use closure::{BreakSignal, Callable, Invocable};
pub use error::ValueError;
pub use expand::Expand;
pub use ord::Cmp;
pub use path::PathMatch;
pub use pattern::Match;
pub use scope::{Binding, BindingTarget, MapScope, Origin, Scope, ScopeStack};
pub use value::{Kind, Opaque, Presence, Value};
