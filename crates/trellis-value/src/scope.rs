//! Lexical scope chain for closure disclosure.
//!
//! The same source expression must resolve differently depending on which
//! project's scope is active when it is finally consumed — an inherited
//! rule evaluated in a derived project sees the derived bindings. The
//! stack is therefore passed explicitly and pushed *persistently*:
//! [`ScopeStack::pushed`] returns a new stack and leaves the original
//! untouched, so every exit path restores the caller's view for free.

use crate::closure::{Callable, Invocable};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where a binding was defined. Argument-binding checks use this to tell
/// rule arguments apart from ordinary variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Argument,
    Rule,
    Variable,
    Builtin,
}

/// What a resolved name is bound to.
#[derive(Clone)]
pub enum BindingTarget {
    /// A plain value, substituted as-is on revelation.
    Plain(Value),
    /// A callable: invoked with expanded arguments, return value is the
    /// result.
    Callable(Arc<dyn Callable>),
    /// A side-effecting command form: executed, result list wrapped as a
    /// `List`, breakers surfaced as errors.
    Invocable(Arc<dyn Invocable>),
}

impl fmt::Debug for BindingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Callable(c) => write!(f, "Callable({})", c.name()),
            Self::Invocable(x) => write!(f, "Invocable({})", x.name()),
        }
    }
}

/// A scope entry: target plus definition origin.
#[derive(Debug, Clone)]
pub struct Binding {
    pub target: BindingTarget,
    pub origin: Origin,
}

impl Binding {
    pub fn plain(value: Value, origin: Origin) -> Self {
        Self {
            target: BindingTarget::Plain(value),
            origin,
        }
    }

    pub fn callable(callable: Arc<dyn Callable>, origin: Origin) -> Self {
        Self {
            target: BindingTarget::Callable(callable),
            origin,
        }
    }

    pub fn invocable(invocable: Arc<dyn Invocable>, origin: Origin) -> Self {
        Self {
            target: BindingTarget::Invocable(invocable),
            origin,
        }
    }
}

/// One lexical scope: a name-to-binding lookup.
pub trait Scope: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Binding>;
}

/// The active scope chain, most specific scope on top.
#[derive(Clone, Default)]
pub struct ScopeStack {
    frames: Vec<Arc<dyn Scope>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(scope: Arc<dyn Scope>) -> Self {
        Self {
            frames: vec![scope],
        }
    }

    /// A new stack with `scope` pushed on top. The receiver is unchanged.
    pub fn pushed(&self, scope: Arc<dyn Scope>) -> ScopeStack {
        let mut frames = self.frames.clone();
        frames.push(scope);
        Self { frames }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Walk the chain top-down; the most recently pushed scope wins.
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.lookup(name))
    }
}

impl fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeStack({} frames)", self.frames.len())
    }
}

/// A map-backed scope, used for automatic variables and tests.
#[derive(Default)]
pub struct MapScope {
    bindings: HashMap<String, Binding>,
}

impl MapScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: &str, binding: Binding) -> Self {
        self.bindings.insert(name.to_string(), binding);
        self
    }

    pub fn insert(&mut self, name: &str, binding: Binding) {
        self.bindings.insert(name.to_string(), binding);
    }
}

impl Scope for MapScope {
    fn lookup(&self, name: &str) -> Option<Binding> {
        self.bindings.get(name).cloned()
    }
}
