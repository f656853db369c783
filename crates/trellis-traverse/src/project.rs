//! Boundary contracts toward the loader and the recipe executor.
//!
//! The traversal engine does not parse build trees or run recipes. It
//! consumes rule tables through [`Project`] and hands ready-to-run
//! entries to a [`Program`], receiving a result value and zero or more
//! breakers back.

use crate::breaker::Breaker;
use crate::error::TraverseError;
use std::path::PathBuf;
use std::sync::Arc;
use trellis_fs::FileHandle;
use trellis_value::{Origin, ScopeStack, Value};

/// One rule: target name, recipe text, prerequisites in declaration
/// order, plus order-only prerequisites that never affect staleness.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub name: String,
    pub recipe: String,
    pub prerequisites: Vec<Value>,
    pub order_only: Vec<Value>,
    pub origin: Origin,
}

/// A pattern rule: a pattern value (percent pattern or patterned path)
/// paired with the entry whose prerequisites are stenciled from the
/// captured stems.
#[derive(Debug, Clone)]
pub struct StemmedEntry {
    pub pattern: Value,
    pub entry: Arc<RuleEntry>,
}

/// A loaded project: rule tables, file aliases, search roots, and the
/// lexical scope its rules evaluate in.
pub trait Project: Send + Sync {
    fn name(&self) -> &str;

    /// Direct rule entry for a literal target name.
    fn resolve_entry(&self, name: &str) -> Result<Option<Arc<RuleEntry>>, TraverseError>;

    /// Pattern rules that might produce the named target.
    fn resolve_patterns(&self, name: &str) -> Result<Vec<StemmedEntry>, TraverseError>;

    /// A file the project already knows under this name, if any.
    fn match_file(&self, name: &str) -> Option<FileHandle>;

    /// Directories searched, in order, when resolving relative names.
    fn search_roots(&self) -> Vec<PathBuf>;

    /// The scope chain active for rules of this project.
    fn scope(&self) -> ScopeStack;
}

/// Everything a recipe executor gets to see: the rule's automatic
/// variables, bound arguments, and the scope to evaluate in.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub project: String,
    pub target: Value,
    pub target_name: String,
    pub target_file: FileHandle,
    pub first_prereq: Option<Value>,
    /// Names of prerequisites found newer than the target.
    pub newer: Vec<String>,
    pub order_only: Vec<String>,
    pub stems: Vec<String>,
    pub args: Vec<Value>,
    pub scope: ScopeStack,
}

/// The pluggable recipe executor.
pub trait Program: Send + Sync {
    /// Run the entry's recipe. A non-empty breaker list signals abort.
    fn execute(&self, ctx: &ExecContext, entry: &RuleEntry) -> (Value, Vec<Breaker>);
}
