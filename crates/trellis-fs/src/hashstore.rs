//! Recipe-content hash store.
//!
//! Timestamps catch "an input changed"; they cannot catch "the build
//! instructions changed". After every successful build the engine stores a
//! content hash of the rule's recipe text here; a later traversal whose
//! recipe hashes differently is stale even when every prerequisite is
//! older than the target.
//!
//! Layout: one small file per rule identity under a directory sharded by
//! the first two hex characters of the key, so large build trees do not
//! fan a single directory out into thousands of entries.

use crate::error::FsError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

fn hex_sha256(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let hash = hasher.finalize();
    format!("{hash:x}")
}

/// Persistent store of recipe-content hashes, rooted at one directory.
#[derive(Debug, Clone)]
pub struct RecipeHashStore {
    root: PathBuf,
}

impl RecipeHashStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content hash of a recipe's text.
    pub fn hash_recipe(recipe: &str) -> String {
        hex_sha256(&[recipe.as_bytes()])
    }

    // Rule identity: project and target, NUL-separated so neither can
    // smuggle a boundary into the other.
    fn key(project: &str, target: &str) -> String {
        hex_sha256(&[project.as_bytes(), b"\0", target.as_bytes()])
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(&key[..2]).join(&key[2..])
    }

    /// Stored hash of the most recent successful build of this rule.
    pub fn load(&self, project: &str, target: &str) -> Result<Option<String>, FsError> {
        let path = self.path_for(&Self::key(project, target));
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FsError::io(&path, &err)),
        }
    }

    /// Record a successful build of this rule's recipe.
    pub fn store(&self, project: &str, target: &str, recipe: &str) -> Result<(), FsError> {
        let path = self.path_for(&Self::key(project, target));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| FsError::io(parent, &err))?;
        }
        fs::write(&path, Self::hash_recipe(recipe)).map_err(|err| FsError::io(&path, &err))
    }

    /// Whether the rule's recipe text differs from its last successful
    /// build. Absent history counts as stale.
    pub fn recipe_stale(&self, project: &str, target: &str, recipe: &str) -> Result<bool, FsError> {
        Ok(match self.load(project, target)? {
            Some(stored) => stored != Self::hash_recipe(recipe),
            None => true,
        })
    }
}
