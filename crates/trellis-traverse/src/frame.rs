//! Traversal frames: one per in-flight target.
//!
//! A frame carries the active project and scope, the shared visited set,
//! and the frame's "newer prerequisites" records. Newer-facts are
//! recorded into the immediate parent only; transitivity comes from the
//! rebuild cascade — a frame with newer-facts is stale, rebuilds, and
//! records its own fact one level up. An order-only frame breaks the
//! cascade because its rebuild is never recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use trellis_value::ScopeStack;

use crate::project::Project;

/// One node in the tree of updated prerequisites reported after a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UpdatedRecord>,
}

impl UpdatedRecord {
    pub fn leaf(name: impl Into<String>, mtime: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            mtime,
            children: Vec::new(),
        }
    }

    /// Every name in this subtree, for reporting.
    pub fn names(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        for child in &self.children {
            out.extend(child.names());
        }
        out
    }
}

/// Ephemeral per-target build state.
pub struct Frame {
    project: Arc<dyn Project>,
    scope: ScopeStack,
    target_name: String,
    visited: Arc<Mutex<HashSet<String>>>,
    newer: Mutex<Vec<UpdatedRecord>>,
    parent: Option<Arc<Frame>>,
    /// Order-only sub-builds do not feed ancestors' staleness.
    propagates: bool,
}

impl Frame {
    pub fn root(project: Arc<dyn Project>, scope: ScopeStack, target_name: &str) -> Arc<Frame> {
        Arc::new(Frame {
            project,
            scope,
            target_name: target_name.to_string(),
            visited: Arc::new(Mutex::new(HashSet::new())),
            newer: Mutex::new(Vec::new()),
            parent: None,
            propagates: true,
        })
    }

    pub fn child(
        self: &Arc<Self>,
        project: Arc<dyn Project>,
        scope: ScopeStack,
        target_name: &str,
        propagates: bool,
    ) -> Arc<Frame> {
        Arc::new(Frame {
            project,
            scope,
            target_name: target_name.to_string(),
            visited: Arc::clone(&self.visited),
            newer: Mutex::new(Vec::new()),
            parent: Some(Arc::clone(self)),
            propagates,
        })
    }

    pub fn project(&self) -> &Arc<dyn Project> {
        &self.project
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn parent(&self) -> Option<&Arc<Frame>> {
        self.parent.as_ref()
    }

    pub fn propagates(&self) -> bool {
        self.propagates
    }

    /// Claim a target for this traversal. `false` means it is already in
    /// flight — concurrent fan-out may legitimately request the same
    /// target twice, and the second request is a silent no-op.
    pub fn try_visit(&self, name: &str) -> bool {
        self.visited
            .lock()
            .expect("visited set lock poisoned")
            .insert(name.to_string())
    }

    /// Record a newer-prerequisite fact in this frame. Deliberately
    /// local: deeper changes reach here only through a child that itself
    /// rebuilt, which keeps order-only subtrees from dirtying anything
    /// above them.
    pub fn record_newer(&self, record: UpdatedRecord) {
        self.newer
            .lock()
            .expect("newer list lock poisoned")
            .push(record);
    }

    pub fn newer_records(&self) -> Vec<UpdatedRecord> {
        self.newer.lock().expect("newer list lock poisoned").clone()
    }

    pub fn has_newer(&self) -> bool {
        !self
            .newer
            .lock()
            .expect("newer list lock poisoned")
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraverseError;
    use crate::project::{RuleEntry, StemmedEntry};
    use std::path::PathBuf;
    use trellis_fs::FileHandle;

    struct NullProject;

    impl Project for NullProject {
        fn name(&self) -> &str {
            "null"
        }

        fn resolve_entry(&self, _: &str) -> Result<Option<Arc<RuleEntry>>, TraverseError> {
            Ok(None)
        }

        fn resolve_patterns(&self, _: &str) -> Result<Vec<StemmedEntry>, TraverseError> {
            Ok(Vec::new())
        }

        fn match_file(&self, _: &str) -> Option<FileHandle> {
            None
        }

        fn search_roots(&self) -> Vec<PathBuf> {
            Vec::new()
        }

        fn scope(&self) -> ScopeStack {
            ScopeStack::new()
        }
    }

    fn chain() -> (Arc<Frame>, Arc<Frame>, Arc<Frame>) {
        let project: Arc<dyn Project> = Arc::new(NullProject);
        let root = Frame::root(project.clone(), ScopeStack::new(), "a");
        let mid = root.child(project.clone(), ScopeStack::new(), "b", true);
        let leaf = mid.child(project, ScopeStack::new(), "c", true);
        (root, mid, leaf)
    }

    #[test]
    fn newer_facts_stay_in_the_recorded_frame() {
        let (root, mid, leaf) = chain();
        mid.record_newer(UpdatedRecord::leaf("c.dep", None));

        assert!(mid.has_newer());
        assert!(!leaf.has_newer());
        assert!(!root.has_newer());
        assert_eq!(mid.newer_records()[0].name, "c.dep");
    }

    #[test]
    fn visited_set_is_shared_down_the_chain() {
        let (root, _mid, leaf) = chain();
        assert!(root.try_visit("obj/foo.o"));
        assert!(!leaf.try_visit("obj/foo.o"));
    }

    #[test]
    fn record_names_flatten_the_subtree() {
        let record = UpdatedRecord {
            name: "b".to_string(),
            mtime: None,
            children: vec![UpdatedRecord::leaf("c", None)],
        };
        assert_eq!(record.names(), vec!["b", "c"]);
    }
}
