//! The traversal engine.
//!
//! `Traversal` walks a target's prerequisite graph depth-first with
//! fork-join concurrency: every prerequisite becomes a child frame built
//! in its own task, and the parent blocks at one join point before
//! deciding staleness. A target is rebuilt when it is absent, when any
//! prerequisite is newer, when something below it was rebuilt, or when
//! its recipe text changed since the last run.
//!
//! Resolution order for a name: direct rule entries project by project,
//! then pattern rules (applicability-checked), then the other spellings
//! the file cache knows for the name, then a plain existing file as a
//! leaf. Only after all of those fail is the target "not found".

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use trellis_fs::{FileCache, FileHandle, RecipeHashStore};
use trellis_value::{Binding, Expand, Kind, MapScope, Origin, ScopeStack, Value};

use crate::breaker::Breaker;
use crate::error::TraverseError;
use crate::frame::{Frame, UpdatedRecord};
use crate::joingroup::JoinGroup;
use crate::project::{ExecContext, Program, Project, RuleEntry};

/// Outcome of one traversal: failures plus the tree of rebuilt targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraverseReport {
    pub breakers: Vec<Breaker>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<UpdatedRecord>,
}

/// The engine: a project chain, a recipe executor, and the hash store
/// backing the recipe-change staleness check.
#[derive(Clone)]
pub struct Traversal {
    projects: Vec<Arc<dyn Project>>,
    program: Arc<dyn Program>,
    hashes: RecipeHashStore,
}

impl Traversal {
    pub fn new(
        projects: Vec<Arc<dyn Project>>,
        program: Arc<dyn Program>,
        hashes: RecipeHashStore,
    ) -> Self {
        Self {
            projects,
            program,
            hashes,
        }
    }

    /// Bring `target` up to date. Returns the aggregated breakers; empty
    /// means every reached target is now fresh.
    pub async fn traverse(&self, target: Value) -> Vec<Breaker> {
        self.traverse_report(target).await.breakers
    }

    /// Like [`Traversal::traverse`], but also reports which targets were
    /// rebuilt and when.
    pub async fn traverse_report(&self, target: Value) -> TraverseReport {
        let Some(project) = self.projects.first().cloned() else {
            return TraverseReport {
                breakers: vec![Breaker::new("<root>", "no projects loaded")],
                updated: Vec::new(),
            };
        };
        let scope = project.scope();
        let label = match target.expand(Expand::ALL, &scope).and_then(|v| v.strval()) {
            Ok(name) => name,
            Err(_) => target.kind_name().to_string(),
        };
        let frame = Frame::root(Arc::clone(&project), scope, &label);
        let breakers = self
            .clone()
            .traverse_boxed(Arc::clone(&frame), target)
            .await;

        let records = frame.newer_records();
        let updated = match self.file_record(&project, &label) {
            Ok(handle) if handle.is_updated() => vec![UpdatedRecord {
                name: label,
                mtime: handle.mtime().ok(),
                children: records,
            }],
            _ => records,
        };
        TraverseReport { breakers, updated }
    }

    /// Recursion always crosses a task boundary, so the future is boxed
    /// and owns its engine clone.
    fn traverse_boxed(
        self,
        frame: Arc<Frame>,
        target: Value,
    ) -> Pin<Box<dyn Future<Output = Vec<Breaker>> + Send>> {
        Box::pin(async move { self.traverse_in(frame, target).await })
    }

    async fn traverse_in(&self, frame: Arc<Frame>, target: Value) -> Vec<Breaker> {
        let scope = frame.scope().clone();
        let expanded = match target.expand(Expand::ALL, &scope) {
            Ok(value) => value,
            Err(err) => {
                let err = TraverseError::from(err);
                return vec![Breaker::from_error(frame.target_name(), &err)];
            }
        };

        // A list target fans out; each element is its own traversal.
        if let Kind::List(items) | Kind::Group(items) = expanded.kind() {
            let mut group = JoinGroup::new();
            for item in items {
                group.fork(
                    self.clone()
                        .traverse_boxed(Arc::clone(&frame), item.clone()),
                );
            }
            return group.join().await;
        }

        let (value, args) = match expanded.kind() {
            Kind::Argumented { value, args } => (value.clone(), args.clone()),
            _ => (expanded.clone(), Vec::new()),
        };
        let name = match value.strval() {
            Ok(name) => name,
            Err(err) => {
                let err = TraverseError::from(err);
                return vec![Breaker::from_error(frame.target_name(), &err)];
            }
        };
        if name.is_empty() {
            return Vec::new();
        }
        if !frame.try_visit(&name) {
            // Already claimed by a concurrent branch.
            return Vec::new();
        }

        let chain = self.project_chain(&frame);
        match self.resolve_target(&frame, &chain, &name, &value, &args).await {
            Ok(Some(breakers)) => breakers,
            Ok(None) => {
                let err = TraverseError::NotFound {
                    project: frame.project().name().to_string(),
                    target: name.clone(),
                };
                vec![Breaker::from_error(&name, &err)]
            }
            Err(err) => vec![Breaker::from_error(&name, &err)],
        }
    }

    /// The frame's own project first, then the rest of the load order.
    fn project_chain(&self, frame: &Frame) -> Vec<Arc<dyn Project>> {
        let mut chain = vec![Arc::clone(frame.project())];
        for project in &self.projects {
            if chain.iter().all(|seen| seen.name() != project.name()) {
                chain.push(Arc::clone(project));
            }
        }
        chain
    }

    async fn resolve_target(
        &self,
        frame: &Arc<Frame>,
        chain: &[Arc<dyn Project>],
        name: &str,
        target: &Value,
        args: &[Value],
    ) -> Result<Option<Vec<Breaker>>, TraverseError> {
        for project in chain {
            if let Some(breakers) = self.try_project(frame, project, name, target, args).await? {
                return Ok(Some(breakers));
            }
        }

        // The file cache may know this file under other spellings; a rule
        // keyed on an alias still applies.
        if let Some(handle) = chain.iter().find_map(|project| project.match_file(name)) {
            for stub in handle.stubs() {
                if stub.name == name || stub.name.is_empty() {
                    continue;
                }
                for project in chain {
                    if let Some(breakers) = self
                        .try_project(frame, project, &stub.name, target, args)
                        .await?
                    {
                        return Ok(Some(breakers));
                    }
                }
            }
            if handle.exists() {
                return Ok(Some(Vec::new()));
            }
        }

        // No rule anywhere; an existing file is a leaf prerequisite.
        for project in chain {
            if self.file_record(project, name)?.exists() {
                return Ok(Some(Vec::new()));
            }
        }
        Ok(None)
    }

    /// `Ok(None)` means this project has nothing for the name.
    async fn try_project(
        &self,
        frame: &Arc<Frame>,
        project: &Arc<dyn Project>,
        name: &str,
        target: &Value,
        args: &[Value],
    ) -> Result<Option<Vec<Breaker>>, TraverseError> {
        if let Some(entry) = project.resolve_entry(name)? {
            let breakers = self
                .build_entry(frame, project, &entry, &[], name, target, args)
                .await;
            return Ok(Some(breakers));
        }

        for stemmed in project.resolve_patterns(name)? {
            let Some(found) = stemmed.pattern.match1(name)? else {
                continue;
            };
            if !found.remainder.is_empty() {
                continue;
            }
            let mut seen = HashSet::from([name.to_string()]);
            if !self.pattern_applicable(project, &stemmed.entry, &found.stems, &mut seen)? {
                continue;
            }
            let breakers = self
                .build_entry(frame, project, &stemmed.entry, &found.stems, name, target, args)
                .await;
            return Ok(Some(breakers));
        }
        Ok(None)
    }

    /// A pattern rule applies only when every stenciled prerequisite is
    /// satisfiable: buildable by some rule or already on disk. `seen`
    /// short-circuits cycles — a name already under consideration is
    /// assumed satisfiable.
    fn pattern_applicable(
        &self,
        project: &Arc<dyn Project>,
        entry: &RuleEntry,
        stems: &[String],
        seen: &mut HashSet<String>,
    ) -> Result<bool, TraverseError> {
        for prereq in &entry.prerequisites {
            let name = if prereq.is_pattern() {
                prereq.stencil(stems)?.0
            } else {
                prereq.strval()?
            };
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }
            if !self.satisfiable(project, &name, seen)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn satisfiable(
        &self,
        project: &Arc<dyn Project>,
        name: &str,
        seen: &mut HashSet<String>,
    ) -> Result<bool, TraverseError> {
        if project.resolve_entry(name)?.is_some() {
            return Ok(true);
        }
        for stemmed in project.resolve_patterns(name)? {
            if let Some(found) = stemmed.pattern.match1(name)? {
                if found.remainder.is_empty()
                    && self.pattern_applicable(project, &stemmed.entry, &found.stems, seen)?
                {
                    return Ok(true);
                }
            }
        }
        Ok(self.file_record(project, name)?.exists())
    }

    async fn build_entry(
        &self,
        frame: &Arc<Frame>,
        project: &Arc<dyn Project>,
        entry: &RuleEntry,
        stems: &[String],
        target_name: &str,
        target: &Value,
        args: &[Value],
    ) -> Vec<Breaker> {
        match self
            .build_entry_inner(frame, project, entry, stems, target_name, target, args)
            .await
        {
            Ok(breakers) => breakers,
            Err(err) => vec![Breaker::from_error(target_name, &err)],
        }
    }

    async fn build_entry_inner(
        &self,
        frame: &Arc<Frame>,
        project: &Arc<dyn Project>,
        entry: &RuleEntry,
        stems: &[String],
        target_name: &str,
        target: &Value,
        args: &[Value],
    ) -> Result<Vec<Breaker>, TraverseError> {
        let target_file = self.file_record(project, target_name)?;
        let prereqs = self.concrete_list(&entry.prerequisites, stems, frame.scope())?;
        let order_only = self.concrete_list(&entry.order_only, stems, frame.scope())?;

        let mut group = JoinGroup::new();
        for (value, name) in &prereqs {
            let child = frame.child(Arc::clone(project), frame.scope().clone(), name, true);
            group.fork(self.clone().traverse_boxed(child, value.clone()));
        }
        for (value, name) in &order_only {
            let child = frame.child(Arc::clone(project), frame.scope().clone(), name, false);
            group.fork(self.clone().traverse_boxed(child, value.clone()));
        }
        let breakers = group.join().await;
        if !breakers.is_empty() {
            return Ok(breakers);
        }

        // Staleness. Order-only prerequisites are deliberately absent from
        // the mtime comparison.
        let target_mtime = target_file.mtime().ok();
        let mut newer: Vec<String> = Vec::new();
        for (_, name) in &prereqs {
            let handle = self.file_record(project, name)?;
            let is_newer = match (handle.mtime().ok(), target_mtime) {
                (Some(prereq), Some(target)) => prereq > target,
                (Some(_), None) => true,
                (None, _) => handle.is_updated(),
            };
            if is_newer {
                newer.push(name.clone());
            }
        }
        for record in frame.newer_records() {
            if !newer.contains(&record.name) {
                newer.push(record.name);
            }
        }

        let mut stale = !target_file.exists() || !newer.is_empty();
        if !stale {
            stale = self
                .hashes
                .recipe_stale(project.name(), target_name, &entry.recipe)?;
        }
        if !stale {
            return Ok(Vec::new());
        }

        let scope = auto_scope(frame, target_name, &prereqs, &order_only, &newer, stems, args);
        let args = rebind_args(args, &scope)?;
        let ctx = ExecContext {
            project: project.name().to_string(),
            target: target.clone(),
            target_name: target_name.to_string(),
            target_file: target_file.clone(),
            first_prereq: prereqs.first().map(|(value, _)| value.clone()),
            newer: newer.clone(),
            order_only: order_only.iter().map(|(_, name)| name.clone()).collect(),
            stems: stems.to_vec(),
            args,
            scope,
        };
        let (_result, breakers) = self.program.execute(&ctx, entry);
        if !breakers.is_empty() {
            return Ok(breakers);
        }

        let built = target_file.stamp()?;
        target_file.mark_updated();
        self.hashes.store(project.name(), target_name, &entry.recipe)?;
        if frame.propagates() {
            if let Some(parent) = frame.parent() {
                parent.record_newer(UpdatedRecord {
                    name: target_name.to_string(),
                    mtime: built.mtime,
                    children: frame.newer_records(),
                });
            }
        }
        Ok(Vec::new())
    }

    /// Expand and concretize a prerequisite list. Patterns are stenciled
    /// against the rule's captured stems; empty renderings are dropped.
    fn concrete_list(
        &self,
        values: &[Value],
        stems: &[String],
        scope: &ScopeStack,
    ) -> Result<Vec<(Value, String)>, TraverseError> {
        let mut out = Vec::new();
        for value in values {
            let expanded = value.expand(Expand::ALL, scope)?;
            if expanded.is_pattern() {
                let (text, _) = expanded.stencil(stems)?;
                let concrete = Value::str(text.as_str());
                out.push((concrete, text));
            } else {
                let text = expanded.strval()?;
                if text.is_empty() {
                    continue;
                }
                out.push((expanded, text));
            }
        }
        Ok(out)
    }

    /// Resolve a name to a file handle: a project-known file, an absolute
    /// path, the first search root where it exists, or a placeholder
    /// under the first root for not-yet-built targets.
    fn file_record(
        &self,
        project: &Arc<dyn Project>,
        name: &str,
    ) -> Result<FileHandle, TraverseError> {
        if let Some(handle) = project.match_file(name) {
            return Ok(handle);
        }
        let cache = FileCache::global();
        if Path::new(name).is_absolute() {
            return Ok(cache.stat(name, "", "", None)?);
        }
        let roots = project.search_roots();
        for root in &roots {
            let handle = cache.stat(name, "", &root.to_string_lossy(), None)?;
            if handle.exists() {
                return Ok(handle);
            }
        }
        match roots.first() {
            Some(root) => Ok(cache.stat(name, "", &root.to_string_lossy(), None)?),
            None => Ok(cache.stat(name, "", "", None)?),
        }
    }
}

/// Automatic variables for a rule's execution scope.
fn auto_scope(
    frame: &Frame,
    target_name: &str,
    prereqs: &[(Value, String)],
    order_only: &[(Value, String)],
    newer: &[String],
    stems: &[String],
    args: &[Value],
) -> ScopeStack {
    let mut map = MapScope::new();
    map.insert("target", Binding::plain(Value::str(target_name), Origin::Builtin));
    let first = prereqs
        .first()
        .map(|(value, _)| value.clone())
        .unwrap_or_else(Value::none);
    map.insert("first", Binding::plain(first, Origin::Builtin));
    let stem = stems
        .first()
        .map(|s| Value::str(s.as_str()))
        .unwrap_or_else(Value::none);
    map.insert("stem", Binding::plain(stem, Origin::Builtin));
    map.insert(
        "stems",
        Binding::plain(
            Value::list(stems.iter().map(|s| Value::str(s.as_str())).collect()),
            Origin::Builtin,
        ),
    );
    map.insert(
        "newer",
        Binding::plain(
            Value::list(newer.iter().map(|n| Value::str(n.as_str())).collect()),
            Origin::Builtin,
        ),
    );
    map.insert(
        "prereqs",
        Binding::plain(
            Value::list(prereqs.iter().map(|(value, _)| value.clone()).collect()),
            Origin::Builtin,
        ),
    );
    map.insert(
        "order_only",
        Binding::plain(
            Value::list(order_only.iter().map(|(value, _)| value.clone()).collect()),
            Origin::Builtin,
        ),
    );
    map.insert(
        "args",
        Binding::plain(Value::list(args.to_vec()), Origin::Builtin),
    );
    frame.scope().pushed(Arc::new(map))
}

/// Call arguments that reference argument-origin definitions are
/// re-expanded under the rule's scope before execution.
fn rebind_args(args: &[Value], scope: &ScopeStack) -> Result<Vec<Value>, TraverseError> {
    args.iter()
        .map(|arg| {
            if arg.refdef(Origin::Argument) {
                Ok(arg.expand(Expand::ALL, scope)?)
            } else {
                Ok(arg.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::StemmedEntry;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, SystemTime};
    use trellis_value::BindingTarget;

    fn scratch(tag: &str) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let dir = std::env::temp_dir().join(format!(
            "trellis-traverse-{tag}-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed),
        ));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn write_with_age(dir: &Path, name: &str, age_secs: u64) {
        let path = dir.join(name);
        fs::write(&path, name).expect("write fixture");
        let file = fs::File::options()
            .write(true)
            .open(&path)
            .expect("open fixture");
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .expect("set fixture mtime");
    }

    struct TableProject {
        name: String,
        root: PathBuf,
        rules: HashMap<String, Arc<RuleEntry>>,
        patterns: Vec<StemmedEntry>,
    }

    impl TableProject {
        fn new(name: &str, root: &Path) -> Self {
            Self {
                name: name.to_string(),
                root: root.to_path_buf(),
                rules: HashMap::new(),
                patterns: Vec::new(),
            }
        }

        fn rule(self, name: &str, recipe: &str, prereqs: &[&str]) -> Self {
            self.rule_full(name, recipe, prereqs, &[])
        }

        fn rule_full(
            mut self,
            name: &str,
            recipe: &str,
            prereqs: &[&str],
            order_only: &[&str],
        ) -> Self {
            self.rules.insert(
                name.to_string(),
                Arc::new(RuleEntry {
                    name: name.to_string(),
                    recipe: recipe.to_string(),
                    prerequisites: prereqs.iter().map(|p| Value::str(*p)).collect(),
                    order_only: order_only.iter().map(|p| Value::str(*p)).collect(),
                    origin: Origin::Rule,
                }),
            );
            self
        }

        fn pattern(mut self, pattern: Value, recipe: &str, prereqs: Vec<Value>) -> Self {
            self.patterns.push(StemmedEntry {
                pattern,
                entry: Arc::new(RuleEntry {
                    name: "%".to_string(),
                    recipe: recipe.to_string(),
                    prerequisites: prereqs,
                    order_only: Vec::new(),
                    origin: Origin::Rule,
                }),
            });
            self
        }
    }

    impl Project for TableProject {
        fn name(&self) -> &str {
            &self.name
        }

        fn resolve_entry(&self, name: &str) -> Result<Option<Arc<RuleEntry>>, TraverseError> {
            Ok(self.rules.get(name).cloned())
        }

        fn resolve_patterns(&self, _name: &str) -> Result<Vec<StemmedEntry>, TraverseError> {
            Ok(self.patterns.clone())
        }

        fn match_file(&self, _name: &str) -> Option<FileHandle> {
            None
        }

        fn search_roots(&self) -> Vec<PathBuf> {
            vec![self.root.clone()]
        }

        fn scope(&self) -> ScopeStack {
            ScopeStack::new()
        }
    }

    /// Logs every execution, writes the target file, and fails on demand.
    #[derive(Default)]
    struct ScriptedProgram {
        contexts: Mutex<Vec<ExecContext>>,
        broken: HashSet<String>,
    }

    impl ScriptedProgram {
        fn fails(mut self, target: &str) -> Self {
            self.broken.insert(target.to_string());
            self
        }

        fn executed(&self) -> Vec<String> {
            self.contexts
                .lock()
                .expect("context log")
                .iter()
                .map(|ctx| ctx.target_name.clone())
                .collect()
        }

        fn context(&self, index: usize) -> ExecContext {
            self.contexts.lock().expect("context log")[index].clone()
        }
    }

    impl Program for ScriptedProgram {
        fn execute(&self, ctx: &ExecContext, _entry: &RuleEntry) -> (Value, Vec<Breaker>) {
            self.contexts.lock().expect("context log").push(ctx.clone());
            if self.broken.contains(&ctx.target_name) {
                return (
                    Value::none(),
                    vec![Breaker::new(&ctx.target_name, "recipe failed")],
                );
            }
            fs::write(ctx.target_file.canon(), "built").expect("write target");
            (Value::str("done"), Vec::new())
        }
    }

    fn engine(project: TableProject, program: Arc<ScriptedProgram>, dir: &Path) -> Traversal {
        Traversal::new(
            vec![Arc::new(project)],
            program,
            RecipeHashStore::new(dir.join("hashes")),
        )
    }

    #[tokio::test]
    async fn builds_a_missing_target() {
        let dir = scratch("missing");
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir).rule("out.txt", "emit out.txt", &[]);
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("out.txt")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        assert_eq!(program.executed(), vec!["out.txt"]);
        assert!(dir.join("out.txt").exists());
    }

    #[tokio::test]
    async fn fresh_target_is_left_alone() {
        let dir = scratch("fresh");
        write_with_age(&dir, "src.c", 100);
        write_with_age(&dir, "out.txt", 10);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir).rule("out.txt", "emit", &["src.c"]);
        let hashes = RecipeHashStore::new(dir.join("hashes"));
        hashes.store("app", "out.txt", "emit").expect("seed hash");
        let engine = Traversal::new(vec![Arc::new(project)], program.clone(), hashes);

        let breakers = engine.traverse(Value::str("out.txt")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        assert!(program.executed().is_empty());
    }

    #[tokio::test]
    async fn newer_prerequisite_propagates_up_the_chain() {
        let dir = scratch("chain");
        write_with_age(&dir, "c.src", 10);
        write_with_age(&dir, "b.txt", 100);
        write_with_age(&dir, "a.txt", 50);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule("a.txt", "link", &["b.txt"])
            .rule("b.txt", "compile", &["c.src"]);
        let hashes = RecipeHashStore::new(dir.join("hashes"));
        hashes.store("app", "a.txt", "link").expect("seed hash");
        hashes.store("app", "b.txt", "compile").expect("seed hash");
        let engine = Traversal::new(vec![Arc::new(project)], program.clone(), hashes);

        let report = engine.traverse_report(Value::str("a.txt")).await;
        assert!(report.breakers.is_empty(), "breakers: {:?}", report.breakers);
        // b rebuilds because c.src is newer; a rebuilds because b did.
        assert_eq!(program.executed(), vec!["b.txt", "a.txt"]);
        let names: Vec<String> = report
            .updated
            .iter()
            .flat_map(|record| record.names())
            .map(str::to_string)
            .collect();
        assert!(names.contains(&"a.txt".to_string()), "report: {names:?}");
        assert!(names.contains(&"b.txt".to_string()), "report: {names:?}");
    }

    #[tokio::test]
    async fn recipe_change_forces_a_rebuild() {
        let dir = scratch("recipe");
        write_with_age(&dir, "src.c", 100);
        write_with_age(&dir, "out.txt", 10);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir).rule("out.txt", "emit -O2", &["src.c"]);
        let hashes = RecipeHashStore::new(dir.join("hashes"));
        hashes.store("app", "out.txt", "emit -O0").expect("seed hash");
        let engine = Traversal::new(vec![Arc::new(project)], program.clone(), hashes);

        let breakers = engine.traverse(Value::str("out.txt")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        assert_eq!(program.executed(), vec!["out.txt"]);
    }

    #[tokio::test]
    async fn diamond_dependency_is_built_once() {
        let dir = scratch("diamond");
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule("top", "link", &["left", "right"])
            .rule("left", "compile", &["base"])
            .rule("right", "compile", &["base"])
            .rule("base", "generate", &[]);
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("top")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        let executed = program.executed();
        assert_eq!(executed.len(), 4);
        assert_eq!(executed.iter().filter(|name| *name == "base").count(), 1);
    }

    #[tokio::test]
    async fn unresolvable_target_reports_not_found() {
        let dir = scratch("notfound");
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir);
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("ghost.txt")).await;
        assert_eq!(breakers.len(), 1);
        assert!(breakers[0].message.contains("ghost.txt"));
        assert!(breakers[0].message.contains("app"));
        assert!(program.executed().is_empty());
    }

    #[tokio::test]
    async fn pattern_rule_captures_and_stencils_stems() {
        let dir = scratch("pattern");
        write_with_age(&dir, "foo.c", 10);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir).pattern(
            Value::perc(Value::none(), Value::str(".o")),
            "compile",
            vec![Value::perc(Value::none(), Value::str(".c"))],
        );
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("foo.o")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        let ctx = program.context(0);
        assert_eq!(ctx.target_name, "foo.o");
        assert_eq!(ctx.stems, vec!["foo"]);
        let first = ctx.first_prereq.expect("stenciled prerequisite");
        assert_eq!(first.strval().expect("string prerequisite"), "foo.c");
    }

    #[tokio::test]
    async fn unsatisfiable_pattern_is_passed_over() {
        let dir = scratch("applicable");
        write_with_age(&dir, "foo.c", 10);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .pattern(
                Value::perc(Value::none(), Value::str(".o")),
                "from-z",
                vec![Value::perc(Value::none(), Value::str(".z"))],
            )
            .pattern(
                Value::perc(Value::none(), Value::str(".o")),
                "from-c",
                vec![Value::perc(Value::none(), Value::str(".c"))],
            );
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("foo.o")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        let first = program.context(0).first_prereq.expect("prerequisite");
        assert_eq!(first.strval().expect("string prerequisite"), "foo.c");
    }

    #[tokio::test]
    async fn mutually_recursive_rules_terminate() {
        let dir = scratch("mutual");
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule("ping", "emit ping", &["pong"])
            .rule("pong", "emit pong", &["ping"]);
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("ping")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        let mut executed = program.executed();
        executed.sort_unstable();
        assert_eq!(executed, vec!["ping", "pong"]);
    }

    #[tokio::test]
    async fn order_only_prerequisite_never_dirties_the_target() {
        let dir = scratch("orderonly");
        write_with_age(&dir, "out.txt", 10);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule_full("out.txt", "emit", &[], &["setup"])
            .rule("setup", "prepare", &[]);
        let hashes = RecipeHashStore::new(dir.join("hashes"));
        hashes.store("app", "out.txt", "emit").expect("seed hash");
        let engine = Traversal::new(vec![Arc::new(project)], program.clone(), hashes);

        let breakers = engine.traverse(Value::str("out.txt")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        // The missing order-only prerequisite is built, but the fresh
        // target is not.
        assert_eq!(program.executed(), vec!["setup"]);
    }

    #[tokio::test]
    async fn rebuilds_below_an_order_only_edge_stay_isolated() {
        let dir = scratch("orderchain");
        write_with_age(&dir, "out.txt", 10);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule_full("out.txt", "emit", &[], &["tool"])
            .rule("tool", "assemble", &["gen.c"])
            .rule("gen.c", "generate", &[]);
        let hashes = RecipeHashStore::new(dir.join("hashes"));
        hashes.store("app", "out.txt", "emit").expect("seed hash");
        let engine = Traversal::new(vec![Arc::new(project)], program.clone(), hashes);

        let breakers = engine.traverse(Value::str("out.txt")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        // The whole order-only chain is brought up to date; the rebuild
        // two levels down must not leak past the order-only edge and
        // drag the fresh target along.
        assert_eq!(program.executed(), vec!["gen.c", "tool"]);
    }

    #[tokio::test]
    async fn deep_chain_reports_each_rebuilt_target_once() {
        let dir = scratch("deepchain");
        write_with_age(&dir, "d.src", 10);
        write_with_age(&dir, "c.bin", 100);
        write_with_age(&dir, "b.bin", 80);
        write_with_age(&dir, "a.bin", 60);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule("a.bin", "link", &["b.bin"])
            .rule("b.bin", "pack", &["c.bin"])
            .rule("c.bin", "compile", &["d.src"]);
        let hashes = RecipeHashStore::new(dir.join("hashes"));
        hashes.store("app", "a.bin", "link").expect("seed hash");
        hashes.store("app", "b.bin", "pack").expect("seed hash");
        hashes.store("app", "c.bin", "compile").expect("seed hash");
        let engine = Traversal::new(vec![Arc::new(project)], program.clone(), hashes);

        let report = engine.traverse_report(Value::str("a.bin")).await;
        assert!(report.breakers.is_empty(), "breakers: {:?}", report.breakers);
        let names: Vec<&str> = report
            .updated
            .iter()
            .flat_map(|record| record.names())
            .collect();
        for name in ["a.bin", "b.bin", "c.bin"] {
            assert_eq!(
                names.iter().filter(|n| **n == name).count(),
                1,
                "{name} duplicated in {names:?}"
            );
        }
    }

    #[tokio::test]
    async fn execution_scope_carries_the_automatic_bindings() {
        let dir = scratch("autoscope");
        write_with_age(&dir, "dep.c", 10);
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule_full("out.txt", "emit", &["dep.c"], &["setup"])
            .rule("setup", "prepare", &[]);
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("out.txt")).await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        let ctx = program.context(1);
        assert_eq!(ctx.target_name, "out.txt");

        let lookup = |name: &str| -> Value {
            match ctx.scope.lookup(name).expect("automatic binding").target {
                BindingTarget::Plain(value) => value,
                other => panic!("unexpected binding target: {other:?}"),
            }
        };
        assert_eq!(lookup("target").strval().expect("target name"), "out.txt");
        assert_eq!(lookup("prereqs").to_string(), "dep.c");
        assert_eq!(lookup("order_only").to_string(), "setup");
        assert!(matches!(lookup("args").kind(), Kind::List(items) if items.is_empty()));
    }

    #[tokio::test]
    async fn failed_prerequisite_aborts_the_parent() {
        let dir = scratch("abort");
        let program = Arc::new(ScriptedProgram::default().fails("lib"));
        let project = TableProject::new("app", &dir)
            .rule("app", "link", &["lib"])
            .rule("lib", "compile", &[]);
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine.traverse(Value::str("app")).await;
        assert_eq!(breakers.len(), 1);
        assert_eq!(breakers[0].target, "lib");
        assert_eq!(program.executed(), vec!["lib"]);
    }

    #[tokio::test]
    async fn list_target_fans_out() {
        let dir = scratch("fanout");
        let program = Arc::new(ScriptedProgram::default());
        let project = TableProject::new("app", &dir)
            .rule("one", "emit one", &[])
            .rule("two", "emit two", &[]);
        let engine = engine(project, Arc::clone(&program), &dir);

        let breakers = engine
            .traverse(Value::list(vec![Value::str("one"), Value::str("two")]))
            .await;
        assert!(breakers.is_empty(), "unexpected breakers: {breakers:?}");
        let mut executed = program.executed();
        executed.sort_unstable();
        assert_eq!(executed, vec!["one", "two"]);
    }
}
