//! Process-wide file identity cache.
//!
//! Build trees reach the same physical file through many composed paths:
//! a rule may name `obj/foo.o` while a sub-project names `../obj/foo.o`
//! and a search root contributes `/work/obj/foo.o`. The cache keys every
//! record by its canonical absolute path, so all of those compositions
//! share one mutable base record — refreshing stat state through one
//! alias is visible through every other.
//!
//! Aliases are kept as an owned list of [`Stub`] triples per record rather
//! than intrusive links between records.

use crate::error::FsError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// One (dir, sub, name) composition of a file's canonical path.
///
/// `dir` is the project base, `sub` an intermediate subdirectory, `name`
/// the rule-visible file name. Any component may be empty; a later
/// component being absolute requires the earlier ones to be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    pub dir: String,
    pub sub: String,
    pub name: String,
}

impl Stub {
    pub fn new(name: &str, sub: &str, dir: &str) -> Self {
        Self {
            dir: dir.to_string(),
            sub: sub.to_string(),
            name: name.to_string(),
        }
    }

    /// Compose the three components into one path, skipping empty parts.
    pub fn join(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for part in [&self.dir, &self.sub, &self.name] {
            if !part.is_empty() {
                path.push(part);
            }
        }
        path
    }
}

/// Cached stat state of one canonical path.
#[derive(Debug, Clone, Default)]
pub struct FileState {
    pub exists: bool,
    pub mtime: Option<DateTime<Utc>>,
    pub len: u64,
    pub is_dir: bool,
    /// Set once the traversal engine has rebuilt this file in the current
    /// process; readers treat an updated file as fresh without re-statting.
    pub updated: bool,
}

impl FileState {
    fn from_metadata(meta: &fs::Metadata) -> Self {
        Self {
            exists: true,
            mtime: meta.modified().ok().map(DateTime::<Utc>::from),
            len: meta.len(),
            is_dir: meta.is_dir(),
            updated: false,
        }
    }
}

/// The shared base record for one canonical path.
#[derive(Debug)]
pub struct FileRecord {
    canon: PathBuf,
    state: Mutex<FileState>,
    stubs: Mutex<Vec<Stub>>,
}

impl FileRecord {
    pub fn canon(&self) -> &Path {
        &self.canon
    }

    pub fn state(&self) -> FileState {
        self.state.lock().expect("file record lock poisoned").clone()
    }
}

/// A handle to a [`FileRecord`] through one particular alias stub.
#[derive(Debug, Clone)]
pub struct FileHandle {
    record: Arc<FileRecord>,
    stub: usize,
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl Eq for FileHandle {}

impl FileHandle {
    pub fn canon(&self) -> &Path {
        &self.record.canon
    }

    /// The alias triple this handle was created through.
    pub fn stub(&self) -> Stub {
        self.record.stubs.lock().expect("stub list lock poisoned")[self.stub].clone()
    }

    /// Every alias triple known for this record, including this handle's.
    pub fn stubs(&self) -> Vec<Stub> {
        self.record
            .stubs
            .lock()
            .expect("stub list lock poisoned")
            .clone()
    }

    /// Whether two handles alias the same physical file.
    pub fn same_record(&self, other: &FileHandle) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }

    /// Cached existence — never re-stats.
    pub fn exists(&self) -> bool {
        self.record.state().exists
    }

    /// Cached modification time — never re-stats. `Err` when the file does
    /// not exist yet (absent mtime means "must be built").
    pub fn mtime(&self) -> Result<DateTime<Utc>, FsError> {
        self.record.state().mtime.ok_or_else(|| FsError::NoModTime {
            path: self.record.canon.display().to_string(),
        })
    }

    pub fn is_updated(&self) -> bool {
        self.record.state().updated
    }

    /// Mark the record as rebuilt in this process.
    pub fn mark_updated(&self) {
        self.record
            .state
            .lock()
            .expect("file record lock poisoned")
            .updated = true;
    }

    /// Re-stat the filesystem, refresh the shared record, and publish the
    /// new mtime to the process-wide stamp index.
    pub fn stamp(&self) -> Result<FileState, FsError> {
        let fresh = match fs::metadata(&self.record.canon) {
            Ok(meta) => FileState::from_metadata(&meta),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => FileState::default(),
            Err(err) => return Err(FsError::io(&self.record.canon, &err)),
        };
        let published = {
            let mut state = self.record.state.lock().expect("file record lock poisoned");
            let updated = state.updated;
            *state = fresh;
            state.updated = updated;
            state.clone()
        };
        if let Some(mtime) = published.mtime {
            stamp_index()
                .lock()
                .expect("stamp index lock poisoned")
                .insert(self.record.canon.clone(), mtime);
        }
        Ok(published)
    }
}

/// Process-wide map from canonical absolute path to shared file record.
pub struct FileCache {
    records: Mutex<HashMap<PathBuf, Arc<FileRecord>>>,
}

static GLOBAL: OnceLock<FileCache> = OnceLock::new();

fn stamp_index() -> &'static Mutex<HashMap<PathBuf, DateTime<Utc>>> {
    static INDEX: OnceLock<Mutex<HashMap<PathBuf, DateTime<Utc>>>> = OnceLock::new();
    INDEX.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Last stamped modification time of a canonical path, if any `stamp()`
/// has published one this process.
pub fn stamped_mtime(path: &Path) -> Option<DateTime<Utc>> {
    stamp_index()
        .lock()
        .expect("stamp index lock poisoned")
        .get(path)
        .copied()
}

impl FileCache {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// The per-process cache. Lives until shutdown; records are never
    /// evicted.
    pub fn global() -> &'static FileCache {
        GLOBAL.get_or_init(FileCache::new)
    }

    /// Guarded factory: return the cached record for the composed path,
    /// registering the (name, sub, dir) triple as an alias, or stat the
    /// filesystem and insert a new record.
    ///
    /// `known` short-circuits the stat: callers that already hold fresh
    /// stat info (or want a not-yet-existing placeholder, via
    /// `FileState::default()`) install it directly.
    pub fn stat(
        &self,
        name: &str,
        sub: &str,
        dir: &str,
        known: Option<FileState>,
    ) -> Result<FileHandle, FsError> {
        let stub = Stub::new(name, sub, dir);
        let canon = canonical(&stub);

        let mut records = self.records.lock().expect("file cache lock poisoned");
        if let Some(record) = records.get(&canon) {
            let record = Arc::clone(record);
            drop(records);
            let index = {
                let mut stubs = record.stubs.lock().expect("stub list lock poisoned");
                match stubs.iter().position(|s| *s == stub) {
                    Some(index) => index,
                    None => {
                        stubs.push(stub);
                        stubs.len() - 1
                    }
                }
            };
            return Ok(FileHandle { record, stub: index });
        }

        let state = match known {
            Some(state) => state,
            None => match fs::metadata(&canon) {
                Ok(meta) => FileState::from_metadata(&meta),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => FileState::default(),
                Err(err) => return Err(FsError::io(&canon, &err)),
            },
        };
        let record = Arc::new(FileRecord {
            canon: canon.clone(),
            state: Mutex::new(state),
            stubs: Mutex::new(vec![stub]),
        });
        records.insert(canon, Arc::clone(&record));
        Ok(FileHandle { record, stub: 0 })
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexical canonicalization of a stub's composed path.
///
/// Purely textual (`.` dropped, `..` pops, separators collapsed) so that
/// records can exist for files not yet on disk. Relative compositions are
/// rooted at the process working directory.
fn canonical(stub: &Stub) -> PathBuf {
    // A later absolute component with a nonempty earlier one means the
    // loader composed contradictory roots; that is a bug upstream.
    if Path::new(&stub.name).is_absolute() {
        assert!(
            stub.sub.is_empty() && stub.dir.is_empty(),
            "absolute name {:?} composed under sub={:?} dir={:?}",
            stub.name,
            stub.sub,
            stub.dir,
        );
    } else if Path::new(&stub.sub).is_absolute() {
        assert!(
            stub.dir.is_empty(),
            "absolute sub {:?} composed under dir={:?}",
            stub.sub,
            stub.dir,
        );
    }

    let joined = stub.join();
    let rooted = if joined.is_absolute() {
        joined
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        cwd.join(joined)
    };

    let mut canon = PathBuf::new();
    for component in rooted.components() {
        match component {
            Component::Prefix(p) => canon.push(p.as_os_str()),
            Component::RootDir => canon.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                if !canon.pop() {
                    canon.push(Component::RootDir);
                }
            }
            Component::Normal(part) => canon.push(part),
        }
    }
    canon
}
