//! JSON-file state store for workflow persistence
//!
//! One directory per project (see [`super::schema`]). Every write is
//! committed before the call returns: temp file, fsync, previous copy kept as
//! `.backup`, then an atomic rename. Reads go through a small cache that is
//! revalidated against file metadata on every access, so the files on disk
//! stay the single source of truth.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use fs4::fs_std::FileExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::schema::{self, keys};
use super::types::{CurrentTaskContext, QueueState, StepId, TaskId, TaskStatus, WorkflowState};
use crate::error::{StoreError, StoreResult};

/// Summary of what a reset removed for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ResetSummary {
    /// Project the directory belonged to, when it could be read back
    pub project_path: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub steps_cleared: Vec<StepId>,
    /// Pending and in-progress tasks discarded
    pub tasks_cleared: usize,
    pub tasks_total: usize,
    pub current_task: Option<TaskId>,
}

/// Durable storage for everything the workflow tracks per project.
///
/// `project` arguments may be relative or unnormalized; implementations key
/// on [`schema::normalize_project_path`].
pub trait WorkflowStateStore: Send + Sync {
    /// Load workflow state. Missing or unreadable state yields a fresh one.
    fn load(&self, project: &Path) -> StoreResult<WorkflowState>;

    fn save(&self, project: &Path, state: &WorkflowState) -> StoreResult<()>;

    /// Whether any workflow state has been persisted for the project.
    fn has_state(&self, project: &Path) -> bool;

    /// Whether a result snapshot exists for `step`. Does not parse anything.
    fn exists(&self, step: StepId, project: &Path) -> bool;

    fn save_step_result(
        &self,
        project: &Path,
        step: StepId,
        snapshot: &serde_json::Value,
    ) -> StoreResult<()>;

    fn load_step_result(
        &self,
        project: &Path,
        step: StepId,
    ) -> StoreResult<Option<serde_json::Value>>;

    fn load_queue(&self, project: &Path) -> StoreResult<Option<QueueState>>;

    fn save_queue(&self, project: &Path, queue: &QueueState) -> StoreResult<()>;

    fn load_task_context(&self, project: &Path) -> StoreResult<Option<CurrentTaskContext>>;

    fn save_task_context(&self, project: &Path, context: &CurrentTaskContext)
        -> StoreResult<()>;

    fn clear_task_context(&self, project: &Path) -> StoreResult<()>;

    /// Delete all state for one project.
    fn reset(&self, project: &Path) -> StoreResult<ResetSummary>;

    /// Delete all state for every project under the store root.
    fn reset_all(&self) -> StoreResult<Vec<ResetSummary>>;

    /// Project paths that have persisted state.
    fn projects(&self) -> StoreResult<Vec<PathBuf>>;

    /// In-process lock serializing read-modify-write cycles for a project.
    fn project_lock(&self, project: &Path) -> Arc<Mutex<()>>;

    /// Cross-process lock for a project, held until the guard is dropped.
    /// Stores without one return `None`.
    fn lock_file(&self, _project: &Path) -> StoreResult<Option<ProjectFileLock>> {
        Ok(None)
    }
}

/// Shared reference to a state store
pub type SharedStateStore = Arc<dyn WorkflowStateStore>;

/// Exclusive advisory lock on a project's lock file. Released on drop.
#[derive(Debug)]
pub struct ProjectFileLock {
    _file: File,
}

/// Run `f` holding both the in-process mutex and the lock file of `project`.
///
/// Not reentrant: `f` must not take the same project's lock again.
pub fn with_project_lock<T, E>(
    store: &dyn WorkflowStateStore,
    project: &Path,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    let lock = store.project_lock(project);
    let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;
    let _file = store.lock_file(project)?;
    f()
}

#[derive(Debug, Clone, PartialEq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    identity: u64,
}

impl FileStamp {
    fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            identity: file_identity(metadata),
        }
    }
}

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> u64 {
    0
}

struct CachedFile {
    stamp: FileStamp,
    value: serde_json::Value,
}

/// [`WorkflowStateStore`] backed by pretty-printed JSON files.
pub struct JsonStateStore {
    root: PathBuf,
    cache: RwLock<HashMap<PathBuf, CachedFile>>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl JsonStateStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// State directory for a project.
    pub fn project_dir(&self, project: &Path) -> PathBuf {
        let normalized = schema::normalize_project_path(project);
        self.root.join(schema::project_key(&normalized))
    }

    fn file(&self, project: &Path, name: impl AsRef<Path>) -> PathBuf {
        self.project_dir(project).join(name)
    }

    // =========================================================================
    // Raw file operations
    // =========================================================================

    /// Read and parse `path`, consulting the cache first.
    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> StoreResult<Option<T>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.evict(path);
                return Ok(None);
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let stamp = FileStamp::of(&metadata);

        let cached = {
            let cache = self.cache.read().map_err(|_| StoreError::LockPoisoned)?;
            cache
                .get(path)
                .filter(|entry| entry.stamp == stamp)
                .map(|entry| entry.value.clone())
        };

        let value = match cached {
            Some(value) => {
                debug!(path = %path.display(), "State cache hit");
                value
            }
            None => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
                let value: serde_json::Value =
                    serde_json::from_str(&content).map_err(|e| StoreError::Corrupted {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                let mut cache = self.cache.write().map_err(|_| StoreError::LockPoisoned)?;
                cache.insert(
                    path.to_path_buf(),
                    CachedFile {
                        stamp,
                        value: value.clone(),
                    },
                );
                value
            }
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Corrupted {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Serialize and commit `value` to `path` atomically.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let json =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(&json)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = path.with_extension(schema::TMP_EXTENSION);
        {
            let mut file =
                std::fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
            file.write_all(&bytes)
                .map_err(|e| StoreError::io(&tmp_path, e))?;
            file.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
        }

        if path.exists() {
            let backup_path = path.with_extension(schema::BACKUP_EXTENSION);
            if let Err(e) = std::fs::copy(path, &backup_path) {
                // The write itself still goes ahead.
                warn!(path = %backup_path.display(), error = %e, "Failed to refresh backup");
            }
        }

        std::fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))?;

        let metadata = std::fs::metadata(path).map_err(|e| StoreError::io(path, e))?;
        let mut cache = self.cache.write().map_err(|_| StoreError::LockPoisoned)?;
        cache.insert(
            path.to_path_buf(),
            CachedFile {
                stamp: FileStamp::of(&metadata),
                value: json,
            },
        );
        Ok(())
    }

    /// Read `path`, falling back to its backup when it is missing or corrupted.
    ///
    /// A corrupted primary is renamed to `.corrupt` and kept for inspection.
    fn read_with_recovery<T: DeserializeOwned + Serialize>(
        &self,
        path: &Path,
    ) -> StoreResult<Option<T>> {
        match self.read_json::<T>(path) {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(StoreError::Corrupted { message, .. }) => {
                warn!(
                    path = %path.display(),
                    error = %message,
                    "State file is corrupted, trying backup"
                );
                self.evict(path);
                let preserved = path.with_extension(schema::CORRUPT_EXTENSION);
                if let Err(e) = std::fs::rename(path, &preserved) {
                    warn!(path = %path.display(), error = %e, "Failed to preserve corrupted file");
                }
            }
            Err(e) => return Err(e),
        }

        let backup_path = path.with_extension(schema::BACKUP_EXTENSION);
        match self.read_json::<T>(&backup_path) {
            Ok(Some(value)) => {
                info!(path = %backup_path.display(), "Recovered state from backup");
                self.evict(&backup_path);
                if let Err(e) = self.write_json(path, &value) {
                    warn!(path = %path.display(), error = %e, "Failed to restore primary from backup");
                }
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(StoreError::Corrupted { message, .. }) => {
                self.evict(&backup_path);
                warn!(
                    path = %backup_path.display(),
                    error = %message,
                    "Backup also corrupted, starting fresh"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove `path` and its backup.
    fn remove_file(&self, path: &Path) -> StoreResult<()> {
        for candidate in [
            path.to_path_buf(),
            path.with_extension(schema::BACKUP_EXTENSION),
        ] {
            match std::fs::remove_file(&candidate) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&candidate, e)),
            }
            self.evict(&candidate);
        }
        Ok(())
    }

    fn evict(&self, path: &Path) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(path);
        }
    }

    fn evict_dir(&self, dir: &Path) {
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|path, _| !path.starts_with(dir));
        }
    }

    /// Summarize and delete one project state directory.
    /// Project state directories under the root, sorted. Hidden entries
    /// such as the lock directory are skipped.
    fn project_dirs(&self) -> StoreResult<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'))
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Project a state directory belongs to, read from its state or queue.
    fn dir_project(&self, dir: &Path) -> Option<PathBuf> {
        if let Ok(Some(state)) =
            self.read_json::<WorkflowState>(&dir.join(schema::WORKFLOW_STATE_FILE))
        {
            return Some(state.project_path);
        }
        match self.read_json::<QueueState>(&dir.join(schema::TASK_QUEUE_FILE)) {
            Ok(Some(queue)) => Some(queue.plan.project_path),
            _ => None,
        }
    }

    fn reset_dir(&self, dir: &Path) -> StoreResult<ResetSummary> {
        let mut summary = ResetSummary {
            state_dir: dir.to_path_buf(),
            ..ResetSummary::default()
        };
        if !dir.exists() {
            return Ok(summary);
        }

        // Best effort: unreadable files are still deleted.
        if let Ok(Some(state)) =
            self.read_json::<WorkflowState>(&dir.join(schema::WORKFLOW_STATE_FILE))
        {
            summary.project_path = Some(state.project_path.clone());
            summary.steps_cleared = state.steps_completed.clone();
        }
        if let Ok(Some(queue)) = self.read_json::<QueueState>(&dir.join(schema::TASK_QUEUE_FILE))
        {
            summary
                .project_path
                .get_or_insert_with(|| queue.plan.project_path.clone());
            summary.tasks_total = queue.tasks.len();
            summary.tasks_cleared = queue
                .tasks
                .iter()
                .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
                .count();
        }
        if let Ok(Some(context)) =
            self.read_json::<CurrentTaskContext>(&dir.join(schema::CURRENT_TASK_FILE))
        {
            summary.current_task = Some(context.task_id);
        }

        std::fs::remove_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        self.evict_dir(dir);

        info!(
            dir = %dir.display(),
            steps = summary.steps_cleared.len(),
            tasks = summary.tasks_cleared,
            "Workflow state reset"
        );
        Ok(summary)
    }
}

impl WorkflowStateStore for JsonStateStore {
    fn load(&self, project: &Path) -> StoreResult<WorkflowState> {
        let path = self.file(project, schema::WORKFLOW_STATE_FILE);
        Ok(self
            .read_with_recovery::<WorkflowState>(&path)?
            .unwrap_or_else(|| WorkflowState::new(schema::normalize_project_path(project))))
    }

    fn save(&self, project: &Path, state: &WorkflowState) -> StoreResult<()> {
        self.write_json(&self.file(project, schema::WORKFLOW_STATE_FILE), state)
    }

    fn has_state(&self, project: &Path) -> bool {
        self.file(project, schema::WORKFLOW_STATE_FILE).is_file()
    }

    fn exists(&self, step: StepId, project: &Path) -> bool {
        self.file(project, keys::step_result(step)).is_file()
    }

    fn save_step_result(
        &self,
        project: &Path,
        step: StepId,
        snapshot: &serde_json::Value,
    ) -> StoreResult<()> {
        self.write_json(&self.file(project, keys::step_result(step)), snapshot)
    }

    fn load_step_result(
        &self,
        project: &Path,
        step: StepId,
    ) -> StoreResult<Option<serde_json::Value>> {
        self.read_with_recovery(&self.file(project, keys::step_result(step)))
    }

    fn load_queue(&self, project: &Path) -> StoreResult<Option<QueueState>> {
        self.read_with_recovery(&self.file(project, schema::TASK_QUEUE_FILE))
    }

    fn save_queue(&self, project: &Path, queue: &QueueState) -> StoreResult<()> {
        self.write_json(&self.file(project, schema::TASK_QUEUE_FILE), queue)
    }

    fn load_task_context(&self, project: &Path) -> StoreResult<Option<CurrentTaskContext>> {
        self.read_with_recovery(&self.file(project, schema::CURRENT_TASK_FILE))
    }

    fn save_task_context(
        &self,
        project: &Path,
        context: &CurrentTaskContext,
    ) -> StoreResult<()> {
        self.write_json(&self.file(project, schema::CURRENT_TASK_FILE), context)
    }

    fn clear_task_context(&self, project: &Path) -> StoreResult<()> {
        self.remove_file(&self.file(project, schema::CURRENT_TASK_FILE))
    }

    fn reset(&self, project: &Path) -> StoreResult<ResetSummary> {
        let dir = self.project_dir(project);
        let mut summary = self.reset_dir(&dir)?;
        summary
            .project_path
            .get_or_insert_with(|| schema::normalize_project_path(project));
        Ok(summary)
    }

    fn reset_all(&self) -> StoreResult<Vec<ResetSummary>> {
        self.project_dirs()?
            .iter()
            .map(|dir| self.reset_dir(dir))
            .collect()
    }

    fn projects(&self) -> StoreResult<Vec<PathBuf>> {
        Ok(self
            .project_dirs()?
            .iter()
            .filter_map(|dir| self.dir_project(dir))
            .collect())
    }

    fn project_lock(&self, project: &Path) -> Arc<Mutex<()>> {
        let key = schema::normalize_project_path(project);
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key).or_default().clone()
    }

    fn lock_file(&self, project: &Path) -> StoreResult<Option<ProjectFileLock>> {
        let dir = self.root.join(schema::LOCKS_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let key = schema::project_key(&schema::normalize_project_path(project));
        let path = dir.join(format!("{}.lock", key));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.lock_exclusive().map_err(|e| StoreError::io(&path, e))?;
        Ok(Some(ProjectFileLock { _file: file }))
    }
}
