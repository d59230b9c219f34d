//! On-disk layout of the per-project state directory
//!
//! ```text
//! <state_dir>/<name>-<hash12>/
//!     workflow-state.json
//!     task-queue.json
//!     current-task.json
//!     step-results/<step>.json
//! <state_dir>/.locks/<name>-<hash12>.lock
//! ```

use std::path::{Component, Path, PathBuf};

/// Authoritative workflow state
pub const WORKFLOW_STATE_FILE: &str = "workflow-state.json";

/// Batch plan plus task statuses
pub const TASK_QUEUE_FILE: &str = "task-queue.json";

/// Last granted task and delivery cursor
pub const CURRENT_TASK_FILE: &str = "current-task.json";

/// One snapshot per completed step
pub const STEP_RESULTS_DIR: &str = "step-results";

/// Advisory lock files, kept outside project directories so a reset can
/// delete a project while its lock is held
pub const LOCKS_DIR: &str = ".locks";

/// Extension appended for in-flight writes
pub const TMP_EXTENSION: &str = "json.tmp";

/// Extension of the previous good copy
pub const BACKUP_EXTENSION: &str = "json.backup";

/// Extension given to a file that failed to parse
pub const CORRUPT_EXTENSION: &str = "json.corrupt";

/// Normalize a project path into the key the store is indexed by.
///
/// Existing paths are canonicalized. Otherwise the path is made absolute
/// against the current directory and `.`/`..` are resolved lexically.
pub fn normalize_project_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Directory name for a normalized project path: `<name>-<hash12>`.
pub fn project_key(normalized: &Path) -> String {
    let name: String = normalized
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("root")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    let hash = blake3::hash(normalized.to_string_lossy().as_bytes()).to_hex();
    format!("{}-{}", name, &hash.as_str()[..12])
}

/// Relative paths inside a project state directory
pub mod keys {
    use crate::state::types::StepId;
    use std::path::PathBuf;

    /// Snapshot file for a completed step
    pub fn step_result(step: StepId) -> PathBuf {
        PathBuf::from(super::STEP_RESULTS_DIR).join(format!("{}.json", step.as_str()))
    }
}
