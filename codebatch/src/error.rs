//! Workflow error types
//!
//! Provides structured error handling for planning, queueing and stage
//! transitions. Every error converts into a [`StructuredError`] carrying a
//! machine-readable code and a recovery action, so callers (often an LLM
//! driving the pipeline) can retry with something actionable.

use crate::state::types::{StepId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Result type alias for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error returned across the operation boundary.
///
/// # Example Response
/// ```json
/// {
///   "code": "PREREQUISITE_NOT_MET",
///   "message": "Step 'architecture' requires step 'module_docs' to be completed first",
///   "recovery_action": "Complete step 'module_docs' (check_step_completion) before entering 'architecture'",
///   "context": { "step": "architecture", "missing_step": "module_docs" },
///   "retryable": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code (e.g., "TASK_NOT_FOUND")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Actionable recovery instruction
    pub recovery_action: String,

    /// Relevant context for debugging and recovery
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Whether retrying the same call can succeed once the cause is fixed
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

// ============================================================================
// Store errors
// ============================================================================

/// Error type for state store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Persisted JSON could not be parsed. Recovered internally by the
    /// store; only surfaces from the raw read helpers.
    #[error("Corrupted state file {path}: {message}")]
    Corrupted { path: PathBuf, message: String },

    #[error("Lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ============================================================================
// Workflow errors
// ============================================================================

/// Errors that can occur during workflow operations
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A stage was entered before one of its prerequisites completed
    #[error("Step '{step}' requires step '{missing}' to be completed first")]
    PrerequisiteNotMet { step: StepId, missing: StepId },

    /// Unknown task id
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// Task status change that the lifecycle forbids
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTaskTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Planning input rejected
    #[error("Invalid file list: {message}")]
    InvalidFileList { message: String },

    /// Queue operation before any plan exists
    #[error("No batch plan exists for project {project}")]
    NoPlan { project: PathBuf },

    /// Step identifier could not be parsed
    #[error("Unknown step: {step}")]
    UnknownStep { step: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    InvalidConfig { message: String },

    /// Content chunk requested past the end
    #[error("Chunk {chunk_index} out of range (task has {total_chunks} chunks)")]
    ChunkOutOfRange {
        chunk_index: usize,
        total_chunks: usize,
    },

    /// Persistence failure
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkflowError {
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    pub fn invalid_file_list(message: impl Into<String>) -> Self {
        Self::InvalidFileList {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn unknown_step(step: impl Into<String>) -> Self {
        Self::UnknownStep { step: step.into() }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PrerequisiteNotMet { .. } => "PREREQUISITE_NOT_MET",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::InvalidTaskTransition { .. } => "INVALID_TASK_TRANSITION",
            Self::InvalidFileList { .. } => "INVALID_FILE_LIST",
            Self::NoPlan { .. } => "NO_PLAN",
            Self::UnknownStep { .. } => "UNKNOWN_STEP",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::ChunkOutOfRange { .. } => "CHUNK_OUT_OF_RANGE",
            Self::Store(_) => "STORE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the same call may succeed later without changing its input.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Resolved by doing the missing work first, then calling again.
            Self::PrerequisiteNotMet { .. } | Self::NoPlan { .. } => true,
            Self::Store(StoreError::Io { .. }) | Self::Store(StoreError::LockPoisoned) => true,
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Suggested recovery action for the caller.
    pub fn recovery_action(&self) -> String {
        match self {
            Self::PrerequisiteNotMet { step, missing } => format!(
                "Complete step '{}' (check_step_completion) before entering '{}'",
                missing, step
            ),
            Self::TaskNotFound { .. } => {
                "Call get_next_task to obtain a valid task id".to_string()
            }
            Self::InvalidTaskTransition { .. } => {
                "Call get_next_task to obtain the task currently in progress".to_string()
            }
            Self::InvalidFileList { .. } => {
                "Fix the file list (relative paths inside the project, no duplicates) and call analyze_project again".to_string()
            }
            Self::NoPlan { .. } => "Call analyze_project first".to_string(),
            Self::UnknownStep { .. } => format!(
                "Use one of: {}",
                StepId::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::InvalidConfig { .. } => "Fix the configuration and retry".to_string(),
            Self::ChunkOutOfRange { total_chunks, .. } => format!(
                "Request a chunk_index between 0 and {}",
                total_chunks.saturating_sub(1)
            ),
            Self::Store(_) | Self::Io(_) => {
                "Check that the state directory is writable and retry".to_string()
            }
            Self::Json(_) => "Report this error; the payload could not be encoded".to_string(),
        }
    }

    /// Convert into the structured form returned across the operation boundary.
    pub fn to_structured(&self) -> StructuredError {
        let mut err = StructuredError::new(self.code(), self.to_string(), self.recovery_action());
        if self.is_retryable() {
            err = err.retryable();
        }
        match self {
            Self::PrerequisiteNotMet { step, missing } => err
                .with_context("step", step.as_str())
                .with_context("missing_step", missing.as_str()),
            Self::TaskNotFound { task_id } => err.with_context("task_id", task_id.as_str()),
            Self::InvalidTaskTransition { task_id, from, .. } => err
                .with_context("task_id", task_id.as_str())
                .with_context("status", from.to_string()),
            Self::ChunkOutOfRange { total_chunks, .. } => {
                err.with_context("total_chunks", *total_chunks)
            }
            _ => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prerequisite_error_names_missing_step() {
        let err = WorkflowError::PrerequisiteNotMet {
            step: StepId::Architecture,
            missing: StepId::ModuleDocs,
        };
        assert!(err.to_string().contains("module_docs"));

        let structured = err.to_structured();
        assert_eq!(structured.code, "PREREQUISITE_NOT_MET");
        assert!(structured.retryable);
        assert_eq!(
            structured.context.get("missing_step"),
            Some(&serde_json::json!("module_docs"))
        );
    }

    #[test]
    fn test_task_not_found_is_not_retryable() {
        let err = WorkflowError::task_not_found("task_99");
        let structured = err.to_structured();
        assert_eq!(structured.code, "TASK_NOT_FOUND");
        assert!(!structured.retryable);
        assert!(structured.recovery_action.contains("get_next_task"));
    }

    #[test]
    fn test_structured_error_serialization() {
        let err = StructuredError::new("NO_PLAN", "No plan", "Call analyze_project first")
            .with_context("project", "/tmp/p");
        let json = serde_json::to_string(&err).unwrap();
        let parsed: StructuredError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
        assert_eq!(format!("{}", parsed), "[NO_PLAN] No plan");
    }

    #[test]
    fn test_unknown_step_lists_valid_steps() {
        let err = WorkflowError::unknown_step("step-9");
        assert!(err.recovery_action().contains("overview"));
        assert!(err.recovery_action().contains("summary"));
    }
}
