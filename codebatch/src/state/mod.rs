//! Persistent workflow state
//!
//! Durable, resumable storage for batch plans, task statuses, stage progress
//! and the current task context. All state is keyed by normalized project
//! path and survives process restarts.

pub mod schema;
pub mod store;
pub mod types;

pub use store::{
    with_project_lock, JsonStateStore, ProjectFileLock, ResetSummary, SharedStateStore,
    WorkflowStateStore,
};
pub use types::*;
