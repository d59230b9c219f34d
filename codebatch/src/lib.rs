//! codebatch
//!
//! Splits a source tree into token-bounded batches for an external content
//! generator with a limited context window, then tracks those batches
//! through a six-stage documentation workflow with crash-safe, resumable
//! state.
//!
//! # Components
//!
//! - `planning`: token estimation, size tiers, function-boundary-aware
//!   splitting, deterministic task ids
//! - `queue`: serves tasks one at a time, strictly in plan order
//! - `state`: JSON persistence with atomic writes and corruption recovery
//! - `validation`: artifact-presence checks per stage
//! - `workflow`: prerequisite enforcement and stage completion
//! - `service`: request/response operations for any transport
//!
//! # Usage
//!
//! ```rust,ignore
//! use codebatch::{WorkflowConfig, WorkflowOrchestrator, StepId};
//!
//! let orchestrator = WorkflowOrchestrator::new(WorkflowConfig::from_env())?;
//! orchestrator.analyze_project(project, None, false)?;
//! while let Some(granted) = orchestrator.get_next_task(project)?.task() {
//!     let content = orchestrator.get_task_content(project, &granted.task.id, None, None)?;
//!     // hand `content` to the generator, then:
//!     orchestrator.complete_task(project, &granted.task.id, &outputs)?;
//! }
//! orchestrator.check_step_completion(project, StepId::FileAnalysis)?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod error;
pub mod language;
pub mod planning;
pub mod queue;
pub mod service;
pub mod source;
pub mod state;
pub mod tokens;
pub mod validation;
pub mod workflow;

pub use config::{BatchConfig, WorkflowConfig};
pub use error::{StoreError, StructuredError, WorkflowError, WorkflowResult};
pub use language::Language;
pub use planning::{BatchPlan, BatchPlanner, PlanWarning};
pub use queue::{CompletionOutcome, GrantedTask, NextTask, TaskLookup, TaskQueue};
pub use service::{CodebatchService, ServiceResponse};
pub use source::{ContentSource, FsContentSource, MemoryContentSource};
pub use state::{
    Batch, BatchKind, JsonStateStore, SharedStateStore, SourceFile, StepId, Task, TaskStatus,
    WorkflowState, WorkflowStateStore,
};
pub use tokens::{DensityEstimator, TokenEstimator};
pub use validation::{StepValidationResult, StepValidator, ValidationStrategy};
pub use workflow::{TaskContent, WorkflowOrchestrator, WorkflowStatus};
