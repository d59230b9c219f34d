//! Six-stage documentation workflow
//!
//! - **steps**: the stage table (artifacts and validators per [`StepId`])
//! - **content**: task text assembly and delivery chunking
//! - **orchestrator**: prerequisite enforcement and stage completion
//!
//! [`StepId`]: crate::state::types::StepId

pub mod content;
pub mod orchestrator;
pub mod steps;

pub use content::{ChunkInfo, TaskContent};
pub use orchestrator::{StepEntry, WorkflowOrchestrator, WorkflowStatus};
pub use steps::{ArtifactRule, StepDefinition};
