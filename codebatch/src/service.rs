//! Transport-agnostic operations
//!
//! Each operation takes a request struct and resolves to a
//! [`ServiceResponse`]: either `{"status":"ok","data":...}` or
//! `{"status":"error","error":{...}}`. Nothing here returns a bare error or
//! panics, so any transport (CLI, RPC, HTTP) can forward responses as-is.
//!
//! Operations:
//! - analyze_project / get_next_task / get_task_content
//! - complete_task / fail_task
//! - begin_step / check_step_completion / get_workflow_status
//! - reset_workflow

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StructuredError, WorkflowError, WorkflowResult};
use crate::planning::planner::PlanWarning;
use crate::queue::{CompletionOutcome, NextTask};
use crate::state::store::ResetSummary;
use crate::state::types::{Batch, StepId, Task};
use crate::validation::StepValidationResult;
use crate::workflow::{StepEntry, TaskContent, WorkflowOrchestrator, WorkflowStatus};

/// Outcome of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceResponse<T> {
    Ok { data: T },
    Error { error: StructuredError },
}

impl<T> ServiceResponse<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Ok { data } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&StructuredError> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { error } => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, StructuredError> {
        match self {
            Self::Ok { data } => Ok(data),
            Self::Error { error } => Err(error),
        }
    }
}

impl<T> From<WorkflowResult<T>> for ServiceResponse<T> {
    fn from(result: WorkflowResult<T>) -> Self {
        match result {
            Ok(data) => Self::Ok { data },
            Err(e) => {
                warn!(code = e.code(), error = %e, "Operation failed");
                Self::Error {
                    error: e.to_structured(),
                }
            }
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request for analyze_project
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AnalyzeProjectRequest {
    #[schemars(description = "Project root directory")]
    pub project_path: String,

    /// Files relative to the project root (default: discover all source files)
    #[schemars(description = "Explicit file list; omit to discover source files")]
    pub files: Option<Vec<String>>,

    /// Replace the persisted queue even if the plan is unchanged (default: false)
    #[schemars(description = "Discard existing task progress and re-plan")]
    pub force: Option<bool>,
}

/// Response for analyze_project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeProjectResponse {
    pub project_path: PathBuf,
    pub fingerprint: String,
    pub total_tasks: usize,
    pub total_tokens: usize,
    pub total_files: usize,
    /// The persisted queue was unchanged and kept with its progress
    pub kept_existing: bool,
    pub discarded_tasks: usize,
    pub batches: Vec<Batch>,
    pub warnings: Vec<PlanWarning>,
}

/// Request for get_next_task, get_workflow_status
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ProjectRequest {
    #[schemars(description = "Project root directory")]
    pub project_path: String,
}

/// Request for get_task_content
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetTaskContentRequest {
    #[schemars(description = "Project root directory")]
    pub project_path: String,

    #[schemars(description = "Task id, e.g. task_3 or task_3_2")]
    pub task_id: String,

    /// Characters per delivery chunk (default: configured delivery_max_length)
    #[schemars(description = "Maximum characters returned per call")]
    pub max_length: Option<usize>,

    /// Chunk to return (default: next undelivered chunk of the current task)
    #[schemars(description = "0-based chunk index")]
    pub chunk_index: Option<usize>,
}

/// Request for complete_task
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CompleteTaskRequest {
    #[schemars(description = "Project root directory")]
    pub project_path: String,

    #[schemars(description = "Task id being completed")]
    pub task_id: String,

    #[serde(default)]
    #[schemars(description = "Artifact paths produced for this task")]
    pub outputs: Vec<String>,
}

/// Request for fail_task
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FailTaskRequest {
    #[schemars(description = "Project root directory")]
    pub project_path: String,

    #[schemars(description = "Task id being abandoned")]
    pub task_id: String,

    #[schemars(description = "Why the task could not be completed")]
    pub message: String,
}

/// Response for fail_task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailTaskResponse {
    pub task: Task,
}

/// Request for begin_step, check_step_completion
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StepRequest {
    #[schemars(description = "Project root directory")]
    pub project_path: String,

    #[schemars(description = "Step name (overview, file_analysis, ...) or number 1-6")]
    pub step: String,
}

/// Request for reset_workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ResetWorkflowRequest {
    /// Omit to reset every project
    #[schemars(description = "Project to reset; omit to reset all projects")]
    pub project_path: Option<String>,
}

/// Response for reset_workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetWorkflowResponse {
    pub cleared: Vec<ResetSummary>,
}

// ============================================================================
// Operations
// ============================================================================

/// Operation names accepted by [`CodebatchService::call`].
pub const OPERATIONS: &[&str] = &[
    "analyze_project",
    "get_next_task",
    "get_task_content",
    "complete_task",
    "fail_task",
    "begin_step",
    "check_step_completion",
    "get_workflow_status",
    "reset_workflow",
];

pub struct CodebatchService {
    orchestrator: WorkflowOrchestrator,
}

impl CodebatchService {
    pub fn new(orchestrator: WorkflowOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &WorkflowOrchestrator {
        &self.orchestrator
    }

    pub fn analyze_project(
        &self,
        req: AnalyzeProjectRequest,
    ) -> ServiceResponse<AnalyzeProjectResponse> {
        self.orchestrator
            .analyze_project(
                Path::new(&req.project_path),
                req.files.as_deref(),
                req.force.unwrap_or(false),
            )
            .map(|outcome| AnalyzeProjectResponse {
                fingerprint: outcome.plan.fingerprint.clone(),
                total_tasks: outcome.plan.total_tasks,
                total_tokens: outcome.plan.total_tokens,
                total_files: outcome.plan.files.len(),
                kept_existing: outcome.kept_existing,
                discarded_tasks: outcome.discarded_tasks,
                project_path: outcome.plan.project_path,
                batches: outcome.plan.batches,
                warnings: outcome.plan.warnings,
            })
            .into()
    }

    pub fn get_next_task(&self, req: ProjectRequest) -> ServiceResponse<NextTask> {
        self.orchestrator
            .get_next_task(Path::new(&req.project_path))
            .into()
    }

    pub fn get_task_content(&self, req: GetTaskContentRequest) -> ServiceResponse<TaskContent> {
        self.orchestrator
            .get_task_content(
                Path::new(&req.project_path),
                &req.task_id,
                req.max_length,
                req.chunk_index,
            )
            .into()
    }

    pub fn complete_task(&self, req: CompleteTaskRequest) -> ServiceResponse<CompletionOutcome> {
        self.orchestrator
            .complete_task(Path::new(&req.project_path), &req.task_id, &req.outputs)
            .into()
    }

    pub fn fail_task(&self, req: FailTaskRequest) -> ServiceResponse<FailTaskResponse> {
        self.orchestrator
            .fail_task(Path::new(&req.project_path), &req.task_id, &req.message)
            .map(|task| FailTaskResponse { task })
            .into()
    }

    pub fn begin_step(&self, req: StepRequest) -> ServiceResponse<StepEntry> {
        req.step
            .parse::<StepId>()
            .and_then(|step| {
                self.orchestrator
                    .begin_step(Path::new(&req.project_path), step)
            })
            .into()
    }

    pub fn check_step_completion(
        &self,
        req: StepRequest,
    ) -> ServiceResponse<StepValidationResult> {
        req.step
            .parse::<StepId>()
            .and_then(|step| {
                self.orchestrator
                    .check_step_completion(Path::new(&req.project_path), step)
            })
            .into()
    }

    pub fn get_workflow_status(&self, req: ProjectRequest) -> ServiceResponse<WorkflowStatus> {
        self.orchestrator
            .get_workflow_status(Path::new(&req.project_path))
            .into()
    }

    pub fn reset_workflow(
        &self,
        req: ResetWorkflowRequest,
    ) -> ServiceResponse<ResetWorkflowResponse> {
        self.orchestrator
            .reset(req.project_path.as_deref().map(Path::new))
            .map(|cleared| ResetWorkflowResponse { cleared })
            .into()
    }

    /// Dispatch an operation by name with JSON parameters.
    pub fn call(&self, operation: &str, params: serde_json::Value) -> serde_json::Value {
        match operation {
            "analyze_project" => {
                self.dispatch(params, |r: AnalyzeProjectRequest| self.analyze_project(r))
            }
            "get_next_task" => self.dispatch(params, |r: ProjectRequest| self.get_next_task(r)),
            "get_task_content" => {
                self.dispatch(params, |r: GetTaskContentRequest| self.get_task_content(r))
            }
            "complete_task" => {
                self.dispatch(params, |r: CompleteTaskRequest| self.complete_task(r))
            }
            "fail_task" => self.dispatch(params, |r: FailTaskRequest| self.fail_task(r)),
            "begin_step" => self.dispatch(params, |r: StepRequest| self.begin_step(r)),
            "check_step_completion" => {
                self.dispatch(params, |r: StepRequest| self.check_step_completion(r))
            }
            "get_workflow_status" => {
                self.dispatch(params, |r: ProjectRequest| self.get_workflow_status(r))
            }
            "reset_workflow" => {
                self.dispatch(params, |r: ResetWorkflowRequest| self.reset_workflow(r))
            }
            other => encode::<()>(ServiceResponse::Error {
                error: StructuredError::new(
                    "UNKNOWN_OPERATION",
                    format!("Unknown operation: {}", other),
                    format!("Use one of: {}", OPERATIONS.join(", ")),
                )
                .with_context("operation", other),
            }),
        }
    }

    fn dispatch<Req, Resp>(
        &self,
        params: serde_json::Value,
        op: impl FnOnce(Req) -> ServiceResponse<Resp>,
    ) -> serde_json::Value
    where
        Req: DeserializeOwned,
        Resp: Serialize,
    {
        match serde_json::from_value::<Req>(params) {
            Ok(req) => encode(op(req)),
            Err(e) => encode::<Resp>(ServiceResponse::Error {
                error: StructuredError::new(
                    "INVALID_REQUEST",
                    format!("Invalid parameters: {}", e),
                    "Check the parameter names against the operation's schema",
                ),
            }),
        }
    }
}

fn encode<T: Serialize>(response: ServiceResponse<T>) -> serde_json::Value {
    serde_json::to_value(&response).unwrap_or_else(|e| {
        let error = WorkflowError::from(e).to_structured();
        serde_json::json!({ "status": "error", "error": error })
    })
}

/// JSON Schema of every request type, keyed by operation name.
pub fn request_schemas() -> BTreeMap<&'static str, schemars::schema::RootSchema> {
    let mut schemas = BTreeMap::new();
    schemas.insert("analyze_project", schemars::schema_for!(AnalyzeProjectRequest));
    schemas.insert("get_next_task", schemars::schema_for!(ProjectRequest));
    schemas.insert("get_task_content", schemars::schema_for!(GetTaskContentRequest));
    schemas.insert("complete_task", schemars::schema_for!(CompleteTaskRequest));
    schemas.insert("fail_task", schemars::schema_for!(FailTaskRequest));
    schemas.insert("begin_step", schemars::schema_for!(StepRequest));
    schemas.insert("check_step_completion", schemars::schema_for!(StepRequest));
    schemas.insert("get_workflow_status", schemars::schema_for!(ProjectRequest));
    schemas.insert("reset_workflow", schemars::schema_for!(ResetWorkflowRequest));
    schemas
}
