//! Core types for workflow state persistence
//!
//! These types are stored as JSON under the per-project state directory and
//! represent the durable state of one documentation pipeline.

use crate::error::{WorkflowError, WorkflowResult};
use crate::language::Language;
use crate::planning::planner::BatchPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Unique identifier for tasks (and the batches they track)
pub type TaskId = String;

// ============================================================================
// Source files and batches
// ============================================================================

/// A file analyzed for planning. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SourceFile {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub byte_size: u64,
    pub token_estimate: usize,
    pub language: Language,
    /// 0-100, higher is packed first
    pub importance: u8,
    /// blake3 of the content, used for the plan fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Half-open byte range `[start, end)` into a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ChunkRange {
    pub start: usize,
    pub end: usize,
}

impl ChunkRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strategy-specific payload of a batch.
///
/// Only `Multi` carries part information, so a part index can never be
/// attached to a combined or single batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BatchKind {
    /// Several small files delivered together, in packing order
    Combined { files: Vec<String> },
    /// One medium file, whole
    Single { file: String },
    /// One part of a large file
    Multi {
        file: String,
        range: ChunkRange,
        /// 1-based
        part_index: usize,
        total_parts: usize,
        is_last_part: bool,
        /// Set when the part boundary was forced inside a code unit
        #[serde(default)]
        forced_split: bool,
    },
}

/// A bounded unit of work scheduled as one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Batch {
    pub id: TaskId,
    /// Position in the plan, 0-based
    pub sequence_index: usize,
    pub total_tokens: usize,
    #[serde(flatten)]
    pub kind: BatchKind,
}

impl Batch {
    /// Strategy name as it appears on the wire.
    pub fn strategy(&self) -> &'static str {
        match self.kind {
            BatchKind::Combined { .. } => "combined",
            BatchKind::Single { .. } => "single",
            BatchKind::Multi { .. } => "multi",
        }
    }

    /// Paths of every file this batch touches.
    pub fn files(&self) -> Vec<&str> {
        match &self.kind {
            BatchKind::Combined { files } => files.iter().map(String::as_str).collect(),
            BatchKind::Single { file } | BatchKind::Multi { file, .. } => vec![file.as_str()],
        }
    }

    pub fn part_index(&self) -> Option<usize> {
        match self.kind {
            BatchKind::Multi { part_index, .. } => Some(part_index),
            _ => None,
        }
    }

    pub fn is_forced_split(&self) -> bool {
        matches!(
            self.kind,
            BatchKind::Multi {
                forced_split: true,
                ..
            }
        )
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be granted
    Pending,
    /// Granted to the caller, not yet finished
    InProgress,
    /// Finished with outputs (terminal)
    Completed,
    /// Abandoned by the caller (terminal)
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked lifecycle of one batch. Owned by the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Task {
    pub id: TaskId,
    /// Index into the plan's batch list
    pub batch_index: usize,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, batch_index: usize, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            batch_index,
            status: TaskStatus::Pending,
            created_at,
            granted_at: None,
            completed_at: None,
            outputs: Vec::new(),
            error: None,
        }
    }

    /// `pending -> in_progress`.
    pub fn grant(&mut self) -> WorkflowResult<()> {
        self.transition(TaskStatus::InProgress)?;
        self.granted_at = Some(Utc::now());
        Ok(())
    }

    /// `in_progress -> completed`, appending outputs not already recorded.
    pub fn complete(&mut self, outputs: &[String]) -> WorkflowResult<()> {
        self.transition(TaskStatus::Completed)?;
        for output in outputs {
            if !self.outputs.contains(output) {
                self.outputs.push(output.clone());
            }
        }
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `in_progress -> error`.
    pub fn fail(&mut self, message: impl Into<String>) -> WorkflowResult<()> {
        self.transition(TaskStatus::Error)?;
        self.error = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: TaskStatus) -> WorkflowResult<()> {
        let allowed = matches!(
            (self.status, to),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Error)
        );
        if !allowed {
            return Err(WorkflowError::InvalidTaskTransition {
                task_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Persisted queue: the plan plus one task per batch, in plan order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueState {
    pub plan: BatchPlan,
    pub tasks: Vec<Task>,
    pub updated_at: DateTime<Utc>,
}

impl QueueState {
    pub fn new(plan: BatchPlan) -> Self {
        let now = Utc::now();
        let tasks = plan
            .batches
            .iter()
            .enumerate()
            .map(|(idx, batch)| Task::new(batch.id.clone(), idx, now))
            .collect();
        Self {
            plan,
            tasks,
            updated_at: now,
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// Batch tracked by `task`.
    pub fn batch_for(&self, task: &Task) -> Option<&Batch> {
        self.plan.batches.get(task.batch_index)
    }

    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary {
            total: self.tasks.len(),
            ..QueueSummary::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Error => summary.error += 1,
            }
        }
        summary.current_task = self
            .tasks
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
            .map(|t| t.id.clone());
        summary
    }
}

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QueueSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub error: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskId>,
}

impl QueueSummary {
    /// Pending or in progress.
    pub fn outstanding(&self) -> usize {
        self.pending + self.in_progress
    }
}

/// Last granted task, persisted so delivery resumes across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CurrentTaskContext {
    pub task_id: TaskId,
    pub granted_at: DateTime<Utc>,
    /// Next content chunk not yet delivered
    #[serde(default)]
    pub next_chunk: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// Chunk size the chunk indices refer to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl CurrentTaskContext {
    pub fn new(task_id: impl Into<TaskId>, granted_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            granted_at,
            next_chunk: 0,
            total_chunks: None,
            max_length: None,
        }
    }
}

// ============================================================================
// Workflow stages
// ============================================================================

/// The six ordered pipeline stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Overview,
    FileAnalysis,
    ModuleDocs,
    Architecture,
    ApiReference,
    Summary,
}

impl StepId {
    /// All steps in pipeline order.
    pub const ALL: [StepId; 6] = [
        StepId::Overview,
        StepId::FileAnalysis,
        StepId::ModuleDocs,
        StepId::Architecture,
        StepId::ApiReference,
        StepId::Summary,
    ];

    /// 0-based position.
    pub fn index(self) -> usize {
        self as usize
    }

    /// 1-based stage number shown to humans.
    pub fn number(self) -> usize {
        self.index() + 1
    }

    /// Every step that must be completed before this one.
    pub fn prerequisites(self) -> &'static [StepId] {
        &Self::ALL[..self.index()]
    }

    pub fn next(self) -> Option<StepId> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::FileAnalysis => "file_analysis",
            Self::ModuleDocs => "module_docs",
            Self::Architecture => "architecture",
            Self::ApiReference => "api_reference",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepId {
    type Err = WorkflowError;

    /// Accepts the snake_case name, a kebab-case variant, or the 1-based number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        if let Ok(n) = normalized.parse::<usize>() {
            return n
                .checked_sub(1)
                .and_then(|i| Self::ALL.get(i).copied())
                .ok_or_else(|| WorkflowError::unknown_step(s));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == normalized)
            .ok_or_else(|| WorkflowError::unknown_step(s))
    }
}

/// Durable pipeline state for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WorkflowState {
    pub project_path: PathBuf,
    #[serde(default)]
    pub current_step: Option<StepId>,
    #[serde(default)]
    pub steps_completed: Vec<StepId>,
    /// Snapshot recorded when each step completed, keyed by step name
    #[serde(default)]
    pub step_results: BTreeMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowState {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            project_path: project_path.into(),
            current_step: None,
            steps_completed: Vec::new(),
            step_results: BTreeMap::new(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        }
    }

    pub fn is_completed(&self, step: StepId) -> bool {
        self.steps_completed.contains(&step)
    }

    /// First prerequisite of `step` not yet completed.
    pub fn missing_prerequisite(&self, step: StepId) -> Option<StepId> {
        step.prerequisites()
            .iter()
            .copied()
            .find(|p| !self.is_completed(*p))
    }

    /// Record `step` as complete. Returns false if it already was.
    pub fn mark_completed(&mut self, step: StepId, snapshot: serde_json::Value) -> bool {
        if self.is_completed(step) {
            return false;
        }
        self.steps_completed.push(step);
        self.steps_completed.sort();
        self.step_results.insert(step.as_str().to_string(), snapshot);
        self.current_step = step.next().or(Some(step));
        self.updated_at = Utc::now();
        if self.is_finished() {
            self.completed_at = Some(self.updated_at);
        }
        true
    }

    pub fn step_result(&self, step: StepId) -> Option<&serde_json::Value> {
        self.step_results.get(step.as_str())
    }

    pub fn is_finished(&self) -> bool {
        StepId::ALL.iter().all(|s| self.is_completed(*s))
    }

    /// Completed stages as a whole percentage.
    pub fn percentage(&self) -> u8 {
        let done = StepId::ALL
            .iter()
            .filter(|s| self.is_completed(**s))
            .count();
        ((done * 100) / StepId::ALL.len()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbering_and_prerequisites() {
        assert_eq!(StepId::Overview.number(), 1);
        assert_eq!(StepId::Summary.number(), 6);
        assert!(StepId::Overview.prerequisites().is_empty());
        assert_eq!(
            StepId::ModuleDocs.prerequisites(),
            &[StepId::Overview, StepId::FileAnalysis]
        );
        assert_eq!(StepId::Summary.next(), None);
    }

    #[test]
    fn test_step_parsing() {
        assert_eq!("file_analysis".parse::<StepId>().unwrap(), StepId::FileAnalysis);
        assert_eq!("API-Reference".parse::<StepId>().unwrap(), StepId::ApiReference);
        assert_eq!("3".parse::<StepId>().unwrap(), StepId::ModuleDocs);
        assert!("0".parse::<StepId>().is_err());
        assert!("7".parse::<StepId>().is_err());
        assert!("deploy".parse::<StepId>().is_err());
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::new("task_1", 0, Utc::now());
        assert!(task.complete(&[]).is_err());

        task.grant().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.granted_at.is_some());
        assert!(task.grant().is_err());

        task.complete(&["files/a.md".to_string()]).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.fail("late").is_err());
        assert_eq!(task.outputs, vec!["files/a.md".to_string()]);
    }

    #[test]
    fn test_batch_kind_serialization_is_tagged() {
        let batch = Batch {
            id: "task_3_2".to_string(),
            sequence_index: 3,
            total_tokens: 9_000,
            kind: BatchKind::Multi {
                file: "src/big.rs".to_string(),
                range: ChunkRange::new(100, 200),
                part_index: 2,
                total_parts: 2,
                is_last_part: true,
                forced_split: false,
            },
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["strategy"], "multi");
        assert_eq!(json["part_index"], 2);
        assert_eq!(json["is_last_part"], true);

        let single = serde_json::json!({
            "id": "task_2", "sequence_index": 1, "total_tokens": 18000,
            "strategy": "single", "file": "src/mid.rs"
        });
        let parsed: Batch = serde_json::from_value(single).unwrap();
        assert_eq!(parsed.part_index(), None);
        assert_eq!(parsed.files(), vec!["src/mid.rs"]);
    }

    #[test]
    fn test_workflow_state_completion() {
        let mut state = WorkflowState::new("/tmp/project");
        assert_eq!(state.missing_prerequisite(StepId::Architecture), Some(StepId::Overview));

        assert!(state.mark_completed(StepId::Overview, serde_json::json!({"ok": true})));
        assert!(!state.mark_completed(StepId::Overview, serde_json::json!({"ok": false})));
        assert_eq!(state.step_result(StepId::Overview).unwrap()["ok"], true);
        assert_eq!(state.current_step, Some(StepId::FileAnalysis));
        assert_eq!(state.percentage(), 16);

        for step in StepId::ALL {
            state.mark_completed(step, serde_json::Value::Null);
        }
        assert!(state.is_finished());
        assert!(state.completed_at.is_some());
        assert_eq!(state.percentage(), 100);
    }
}
