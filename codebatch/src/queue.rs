//! Task queue: serves a project's tasks one at a time, in plan order.
//!
//! Every operation is read-modify-persist-return under the project lock, and
//! the persisted queue is the only source of truth. A task stays granted
//! (and is handed out again) until it is completed or failed, so a retried
//! `get_next` never skips ahead.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{WorkflowError, WorkflowResult};
use crate::planning::planner::BatchPlan;
use crate::state::store::{with_project_lock, SharedStateStore};
use crate::state::types::{
    Batch, CurrentTaskContext, QueueState, QueueSummary, SourceFile, Task, TaskStatus,
};

/// A task looked up by id, with its batch and the planned records of the
/// files that batch reads.
#[derive(Debug, Clone)]
pub struct TaskLookup {
    pub task: Task,
    pub batch: Batch,
    pub sources: Vec<SourceFile>,
}

/// A granted task with the batch it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GrantedTask {
    pub task: Task,
    pub batch: Batch,
    /// True when this task was already in progress before the call
    pub resumed: bool,
    /// 1-based position in the plan
    pub position: usize,
    pub total_tasks: usize,
}

/// Terminal answer once every task is completed or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QueueExhausted {
    /// Always true
    pub completed: bool,
    pub summary: QueueSummary,
}

/// Result of [`TaskQueue::get_next`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum NextTask {
    Task(Box<GrantedTask>),
    Exhausted(QueueExhausted),
}

impl NextTask {
    pub fn task(&self) -> Option<&GrantedTask> {
        match self {
            Self::Task(granted) => Some(granted),
            Self::Exhausted(_) => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
}

/// Result of [`TaskQueue::complete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CompletionOutcome {
    pub task: Task,
    /// The task was already completed; nothing changed
    pub already_completed: bool,
}

/// Result of [`TaskQueue::install_plan`].
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// The plan now in effect
    pub plan: BatchPlan,
    /// The persisted queue had the same fingerprint and was kept
    pub kept_existing: bool,
    /// Pending or in-progress tasks dropped by a replacement
    pub discarded_tasks: usize,
}

/// Queue operations over a [`SharedStateStore`].
#[derive(Clone)]
pub struct TaskQueue {
    store: SharedStateStore,
}

impl TaskQueue {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    fn with_lock<T>(
        &self,
        project: &Path,
        f: impl FnOnce() -> WorkflowResult<T>,
    ) -> WorkflowResult<T> {
        with_project_lock(self.store.as_ref(), project, f)
    }

    fn load(&self, project: &Path) -> WorkflowResult<QueueState> {
        self.store
            .load_queue(project)?
            .ok_or_else(|| WorkflowError::NoPlan {
                project: project.to_path_buf(),
            })
    }

    /// Persist a freshly built plan.
    ///
    /// If the stored queue has the same fingerprint and `force` is false,
    /// the stored queue (with its statuses) is kept.
    pub fn install_plan(
        &self,
        project: &Path,
        plan: BatchPlan,
        force: bool,
    ) -> WorkflowResult<InstallOutcome> {
        self.with_lock(project, || {
            let existing = self.store.load_queue(project)?;

            if let Some(existing) = &existing {
                if !force && existing.plan.fingerprint == plan.fingerprint {
                    info!(
                        project = %project.display(),
                        fingerprint = %plan.fingerprint,
                        "Plan unchanged, keeping existing queue"
                    );
                    return Ok(InstallOutcome {
                        plan: existing.plan.clone(),
                        kept_existing: true,
                        discarded_tasks: 0,
                    });
                }
            }

            let discarded_tasks = existing
                .as_ref()
                .map(|q| q.summary().outstanding())
                .unwrap_or(0);
            if discarded_tasks > 0 {
                warn!(
                    project = %project.display(),
                    discarded = discarded_tasks,
                    "Replacing plan with outstanding tasks"
                );
            }

            let queue = QueueState::new(plan);
            self.store.save_queue(project, &queue)?;
            self.store.clear_task_context(project)?;

            info!(
                project = %project.display(),
                tasks = queue.tasks.len(),
                "Batch plan persisted"
            );
            Ok(InstallOutcome {
                plan: queue.plan,
                kept_existing: false,
                discarded_tasks,
            })
        })
    }

    /// Grant the next task, or re-serve the one already in progress.
    pub fn get_next(&self, project: &Path) -> WorkflowResult<NextTask> {
        self.with_lock(project, || {
            let mut queue = self.load(project)?;
            let total_tasks = queue.tasks.len();

            if let Some(idx) = queue
                .tasks
                .iter()
                .position(|t| t.status == TaskStatus::InProgress)
            {
                let task = queue.tasks[idx].clone();
                warn!(
                    project = %project.display(),
                    task_id = %task.id,
                    granted_at = ?task.granted_at,
                    "Re-serving task already in progress"
                );
                self.ensure_context(project, &task)?;
                return Ok(NextTask::Task(Box::new(GrantedTask {
                    batch: self.batch_of(&queue, &task)?,
                    task,
                    resumed: true,
                    position: idx + 1,
                    total_tasks,
                })));
            }

            let Some(idx) = queue
                .tasks
                .iter()
                .position(|t| t.status == TaskStatus::Pending)
            else {
                return Ok(NextTask::Exhausted(QueueExhausted {
                    completed: true,
                    summary: queue.summary(),
                }));
            };

            queue.tasks[idx].grant()?;
            queue.updated_at = chrono::Utc::now();
            self.store.save_queue(project, &queue)?;

            let task = queue.tasks[idx].clone();
            let granted_at = task.granted_at.unwrap_or(queue.updated_at);
            self.store
                .save_task_context(project, &CurrentTaskContext::new(task.id.clone(), granted_at))?;

            info!(
                project = %project.display(),
                task_id = %task.id,
                position = idx + 1,
                total = total_tasks,
                "Task granted"
            );
            Ok(NextTask::Task(Box::new(GrantedTask {
                batch: self.batch_of(&queue, &task)?,
                task,
                resumed: false,
                position: idx + 1,
                total_tasks,
            })))
        })
    }

    /// `in_progress -> completed`. Completing a completed task is a no-op.
    pub fn complete(
        &self,
        project: &Path,
        task_id: &str,
        outputs: &[String],
    ) -> WorkflowResult<CompletionOutcome> {
        self.with_lock(project, || {
            let mut queue = self.load(project)?;
            let task = queue
                .task_mut(task_id)
                .ok_or_else(|| WorkflowError::task_not_found(task_id))?;

            if task.status == TaskStatus::Completed {
                return Ok(CompletionOutcome {
                    task: task.clone(),
                    already_completed: true,
                });
            }

            task.complete(outputs)?;
            let task = task.clone();
            queue.updated_at = chrono::Utc::now();
            self.store.save_queue(project, &queue)?;
            self.clear_context_for(project, task_id)?;

            info!(
                project = %project.display(),
                task_id,
                outputs = task.outputs.len(),
                "Task completed"
            );
            Ok(CompletionOutcome {
                task,
                already_completed: false,
            })
        })
    }

    /// `in_progress -> error`. Failing a failed task is a no-op.
    pub fn fail(&self, project: &Path, task_id: &str, message: &str) -> WorkflowResult<Task> {
        self.with_lock(project, || {
            let mut queue = self.load(project)?;
            let task = queue
                .task_mut(task_id)
                .ok_or_else(|| WorkflowError::task_not_found(task_id))?;

            if task.status == TaskStatus::Error {
                return Ok(task.clone());
            }

            task.fail(message)?;
            let task = task.clone();
            queue.updated_at = chrono::Utc::now();
            self.store.save_queue(project, &queue)?;
            self.clear_context_for(project, task_id)?;

            warn!(project = %project.display(), task_id, error = message, "Task failed");
            Ok(task)
        })
    }

    /// Task and batch for `task_id`.
    pub fn get_task(&self, project: &Path, task_id: &str) -> WorkflowResult<TaskLookup> {
        let queue = self.load(project)?;
        let task = queue
            .task(task_id)
            .cloned()
            .ok_or_else(|| WorkflowError::task_not_found(task_id))?;
        let batch = self.batch_of(&queue, &task)?;
        let sources = batch
            .files()
            .into_iter()
            .filter_map(|path| queue.plan.file(path).cloned())
            .collect();
        Ok(TaskLookup {
            task,
            batch,
            sources,
        })
    }

    pub fn summary(&self, project: &Path) -> WorkflowResult<Option<QueueSummary>> {
        Ok(self.store.load_queue(project)?.map(|q| q.summary()))
    }

    pub fn plan(&self, project: &Path) -> WorkflowResult<Option<BatchPlan>> {
        Ok(self.store.load_queue(project)?.map(|q| q.plan))
    }

    /// Outstanding (pending or in-progress) tasks in plan order.
    pub fn outstanding(&self, project: &Path) -> WorkflowResult<Vec<Task>> {
        Ok(self
            .store
            .load_queue(project)?
            .map(|q| {
                q.tasks
                    .into_iter()
                    .filter(|t| !t.status.is_terminal())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn batch_of(&self, queue: &QueueState, task: &Task) -> WorkflowResult<Batch> {
        queue
            .batch_for(task)
            .cloned()
            .ok_or_else(|| WorkflowError::task_not_found(&task.id))
    }

    /// Recreate the context file if a crash lost it after the grant.
    fn ensure_context(&self, project: &Path, task: &Task) -> WorkflowResult<()> {
        let current = self.store.load_task_context(project)?;
        if current.as_ref().map(|c| c.task_id.as_str()) != Some(task.id.as_str()) {
            let granted_at = task.granted_at.unwrap_or_else(chrono::Utc::now);
            self.store
                .save_task_context(project, &CurrentTaskContext::new(task.id.clone(), granted_at))?;
        }
        Ok(())
    }

    fn clear_context_for(&self, project: &Path, task_id: &str) -> WorkflowResult<()> {
        if let Some(context) = self.store.load_task_context(project)? {
            if context.task_id == task_id {
                self.store.clear_task_context(project)?;
            }
        }
        Ok(())
    }
}
