//! Workflow Orchestrator
//!
//! Drives the six-stage pipeline for a project. Stage `k` can only be
//! entered once stages `1..k-1` are in `steps_completed`, and
//! [`WorkflowOrchestrator::check_step_completion`] is the one place a stage
//! becomes complete.
//!
//! Mutations run read-modify-persist under the store's per-project lock.
//! Nothing here keeps authoritative state in memory between calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::planning::file_walker::FileWalker;
use crate::planning::BatchPlanner;
use crate::queue::{CompletionOutcome, InstallOutcome, NextTask, TaskLookup, TaskQueue};
use crate::source::{ContentSource, FsContentSource};
use crate::state::schema::normalize_project_path;
use crate::state::store::{with_project_lock, JsonStateStore, ResetSummary, SharedStateStore};
use crate::state::types::{CurrentTaskContext, QueueSummary, StepId, Task, TaskStatus};
use crate::tokens::{DensityEstimator, TokenEstimator};
use crate::validation::{discover_modules, StepValidationResult};

use super::content::{self, TaskContent};
use super::steps::{ArtifactRule, StepDefinition};

/// Result of entering a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StepEntry {
    pub step: StepId,
    pub step_number: usize,
    pub title: String,
    pub already_completed: bool,
    /// Persisted completion snapshot when the step was already completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

/// Pipeline progress for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WorkflowStatus {
    pub project_path: PathBuf,
    pub current_step: Option<StepId>,
    pub current_step_number: Option<usize>,
    pub steps_completed: Vec<StepId>,
    pub percentage: u8,
    pub is_finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Absent until the project has been analyzed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueSummary>,
}

/// Composes planning, the task queue, validators and the state store.
pub struct WorkflowOrchestrator {
    config: WorkflowConfig,
    store: SharedStateStore,
    queue: TaskQueue,
    source: Arc<dyn ContentSource>,
    estimator: Arc<dyn TokenEstimator>,
}

impl WorkflowOrchestrator {
    /// Filesystem-backed orchestrator rooted at `config.state_dir`.
    pub fn new(config: WorkflowConfig) -> WorkflowResult<Self> {
        let store = JsonStateStore::new(&config.state_dir).shared();
        Self::with_parts(config, store, Arc::new(FsContentSource::new()))
    }

    pub fn with_parts(
        config: WorkflowConfig,
        store: SharedStateStore,
        source: Arc<dyn ContentSource>,
    ) -> WorkflowResult<Self> {
        config.validate()?;
        let estimator: Arc<dyn TokenEstimator> =
            Arc::new(DensityEstimator::new(config.batch.chars_per_token));
        Ok(Self {
            queue: TaskQueue::new(store.clone()),
            config,
            store,
            source,
            estimator,
        })
    }

    /// Swap the token estimator used for planning.
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Where a project's generated artifacts live.
    pub fn output_root(&self, project: &Path) -> PathBuf {
        normalize_project_path(project).join(&self.config.output_dir)
    }

    fn locked<T>(
        &self,
        project: &Path,
        f: impl FnOnce() -> WorkflowResult<T>,
    ) -> WorkflowResult<T> {
        with_project_lock(self.store.as_ref(), project, f)
    }

    // ------------------------------------------------------------------
    // Planning and tasks
    // ------------------------------------------------------------------

    /// Plan `files` (or every discovered source file) and persist the queue.
    pub fn analyze_project(
        &self,
        project: &Path,
        files: Option<&[String]>,
        force: bool,
    ) -> WorkflowResult<InstallOutcome> {
        let root = normalize_project_path(project);
        let planner = BatchPlanner::with_estimator(
            self.config.batch.clone(),
            self.source.clone(),
            self.estimator.clone(),
        );
        let plan = match files {
            Some(files) => planner.plan(&root, files)?,
            None => planner.plan_discovered(&root, &self.discover(&root)?)?,
        };
        info!(
            project = %root.display(),
            files = plan.files.len(),
            tasks = plan.total_tasks,
            tokens = plan.total_tokens,
            warnings = plan.warnings.len(),
            "Project analyzed"
        );
        self.queue.install_plan(&root, plan, force)
    }

    fn discover(&self, root: &Path) -> WorkflowResult<Vec<String>> {
        if !root.is_dir() {
            return Err(WorkflowError::invalid_file_list(format!(
                "project path {} is not a directory",
                root.display()
            )));
        }
        let files = FileWalker::new(root)
            .exclude(&self.config.state_dir)
            .exclude(&self.config.output_dir)
            .source_files();
        if files.is_empty() {
            return Err(WorkflowError::invalid_file_list(format!(
                "no source files found under {}",
                root.display()
            )));
        }
        debug!(project = %root.display(), files = files.len(), "Discovered source files");
        Ok(files)
    }

    pub fn get_next_task(&self, project: &Path) -> WorkflowResult<NextTask> {
        self.queue.get_next(&normalize_project_path(project))
    }

    pub fn complete_task(
        &self,
        project: &Path,
        task_id: &str,
        outputs: &[String],
    ) -> WorkflowResult<CompletionOutcome> {
        self.queue
            .complete(&normalize_project_path(project), task_id, outputs)
    }

    pub fn fail_task(&self, project: &Path, task_id: &str, message: &str) -> WorkflowResult<Task> {
        self.queue
            .fail(&normalize_project_path(project), task_id, message)
    }

    /// Content of a task, one delivery chunk at a time.
    ///
    /// Without `chunk_index`, the task currently in progress resumes at the
    /// next chunk not yet delivered (wrapping to 0 once all were served);
    /// any other task starts at 0.
    pub fn get_task_content(
        &self,
        project: &Path,
        task_id: &str,
        max_length: Option<usize>,
        chunk_index: Option<usize>,
    ) -> WorkflowResult<TaskContent> {
        let root = normalize_project_path(project);
        let max_length = max_length.unwrap_or(self.config.batch.delivery_max_length);
        if max_length == 0 {
            return Err(WorkflowError::config("max_length must be positive"));
        }

        self.locked(&root, || {
            let TaskLookup {
                task,
                batch,
                sources,
            } = self.queue.get_task(&root, task_id)?;
            let text = content::assemble(&batch, &root, self.source.as_ref(), &sources)?;
            let total_chunks = content::chunk_ranges(&text, max_length).len();

            let context = self
                .store
                .load_task_context(&root)?
                .filter(|c| c.task_id == task.id);

            let index = chunk_index.unwrap_or_else(|| match &context {
                Some(c) if c.max_length == Some(max_length) && c.next_chunk < total_chunks => {
                    c.next_chunk
                }
                _ => 0,
            });
            let (chunk, info) = content::select_chunk(&text, max_length, index)?;

            if task.status == TaskStatus::InProgress {
                let mut context = context.unwrap_or_else(|| {
                    CurrentTaskContext::new(task.id.clone(), task.granted_at.unwrap_or_else(Utc::now))
                });
                context.next_chunk = index + 1;
                context.total_chunks = Some(total_chunks);
                context.max_length = Some(max_length);
                self.store.save_task_context(&root, &context)?;
            }

            debug!(
                task_id,
                chunk = index,
                total = total_chunks,
                chars = chunk.chars().count(),
                "Task content delivered"
            );
            Ok(TaskContent::new(
                &batch,
                chunk,
                (total_chunks > 1).then_some(info),
            ))
        })
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    /// Enter `step`. Fails fast naming the first missing prerequisite.
    pub fn begin_step(&self, project: &Path, step: StepId) -> WorkflowResult<StepEntry> {
        let root = normalize_project_path(project);
        let def = StepDefinition::of(step);

        self.locked(&root, || {
            let mut state = self.store.load(&root)?;
            if state.is_completed(step) {
                // The snapshot file may be gone; the state keeps its own copy.
                let stored = if self.store.exists(step, &root) {
                    self.store.load_step_result(&root, step)?
                } else {
                    None
                };
                let snapshot = stored.or_else(|| state.step_result(step).cloned());
                return Ok(StepEntry {
                    step,
                    step_number: step.number(),
                    title: def.title.to_string(),
                    already_completed: true,
                    snapshot,
                });
            }

            if let Some(missing) = state.missing_prerequisite(step) {
                warn!(project = %root.display(), %step, %missing, "Step entered before prerequisite");
                return Err(WorkflowError::PrerequisiteNotMet { step, missing });
            }

            state.current_step = Some(step);
            state.updated_at = Utc::now();
            self.store.save(&root, &state)?;
            info!(project = %root.display(), %step, number = step.number(), "Step started");

            Ok(StepEntry {
                step,
                step_number: step.number(),
                title: def.title.to_string(),
                already_completed: false,
                snapshot: None,
            })
        })
    }

    /// Validate `step`'s artifacts and complete it when they are present.
    ///
    /// An already-completed step returns its persisted result unchanged.
    pub fn check_step_completion(
        &self,
        project: &Path,
        step: StepId,
    ) -> WorkflowResult<StepValidationResult> {
        let root = normalize_project_path(project);
        let def = StepDefinition::of(step);

        self.locked(&root, || {
            let mut state = self.store.load(&root)?;

            if state.is_completed(step) {
                let persisted = self
                    .store
                    .load_step_result(&root, step)?
                    .or_else(|| state.step_result(step).cloned())
                    .and_then(|v| serde_json::from_value::<StepValidationResult>(v).ok());
                if let Some(result) = persisted {
                    return Ok(result);
                }
                let mut result = StepValidationResult::from_missing(
                    step,
                    def.validator(&[]).strategy(),
                    Vec::new(),
                );
                result.message = format!("Step {} ({}) already completed", step.number(), step);
                return Ok(result);
            }

            if let Some(missing) = state.missing_prerequisite(step) {
                return Err(WorkflowError::PrerequisiteNotMet { step, missing });
            }

            let modules = match def.artifacts {
                ArtifactRule::Modules { .. } => self.modules(&root)?,
                _ => Vec::new(),
            };
            let validator = def.validator(&modules);
            let mut missing = validator.missing(&self.output_root(&root));
            if def.requires_drained_queue {
                missing.extend(self.undrained(&root)?);
            }

            let mut result = StepValidationResult::from_missing(step, validator.strategy(), missing);
            if !result.success {
                debug!(
                    project = %root.display(),
                    %step,
                    missing = result.missing_artifacts.len(),
                    "Step not complete yet"
                );
                return Ok(result);
            }

            result.auto_completed = true;
            result.message = format!("Step {} ({}) completed", step.number(), step);
            let snapshot = serde_json::to_value(&result)?;
            self.store.save_step_result(&root, step, &snapshot)?;
            state.mark_completed(step, snapshot);
            self.store.save(&root, &state)?;

            info!(
                project = %root.display(),
                %step,
                progress = state.percentage(),
                "Step completed"
            );
            Ok(result)
        })
    }

    fn modules(&self, root: &Path) -> WorkflowResult<Vec<String>> {
        Ok(self
            .queue
            .plan(root)?
            .map(|plan| discover_modules(plan.files.iter().map(|f| f.path.as_str())))
            .unwrap_or_default())
    }

    /// Queue entries that keep the batch stage open.
    fn undrained(&self, root: &Path) -> WorkflowResult<Vec<String>> {
        if self.queue.plan(root)?.is_none() {
            return Ok(vec!["batch plan (analyze_project)".to_string()]);
        }
        Ok(self
            .queue
            .outstanding(root)?
            .iter()
            .map(|t| format!("{} ({})", t.id, t.status))
            .collect())
    }

    pub fn get_workflow_status(&self, project: &Path) -> WorkflowResult<WorkflowStatus> {
        let root = normalize_project_path(project);
        let has_state = self.store.has_state(&root);
        let state = self.store.load(&root)?;
        Ok(WorkflowStatus {
            current_step: state.current_step,
            current_step_number: state.current_step.map(StepId::number),
            percentage: state.percentage(),
            is_finished: state.is_finished(),
            started_at: has_state.then_some(state.started_at),
            completed_at: state.completed_at,
            queue: self.queue.summary(&root)?,
            steps_completed: state.steps_completed,
            project_path: root,
        })
    }

    /// Clear one project's state, or every project's when `project` is None.
    pub fn reset(&self, project: Option<&Path>) -> WorkflowResult<Vec<ResetSummary>> {
        match project {
            Some(project) => {
                let root = normalize_project_path(project);
                let summary = self.locked(&root, || Ok(self.store.reset(&root)?))?;
                Ok(vec![summary])
            }
            None => {
                let mut cleared = Vec::new();
                for project in self.store.projects()? {
                    cleared.push(self.locked(&project, || Ok(self.store.reset(&project)?))?);
                }
                // Directories whose project could not be read back.
                cleared.extend(self.store.reset_all()?);
                info!(projects = cleared.len(), "All workflow state reset");
                Ok(cleared)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::PlanWarning;
    use crate::source::MemoryContentSource;
    use std::fs;

    struct Fixture {
        _state: tempfile::TempDir,
        project: tempfile::TempDir,
        orchestrator: WorkflowOrchestrator,
    }

    impl Fixture {
        fn root(&self) -> PathBuf {
            normalize_project_path(self.project.path())
        }

        fn write_artifact(&self, relative: &str) {
            let path = self.orchestrator.output_root(self.project.path()).join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "# generated\n").unwrap();
        }
    }

    fn fixture() -> Fixture {
        let state = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let root = normalize_project_path(project.path());
        let source = MemoryContentSource::new()
            .with_file(root.join("src/main.rs"), "fn main() {}\n")
            .with_file(root.join("src/planning/mod.rs"), "pub mod strategy;\n");
        let orchestrator = WorkflowOrchestrator::with_parts(
            WorkflowConfig::with_state_dir(state.path()),
            JsonStateStore::new(state.path()).shared(),
            Arc::new(source),
        )
        .unwrap();
        Fixture {
            _state: state,
            project,
            orchestrator,
        }
    }

    fn analyze(f: &Fixture) {
        let files = vec!["src/main.rs".to_string(), "src/planning/mod.rs".to_string()];
        f.orchestrator
            .analyze_project(f.project.path(), Some(&files), false)
            .unwrap();
    }

    #[test]
    fn test_begin_step_requires_prerequisites() {
        let f = fixture();
        let err = f
            .orchestrator
            .begin_step(f.project.path(), StepId::Architecture)
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::PrerequisiteNotMet {
                step: StepId::Architecture,
                missing: StepId::Overview
            }
        ));

        let entry = f
            .orchestrator
            .begin_step(f.project.path(), StepId::Overview)
            .unwrap();
        assert!(!entry.already_completed);
        let status = f.orchestrator.get_workflow_status(f.project.path()).unwrap();
        assert_eq!(status.current_step, Some(StepId::Overview));
        assert_eq!(status.current_step_number, Some(1));
        assert!(status.started_at.is_some());
    }

    #[test]
    fn test_check_completion_auto_completes_and_is_idempotent() {
        let f = fixture();
        let result = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::Overview)
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.missing_artifacts, vec!["overview.md", "tech-stack.md"]);

        f.write_artifact("overview.md");
        f.write_artifact("tech-stack.md");
        let first = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::Overview)
            .unwrap();
        assert!(first.success);
        assert!(first.auto_completed);

        // Removing artifacts afterwards does not un-complete the step.
        fs::remove_file(f.orchestrator.output_root(f.project.path()).join("overview.md")).unwrap();
        let again = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::Overview)
            .unwrap();
        assert_eq!(again, first);

        let entry = f
            .orchestrator
            .begin_step(f.project.path(), StepId::Overview)
            .unwrap();
        assert!(entry.already_completed);
        assert_eq!(entry.snapshot.unwrap()["auto_completed"], true);
    }

    #[test]
    fn test_file_analysis_waits_for_queue() {
        let f = fixture();
        f.write_artifact("overview.md");
        f.write_artifact("tech-stack.md");
        f.orchestrator
            .check_step_completion(f.project.path(), StepId::Overview)
            .unwrap();
        f.write_artifact("files/main.md");

        let no_plan = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::FileAnalysis)
            .unwrap();
        assert!(!no_plan.success);

        analyze(&f);
        let pending = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::FileAnalysis)
            .unwrap();
        assert!(!pending.success);
        assert_eq!(pending.missing_artifacts, vec!["task_1 (pending)"]);

        let next = f.orchestrator.get_next_task(f.project.path()).unwrap();
        let id = next.task().unwrap().task.id.clone();
        let in_progress = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::FileAnalysis)
            .unwrap();
        assert_eq!(in_progress.missing_artifacts, vec!["task_1 (in_progress)"]);

        f.orchestrator
            .complete_task(f.project.path(), &id, &["files/main.md".to_string()])
            .unwrap();
        let done = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::FileAnalysis)
            .unwrap();
        assert!(done.success, "{}", done.message);
    }

    #[test]
    fn test_module_docs_uses_planned_modules() {
        let f = fixture();
        analyze(&f);
        for artifact in ["overview.md", "tech-stack.md", "files/a.md"] {
            f.write_artifact(artifact);
        }
        let id = f
            .orchestrator
            .get_next_task(f.project.path())
            .unwrap()
            .task()
            .unwrap()
            .task
            .id
            .clone();
        f.orchestrator.complete_task(f.project.path(), &id, &[]).unwrap();
        for step in [StepId::Overview, StepId::FileAnalysis] {
            assert!(f
                .orchestrator
                .check_step_completion(f.project.path(), step)
                .unwrap()
                .success);
        }

        let result = f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::ModuleDocs)
            .unwrap();
        assert_eq!(result.missing_artifacts, vec!["modules/planning/*.md"]);

        f.write_artifact("modules/planning/overview.md");
        assert!(f
            .orchestrator
            .check_step_completion(f.project.path(), StepId::ModuleDocs)
            .unwrap()
            .success);
    }

    #[test]
    fn test_task_content_resumes_at_next_chunk() {
        let f = fixture();
        analyze(&f);
        let id = f
            .orchestrator
            .get_next_task(f.project.path())
            .unwrap()
            .task()
            .unwrap()
            .task
            .id
            .clone();

        let first = f
            .orchestrator
            .get_task_content(f.project.path(), &id, Some(24), None)
            .unwrap();
        let info = first.chunk_info.unwrap();
        assert_eq!(info.chunk_index, 0);
        assert!(info.has_more);

        let second = f
            .orchestrator
            .get_task_content(f.project.path(), &id, Some(24), None)
            .unwrap();
        assert_eq!(second.chunk_info.unwrap().chunk_index, 1);

        let explicit = f
            .orchestrator
            .get_task_content(f.project.path(), &id, Some(24), Some(0))
            .unwrap();
        assert_eq!(explicit.content, first.content);

        let whole = f
            .orchestrator
            .get_task_content(f.project.path(), &id, None, None)
            .unwrap();
        assert!(whole.chunk_info.is_none());
        assert!(whole.content.contains("===== src/main.rs ====="));
        assert!(whole.content.contains("pub mod strategy;"));
    }

    #[test]
    fn test_reset_returns_project_to_start() {
        let f = fixture();
        analyze(&f);
        f.orchestrator.get_next_task(f.project.path()).unwrap();
        f.orchestrator
            .begin_step(f.project.path(), StepId::Overview)
            .unwrap();

        let cleared = f.orchestrator.reset(Some(f.project.path())).unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].tasks_cleared, 1);
        assert_eq!(cleared[0].current_task.as_deref(), Some("task_1"));

        let status = f.orchestrator.get_workflow_status(f.project.path()).unwrap();
        assert_eq!(status.current_step, None);
        assert!(status.queue.is_none());
        assert!(status.started_at.is_none());
        assert_eq!(status.project_path, f.root());
        assert!(matches!(
            f.orchestrator.get_next_task(f.project.path()),
            Err(WorkflowError::NoPlan { .. })
        ));
    }

    #[test]
    fn test_begin_completed_step_without_snapshot_file() {
        let f = fixture();
        f.write_artifact("overview.md");
        f.write_artifact("tech-stack.md");
        f.orchestrator
            .check_step_completion(f.project.path(), StepId::Overview)
            .unwrap();
        f.orchestrator
            .begin_step(f.project.path(), StepId::FileAnalysis)
            .unwrap();

        let store = JsonStateStore::new(&f.orchestrator.config.state_dir);
        let snapshot = store
            .project_dir(f.project.path())
            .join(crate::state::schema::keys::step_result(StepId::Overview));
        fs::remove_file(snapshot).unwrap();

        let entry = f
            .orchestrator
            .begin_step(f.project.path(), StepId::Overview)
            .unwrap();
        assert!(entry.already_completed);
        assert_eq!(entry.snapshot.unwrap()["success"], true);
        let status = f.orchestrator.get_workflow_status(f.project.path()).unwrap();
        assert_eq!(status.current_step, Some(StepId::FileAnalysis));
    }

    #[test]
    fn test_reset_all_waits_for_project_lock() {
        let f = fixture();
        analyze(&f);

        let lock = f.orchestrator.store.project_lock(f.project.path());
        let guard = lock.lock().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let cleared = f.orchestrator.reset(None).unwrap();
                tx.send(cleared.len()).unwrap();
            });

            assert!(rx
                .recv_timeout(std::time::Duration::from_millis(200))
                .is_err());
            drop(guard);
            assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(10)), Ok(1));
        });
        assert!(matches!(
            f.orchestrator.get_next_task(f.project.path()),
            Err(WorkflowError::NoPlan { .. })
        ));
    }

    #[test]
    fn test_discovery_skips_non_utf8_files() {
        let state = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        fs::write(project.path().join("src/legacy.c"), b"/* caf\xe9 */\nint x;\n").unwrap();

        let orchestrator =
            WorkflowOrchestrator::new(WorkflowConfig::with_state_dir(state.path())).unwrap();
        let plan = orchestrator
            .analyze_project(project.path(), None, false)
            .unwrap()
            .plan;
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].path, "src/lib.rs");
        assert_eq!(
            plan.warnings,
            vec![PlanWarning::UndecodableFile {
                path: "src/legacy.c".to_string()
            }]
        );

        let explicit = vec!["src/legacy.c".to_string()];
        assert!(matches!(
            orchestrator.analyze_project(project.path(), Some(&explicit), true),
            Err(WorkflowError::InvalidFileList { .. })
        ));
    }

    #[test]
    fn test_discovery_excludes_output_dir() {
        let state = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        fs::create_dir_all(project.path().join("docs/codebatch/files")).unwrap();
        fs::write(project.path().join("docs/codebatch/files/lib.md"), "# lib\n").unwrap();

        let orchestrator =
            WorkflowOrchestrator::new(WorkflowConfig::with_state_dir(state.path())).unwrap();
        let outcome = orchestrator.analyze_project(project.path(), None, false).unwrap();
        assert_eq!(outcome.plan.files.len(), 1);
        assert_eq!(outcome.plan.files[0].path, "src/lib.rs");
    }
}
