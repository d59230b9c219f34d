//! Restart and reset behavior: everything a caller relies on must come back
//! from disk alone, and resetting one project must leave others untouched.

use std::path::Path;
use std::sync::Arc;

use codebatch::state::schema::normalize_project_path;
use codebatch::{
    JsonStateStore, MemoryContentSource, StepId, TaskStatus, WorkflowConfig, WorkflowError,
    WorkflowOrchestrator, WorkflowStateStore,
};

/// Ten medium-sized Python files, one task each.
fn source_for(root: &Path) -> MemoryContentSource {
    let mut source = MemoryContentSource::new();
    for i in 0..10 {
        let body: String = (0..1_800)
            .map(|n| format!("value_{i}_{n} = compute({n}, scale={i})\n"))
            .collect();
        source.insert(root.join(format!("pkg/mod_{i}.py")), body);
    }
    source
}

fn files() -> Vec<String> {
    (0..10).map(|i| format!("pkg/mod_{i}.py")).collect()
}

fn open(state: &Path, project: &Path) -> WorkflowOrchestrator {
    let root = normalize_project_path(project);
    WorkflowOrchestrator::with_parts(
        WorkflowConfig::with_state_dir(state),
        JsonStateStore::new(state).shared(),
        Arc::new(source_for(&root)),
    )
    .unwrap()
}

fn next_id(o: &WorkflowOrchestrator, project: &Path) -> Option<String> {
    o.get_next_task(project)
        .unwrap()
        .task()
        .map(|g| g.task.id.clone())
}

#[test]
fn test_restart_resumes_at_correct_task() {
    let state = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();

    let total_tasks;
    let mut completed = Vec::new();
    {
        let o = open(state.path(), project.path());
        let plan = o
            .analyze_project(project.path(), Some(&files()), false)
            .unwrap()
            .plan;
        total_tasks = plan.total_tasks;
        assert!(total_tasks >= 2, "expected several tasks, got {total_tasks}");

        for _ in 0..total_tasks / 2 {
            let id = next_id(&o, project.path()).unwrap();
            o.complete_task(project.path(), &id, &[]).unwrap();
            completed.push(id);
        }
    }

    // Fresh process: nothing in memory survives.
    let o = open(state.path(), project.path());
    let mut rest = Vec::new();
    while let Some(id) = next_id(&o, project.path()) {
        assert!(!completed.contains(&id), "{id} was served twice");
        o.complete_task(project.path(), &id, &[]).unwrap();
        rest.push(id);
    }
    assert_eq!(completed.len() + rest.len(), total_tasks);
}

#[test]
fn test_restart_mid_task_reserves_same_task_and_chunk() {
    let state = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();

    let in_flight;
    {
        let o = open(state.path(), project.path());
        o.analyze_project(project.path(), Some(&files()), false)
            .unwrap();
        in_flight = next_id(&o, project.path()).unwrap();
        let first = o
            .get_task_content(project.path(), &in_flight, Some(5_000), None)
            .unwrap();
        assert_eq!(first.chunk_info.unwrap().chunk_index, 0);
    }

    let o = open(state.path(), project.path());
    let resumed = o.get_next_task(project.path()).unwrap();
    let resumed = resumed.task().unwrap();
    assert_eq!(resumed.task.id, in_flight);
    assert!(resumed.resumed);
    assert_eq!(resumed.task.status, TaskStatus::InProgress);

    let second = o
        .get_task_content(project.path(), &in_flight, Some(5_000), None)
        .unwrap();
    assert_eq!(second.chunk_info.unwrap().chunk_index, 1);
}

#[test]
fn test_reanalyzing_unchanged_project_keeps_progress() {
    let state = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let o = open(state.path(), project.path());

    let first = o
        .analyze_project(project.path(), Some(&files()), false)
        .unwrap();
    let id = next_id(&o, project.path()).unwrap();
    o.complete_task(project.path(), &id, &[]).unwrap();

    let again = o
        .analyze_project(project.path(), Some(&files()), false)
        .unwrap();
    assert!(again.kept_existing);
    assert_eq!(again.plan.fingerprint, first.plan.fingerprint);
    let ids = |p: &codebatch::BatchPlan| p.batches.iter().map(|b| b.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&again.plan), ids(&first.plan));

    let summary = o.queue().summary(project.path()).unwrap().unwrap();
    assert_eq!(summary.completed, 1);
}

#[test]
fn test_reset_isolates_projects() {
    let state = tempfile::tempdir().unwrap();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = open(state.path(), first.path());
    let b = open(state.path(), second.path());

    for (o, project) in [(&a, first.path()), (&b, second.path())] {
        o.analyze_project(project, Some(&files()), false).unwrap();
        let id = next_id(o, project).unwrap();
        o.complete_task(project, &id, &[]).unwrap();
        next_id(o, project).unwrap();
    }
    let before = b.get_workflow_status(second.path()).unwrap();

    let cleared = a.reset(Some(first.path())).unwrap();
    assert_eq!(cleared.len(), 1);
    assert!(cleared[0].tasks_cleared > 0);

    assert!(matches!(
        a.get_next_task(first.path()),
        Err(WorkflowError::NoPlan { .. })
    ));
    let after = b.get_workflow_status(second.path()).unwrap();
    assert_eq!(after.queue, before.queue);
    assert_eq!(after.queue.unwrap().in_progress, 1);
}

#[test]
fn test_reset_all_clears_every_project() {
    let state = tempfile::tempdir().unwrap();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = open(state.path(), first.path());
    let b = open(state.path(), second.path());
    a.analyze_project(first.path(), Some(&files()), false).unwrap();
    b.analyze_project(second.path(), Some(&files()), false).unwrap();

    let cleared = a.reset(None).unwrap();
    assert_eq!(cleared.len(), 2);
    assert!(b.get_workflow_status(second.path()).unwrap().queue.is_none());
}

#[test]
fn test_corrupted_state_starts_fresh_and_keeps_queue() {
    let state = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let o = open(state.path(), project.path());
    o.analyze_project(project.path(), Some(&files()), false)
        .unwrap();
    o.begin_step(project.path(), StepId::Overview).unwrap();

    let store = JsonStateStore::new(state.path());
    let dir = store.project_dir(project.path());
    std::fs::write(dir.join("workflow-state.json"), "{ not json").unwrap();
    std::fs::remove_file(dir.join("workflow-state.json.backup")).ok();

    let status = o.get_workflow_status(project.path()).unwrap();
    assert_eq!(status.current_step, None);
    assert!(status.steps_completed.is_empty());
    assert!(status.queue.is_some());
    assert!(store.load(project.path()).is_ok());
}
