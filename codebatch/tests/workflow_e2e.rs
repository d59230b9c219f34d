//! End-to-end workflow: plan a project, drain the task queue, and walk all
//! six stages to completion against real artifacts on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use codebatch::state::schema::normalize_project_path;
use codebatch::{
    BatchKind, FsContentSource, JsonStateStore, Language, MemoryContentSource, NextTask, StepId,
    TokenEstimator, WorkflowConfig, WorkflowError, WorkflowOrchestrator,
};

/// One token per byte, so token estimates are exact file sizes.
struct ByteEstimator;

impl TokenEstimator for ByteEstimator {
    fn estimate(&self, text: &str, _language: Language) -> usize {
        text.len()
    }

    fn name(&self) -> &str {
        "bytes"
    }
}

/// Filler content of exactly `len` bytes.
fn filler(len: usize) -> String {
    let line = "// filler line for token budget\n";
    let mut out = line.repeat(len / line.len() + 1);
    out.truncate(len);
    out
}

/// A Rust file of roughly `len` bytes made of small top-level functions.
fn functions(len: usize) -> String {
    let mut out = String::new();
    let mut i = 0;
    while out.len() < len {
        out.push_str(&format!(
            "pub fn handler_{i:04}(input: u64) -> u64 {{\n    let scaled = input * {i};\n    scaled + 1\n}}\n\n"
        ));
        i += 1;
    }
    out
}

struct Scenario {
    _state: tempfile::TempDir,
    project: tempfile::TempDir,
    root: PathBuf,
    big: String,
    orchestrator: WorkflowOrchestrator,
}

fn scenario() -> Scenario {
    let state = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let root = normalize_project_path(project.path());

    let big = functions(28_000);
    let source = MemoryContentSource::new()
        .with_file(root.join("src/alpha.rs"), filler(3_000))
        .with_file(root.join("src/beta.rs"), filler(5_000))
        .with_file(root.join("src/gamma.rs"), filler(10_000))
        .with_file(root.join("src/delta.rs"), filler(18_000))
        .with_file(root.join("src/engine/big.rs"), big.clone());

    let orchestrator = WorkflowOrchestrator::with_parts(
        WorkflowConfig::with_state_dir(state.path()),
        JsonStateStore::new(state.path()).shared(),
        Arc::new(source),
    )
    .unwrap()
    .with_estimator(Arc::new(ByteEstimator));

    Scenario {
        _state: state,
        project,
        root,
        big,
        orchestrator,
    }
}

fn file_list() -> Vec<String> {
    ["src/alpha.rs", "src/beta.rs", "src/gamma.rs", "src/delta.rs", "src/engine/big.rs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn write_artifact(root: &Path, relative: &str) {
    let path = root.join("docs/codebatch").join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "# generated\n").unwrap();
}

#[test]
fn test_reference_plan_shape() {
    let s = scenario();
    let outcome = s
        .orchestrator
        .analyze_project(s.project.path(), Some(&file_list()), false)
        .unwrap();
    let plan = outcome.plan;

    let ids: Vec<&str> = plan.batches.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["task_1", "task_2", "task_3_1", "task_3_2"]);
    assert_eq!(plan.total_tasks, 4);

    let combined = &plan.batches[0];
    assert_eq!(combined.total_tokens, 18_000);
    match &combined.kind {
        BatchKind::Combined { files } => {
            let mut files = files.clone();
            files.sort();
            assert_eq!(files, vec!["src/alpha.rs", "src/beta.rs", "src/gamma.rs"]);
        }
        other => panic!("expected combined batch, got {other:?}"),
    }

    assert!(matches!(
        &plan.batches[1].kind,
        BatchKind::Single { file } if file == "src/delta.rs"
    ));

    // The two parts are ordered, bounded, and rebuild the file exactly.
    let mut rebuilt = String::new();
    for (k, batch) in plan.batches[2..].iter().enumerate() {
        assert!(batch.total_tokens <= 18_000, "{} has {}", batch.id, batch.total_tokens);
        match &batch.kind {
            BatchKind::Multi {
                range,
                part_index,
                total_parts,
                is_last_part,
                forced_split,
                ..
            } => {
                assert_eq!(*part_index, k + 1);
                assert_eq!(*total_parts, 2);
                assert_eq!(*is_last_part, k == 1);
                assert!(!forced_split);
                rebuilt.push_str(&s.big[range.start..range.end]);
            }
            other => panic!("expected multi batch, got {other:?}"),
        }
    }
    assert_eq!(rebuilt, s.big);
    assert!(plan.warnings.is_empty());
    assert!(plan.batches.iter().all(|b| b.total_tokens <= 25_000));
}

#[test]
fn test_parts_split_between_functions() {
    let s = scenario();
    let plan = s
        .orchestrator
        .analyze_project(s.project.path(), Some(&file_list()), false)
        .unwrap()
        .plan;

    for batch in &plan.batches[2..] {
        if let BatchKind::Multi { range, .. } = &batch.kind {
            assert!(s.big[range.start..].starts_with("pub fn handler_"));
        }
    }
}

#[test]
fn test_full_pipeline() {
    let s = scenario();
    let project = s.project.path();
    let o = &s.orchestrator;

    o.begin_step(project, StepId::Overview).unwrap();
    write_artifact(&s.root, "overview.md");
    write_artifact(&s.root, "tech-stack.md");
    assert!(o.check_step_completion(project, StepId::Overview).unwrap().auto_completed);

    o.begin_step(project, StepId::FileAnalysis).unwrap();
    o.analyze_project(project, Some(&file_list()), false).unwrap();

    let mut served = Vec::new();
    loop {
        let granted = match o.get_next_task(project).unwrap() {
            NextTask::Task(granted) => granted,
            NextTask::Exhausted(done) => {
                assert!(done.completed);
                assert_eq!(done.summary.completed, 4);
                break;
            }
        };
        let id = granted.task.id.clone();

        // Pull every chunk of the content before completing.
        let mut delivered = String::new();
        loop {
            let content = o.get_task_content(project, &id, Some(4_000), None).unwrap();
            delivered.push_str(&content.content);
            match content.chunk_info {
                Some(info) if info.has_more => continue,
                _ => break,
            }
        }
        assert!(!delivered.is_empty());

        let output = format!("files/{id}.md");
        write_artifact(&s.root, &output);
        o.complete_task(project, &id, &[output]).unwrap();
        served.push(id);
    }
    assert_eq!(served, vec!["task_1", "task_2", "task_3_1", "task_3_2"]);

    let file_step = o.check_step_completion(project, StepId::FileAnalysis).unwrap();
    assert!(file_step.success, "{}", file_step.message);

    o.begin_step(project, StepId::ModuleDocs).unwrap();
    let modules = o.check_step_completion(project, StepId::ModuleDocs).unwrap();
    assert_eq!(modules.missing_artifacts, vec!["modules/engine/*.md"]);
    write_artifact(&s.root, "modules/engine/engine.md");
    assert!(o.check_step_completion(project, StepId::ModuleDocs).unwrap().success);

    write_artifact(&s.root, "architecture.md");
    write_artifact(&s.root, "data-flow.md");
    assert!(o.check_step_completion(project, StepId::Architecture).unwrap().success);

    write_artifact(&s.root, "api/handlers.md");
    assert!(o.check_step_completion(project, StepId::ApiReference).unwrap().success);

    let summary = o.check_step_completion(project, StepId::Summary).unwrap();
    assert_eq!(summary.missing_artifacts, vec!["README.md", "index.md"]);
    write_artifact(&s.root, "README.md");
    write_artifact(&s.root, "index.md");
    assert!(o.check_step_completion(project, StepId::Summary).unwrap().success);

    let status = o.get_workflow_status(project).unwrap();
    assert!(status.is_finished);
    assert_eq!(status.percentage, 100);
    assert_eq!(status.steps_completed, StepId::ALL.to_vec());
    assert!(status.completed_at.is_some());
    assert_eq!(status.queue.unwrap().completed, 4);
}

#[test]
fn test_multi_part_content_is_the_planned_slice() {
    let s = scenario();
    let project = s.project.path();
    let plan = s
        .orchestrator
        .analyze_project(project, Some(&file_list()), false)
        .unwrap()
        .plan;

    let part = plan.batch("task_3_2").unwrap();
    let content = s
        .orchestrator
        .get_task_content(project, "task_3_2", Some(100_000), None)
        .unwrap();
    assert_eq!(content.part_index, Some(2));
    assert_eq!(content.is_last_part, Some(true));

    if let BatchKind::Multi { range, .. } = &part.kind {
        let body = content
            .content
            .strip_prefix("===== src/engine/big.rs (part 2/2) =====\n")
            .unwrap();
        assert_eq!(body, &s.big[range.start..range.end]);
    } else {
        panic!("task_3_2 is not a multi batch");
    }
}

#[test]
fn test_same_length_edit_after_planning_is_refused() {
    let state = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let path = project.path().join("src/big.rs");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let big = functions(28_000);
    std::fs::write(&path, &big).unwrap();

    let open = || {
        WorkflowOrchestrator::with_parts(
            WorkflowConfig::with_state_dir(state.path()),
            JsonStateStore::new(state.path()).shared(),
            Arc::new(FsContentSource::new()),
        )
        .unwrap()
        .with_estimator(Arc::new(ByteEstimator))
    };

    let plan = open()
        .analyze_project(project.path(), Some(&["src/big.rs".to_string()]), false)
        .unwrap()
        .plan;
    let ids: Vec<&str> = plan.batches.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["task_1_1", "task_1_2"]);

    // Shift every byte by a leading comment, keeping the length.
    let edited = format!("// edited\n{}", &big[..big.len() - 10]);
    assert_eq!(edited.len(), big.len());
    std::fs::write(&path, edited).unwrap();

    let err = open()
        .get_task_content(project.path(), "task_1_2", Some(100_000), None)
        .unwrap_err();
    match err {
        WorkflowError::InvalidFileList { message } => {
            assert!(message.contains("src/big.rs"), "{message}");
            assert!(message.contains("re-run analysis"), "{message}");
        }
        other => panic!("expected a stale-plan error, got {other:?}"),
    }
}
