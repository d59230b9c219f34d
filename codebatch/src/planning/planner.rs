//! Batch planner: file list in, [`BatchPlan`] out.
//!
//! Pipeline: validate paths → read through the [`ContentSource`] → analyze →
//! classify → run the three strategies → assign task ids → fingerprint.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::analyzer::FileAnalyzer;
use super::classifier::{FileClassifier, SizeTier};
use super::ids::TaskIdAssigner;
use super::strategy::{
    CombinedBatchStrategy, LargeFileMultiBatchStrategy, PlannedUnit, SingleFileBatchStrategy,
};
use crate::config::BatchConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::source::ContentSource;
use crate::state::schema::normalize_project_path;
use crate::state::types::{Batch, ChunkRange, SourceFile};
use crate::tokens::{DensityEstimator, TokenEstimator};

/// Non-fatal planning issue surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// A single code unit exceeded the max batch size and was cut without
    /// regard to structure.
    UnsplittableUnit {
        path: String,
        range: ChunkRange,
        tokens: usize,
    },
    /// A discovered file was not valid UTF-8 and was left out of the plan.
    UndecodableFile { path: String },
}

/// Complete, ordered plan for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BatchPlan {
    pub project_path: PathBuf,
    /// blake3 over thresholds and file contents; unchanged input, unchanged plan
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub config: BatchConfig,
    /// Analyzed files, sorted by path
    pub files: Vec<SourceFile>,
    /// Combined batches, then single, then multi parts
    pub batches: Vec<Batch>,
    pub total_tasks: usize,
    pub total_tokens: usize,
    #[serde(default)]
    pub warnings: Vec<PlanWarning>,
}

impl BatchPlan {
    pub fn batch(&self, id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.id == id)
    }

    pub fn file(&self, path: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Builds [`BatchPlan`]s.
pub struct BatchPlanner {
    config: BatchConfig,
    analyzer: FileAnalyzer,
    estimator: Arc<dyn TokenEstimator>,
    source: Arc<dyn ContentSource>,
}

impl BatchPlanner {
    pub fn new(config: BatchConfig, source: Arc<dyn ContentSource>) -> Self {
        let estimator: Arc<dyn TokenEstimator> =
            Arc::new(DensityEstimator::new(config.chars_per_token));
        Self::with_estimator(config, source, estimator)
    }

    pub fn with_estimator(
        config: BatchConfig,
        source: Arc<dyn ContentSource>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            config,
            analyzer: FileAnalyzer::new(estimator.clone()),
            estimator,
            source,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Validate, read, analyze and plan an explicit file list. A file that
    /// cannot be read as UTF-8 text aborts planning.
    pub fn plan(&self, project_root: &Path, paths: &[String]) -> WorkflowResult<BatchPlan> {
        self.plan_paths(project_root, paths, false)
    }

    /// Like [`plan`](Self::plan), for files found by discovery: files that
    /// are not valid UTF-8 are skipped with [`PlanWarning::UndecodableFile`].
    pub fn plan_discovered(&self, project_root: &Path, paths: &[String]) -> WorkflowResult<BatchPlan> {
        self.plan_paths(project_root, paths, true)
    }

    fn plan_paths(
        &self,
        project_root: &Path,
        paths: &[String],
        skip_undecodable: bool,
    ) -> WorkflowResult<BatchPlan> {
        self.config.validate()?;
        let root = normalize_project_path(project_root);
        let paths = normalize_file_list(&root, paths)?;
        let classifier = FileClassifier::from_config(&self.config);

        let mut files = Vec::with_capacity(paths.len());
        let mut large_contents = HashMap::new();
        let mut warnings = Vec::new();
        for path in paths {
            let content = match self.source.read(&root.join(&path)) {
                Ok(content) => content,
                Err(e) if skip_undecodable && e.kind() == std::io::ErrorKind::InvalidData => {
                    warn!(path = %path, error = %e, "Skipping file that is not valid UTF-8");
                    warnings.push(PlanWarning::UndecodableFile { path });
                    continue;
                }
                Err(e) => return Err(read_error(&path, e)),
            };
            let file = self.analyzer.analyze(&path, &content);
            if classifier.tier(file.token_estimate) == SizeTier::Large {
                large_contents.insert(path, content);
            }
            files.push(file);
        }
        if files.is_empty() {
            return Err(WorkflowError::invalid_file_list(format!(
                "no readable source files under {}",
                root.display()
            )));
        }

        self.build(&root, files, large_contents, warnings)
    }

    /// Plan files that were already analyzed. Large files are read through
    /// the content source to find split points.
    pub fn plan_files(&self, project_root: &Path, files: Vec<SourceFile>) -> WorkflowResult<BatchPlan> {
        self.config.validate()?;
        let root = normalize_project_path(project_root);

        let mut seen = HashSet::new();
        for file in &files {
            if !seen.insert(file.path.as_str()) {
                return Err(WorkflowError::invalid_file_list(format!(
                    "duplicate path: {}",
                    file.path
                )));
            }
        }
        if files.is_empty() {
            return Err(WorkflowError::invalid_file_list("file list is empty"));
        }

        self.build(&root, files, HashMap::new(), Vec::new())
    }

    fn read(&self, root: &Path, relative: &str) -> WorkflowResult<String> {
        self.source
            .read(&root.join(relative))
            .map_err(|e| read_error(relative, e))
    }

    fn build(
        &self,
        root: &Path,
        mut files: Vec<SourceFile>,
        mut large_contents: HashMap<String, String>,
        mut warnings: Vec<PlanWarning>,
    ) -> WorkflowResult<BatchPlan> {
        let classifier = FileClassifier::from_config(&self.config);
        let classified = classifier.classify(files.iter().cloned());

        let mut units: Vec<PlannedUnit> = Vec::new();
        units.extend(CombinedBatchStrategy::new(self.config.target_batch_size).plan(&classified.small));
        units.extend(SingleFileBatchStrategy.plan(&classified.medium));

        let multi = LargeFileMultiBatchStrategy::new(
            self.config.target_batch_size,
            self.config.max_batch_size,
            self.estimator.clone(),
        );
        let mut large = classified.large;
        large.sort_by(|a, b| {
            b.importance
                .cmp(&a.importance)
                .then_with(|| a.path.cmp(&b.path))
        });
        for file in &large {
            let content = match large_contents.remove(&file.path) {
                Some(content) => content,
                None => self.read(root, &file.path)?,
            };
            let (unit, file_warnings) = multi.plan_file(file, &content);
            warnings.extend(file_warnings);
            units.push(unit);
        }

        let batches = TaskIdAssigner::new().assign(units);
        for batch in &batches {
            if batch.total_tokens > self.config.max_batch_size {
                // Only reachable when a caller-supplied estimate disagrees
                // with the tier thresholds.
                warn!(
                    task_id = %batch.id,
                    tokens = batch.total_tokens,
                    max = self.config.max_batch_size,
                    "Batch exceeds max batch size"
                );
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        let fingerprint = fingerprint(&self.config, self.estimator.name(), &files);
        let total_tokens = batches.iter().map(|b| b.total_tokens).sum();

        info!(
            project = %root.display(),
            files = files.len(),
            tasks = batches.len(),
            total_tokens,
            warnings = warnings.len(),
            "Batch plan created"
        );

        Ok(BatchPlan {
            project_path: root.to_path_buf(),
            fingerprint,
            created_at: Utc::now(),
            config: self.config.clone(),
            files,
            total_tasks: batches.len(),
            total_tokens,
            batches,
            warnings,
        })
    }
}

fn read_error(relative: &str, e: std::io::Error) -> WorkflowError {
    WorkflowError::invalid_file_list(format!("cannot read {}: {}", relative, e))
}

/// Validate an explicit file list and normalize entries to relative
/// `/`-separated paths.
pub fn normalize_file_list(root: &Path, paths: &[String]) -> WorkflowResult<Vec<String>> {
    if paths.is_empty() {
        return Err(WorkflowError::invalid_file_list("file list is empty"));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(paths.len());
    for raw in paths {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::invalid_file_list("empty path in file list"));
        }

        let path = Path::new(trimmed);
        let relative = if path.is_absolute() {
            let normalized = normalize_project_path(path);
            normalized
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .map_err(|_| {
                    WorkflowError::invalid_file_list(format!(
                        "{} is outside the project root {}",
                        trimmed,
                        root.display()
                    ))
                })?
        } else {
            path.to_path_buf()
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(WorkflowError::invalid_file_list(format!(
                        "{} escapes the project root",
                        trimmed
                    )))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkflowError::invalid_file_list(format!(
                        "{} is not a project-relative path",
                        trimmed
                    )))
                }
            }
        }
        if parts.is_empty() {
            return Err(WorkflowError::invalid_file_list(format!(
                "{} does not name a file",
                trimmed
            )));
        }

        let normalized = parts.join("/");
        if !seen.insert(normalized.clone()) {
            return Err(WorkflowError::invalid_file_list(format!(
                "duplicate path: {}",
                normalized
            )));
        }
        out.push(normalized);
    }
    Ok(out)
}

/// Stable hash of everything that shapes a plan.
pub fn fingerprint(config: &BatchConfig, estimator: &str, files: &[SourceFile]) -> String {
    let mut sorted: Vec<&SourceFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = blake3::Hasher::new();
    hasher.update(
        format!(
            "{}|{}|{}|{}|{}|{}\n",
            estimator,
            config.small_max,
            config.large_min,
            config.target_batch_size,
            config.max_batch_size,
            config.chars_per_token
        )
        .as_bytes(),
    );
    for file in sorted {
        hasher.update(file.path.as_bytes());
        hasher.update(b"\0");
        match &file.content_hash {
            Some(hash) => hasher.update(hash.as_bytes()),
            None => hasher.update(format!("{}:{}", file.byte_size, file.token_estimate).as_bytes()),
        };
        hasher.update(format!("\0{}\n", file.importance).as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
