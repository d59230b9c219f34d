//! Step Validators: artifact-presence gates for workflow stages
//!
//! A validator only checks that the expected artifacts exist. It never looks
//! at what they contain. Three strategies cover every stage:
//!
//! - **folderContent**: a directory holds at least one file with an extension
//! - **fixedFileSet**: every named file exists (each missing name reported)
//! - **moduleFolder**: folderContent, once per discovered module subdirectory
//!
//! Validators are invoked by the orchestrator only; a passing result is what
//! allows it to mark a stage complete.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

use crate::state::types::StepId;

/// Directory names treated as source roots during module discovery.
pub const SOURCE_ROOTS: &[&str] = &["src", "lib", "app", "pkg", "packages", "internal", "cmd"];

/// Which rule a validator applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ValidationStrategy {
    FolderContent,
    FixedFileSet,
    ModuleFolder,
}

impl std::fmt::Display for ValidationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FolderContent => write!(f, "folderContent"),
            Self::FixedFileSet => write!(f, "fixedFileSet"),
            Self::ModuleFolder => write!(f, "moduleFolder"),
        }
    }
}

/// Outcome of checking one stage. Computed on demand, never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StepValidationResult {
    pub step_id: StepId,
    pub strategy: ValidationStrategy,
    pub success: bool,
    /// The orchestrator marked the step complete as a result of this check
    pub auto_completed: bool,
    /// Each artifact still absent, relative to the output root
    #[serde(default)]
    pub missing_artifacts: Vec<String>,
    pub message: String,
}

impl StepValidationResult {
    /// Build a result from a missing-artifact list.
    pub fn from_missing(step_id: StepId, strategy: ValidationStrategy, missing: Vec<String>) -> Self {
        let success = missing.is_empty();
        let message = if success {
            format!("Step {} ({}) artifacts present", step_id.number(), step_id)
        } else {
            format!(
                "Step {} ({}) incomplete: missing {}",
                step_id.number(),
                step_id,
                missing.join(", ")
            )
        };
        Self {
            step_id,
            strategy,
            success,
            auto_completed: false,
            missing_artifacts: missing,
            message,
        }
    }
}

/// Checks a stage's artifacts under an output root.
pub trait StepValidator: Send + Sync {
    fn strategy(&self) -> ValidationStrategy;

    /// Artifacts absent under `output_root`. Empty means satisfied.
    fn missing(&self, output_root: &Path) -> Vec<String>;

    fn validate(&self, step: StepId, output_root: &Path) -> StepValidationResult {
        StepValidationResult::from_missing(step, self.strategy(), self.missing(output_root))
    }
}

/// A directory (relative to the output root) must hold at least one file
/// with `extension`, at any depth.
#[derive(Debug, Clone)]
pub struct FolderContent {
    pub dir: PathBuf,
    pub extension: String,
}

impl FolderContent {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    fn expected(&self) -> String {
        format!("{}/*.{}", slash(&self.dir), self.extension)
    }

    fn satisfied(&self, output_root: &Path) -> bool {
        let dir = output_root.join(&self.dir);
        if !dir.is_dir() {
            return false;
        }
        // Generated docs may well be gitignored, so no standard filters.
        WalkBuilder::new(&dir)
            .standard_filters(false)
            .build()
            .flatten()
            .any(|entry| {
                entry.file_type().is_some_and(|t| t.is_file())
                    && entry
                        .path()
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
            })
    }
}

impl StepValidator for FolderContent {
    fn strategy(&self) -> ValidationStrategy {
        ValidationStrategy::FolderContent
    }

    fn missing(&self, output_root: &Path) -> Vec<String> {
        if self.satisfied(output_root) {
            Vec::new()
        } else {
            vec![self.expected()]
        }
    }
}

/// Every listed file (relative to the output root) must exist.
#[derive(Debug, Clone)]
pub struct FixedFileSet {
    pub files: Vec<String>,
}

impl FixedFileSet {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

impl StepValidator for FixedFileSet {
    fn strategy(&self) -> ValidationStrategy {
        ValidationStrategy::FixedFileSet
    }

    fn missing(&self, output_root: &Path) -> Vec<String> {
        self.files
            .iter()
            .filter(|name| !output_root.join(name.as_str()).is_file())
            .cloned()
            .collect()
    }
}

/// Every module needs its own `<root>/<module>/` folder with content.
///
/// With no modules the rule degrades to folderContent over `root`.
#[derive(Debug, Clone)]
pub struct ModuleFolder {
    pub root: PathBuf,
    pub modules: Vec<String>,
    pub extension: String,
}

impl ModuleFolder {
    pub fn new(root: impl Into<PathBuf>, modules: Vec<String>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            modules,
            extension: extension.into(),
        }
    }
}

impl StepValidator for ModuleFolder {
    fn strategy(&self) -> ValidationStrategy {
        ValidationStrategy::ModuleFolder
    }

    fn missing(&self, output_root: &Path) -> Vec<String> {
        if self.modules.is_empty() {
            return FolderContent::new(&self.root, &self.extension).missing(output_root);
        }
        self.modules
            .iter()
            .flat_map(|module| {
                FolderContent::new(self.root.join(module), &self.extension).missing(output_root)
            })
            .collect()
    }
}

/// Module names for a set of project-relative, `/`-separated paths.
///
/// A module is the directory directly below the first source root in a
/// path, or the first directory when the path has no source root. Files
/// sitting at the project root, or directly inside a source root, name no
/// module.
pub fn discover_modules<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut modules = BTreeSet::new();
    for path in paths {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        // The last component is the file itself.
        let dirs = match parts.split_last() {
            Some((_, dirs)) if !dirs.is_empty() => dirs,
            _ => continue,
        };
        let module = match dirs.iter().position(|d| SOURCE_ROOTS.contains(d)) {
            Some(idx) => dirs.get(idx + 1),
            None => dirs.first(),
        };
        if let Some(module) = module {
            modules.insert(module.to_string());
        }
    }
    modules.into_iter().collect()
}

fn slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
