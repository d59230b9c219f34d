//! Stage table: what each [`StepId`] produces and how completion is checked.

use crate::state::types::StepId;
use crate::validation::{FixedFileSet, FolderContent, ModuleFolder, StepValidator};

/// Artifact rule for one stage, relative to the output root.
#[derive(Debug, Clone, Copy)]
pub enum ArtifactRule {
    Files(&'static [&'static str]),
    Folder {
        dir: &'static str,
        extension: &'static str,
    },
    Modules {
        dir: &'static str,
        extension: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    pub id: StepId,
    pub title: &'static str,
    pub artifacts: ArtifactRule,
    /// Completion also requires every task to be completed or failed.
    pub requires_drained_queue: bool,
}

const STEPS: [StepDefinition; 6] = [
    StepDefinition {
        id: StepId::Overview,
        title: "Project overview",
        artifacts: ArtifactRule::Files(&["overview.md", "tech-stack.md"]),
        requires_drained_queue: false,
    },
    StepDefinition {
        id: StepId::FileAnalysis,
        title: "Per-file analysis",
        artifacts: ArtifactRule::Folder {
            dir: "files",
            extension: "md",
        },
        requires_drained_queue: true,
    },
    StepDefinition {
        id: StepId::ModuleDocs,
        title: "Module documentation",
        artifacts: ArtifactRule::Modules {
            dir: "modules",
            extension: "md",
        },
        requires_drained_queue: false,
    },
    StepDefinition {
        id: StepId::Architecture,
        title: "Architecture",
        artifacts: ArtifactRule::Files(&["architecture.md", "data-flow.md"]),
        requires_drained_queue: false,
    },
    StepDefinition {
        id: StepId::ApiReference,
        title: "API reference",
        artifacts: ArtifactRule::Folder {
            dir: "api",
            extension: "md",
        },
        requires_drained_queue: false,
    },
    StepDefinition {
        id: StepId::Summary,
        title: "Summary and index",
        artifacts: ArtifactRule::Files(&["README.md", "index.md"]),
        requires_drained_queue: false,
    },
];

impl StepDefinition {
    pub fn of(step: StepId) -> &'static StepDefinition {
        &STEPS[step.index()]
    }

    pub fn all() -> &'static [StepDefinition] {
        &STEPS
    }

    /// Validator for this stage. `modules` is only used by module rules.
    pub fn validator(&self, modules: &[String]) -> Box<dyn StepValidator> {
        match self.artifacts {
            ArtifactRule::Files(files) => Box::new(FixedFileSet::new(files.iter().copied())),
            ArtifactRule::Folder { dir, extension } => Box::new(FolderContent::new(dir, extension)),
            ArtifactRule::Modules { dir, extension } => {
                Box::new(ModuleFolder::new(dir, modules.to_vec(), extension))
            }
        }
    }
}
