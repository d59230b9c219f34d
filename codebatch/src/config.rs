//! Configuration for batch planning and workflow persistence
//!
//! Layering (lowest to highest precedence): `Default`, an optional TOML
//! file, `CODEBATCH_*` environment variables, then whatever the caller
//! overrides explicitly (CLI flags).

use crate::error::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Token thresholds that drive classification and batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct BatchConfig {
    /// Files estimated below this are "small" and get packed together.
    pub small_max: usize,
    /// Files estimated above this are "large" and get split into parts.
    pub large_min: usize,
    /// Packing and splitting aim for batches of about this size.
    pub target_batch_size: usize,
    /// Hard cap: no batch may exceed this.
    pub max_batch_size: usize,
    /// Characters per token for density-1.0 text.
    pub chars_per_token: f64,
    /// Default delivery chunk size (characters) for task content.
    pub delivery_max_length: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            small_max: 15_000,
            large_min: 20_000,
            target_batch_size: 18_000,
            max_batch_size: 25_000,
            chars_per_token: 4.0,
            delivery_max_length: 40_000,
        }
    }
}

impl BatchConfig {
    /// Validate threshold ordering.
    ///
    /// `small_max <= large_min <= max_batch_size` guarantees combined and
    /// single batches never exceed the cap.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.small_max == 0 || self.target_batch_size == 0 || self.max_batch_size == 0 {
            return Err(WorkflowError::config(
                "small_max, target_batch_size and max_batch_size must be positive",
            ));
        }
        if self.small_max > self.large_min {
            return Err(WorkflowError::config(format!(
                "small_max ({}) must not exceed large_min ({})",
                self.small_max, self.large_min
            )));
        }
        if self.large_min > self.max_batch_size {
            return Err(WorkflowError::config(format!(
                "large_min ({}) must not exceed max_batch_size ({})",
                self.large_min, self.max_batch_size
            )));
        }
        if self.target_batch_size > self.max_batch_size {
            return Err(WorkflowError::config(format!(
                "target_batch_size ({}) must not exceed max_batch_size ({})",
                self.target_batch_size, self.max_batch_size
            )));
        }
        if !(self.chars_per_token > 0.0) {
            return Err(WorkflowError::config("chars_per_token must be positive"));
        }
        if self.delivery_max_length == 0 {
            return Err(WorkflowError::config("delivery_max_length must be positive"));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Root holding one state directory per project.
    pub state_dir: PathBuf,
    /// Artifact root, relative to the project, that validators inspect.
    pub output_dir: PathBuf,
    /// Planning thresholds.
    pub batch: BatchConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            output_dir: PathBuf::from("docs/codebatch"),
            batch: BatchConfig::default(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".codebatch").join("state"),
        _ => PathBuf::from(".codebatch").join("state"),
    }
}

impl WorkflowConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a TOML file, then apply environment overrides on top.
    pub fn from_toml_file(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: WorkflowConfig = toml::from_str(&content).map_err(|e| {
            WorkflowError::config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        config.apply_env();
        Ok(config)
    }

    /// Overlay `CODEBATCH_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("CODEBATCH_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CODEBATCH_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }

        fn from_env(var: &str) -> Option<usize> {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
        }

        if let Some(n) = from_env("CODEBATCH_SMALL_MAX") {
            self.batch.small_max = n;
        }
        if let Some(n) = from_env("CODEBATCH_LARGE_MIN") {
            self.batch.large_min = n;
        }
        if let Some(n) = from_env("CODEBATCH_TARGET_BATCH") {
            self.batch.target_batch_size = n;
        }
        if let Some(n) = from_env("CODEBATCH_MAX_BATCH") {
            self.batch.max_batch_size = n;
        }
        if let Some(n) = from_env("CODEBATCH_DELIVERY_MAX") {
            self.batch.delivery_max_length = n;
        }
    }

    /// Config rooted at an explicit state directory, everything else default.
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> WorkflowResult<()> {
        if self.output_dir.is_absolute() {
            return Err(WorkflowError::config(format!(
                "output_dir must be relative to the project, got {}",
                self.output_dir.display()
            )));
        }
        self.batch.validate()
    }
}
