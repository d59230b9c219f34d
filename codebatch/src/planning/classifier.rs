//! Size-tier classification of analyzed files.

use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;
use crate::state::types::SourceFile;

/// Size tier that decides which batching strategy handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SizeTier {
    /// `< small_max`: packed with other small files
    Small,
    /// `small_max..=large_min`: one batch per file
    Medium,
    /// `> large_min`: split into parts
    Large,
}

/// Files partitioned by tier, each list in input order.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub small: Vec<SourceFile>,
    pub medium: Vec<SourceFile>,
    pub large: Vec<SourceFile>,
}

impl Classification {
    pub fn len(&self) -> usize {
        self.small.len() + self.medium.len() + self.large.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Buckets files by estimated token count.
#[derive(Debug, Clone, Copy)]
pub struct FileClassifier {
    small_max: usize,
    large_min: usize,
}

impl FileClassifier {
    pub fn new(small_max: usize, large_min: usize) -> Self {
        Self {
            small_max,
            large_min,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.small_max, config.large_min)
    }

    pub fn tier(&self, token_estimate: usize) -> SizeTier {
        if token_estimate < self.small_max {
            SizeTier::Small
        } else if token_estimate <= self.large_min {
            SizeTier::Medium
        } else {
            SizeTier::Large
        }
    }

    pub fn classify(&self, files: impl IntoIterator<Item = SourceFile>) -> Classification {
        let mut out = Classification::default();
        for file in files {
            match self.tier(file.token_estimate) {
                SizeTier::Small => out.small.push(file),
                SizeTier::Medium => out.medium.push(file),
                SizeTier::Large => out.large.push(file),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn file(path: &str, tokens: usize) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            byte_size: tokens as u64 * 4,
            token_estimate: tokens,
            language: Language::Rust,
            importance: 50,
            content_hash: None,
        }
    }

    #[test]
    fn test_tier_edges() {
        let classifier = FileClassifier::new(15_000, 20_000);
        assert_eq!(classifier.tier(0), SizeTier::Small);
        assert_eq!(classifier.tier(14_999), SizeTier::Small);
        assert_eq!(classifier.tier(15_000), SizeTier::Medium);
        assert_eq!(classifier.tier(20_000), SizeTier::Medium);
        assert_eq!(classifier.tier(20_001), SizeTier::Large);
    }

    #[test]
    fn test_classify_preserves_input_order() {
        let classifier = FileClassifier::from_config(&BatchConfig::default());
        let result = classifier.classify(vec![
            file("b.rs", 3_000),
            file("big.rs", 28_000),
            file("a.rs", 5_000),
            file("mid.rs", 18_000),
        ]);
        assert_eq!(result.len(), 4);
        let small: Vec<_> = result.small.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(small, vec!["b.rs", "a.rs"]);
        assert_eq!(result.medium[0].path, "mid.rs");
        assert_eq!(result.large[0].path, "big.rs");
    }
}
