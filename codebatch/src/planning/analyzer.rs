//! Turns file content into [`SourceFile`] records: token estimate, language,
//! importance and content hash.

use std::sync::Arc;

use crate::language::Language;
use crate::state::types::SourceFile;
use crate::tokens::TokenEstimator;

const ENTRY_POINT_FILES: &[&str] = &[
    "lib.rs",
    "main.rs",
    "mod.rs",
    "__init__.py",
    "__main__.py",
    "main.go",
];
const ENTRY_POINT_STEMS: &[&str] = &["main", "index", "app", "server", "cli"];
const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs", "testdata"];
const AUXILIARY_DIRS: &[&str] = &[
    "fixtures", "fixture", "examples", "example", "benches", "bench", "vendor", "scripts",
    "mocks",
];

/// Builds [`SourceFile`]s with a shared estimator.
#[derive(Clone)]
pub struct FileAnalyzer {
    estimator: Arc<dyn TokenEstimator>,
}

impl FileAnalyzer {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    /// Analyze one file. `path` is relative to the project root.
    pub fn analyze(&self, path: &str, content: &str) -> SourceFile {
        let language = Language::from_path(path);
        SourceFile {
            path: path.to_string(),
            byte_size: content.len() as u64,
            token_estimate: self.estimator.estimate(content, language),
            language,
            importance: importance(path),
            content_hash: Some(content_hash(content)),
        }
    }
}

/// Hex blake3 digest of file text, as stored in [`SourceFile::content_hash`].
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Heuristic 0-100 importance used to order packing.
///
/// Entry points rank highest, shallow paths above deep ones, tests and
/// auxiliary code lowest.
pub fn importance(path: &str) -> u8 {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let Some((file_name, dirs)) = components.split_last() else {
        return 0;
    };
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let lower_name = file_name.to_ascii_lowercase();

    let mut score: i32 = 50;

    if ENTRY_POINT_FILES.contains(file_name) || ENTRY_POINT_STEMS.contains(&stem) {
        score += 40;
    }

    // Files directly under a source root are not penalized.
    let depth = dirs.len().saturating_sub(1) as i32;
    score -= (depth * 5).min(30);

    let is_test = dirs
        .iter()
        .any(|d| TEST_DIRS.contains(&d.to_ascii_lowercase().as_str()))
        || stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || lower_name.contains(".test.")
        || lower_name.contains(".spec.");
    if is_test {
        score -= 30;
    }

    if dirs
        .iter()
        .any(|d| AUXILIARY_DIRS.contains(&d.to_ascii_lowercase().as_str()))
    {
        score -= 20;
    }

    if !Language::from_path(path).is_code() {
        score -= 10;
    }

    score.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::DensityEstimator;

    #[test]
    fn test_entry_points_rank_high() {
        assert!(importance("src/main.rs") > importance("src/util.rs"));
        assert!(importance("src/lib.rs") > importance("src/parser/tokens.rs"));
        assert!(importance("pkg/__init__.py") > importance("pkg/helpers.py"));
        assert!(importance("web/index.ts") > importance("web/button.ts"));
    }

    #[test]
    fn test_depth_and_tests_rank_low() {
        assert!(importance("src/a.rs") > importance("src/a/b/c/d.rs"));
        assert!(importance("src/a.rs") > importance("tests/a.rs"));
        assert!(importance("src/a.py") > importance("src/test_a.py"));
        assert!(importance("src/a.ts") > importance("src/a.spec.ts"));
        assert!(importance("src/a.rs") > importance("examples/a.rs"));
        assert!(importance("src/a.rs") > importance("docs/a.md"));
    }

    #[test]
    fn test_importance_bounds() {
        assert_eq!(importance(""), 0);
        assert!(importance("main.rs") <= 100);
        assert_eq!(importance("a/b/c/d/e/f/g/h/tests/fixtures/x_test.json"), 0);
    }

    #[test]
    fn test_analyze_fills_every_field() {
        let analyzer = FileAnalyzer::new(Arc::new(DensityEstimator::default()));
        let content = "fn main() {\n    println!(\"hi\");\n}\n";
        let file = analyzer.analyze("src/main.rs", content);
        assert_eq!(file.path, "src/main.rs");
        assert_eq!(file.byte_size, content.len() as u64);
        assert_eq!(file.language, Language::Rust);
        assert!(file.token_estimate > 0);
        assert_eq!(
            file.content_hash.as_deref(),
            Some(blake3::hash(content.as_bytes()).to_hex().as_str())
        );
    }
}
