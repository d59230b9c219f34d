//! File Walker: .gitignore-respecting project discovery using the `ignore` crate

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::language::Language;

/// Directories never worth documenting, even without a .gitignore.
const SKIP_DIRS: &[&str] = &["target", "node_modules", "dist", "build", "__pycache__", "venv"];

/// Walks a project for source files, respecting .gitignore rules.
pub struct FileWalker {
    root: PathBuf,
    exclude: Vec<PathBuf>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            exclude: Vec::new(),
        }
    }

    /// Skip everything under `dir` (absolute, or relative to the root).
    pub fn exclude(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        };
        self.exclude.push(dir);
        self
    }

    /// Relative, `/`-separated paths of every file with a known language,
    /// sorted.
    pub fn source_files(&self) -> Vec<String> {
        let exclude = self.exclude.clone();
        let walker = WalkBuilder::new(&self.root)
            .hidden(true) // skip hidden dirs
            .git_ignore(true)
            .require_git(false)
            .filter_entry(move |entry| {
                let path = entry.path();
                if exclude.iter().any(|dir| path.starts_with(dir)) {
                    return false;
                }
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIP_DIRS.contains(&name)))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker.flatten() {
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if Language::from_path(path) == Language::Unknown {
                continue;
            }
            if let Some(relative) = relative_slash_path(&self.root, path) {
                files.push(relative);
            }
        }

        files.sort();
        files
    }
}

/// `path` relative to `root` with `/` separators.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_discovers_known_languages_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), "src/util/mod.rs");
        touch(dir.path(), "README.md");
        touch(dir.path(), "LICENSE");
        touch(dir.path(), "image.png");

        let files = FileWalker::new(dir.path()).source_files();
        assert_eq!(files, vec!["README.md", "src/main.rs", "src/util/mod.rs"]);
    }

    #[test]
    fn test_respects_gitignore_hidden_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated/\n").unwrap();
        touch(dir.path(), "src/lib.rs");
        touch(dir.path(), "generated/out.rs");
        touch(dir.path(), ".hidden/secret.rs");
        touch(dir.path(), "target/debug/build.rs");
        touch(dir.path(), "docs/codebatch/overview.md");

        let files = FileWalker::new(dir.path())
            .exclude("docs/codebatch")
            .source_files();
        assert_eq!(files, vec!["src/lib.rs"]);
    }

    #[test]
    fn test_relative_slash_path() {
        let root = Path::new("/p");
        assert_eq!(
            relative_slash_path(root, Path::new("/p/a/b.rs")).as_deref(),
            Some("a/b.rs")
        );
        assert_eq!(relative_slash_path(root, Path::new("/q/a.rs")), None);
        assert_eq!(relative_slash_path(root, Path::new("/p")), None);
    }
}
