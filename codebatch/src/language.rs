//! Source language detection and per-language lexical traits.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the planner recognises.
///
/// Anything not listed maps to [`Language::Unknown`], which still plans and
/// estimates with neutral defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Go,
    Java,
    Kotlin,
    CSharp,
    C,
    Cpp,
    Ruby,
    Php,
    Swift,
    Scala,
    Shell,
    Sql,
    Lua,
    Html,
    Css,
    Markdown,
    Json,
    Yaml,
    Toml,
    Unknown,
}

/// Comment delimiters for a language.
///
/// Openers are at most two characters long. The token estimator relies on
/// that to stay monotonic when a trailing `/` turns into `//`.
#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: Option<(&'static str, &'static str)>,
}

const C_STYLE: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
};

const HASH_STYLE: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: None,
};

const NO_COMMENTS: CommentSyntax = CommentSyntax {
    line: &[],
    block: None,
};

impl Language {
    /// Detect a language from a path's extension (or well-known file name).
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        match file_name {
            "Dockerfile" | "Makefile" => return Self::Shell,
            _ => {}
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        Self::from_extension(&ext)
    }

    /// Detect a language from a bare extension (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "rs" => Self::Rust,
            "py" | "pyi" => Self::Python,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "kt" | "kts" => Self::Kotlin,
            "cs" => Self::CSharp,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "scala" | "sc" => Self::Scala,
            "sh" | "bash" | "zsh" => Self::Shell,
            "sql" => Self::Sql,
            "lua" => Self::Lua,
            "html" | "htm" | "vue" | "svelte" => Self::Html,
            "css" | "scss" | "less" => Self::Css,
            "md" | "markdown" => Self::Markdown,
            "json" => Self::Json,
            "yml" | "yaml" => Self::Yaml,
            "toml" => Self::Toml,
            _ => Self::Unknown,
        }
    }

    /// Whether this language is program source (as opposed to markup or data).
    pub fn is_code(self) -> bool {
        !matches!(
            self,
            Self::Html
                | Self::Css
                | Self::Markdown
                | Self::Json
                | Self::Yaml
                | Self::Toml
                | Self::Unknown
        )
    }

    /// Token density relative to plain prose.
    ///
    /// Terse, symbol-heavy languages cost more tokens per character than
    /// verbose ones.
    pub fn density(self) -> f64 {
        match self {
            Self::Rust => 1.10,
            Self::Cpp => 1.10,
            Self::Shell => 1.15,
            Self::Json => 1.20,
            Self::Python | Self::C | Self::Ruby | Self::Scala => 1.05,
            Self::Go
            | Self::TypeScript
            | Self::JavaScript
            | Self::Php
            | Self::Swift
            | Self::Lua
            | Self::Yaml
            | Self::Toml
            | Self::Unknown => 1.0,
            Self::Kotlin | Self::Sql | Self::Css => 0.95,
            Self::Java | Self::CSharp => 0.90,
            Self::Html => 0.85,
            Self::Markdown => 0.80,
        }
    }

    /// Comment syntax used when discounting comments during estimation.
    pub fn comment_syntax(self) -> CommentSyntax {
        match self {
            Self::Rust
            | Self::TypeScript
            | Self::JavaScript
            | Self::Go
            | Self::Java
            | Self::Kotlin
            | Self::CSharp
            | Self::C
            | Self::Cpp
            | Self::Swift
            | Self::Scala => C_STYLE,
            Self::Php => CommentSyntax {
                line: &["//", "#"],
                block: Some(("/*", "*/")),
            },
            Self::Css => CommentSyntax {
                line: &[],
                block: Some(("/*", "*/")),
            },
            Self::Python | Self::Ruby | Self::Shell | Self::Yaml | Self::Toml => HASH_STYLE,
            Self::Sql | Self::Lua => CommentSyntax {
                line: &["--"],
                block: None,
            },
            Self::Html | Self::Markdown | Self::Json | Self::Unknown => NO_COMMENTS,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Go => "go",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::CSharp => "csharp",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Scala => "scala",
            Self::Shell => "shell",
            Self::Sql => "sql",
            Self::Lua => "lua",
            Self::Html => "html",
            Self::Css => "css",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
