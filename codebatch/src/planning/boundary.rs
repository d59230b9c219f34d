//! Function boundary scanning: safe split points in source text.
//!
//! A boundary is a byte offset that falls between two code units, never
//! inside one. Leading comments, attributes and decorators travel with the
//! unit they annotate, so a boundary sits at the start of the first of them.
//!
//! Rust, Python, TypeScript/JavaScript and Go are parsed with tree-sitter.
//! Everything else, and any source the parser rejects, goes through a
//! line-based heuristic.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use tree_sitter::{Language as Grammar, Node, Parser};

use crate::language::Language;

/// Top-level items.
pub const DEPTH_TOP: u8 = 0;

/// Members of an `impl`/`trait`/`mod`/class body.
pub const DEPTH_MEMBER: u8 = 1;

/// A safe split offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// Byte offset where the next unit (including its leading comments) starts
    pub offset: usize,
    /// [`DEPTH_TOP`] or [`DEPTH_MEMBER`]
    pub depth: u8,
}

impl Boundary {
    pub fn new(offset: usize, depth: u8) -> Self {
        Self { offset, depth }
    }
}

/// Locates split points between definitions.
#[derive(Debug, Clone, Default)]
pub struct FunctionBoundaryScanner;

impl FunctionBoundaryScanner {
    pub fn new() -> Self {
        Self
    }

    /// Ordered, de-duplicated boundaries strictly inside `(0, source.len())`.
    pub fn scan(&self, source: &str, language: Language) -> Vec<Boundary> {
        let mut boundaries = match Self::scan_syntax(source, language) {
            Some(found) => found,
            None => heuristic::scan(source, language),
        };

        boundaries.retain(|b| b.offset > 0 && b.offset < source.len());
        boundaries.sort_by_key(|b| (b.offset, b.depth));
        boundaries.dedup_by_key(|b| b.offset);
        boundaries
    }

    fn grammar(language: Language) -> Option<Grammar> {
        match language {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::JavaScript => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Parse with tree-sitter. `None` means "use the heuristic".
    fn scan_syntax(source: &str, language: Language) -> Option<Vec<Boundary>> {
        let grammar = Self::grammar(language)?;
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&grammar) {
            debug!(%language, error = %e, "Grammar unavailable, using heuristic boundaries");
            return None;
        }

        let tree = parser.parse(source, None)?;
        let root = tree.root_node();
        if root.has_error() {
            debug!(%language, "Source has syntax errors, using heuristic boundaries");
            return None;
        }

        let mut boundaries = Vec::new();
        unit_boundaries(&named_children(root), source, DEPTH_TOP, &mut boundaries);
        Some(boundaries)
    }
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn is_comment(kind: &str) -> bool {
    kind.contains("comment")
}

/// Nodes that annotate the unit after them.
fn is_attachment(kind: &str) -> bool {
    is_comment(kind)
        || matches!(kind, "attribute_item" | "inner_attribute_item" | "decorator")
}

/// Body whose members get depth-1 boundaries.
fn container_body(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "impl_item" | "trait_item" | "mod_item" | "class_definition" | "class_declaration"
        | "abstract_class_declaration" => node.child_by_field_name("body"),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .and_then(container_body),
        "export_statement" => node
            .child_by_field_name("declaration")
            .and_then(container_body),
        _ => None,
    }
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Emit a boundary before every unit in `nodes` except the first.
fn unit_boundaries(nodes: &[Node<'_>], source: &str, depth: u8, out: &mut Vec<Boundary>) {
    // (end byte, end row) of the previous unit including trailing comments
    let mut prev_end: Option<(usize, usize)> = None;
    let mut leading_start: Option<usize> = None;

    for node in nodes {
        let kind = node.kind();
        if is_attachment(kind) {
            if let Some((_, row)) = prev_end {
                // `foo(); // note` stays with foo.
                if leading_start.is_none()
                    && is_comment(kind)
                    && node.start_position().row == row
                {
                    prev_end = Some((node.end_byte(), node.end_position().row));
                    continue;
                }
            }
            leading_start.get_or_insert(node.start_byte());
            continue;
        }

        let start = leading_start.take().unwrap_or_else(|| node.start_byte());
        if let Some((end, _)) = prev_end {
            out.push(Boundary::new(line_start(source, start).max(end), depth));
        }
        prev_end = Some((node.end_byte(), node.end_position().row));

        if depth == DEPTH_TOP {
            if let Some(body) = container_body(*node) {
                unit_boundaries(&named_children(body), source, DEPTH_MEMBER, out);
            }
        }
    }
}

mod heuristic {
    use super::*;

    const RUST_ITEM: &str = r#"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|const|unsafe|default)\s+)*(?:extern\s+(?:"[^"]*"\s+)?)?(?:fn|struct|enum|trait|impl|mod|type|const|static|union|macro_rules!)\b"#;
    const PYTHON_ITEM: &str = r"^(?:async\s+def|def|class)\s";
    const SCRIPT_ITEM: &str = r"^(?:export\s+(?:default\s+)?)?(?:declare\s+)?(?:async\s+)?(?:function\b|class\b|abstract\s+class\b|interface\b|type\s+\w|enum\b|namespace\b|(?:const|let|var)\s+[\w$]+\s*=\s*(?:async\s*)?(?:\(|function\b))";
    const SCRIPT_MEMBER: &str = r"^(?:(?:public|private|protected|static|readonly|async|get|set|abstract|override)\s+)*[A-Za-z_$#][\w$]*\s*(?:<[^>]*>)?\s*\(";
    const GO_ITEM: &str = r"^(?:func|type|var|const)\b";
    const JVM_ITEM: &str = r"^(?:@\w+\s+)?(?:(?:public|private|protected|internal|abstract|final|static|sealed|open|data|override|partial|inline|suspend)\s+)*(?:class|interface|enum|object|record|struct|trait|fun|def|func|case\s+class|extension|protocol)\b";
    const JVM_MEMBER: &str = r"^(?:(?:public|private|protected|internal|abstract|final|static|override|open|suspend|synchronized|async|virtual|inline)\s+)*(?:fun\b|def\b|func\b|[A-Za-z_][\w<>\[\],]*\s+[A-Za-z_]\w*\s*\()";
    const RUBY_ITEM: &str = r"^(?:def|class|module)\b";
    const RUBY_MEMBER: &str = r"^def\b";
    const PHP_ITEM: &str = r"^(?:(?:abstract|final)\s+)?(?:function|class|interface|trait)\b";
    const PHP_MEMBER: &str = r"^(?:(?:public|private|protected|static|abstract|final)\s+)*function\b";
    const SHELL_ITEM: &str = r"^(?:function\s+[\w-]+|[\w-]+\s*\(\)\s*\{?)";
    const LUA_ITEM: &str = r"^(?:local\s+)?function\b";
    const SQL_ITEM: &str = r"(?i)^(?:create|alter|drop|insert|select|with|update|delete)\b";
    const MARKDOWN_ITEM: &str = r"^#{1,6}\s";
    const CONTAINER: &str = r"^(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:impl|trait|mod)\b|^(?:export\s+(?:default\s+)?)?(?:(?:public|private|protected|internal|abstract|final|sealed|open|data|static|partial)\s+)*(?:class|interface|object|trait|module|struct|record|extension|protocol)\b";

    fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
        cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
    }

    macro_rules! pattern {
        ($src:expr) => {{
            static CELL: OnceLock<Option<Regex>> = OnceLock::new();
            compiled(&CELL, $src)
        }};
    }

    /// (top-level pattern, member pattern)
    fn patterns(language: Language) -> (Option<&'static Regex>, Option<&'static Regex>) {
        match language {
            Language::Rust => (pattern!(RUST_ITEM), pattern!(RUST_ITEM)),
            Language::Python => (pattern!(PYTHON_ITEM), pattern!(PYTHON_ITEM)),
            Language::TypeScript | Language::JavaScript => {
                (pattern!(SCRIPT_ITEM), pattern!(SCRIPT_MEMBER))
            }
            Language::Go => (pattern!(GO_ITEM), None),
            Language::Java
            | Language::Kotlin
            | Language::CSharp
            | Language::Scala
            | Language::Swift => (pattern!(JVM_ITEM), pattern!(JVM_MEMBER)),
            Language::Ruby => (pattern!(RUBY_ITEM), pattern!(RUBY_MEMBER)),
            Language::Php => (pattern!(PHP_ITEM), pattern!(PHP_MEMBER)),
            Language::Shell => (pattern!(SHELL_ITEM), None),
            Language::Lua => (pattern!(LUA_ITEM), None),
            Language::Sql => (pattern!(SQL_ITEM), None),
            Language::Markdown => (pattern!(MARKDOWN_ITEM), None),
            _ => (None, None),
        }
    }

    struct Line<'a> {
        start: usize,
        text: &'a str,
    }

    impl Line<'_> {
        fn is_blank(&self) -> bool {
            self.text.trim().is_empty()
        }

        fn indent(&self) -> &str {
            let trimmed = self.text.trim_start();
            &self.text[..self.text.len() - trimmed.len()]
        }

        fn is_indented(&self) -> bool {
            !self.indent().is_empty()
        }

        /// One indentation level: a tab or up to four spaces.
        fn is_member_indent(&self) -> bool {
            let indent = self.indent();
            indent == "\t" || (!indent.is_empty() && indent.len() <= 4 && indent.bytes().all(|b| b == b' '))
        }
    }

    fn lines(source: &str) -> Vec<Line<'_>> {
        let mut out = Vec::new();
        let mut start = 0;
        for text in source.split_inclusive('\n') {
            out.push(Line {
                start,
                text: text.trim_end_matches(['\n', '\r']),
            });
            start += text.len();
        }
        out
    }

    fn is_attachment_line(text: &str, language: Language) -> bool {
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return false;
        }
        let syntax = language.comment_syntax();
        syntax.line.iter().any(|o| trimmed.starts_with(*o))
            || trimmed.starts_with("/*")
            || trimmed.starts_with('*')
            || trimmed.starts_with("#[")
            || trimmed.starts_with("#![")
            || (trimmed.starts_with('@') && language != Language::Markdown)
    }

    /// Walk upward from line `idx` over comments, attributes and decorators.
    fn attach_leading(lines: &[Line<'_>], idx: usize, language: Language) -> usize {
        let mut j = idx;
        while j > 0 && is_attachment_line(lines[j - 1].text, language) {
            j -= 1;
        }
        lines[j].start
    }

    pub(super) fn scan(source: &str, language: Language) -> Vec<Boundary> {
        let lines = lines(source);
        let (top, member) = patterns(language);
        let container = pattern!(CONTAINER);

        let mut out = Vec::new();
        let mut in_container = false;
        let mut seen_member = false;

        for (idx, line) in lines.iter().enumerate() {
            if line.is_blank() {
                continue;
            }

            if !line.is_indented() {
                let trimmed = line.text.trim_start();
                let closing = trimmed.starts_with(['}', ')', ']']);
                let candidate = match top {
                    Some(re) => re.is_match(line.text),
                    None => {
                        !closing
                            && language != Language::Markdown
                            && idx > 0
                            && lines[idx - 1].is_blank()
                    }
                };
                if candidate && idx > 0 {
                    out.push(Boundary::new(
                        attach_leading(&lines, idx, language),
                        DEPTH_TOP,
                    ));
                }
                if !is_attachment_line(line.text, language) {
                    in_container = !closing && container.is_some_and(|re| re.is_match(line.text));
                    seen_member = false;
                }
                continue;
            }

            let Some(member) = member else { continue };
            if in_container && line.is_member_indent() && member.is_match(line.text.trim_start()) {
                if seen_member {
                    out.push(Boundary::new(
                        attach_leading(&lines, idx, language),
                        DEPTH_MEMBER,
                    ));
                }
                seen_member = true;
            }
        }
        out
    }
}
