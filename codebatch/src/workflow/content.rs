//! Task content assembly and delivery chunking.
//!
//! Batching bounds tokens; delivery bounds characters. A batch's text is
//! assembled once per request and cut into chunks of at most `max_length`
//! characters, preferring to end each chunk on a newline.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};
use crate::planning::analyzer::content_hash;
use crate::source::ContentSource;
use crate::state::types::{Batch, BatchKind, SourceFile, TaskId};

/// Position of a delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ChunkInfo {
    /// 0-based
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub has_more: bool,
    /// Characters per chunk this split was made with
    pub max_length: usize,
}

/// Content of one task, possibly one chunk of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TaskContent {
    pub task_id: TaskId,
    pub strategy: String,
    pub files: Vec<String>,
    pub total_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last_part: Option<bool>,
    pub content: String,
    /// Present when the content did not fit in one chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
}

impl TaskContent {
    pub fn new(batch: &Batch, content: String, chunk_info: Option<ChunkInfo>) -> Self {
        let (part_index, total_parts, is_last_part) = match batch.kind {
            BatchKind::Multi {
                part_index,
                total_parts,
                is_last_part,
                ..
            } => (Some(part_index), Some(total_parts), Some(is_last_part)),
            _ => (None, None, None),
        };
        Self {
            task_id: batch.id.clone(),
            strategy: batch.strategy().to_string(),
            files: batch.files().into_iter().map(str::to_string).collect(),
            total_tokens: batch.total_tokens,
            part_index,
            total_parts,
            is_last_part,
            content,
            chunk_info,
        }
    }
}

/// Full text of `batch`: each file (or file part) under a header line.
///
/// A part is a byte range into the file as it was planned, so a split file
/// whose hash no longer matches its planned record is refused.
pub fn assemble(
    batch: &Batch,
    root: &Path,
    source: &dyn ContentSource,
    planned: &[SourceFile],
) -> WorkflowResult<String> {
    let mut out = String::new();
    match &batch.kind {
        BatchKind::Combined { files } => {
            for file in files {
                push_section(&mut out, file, &read(source, root, file)?);
            }
        }
        BatchKind::Single { file } => push_section(&mut out, file, &read(source, root, file)?),
        BatchKind::Multi {
            file,
            range,
            part_index,
            total_parts,
            ..
        } => {
            let content = read(source, root, file)?;
            let expected = planned
                .iter()
                .find(|f| &f.path == file)
                .and_then(|f| f.content_hash.as_deref());
            if expected.is_some_and(|hash| hash != content_hash(&content)) {
                return Err(WorkflowError::invalid_file_list(format!(
                    "{} changed since planning (part {} content differs); re-run analysis",
                    file, part_index
                )));
            }
            let slice = content.get(range.start..range.end).ok_or_else(|| {
                WorkflowError::invalid_file_list(format!(
                    "{} changed since planning (part {} range {}..{} no longer valid); re-run analysis",
                    file, part_index, range.start, range.end
                ))
            })?;
            let header = format!("{} (part {}/{})", file, part_index, total_parts);
            push_section(&mut out, &header, slice);
        }
    }
    Ok(out)
}

fn read(source: &dyn ContentSource, root: &Path, relative: &str) -> WorkflowResult<String> {
    source.read(&root.join(relative)).map_err(|e| {
        WorkflowError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read {}: {}", relative, e),
        ))
    })
}

fn push_section(out: &mut String, title: &str, body: &str) {
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str("===== ");
    out.push_str(title);
    out.push_str(" =====\n");
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
}

/// Byte ranges of delivery chunks, each at most `max_length` characters.
///
/// A chunk ends after the last newline inside its window when there is
/// one; otherwise it is cut at the character limit. Empty content is one
/// empty chunk.
pub fn chunk_ranges(content: &str, max_length: usize) -> Vec<Range<usize>> {
    let max_length = max_length.max(1);
    if content.is_empty() {
        return vec![0..0];
    }

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < content.len() {
        let window_end = content[start..]
            .char_indices()
            .nth(max_length)
            .map(|(i, _)| start + i)
            .unwrap_or(content.len());

        let end = if window_end == content.len() {
            window_end
        } else {
            match content[start..window_end].rfind('\n') {
                Some(i) => start + i + 1,
                None => window_end,
            }
        };
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Select chunk `index` of `content`.
pub fn select_chunk(
    content: &str,
    max_length: usize,
    index: usize,
) -> WorkflowResult<(String, ChunkInfo)> {
    let ranges = chunk_ranges(content, max_length);
    let total_chunks = ranges.len();
    let range = ranges
        .get(index)
        .cloned()
        .ok_or(WorkflowError::ChunkOutOfRange {
            chunk_index: index,
            total_chunks,
        })?;
    Ok((
        content[range].to_string(),
        ChunkInfo {
            chunk_index: index,
            total_chunks,
            has_more: index + 1 < total_chunks,
            max_length,
        },
    ))
}
