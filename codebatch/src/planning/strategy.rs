//! Batching strategies: combined (small files), single (medium files) and
//! multi-part (large files).
//!
//! Strategies produce [`PlannedUnit`]s without ids. The
//! [`TaskIdAssigner`](super::ids::TaskIdAssigner) numbers them afterwards so
//! every multi-part file shares one task number.

use std::sync::Arc;

use tracing::{debug, warn};

use super::boundary::{Boundary, FunctionBoundaryScanner, DEPTH_MEMBER, DEPTH_TOP};
use super::planner::PlanWarning;
use crate::state::types::{BatchKind, ChunkRange, SourceFile};
use crate::tokens::TokenEstimator;

/// A batch before id assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedBatch {
    pub total_tokens: usize,
    pub kind: BatchKind,
}

/// One task number's worth of work.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedUnit {
    /// Combined or single batch: `task_<n>`
    Whole(PlannedBatch),
    /// Parts of one large file: `task_<n>_<k>`
    Parts(Vec<PlannedBatch>),
}

impl PlannedUnit {
    pub fn batches(&self) -> &[PlannedBatch] {
        match self {
            Self::Whole(batch) => std::slice::from_ref(batch),
            Self::Parts(parts) => parts,
        }
    }
}

/// Highest importance first, then path, so plans are deterministic.
fn packing_order(files: &[SourceFile]) -> Vec<&SourceFile> {
    let mut ordered: Vec<&SourceFile> = files.iter().collect();
    ordered.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then_with(|| a.path.cmp(&b.path))
    });
    ordered
}

// ============================================================================
// Combined
// ============================================================================

/// Greedily packs small files into batches of about `target` tokens.
///
/// Files are never split. A file that alone exceeds `target` still gets its
/// own batch.
#[derive(Debug, Clone, Copy)]
pub struct CombinedBatchStrategy {
    target: usize,
}

impl CombinedBatchStrategy {
    pub fn new(target: usize) -> Self {
        Self { target }
    }

    pub fn plan(&self, files: &[SourceFile]) -> Vec<PlannedUnit> {
        let mut units = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut tokens = 0usize;

        for file in packing_order(files) {
            if !current.is_empty() && tokens + file.token_estimate > self.target {
                units.push(Self::seal(std::mem::take(&mut current), tokens));
                tokens = 0;
            }
            current.push(file.path.clone());
            tokens += file.token_estimate;
        }
        if !current.is_empty() {
            units.push(Self::seal(current, tokens));
        }
        units
    }

    fn seal(files: Vec<String>, total_tokens: usize) -> PlannedUnit {
        PlannedUnit::Whole(PlannedBatch {
            total_tokens,
            kind: BatchKind::Combined { files },
        })
    }
}

// ============================================================================
// Single
// ============================================================================

/// One batch per medium file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleFileBatchStrategy;

impl SingleFileBatchStrategy {
    pub fn plan(&self, files: &[SourceFile]) -> Vec<PlannedUnit> {
        packing_order(files)
            .into_iter()
            .map(|file| {
                PlannedUnit::Whole(PlannedBatch {
                    total_tokens: file.token_estimate,
                    kind: BatchKind::Single {
                        file: file.path.clone(),
                    },
                })
            })
            .collect()
    }
}

// ============================================================================
// Multi
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Piece {
    range: ChunkRange,
    tokens: usize,
    forced: bool,
}

/// Splits large files into ordered parts at function boundaries.
///
/// Top-level boundaries are tried first. Segments still above `target` are
/// refined with member boundaries. A unit that stays above `max` after both
/// is cut at line breaks regardless of structure; those parts are flagged
/// `forced_split` and reported as [`PlanWarning::UnsplittableUnit`].
pub struct LargeFileMultiBatchStrategy {
    target: usize,
    max: usize,
    scanner: FunctionBoundaryScanner,
    estimator: Arc<dyn TokenEstimator>,
}

impl LargeFileMultiBatchStrategy {
    pub fn new(target: usize, max: usize, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            target,
            max,
            scanner: FunctionBoundaryScanner::new(),
            estimator,
        }
    }

    fn estimate(&self, file: &SourceFile, content: &str, range: ChunkRange) -> usize {
        self.estimator
            .estimate(&content[range.start..range.end], file.language)
    }

    /// Split one file. Concatenating the returned ranges in order yields
    /// `content` exactly.
    pub fn plan_file(&self, file: &SourceFile, content: &str) -> (PlannedUnit, Vec<PlanWarning>) {
        let mut warnings = Vec::new();
        let boundaries = self.scanner.scan(content, file.language);
        let pieces = self.pieces(file, content, &boundaries, &mut warnings);
        let parts = self.accumulate(file, content, pieces);

        let total_parts = parts.len();
        let planned = parts
            .into_iter()
            .enumerate()
            .map(|(idx, (range, tokens, forced))| PlannedBatch {
                total_tokens: tokens,
                kind: BatchKind::Multi {
                    file: file.path.clone(),
                    range,
                    part_index: idx + 1,
                    total_parts,
                    is_last_part: idx + 1 == total_parts,
                    forced_split: forced,
                },
            })
            .collect::<Vec<_>>();

        debug!(
            path = %file.path,
            boundaries = boundaries.len(),
            parts = total_parts,
            "Split large file"
        );
        (PlannedUnit::Parts(planned), warnings)
    }

    /// Boundary-delimited pieces, each at most `max` tokens.
    fn pieces(
        &self,
        file: &SourceFile,
        content: &str,
        boundaries: &[Boundary],
        warnings: &mut Vec<PlanWarning>,
    ) -> Vec<Piece> {
        let mut pieces = Vec::new();
        for segment in segments(content.len(), boundaries, DEPTH_TOP, 0, content.len()) {
            let tokens = self.estimate(file, content, segment);
            if tokens <= self.target {
                pieces.push(Piece {
                    range: segment,
                    tokens,
                    forced: false,
                });
                continue;
            }

            // Too big on its own: try member boundaries inside it.
            for sub in segments(
                content.len(),
                boundaries,
                DEPTH_MEMBER,
                segment.start,
                segment.end,
            ) {
                let tokens = self.estimate(file, content, sub);
                if tokens <= self.max {
                    pieces.push(Piece {
                        range: sub,
                        tokens,
                        forced: false,
                    });
                    continue;
                }

                warn!(
                    path = %file.path,
                    start = sub.start,
                    end = sub.end,
                    tokens,
                    max = self.max,
                    "Code unit exceeds max batch size, forcing a raw split"
                );
                warnings.push(PlanWarning::UnsplittableUnit {
                    path: file.path.clone(),
                    range: sub,
                    tokens,
                });
                pieces.extend(self.forced_pieces(file, content, sub));
            }
        }
        pieces
    }

    /// Cut `range` into pieces of at most `target` tokens, preferring line
    /// breaks. Relies on the estimate being monotonic over prefixes.
    fn forced_pieces(&self, file: &SourceFile, content: &str, range: ChunkRange) -> Vec<Piece> {
        let mut pieces = Vec::new();
        let mut start = range.start;

        while start < range.end {
            let rest = ChunkRange::new(start, range.end);
            let rest_tokens = self.estimate(file, content, rest);
            if rest_tokens <= self.target {
                pieces.push(Piece {
                    range: rest,
                    tokens: rest_tokens,
                    forced: true,
                });
                break;
            }

            // Largest `lo` with estimate(start..lo) <= target.
            let mut lo = start;
            let mut hi = range.end;
            while hi - lo > 1 {
                let mut mid = floor_char_boundary(content, lo + (hi - lo) / 2);
                if mid <= lo {
                    mid = ceil_char_boundary(content, lo + 1);
                    if mid >= hi {
                        break;
                    }
                }
                if self.estimate(file, content, ChunkRange::new(start, mid)) <= self.target {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }

            let mut cut = match content[start..lo].rfind('\n') {
                Some(i) if i > 0 => start + i + 1,
                _ => lo,
            };
            if cut <= start {
                // Always make progress, even with a pathologically small target.
                cut = ceil_char_boundary(content, start + 1).min(range.end);
            }

            let piece = ChunkRange::new(start, cut);
            pieces.push(Piece {
                range: piece,
                tokens: self.estimate(file, content, piece),
                forced: true,
            });
            start = cut;
        }
        pieces
    }

    /// Greedily merge consecutive pieces into parts of at most `target`.
    ///
    /// A single piece above `target` (but within `max`) becomes its own part.
    fn accumulate(
        &self,
        file: &SourceFile,
        content: &str,
        pieces: Vec<Piece>,
    ) -> Vec<(ChunkRange, usize, bool)> {
        if pieces.is_empty() {
            return vec![(ChunkRange::new(0, content.len()), 0, false)];
        }

        let mut parts = Vec::new();
        let mut idx = 0;
        while idx < pieces.len() {
            let first = pieces[idx];
            let mut end_idx = idx + 1;
            // Sum of piece estimates bounds the merged estimate from above.
            let mut bound = first.tokens;
            while end_idx < pieces.len() && bound + pieces[end_idx].tokens <= self.target {
                bound += pieces[end_idx].tokens;
                end_idx += 1;
            }

            // Confirm with the real estimate; give pieces back if the bound was off.
            let (range, tokens) = loop {
                let range = ChunkRange::new(first.range.start, pieces[end_idx - 1].range.end);
                let tokens = self.estimate(file, content, range);
                if tokens <= self.target.max(first.tokens) || end_idx == idx + 1 {
                    break (range, tokens);
                }
                end_idx -= 1;
            };

            let forced = pieces[idx..end_idx].iter().any(|p| p.forced);
            parts.push((range, tokens, forced));
            idx = end_idx;
        }
        parts
    }
}

/// Contiguous ranges covering `[start, end)`, cut at boundaries of exactly
/// `depth` that fall strictly inside.
fn segments(
    len: usize,
    boundaries: &[Boundary],
    depth: u8,
    start: usize,
    end: usize,
) -> Vec<ChunkRange> {
    let mut cuts: Vec<usize> = boundaries
        .iter()
        .filter(|b| b.depth == depth && b.offset > start && b.offset < end && b.offset < len)
        .map(|b| b.offset)
        .collect();
    cuts.dedup();

    let mut out = Vec::with_capacity(cuts.len() + 1);
    let mut prev = start;
    for cut in cuts {
        out.push(ChunkRange::new(prev, cut));
        prev = cut;
    }
    out.push(ChunkRange::new(prev, end));
    out
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::tokens::DensityEstimator;

    fn small(path: &str, tokens: usize, importance: u8) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            byte_size: tokens as u64 * 4,
            token_estimate: tokens,
            language: Language::Rust,
            importance,
            content_hash: None,
        }
    }

    fn analyzed(path: &str, content: &str) -> SourceFile {
        let language = Language::from_path(path);
        SourceFile {
            path: path.to_string(),
            byte_size: content.len() as u64,
            token_estimate: DensityEstimator::default().estimate(content, language),
            language,
            importance: 50,
            content_hash: None,
        }
    }

    fn multi(target: usize, max: usize) -> LargeFileMultiBatchStrategy {
        LargeFileMultiBatchStrategy::new(target, max, Arc::new(DensityEstimator::default()))
    }

    fn ranges(unit: &PlannedUnit) -> Vec<ChunkRange> {
        unit.batches()
            .iter()
            .map(|b| match &b.kind {
                BatchKind::Multi { range, .. } => *range,
                other => panic!("expected multi, got {other:?}"),
            })
            .collect()
    }

    fn rust_functions(count: usize) -> String {
        (0..count)
            .map(|i| {
                format!(
                    "/// Function number {i}.\npub fn function_{i}(input: u64) -> u64 {{\n    let doubled = input * 2;\n    doubled + {i}\n}}\n\n"
                )
            })
            .collect()
    }

    #[test]
    fn test_combined_packs_by_importance_then_path() {
        let units = CombinedBatchStrategy::new(10).plan(&[
            small("b.rs", 4, 50),
            small("a.rs", 4, 50),
            small("main.rs", 4, 90),
        ]);
        assert_eq!(units.len(), 2);
        match &units[0].batches()[0].kind {
            BatchKind::Combined { files } => assert_eq!(files, &vec!["main.rs", "a.rs"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(units[0].batches()[0].total_tokens, 8);
        assert_eq!(units[1].batches()[0].total_tokens, 4);
    }

    #[test]
    fn test_combined_exact_fit_stays_together() {
        let units = CombinedBatchStrategy::new(18_000).plan(&[
            small("a.rs", 3_000, 50),
            small("b.rs", 5_000, 50),
            small("c.rs", 10_000, 50),
        ]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].batches()[0].total_tokens, 18_000);
    }

    #[test]
    fn test_combined_oversized_small_file_gets_own_batch() {
        let units = CombinedBatchStrategy::new(100).plan(&[
            small("a.rs", 50, 60),
            small("huge.rs", 150, 55),
            small("c.rs", 10, 50),
        ]);
        let totals: Vec<usize> = units.iter().map(|u| u.batches()[0].total_tokens).collect();
        assert_eq!(totals, vec![50, 150, 10]);
    }

    #[test]
    fn test_single_is_one_to_one() {
        let units = SingleFileBatchStrategy.plan(&[small("a.rs", 16_000, 50), small("b.rs", 19_000, 50)]);
        assert_eq!(units.len(), 2);
        assert!(units
            .iter()
            .all(|u| matches!(u.batches()[0].kind, BatchKind::Single { .. })));
    }

    #[test]
    fn test_multi_parts_are_lossless_and_bounded() {
        let content = rust_functions(400);
        let file = analyzed("src/big.rs", &content);
        let strategy = multi(2_000, 3_000);
        let (unit, warnings) = strategy.plan_file(&file, &content);
        assert!(warnings.is_empty());

        let parts = unit.batches();
        assert!(parts.len() > 1);
        let mut rebuilt = String::new();
        for (idx, part) in parts.iter().enumerate() {
            assert!(part.total_tokens <= 2_000);
            match &part.kind {
                BatchKind::Multi {
                    range,
                    part_index,
                    total_parts,
                    is_last_part,
                    forced_split,
                    ..
                } => {
                    assert_eq!(*part_index, idx + 1);
                    assert_eq!(*total_parts, parts.len());
                    assert_eq!(*is_last_part, idx + 1 == parts.len());
                    assert!(!forced_split);
                    rebuilt.push_str(&content[range.start..range.end]);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn test_multi_parts_start_at_function_boundaries() {
        let content = rust_functions(200);
        let file = analyzed("src/big.rs", &content);
        let (unit, _) = multi(1_000, 1_500).plan_file(&file, &content);
        for range in ranges(&unit).iter().skip(1) {
            assert!(content[range.start..].starts_with("/// Function number"));
        }
    }

    #[test]
    fn test_oversized_function_is_force_split_and_reported() {
        let body: String = (0..3_000)
            .map(|i| format!("    let value_{i} = compute({i});\n"))
            .collect();
        let content = format!("fn small() {{}}\n\nfn enormous() {{\n{body}}}\n");
        let file = analyzed("src/huge.rs", &content);
        let (unit, warnings) = multi(2_000, 3_000).plan_file(&file, &content);

        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            &warnings[0],
            PlanWarning::UnsplittableUnit { path, .. } if path == "src/huge.rs"
        ));
        let parts = unit.batches();
        assert!(parts.iter().any(|p| p.kind_forced()));
        assert!(parts.iter().all(|p| p.total_tokens <= 3_000));

        let rebuilt: String = ranges(&unit)
            .iter()
            .map(|r| &content[r.start..r.end])
            .collect();
        assert_eq!(rebuilt, content);

        // Forced cuts land on line breaks.
        for range in ranges(&unit).iter().skip(1) {
            assert_eq!(&content[range.start - 1..range.start], "\n");
        }
    }

    #[test]
    fn test_member_boundaries_refine_big_impls() {
        let methods: String = (0..300)
            .map(|i| format!("    pub fn method_{i}(&self) -> u64 {{\n        self.value + {i}\n    }}\n\n"))
            .collect();
        let content = format!("pub struct Holder {{\n    value: u64,\n}}\n\nimpl Holder {{\n{methods}}}\n");
        let file = analyzed("src/holder.rs", &content);
        let (unit, warnings) = multi(1_500, 2_500).plan_file(&file, &content);

        assert!(warnings.is_empty(), "impl should split between methods");
        let parts = unit.batches();
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| !p.kind_forced()));
        for range in ranges(&unit).iter().skip(1) {
            assert!(content[range.start..].starts_with("    pub fn method_"));
        }
    }

    #[test]
    fn test_multibyte_content_never_splits_inside_a_char() {
        let line = "let s = \"ünïcödé ✓ 漢字\";\n";
        let content = line.repeat(2_000);
        let file = analyzed("src/text.rs", &content);
        let (unit, _) = multi(500, 800).plan_file(&file, &content);
        let rebuilt: String = ranges(&unit)
            .iter()
            .map(|r| &content[r.start..r.end])
            .collect();
        assert_eq!(rebuilt, content);
    }

    impl PlannedBatch {
        fn kind_forced(&self) -> bool {
            matches!(
                self.kind,
                BatchKind::Multi {
                    forced_split: true,
                    ..
                }
            )
        }
    }
}
