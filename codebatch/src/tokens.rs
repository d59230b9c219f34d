//! Token estimation: language-aware, deterministic cost model for text.
//!
//! The estimate approximates generation cost rather than any vendor's exact
//! tokenizer. Comments and whitespace runs are discounted (not removed), and
//! the result is scaled by the language's density.

use crate::language::Language;

/// Weight of an ordinary code character, in quarter-character units.
const CODE_UNITS: u64 = 4;

/// Weight of a comment character.
///
/// Must stay at least half of `CODE_UNITS`: a two-character opener such as
/// `//` reclassifies the preceding `/`, and `2 * COMMENT_UNITS >= CODE_UNITS`
/// keeps appending text from ever lowering the estimate.
const COMMENT_UNITS: u64 = 2;

/// Weight of every whitespace character after the first in a run.
const WHITESPACE_RUN_UNITS: u64 = 1;

/// Trait for estimating token counts from text.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in `text` written in `language`.
    fn estimate(&self, text: &str, language: Language) -> usize;

    /// Estimator name for logging.
    fn name(&self) -> &str;
}

/// Character-density estimator with comment and whitespace discounts.
///
/// Roughly `chars / chars_per_token`, where comment characters count half
/// and indentation runs count a quarter, multiplied by
/// [`Language::density`].
#[derive(Debug, Clone)]
pub struct DensityEstimator {
    /// Characters per token for density-1.0 text.
    pub chars_per_token: f64,
}

impl Default for DensityEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4.0,
        }
    }
}

impl DensityEstimator {
    pub fn new(chars_per_token: f64) -> Self {
        Self { chars_per_token }
    }

    /// Weighted length of `text` in quarter-character units.
    fn weighted_units(text: &str, language: Language) -> u64 {
        let syntax = language.comment_syntax();
        let bytes = text.as_bytes();
        let mut units = 0u64;
        let mut i = 0usize;
        let mut prev_whitespace = false;

        while i < text.len() {
            let rest = &text[i..];

            // Line comment: runs to (not including) the newline.
            if syntax.line.iter().any(|o| rest.starts_with(*o)) {
                let end = rest.find('\n').map(|n| i + n).unwrap_or(text.len());
                units += text[i..end].chars().count() as u64 * COMMENT_UNITS;
                i = end;
                prev_whitespace = false;
                continue;
            }

            // Block comment: runs through the closer, or to end of text.
            if let Some((open, close)) = syntax.block {
                if rest.starts_with(open) {
                    let body_start = i + open.len();
                    let end = text[body_start..]
                        .find(close)
                        .map(|n| body_start + n + close.len())
                        .unwrap_or(text.len());
                    units += text[i..end].chars().count() as u64 * COMMENT_UNITS;
                    i = end;
                    prev_whitespace = false;
                    continue;
                }
            }

            // String literal: counted as code, but comment openers inside are not comments.
            if bytes[i] == b'"' {
                let mut j = i + 1;
                while j < text.len() {
                    match bytes[j] {
                        b'\\' => j += 2,
                        b'"' => {
                            j += 1;
                            break;
                        }
                        b'\n' => break,
                        _ => j += 1,
                    }
                }
                let end = j.min(text.len());
                units += text[i..end].chars().count() as u64 * CODE_UNITS;
                i = end;
                prev_whitespace = false;
                continue;
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };
            if ch.is_whitespace() {
                units += if prev_whitespace {
                    WHITESPACE_RUN_UNITS
                } else {
                    CODE_UNITS
                };
                prev_whitespace = true;
            } else {
                units += CODE_UNITS;
                prev_whitespace = false;
            }
            i += ch.len_utf8();
        }

        units
    }
}

impl TokenEstimator for DensityEstimator {
    fn estimate(&self, text: &str, language: Language) -> usize {
        if text.is_empty() {
            return 0;
        }
        let units = Self::weighted_units(text, language);
        let chars = units as f64 / CODE_UNITS as f64;
        (chars * language.density() / self.chars_per_token).ceil() as usize
    }

    fn name(&self) -> &str {
        "density"
    }
}
