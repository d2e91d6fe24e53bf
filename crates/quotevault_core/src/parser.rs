//! Quotation extraction, block-id validation and allocation.
//!
//! # Responsibility
//! - Split raw markdown into quotation runs and their trailing block ids.
//! - Validate block-id uniqueness and shape before any mutation.
//! - Allocate the next free block id for a document.
//!
//! # Invariants
//! - Validation never mutates input.
//! - Allocation never reuses an existing numeric suffix.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Token prefix shared by every block id.
pub const BLOCK_ID_PREFIX: &str = "^Quote";

/// Minimum zero-padded width of the numeric suffix.
const MIN_ID_WIDTH: usize = 3;

static BLOCK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\^Quote(\d{3,})$").expect("valid block id regex"));

/// Stable per-quotation identity: `^Quote` + zero-padded decimal.
///
/// The suffix is stored numerically; rendering pads to width 3 and grows
/// naturally past `^Quote999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Parses a trimmed token like `^Quote001`.
    ///
    /// Returns `None` when the token is not a well-formed block id; callers
    /// that need to distinguish "not an id" from "malformed id" should pair
    /// this with [`looks_like_block_id`].
    pub fn parse(token: &str) -> Option<Self> {
        let captures = BLOCK_ID_RE.captures(token)?;
        let suffix = captures.get(1)?.as_str().parse::<u32>().ok()?;
        Some(Self(suffix))
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:0width$}", BLOCK_ID_PREFIX, self.0, width = MIN_ID_WIDTH)
    }
}

/// Returns whether a trimmed line is trying to be a block id.
///
/// Used by validation to flag `^Quote` tokens with a bad suffix instead of
/// silently treating them as prose.
pub fn looks_like_block_id(token: &str) -> bool {
    token.starts_with(BLOCK_ID_PREFIX)
}

pub type ParseResult<T> = Result<T, ValidationError>;

/// Per-document block-id validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The same block id binds more than one quotation (or appears twice).
    DuplicateId { id: BlockId },
    /// A token starts with `^Quote` but the suffix is not a valid number.
    MalformedId { token: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId { id } => write!(f, "duplicate block id {id}"),
            Self::MalformedId { token } => write!(f, "malformed block id `{token}`"),
        }
    }
}

impl Error for ValidationError {}

/// One extracted quotation: stripped text plus its bound id, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedQuote {
    pub text: String,
    pub block_id: Option<BlockId>,
}

/// Strips the quote marker prefix and trailing whitespace from one line.
pub(crate) fn strip_quote_marker(line: &str) -> &str {
    line.trim_start_matches(['>', ' ']).trim_end()
}

/// Returns whether a raw line belongs to a quotation run.
pub(crate) fn is_quote_line(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

/// Extracts quotation groups in document order.
///
/// A quotation is a maximal run of consecutive quote-marked lines; when the
/// line immediately after the run is a block id, that id binds to the run.
pub fn extract_quotes(markdown: &str) -> Vec<ExtractedQuote> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut quotes = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_quote_line(lines[i]) {
            i += 1;
            continue;
        }
        let mut text_lines = Vec::new();
        while i < lines.len() && is_quote_line(lines[i]) {
            text_lines.push(strip_quote_marker(lines[i]));
            i += 1;
        }
        let mut block_id = None;
        if i < lines.len() {
            if let Some(id) = BlockId::parse(lines[i].trim()) {
                block_id = Some(id);
                i += 1;
            }
        }
        quotes.push(ExtractedQuote {
            text: text_lines.join("\n").trim().to_string(),
            block_id,
        });
    }
    quotes
}

/// Validates every block-id-looking token in the document.
///
/// Emits one error per duplicate occurrence beyond the first and one per
/// malformed token. Never mutates anything; run before any other operation.
pub fn validate_block_ids(markdown: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = Vec::new();
    for line in markdown.lines() {
        let token = line.trim();
        if !looks_like_block_id(token) {
            continue;
        }
        match BlockId::parse(token) {
            Some(id) => {
                if seen.contains(&id) {
                    errors.push(ValidationError::DuplicateId { id });
                } else {
                    seen.push(id);
                }
            }
            None => errors.push(ValidationError::MalformedId {
                token: token.to_string(),
            }),
        }
    }
    errors
}

/// Returns the next free block id for a document.
///
/// Next suffix = max existing suffix + 1, or 1 when the document has none.
pub fn next_block_id(markdown: &str) -> BlockId {
    let max = markdown
        .lines()
        .filter_map(|line| BlockId::parse(line.trim()))
        .map(|id| id.0)
        .max();
    BlockId(max.map_or(1, |n| n + 1))
}

/// Monotonic allocator for assigning several ids in one pass.
///
/// Seeded from the highest existing suffix so later already-used ids in the
/// same document are never handed out twice.
#[derive(Debug)]
pub struct BlockIdAllocator {
    next: u32,
}

impl BlockIdAllocator {
    /// Seeds the allocator from a document's existing ids.
    pub fn for_document(markdown: &str) -> Self {
        Self {
            next: next_block_id(markdown).0,
        }
    }

    /// Seeds the allocator from an iterator of known ids.
    pub fn from_ids<I: IntoIterator<Item = BlockId>>(ids: I) -> Self {
        let max = ids.into_iter().map(|id| id.0).max();
        Self {
            next: max.map_or(1, |n| n + 1),
        }
    }

    /// Hands out the next id and advances the counter.
    pub fn allocate(&mut self) -> BlockId {
        let id = BlockId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_renders_with_minimum_width_and_grows() {
        assert_eq!(BlockId(1).to_string(), "^Quote001");
        assert_eq!(BlockId(999).to_string(), "^Quote999");
        assert_eq!(BlockId(1000).to_string(), "^Quote1000");
    }

    #[test]
    fn block_id_parse_accepts_three_or_more_digits() {
        assert_eq!(BlockId::parse("^Quote007"), Some(BlockId(7)));
        assert_eq!(BlockId::parse("^Quote1234"), Some(BlockId(1234)));
        assert_eq!(BlockId::parse("^Quote12"), None);
        assert_eq!(BlockId::parse("^Quote001x"), None);
        assert_eq!(BlockId::parse("plain text"), None);
    }

    #[test]
    fn extracts_grouped_quotes_with_and_without_ids() {
        let doc = "intro\n> first line\n> second line\n^Quote003\n\n> loose quote\nmore prose\n";
        let quotes = extract_quotes(doc);
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].text, "first line\nsecond line");
        assert_eq!(quotes[0].block_id, Some(BlockId(3)));
        assert_eq!(quotes[1].text, "loose quote");
        assert_eq!(quotes[1].block_id, None);
    }

    #[test]
    fn duplicate_id_yields_one_error_per_extra_occurrence() {
        let doc = "> a\n^Quote001\n> b\n^Quote001\n> c\n^Quote001\n";
        let errors = validate_block_ids(doc);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::DuplicateId { id } if *id == BlockId(1))));
    }

    #[test]
    fn malformed_id_is_reported_not_ignored() {
        let doc = "> a\n^Quote01\n> b\n^Quotexyz\n";
        let errors = validate_block_ids(doc);
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], ValidationError::MalformedId { token } if token == "^Quote01"));
    }

    #[test]
    fn allocator_never_reuses_existing_ids() {
        let doc = "> a\n^Quote001\n> b\n> c\n^Quote003\n";
        let mut alloc = BlockIdAllocator::for_document(doc);
        assert_eq!(alloc.allocate(), BlockId(4));
        assert_eq!(alloc.allocate(), BlockId(5));
    }

    #[test]
    fn allocator_starts_at_one_for_empty_documents() {
        let mut alloc = BlockIdAllocator::for_document("no quotes here\n");
        assert_eq!(alloc.allocate(), BlockId(1));
    }
}
