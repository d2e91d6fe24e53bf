//! In-memory source document with lossless re-serialization.
//!
//! # Responsibility
//! - Hold one source file as verbatim lines plus tracked quotation blocks.
//! - Queue edit/remove/unwrap mutations in memory and commit them once.
//!
//! # Invariants
//! - Lines outside quotation regions re-serialize byte-for-byte.
//! - An untouched quotation block re-serializes from its original raw lines.
//! - `save` writes only when the document is dirty; rendering is stable
//!   across repeated saves with no further mutation.

use crate::model::quote::Quote;
use crate::parser::{self, BlockId};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Frontmatter line that opts a source document into quote sync.
const SYNC_FLAG: &str = "sync_quotes: true";

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockState {
    /// Untouched; re-serialize the original raw lines.
    Clean,
    /// Text edited or id assigned; re-serialize from the quote value.
    Edited,
    /// Converted to an untracked quoted-string literal; id discarded.
    Unwrapped,
    /// Dropped from the document entirely.
    Removed,
}

#[derive(Debug, Clone)]
struct QuoteBlock {
    raw_lines: Vec<String>,
    raw_id_line: Option<String>,
    quote: Quote,
    state: BlockState,
}

impl QuoteBlock {
    fn is_tracked(&self) -> bool {
        matches!(self.state, BlockState::Clean | BlockState::Edited)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    /// One raw non-quotation line, reproduced exactly.
    Verbatim(String),
    Quote(QuoteBlock),
}

/// One source file: ordered quotations plus all surrounding text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    path: PathBuf,
    segments: Vec<Segment>,
    trailing_newline: bool,
    sync_enabled: bool,
    dirty: bool,
}

impl SourceDocument {
    /// Parses raw document text.
    pub fn from_str(path: impl Into<PathBuf>, content: &str) -> Self {
        let trailing_newline = content.ends_with('\n');
        let body = content.strip_suffix('\n').unwrap_or(content);
        let lines: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split('\n').collect()
        };

        let mut segments = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if !parser::is_quote_line(lines[i]) {
                segments.push(Segment::Verbatim(lines[i].to_string()));
                i += 1;
                continue;
            }
            let mut raw_lines = Vec::new();
            let mut text_lines = Vec::new();
            while i < lines.len() && parser::is_quote_line(lines[i]) {
                raw_lines.push(lines[i].to_string());
                text_lines.push(parser::strip_quote_marker(lines[i]));
                i += 1;
            }
            let mut raw_id_line = None;
            let mut block_id = None;
            if i < lines.len() {
                if let Some(id) = BlockId::parse(lines[i].trim()) {
                    raw_id_line = Some(lines[i].to_string());
                    block_id = Some(id);
                    i += 1;
                }
            }
            segments.push(Segment::Quote(QuoteBlock {
                raw_lines,
                raw_id_line,
                quote: Quote::new(text_lines.join("\n").trim().to_string(), block_id),
                state: BlockState::Clean,
            }));
        }

        Self {
            path: path.into(),
            segments,
            trailing_newline,
            sync_enabled: has_sync_flag(content),
            dirty: false,
        }
    }

    /// Loads and parses a document from disk.
    pub fn from_file(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;
        Ok(Self::from_str(path, &content))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Book title: the file name without its `.md` extension.
    pub fn book_title(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether the document opted into quote sync via frontmatter.
    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Tracked quotations in document order (removed/unwrapped excluded).
    pub fn quotes(&self) -> Vec<Quote> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Quote(block) if block.is_tracked() => Some(block.quote.clone()),
                _ => None,
            })
            .collect()
    }

    /// Block ids currently bound in the document.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Quote(block) if block.is_tracked() => block.quote.block_id,
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.block_ids().contains(&id)
    }

    /// Validates every block-id token in the rendered document.
    pub fn validate(&self) -> Vec<parser::ValidationError> {
        parser::validate_block_ids(&self.render())
    }

    /// Assigns ids to quotations that lack one, in document order.
    ///
    /// Returns the number of ids added. A single counter seeded past the
    /// highest existing id serves the whole pass.
    pub fn assign_missing_ids(&mut self) -> usize {
        let mut alloc = parser::BlockIdAllocator::from_ids(self.block_ids());
        let mut added = 0;
        for segment in &mut self.segments {
            if let Segment::Quote(block) = segment {
                if block.is_tracked() && block.quote.block_id.is_none() {
                    block.quote.block_id = Some(alloc.allocate());
                    block.state = BlockState::Edited;
                    added += 1;
                }
            }
        }
        if added > 0 {
            self.dirty = true;
        }
        added
    }

    /// Appends a quotation at the end of the document.
    pub fn add(&mut self, text: impl Into<String>, block_id: Option<BlockId>) {
        if !matches!(self.segments.last(), Some(Segment::Verbatim(line)) if line.is_empty())
            && !self.segments.is_empty()
        {
            self.segments.push(Segment::Verbatim(String::new()));
        }
        self.segments.push(Segment::Quote(QuoteBlock {
            raw_lines: Vec::new(),
            raw_id_line: None,
            quote: Quote::new(text, block_id),
            state: BlockState::Edited,
        }));
        self.dirty = true;
    }

    /// Replaces the text of the quotation bound to `id`.
    pub fn update(&mut self, id: BlockId, text: &str) -> bool {
        for segment in &mut self.segments {
            if let Segment::Quote(block) = segment {
                if block.is_tracked() && block.quote.block_id == Some(id) {
                    if block.quote.text != text {
                        block.quote.text = text.to_string();
                        block.state = BlockState::Edited;
                        self.dirty = true;
                    }
                    return true;
                }
            }
        }
        false
    }

    /// Drops the quotation bound to `id` from the document.
    pub fn remove(&mut self, id: BlockId) -> bool {
        for segment in &mut self.segments {
            if let Segment::Quote(block) = segment {
                if block.is_tracked() && block.quote.block_id == Some(id) {
                    block.state = BlockState::Removed;
                    self.dirty = true;
                    return true;
                }
            }
        }
        false
    }

    /// Converts the quotation bound to `id` into an untracked quoted-string
    /// literal, discarding the id permanently.
    pub fn unwrap_quote(&mut self, id: BlockId) -> bool {
        for segment in &mut self.segments {
            if let Segment::Quote(block) = segment {
                if block.is_tracked() && block.quote.block_id == Some(id) {
                    block.state = BlockState::Unwrapped;
                    block.quote.block_id = None;
                    self.dirty = true;
                    return true;
                }
            }
        }
        false
    }

    /// Serializes the document, reproducing untouched bytes exactly.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Verbatim(line) => lines.push(line.clone()),
                Segment::Quote(block) => match block.state {
                    BlockState::Clean => {
                        lines.extend(block.raw_lines.iter().cloned());
                        if let Some(raw) = &block.raw_id_line {
                            lines.push(raw.clone());
                        }
                    }
                    BlockState::Edited => {
                        for text_line in block.quote.text.split('\n') {
                            lines.push(format!("> {text_line}"));
                        }
                        if let Some(id) = block.quote.block_id {
                            lines.push(id.to_string());
                        }
                    }
                    BlockState::Unwrapped => {
                        let flat = block.quote.text.split('\n').collect::<Vec<_>>().join(" ");
                        lines.push(format!("\"{flat}\""));
                    }
                    BlockState::Removed => {}
                },
            }
        }
        let mut out = lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    /// Writes the document back to disk when dirty.
    ///
    /// Returns whether a write happened.
    pub fn save(&mut self) -> io::Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        fs::write(&self.path, self.render())?;
        self.dirty = false;
        Ok(true)
    }
}

/// Returns whether document content carries the `sync_quotes: true` flag in
/// its leading frontmatter block.
pub fn has_sync_flag(content: &str) -> bool {
    let Some(rest) = content.strip_prefix("---") else {
        return false;
    };
    let Some(end) = rest.find("\n---") else {
        return false;
    };
    rest[..end].lines().any(|line| line.trim() == SYNC_FLAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\nsync_quotes: true\n---\nIntro prose.\n\n>  First quote \n^Quote001\n\ntail text\n";

    #[test]
    fn roundtrip_is_byte_exact_without_mutation() {
        let doc = SourceDocument::from_str("Book.md", DOC);
        assert_eq!(doc.render(), DOC);
    }

    #[test]
    fn sync_flag_is_read_from_frontmatter() {
        let doc = SourceDocument::from_str("Book.md", DOC);
        assert!(doc.sync_enabled());
        let plain = SourceDocument::from_str("Other.md", "no frontmatter\n> q\n");
        assert!(!plain.sync_enabled());
    }

    #[test]
    fn update_rewrites_only_the_target_block() {
        let mut doc = SourceDocument::from_str("Book.md", DOC);
        assert!(doc.update(BlockId(1), "Rewritten"));
        let out = doc.render();
        assert!(out.contains("> Rewritten\n^Quote001"));
        assert!(out.contains("Intro prose.\n"));
        assert!(out.contains("tail text\n"));
        assert!(!out.contains("First quote"));
    }

    #[test]
    fn unwrap_replaces_block_with_quoted_literal() {
        let mut doc =
            SourceDocument::from_str("Book.md", "> line one\n> line two\n^Quote002\nafter\n");
        assert!(doc.unwrap_quote(BlockId(2)));
        let out = doc.render();
        assert_eq!(out, "\"line one line two\"\nafter\n");
        assert!(!doc.contains(BlockId(2)));
    }

    #[test]
    fn remove_drops_block_and_id_line() {
        let mut doc = SourceDocument::from_str("Book.md", "keep\n> gone\n^Quote001\nkeep too\n");
        assert!(doc.remove(BlockId(1)));
        assert_eq!(doc.render(), "keep\nkeep too\n");
        assert!(!doc.remove(BlockId(1)));
    }

    #[test]
    fn assign_missing_ids_uses_one_counter_in_document_order() {
        let mut doc = SourceDocument::from_str(
            "Book.md",
            "> no id yet\n\n> has id\n^Quote003\n\n> also missing\n",
        );
        assert_eq!(doc.assign_missing_ids(), 2);
        let ids: Vec<_> = doc.quotes().iter().filter_map(|q| q.block_id).collect();
        assert_eq!(ids, vec![BlockId(4), BlockId(3), BlockId(5)]);
        let out = doc.render();
        assert!(out.contains("> no id yet\n^Quote004"));
        assert!(out.contains("> also missing\n^Quote005"));
    }

    #[test]
    fn render_is_stable_after_mutation() {
        let mut doc = SourceDocument::from_str("Book.md", DOC);
        doc.update(BlockId(1), "Changed");
        let first = doc.render();
        assert_eq!(doc.render(), first);
    }
}
