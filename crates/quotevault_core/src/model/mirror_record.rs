//! Mirror file model: metadata, filename derivation, backlink rendering.
//!
//! # Responsibility
//! - Represent one mirror file (one tracked quotation) in memory.
//! - Derive the mirror filename and the obsidian open-URI backlink.
//! - Round-trip recognized and unknown frontmatter keys.
//!
//! # Invariants
//! - At most one record exists per (book title, block id) pair.
//! - The backlink fragment is the authoritative identity; the filename is a
//!   labeled last-resort fallback only.
//! - Unknown frontmatter keys survive read/write unchanged.

use crate::model::quote::Quote;
use crate::parser::BlockId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// Current mirror metadata schema version.
pub const SCHEMA_VERSION: &str = "V0.3";

/// Static navigation link appended to every mirror file.
pub const RANDOM_NOTE_LINK: &str =
    "[Random Note](obsidian://adv-uri?vault=ReferenceQuotes&commandid=random-note)";

const MAX_FILENAME_WORDS: usize = 5;
const MAX_FILENAME_CHARS: usize = 30;

static HYPHEN_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid hyphen regex"));
static BACKLINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*Source:\*\*\s*\[[^\]]*\]\(([^)]*)\)").expect("valid link regex"));
static FILENAME_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" - Quote(\d{3,}) - ").expect("valid filename id regex"));

pub type MirrorResult<T> = Result<T, MirrorParseError>;

/// Failure to interpret an on-disk file as a mirror record.
#[derive(Debug)]
pub enum MirrorParseError {
    Io(std::io::Error),
    /// Neither the backlink fragment nor the filename yields a block id.
    MissingIdentity { path: PathBuf },
    /// No quote-marked lines in the body.
    MissingQuote { path: PathBuf },
    /// Frontmatter present but not parseable as a YAML mapping.
    BadFrontmatter { path: PathBuf, message: String },
}

impl Display for MirrorParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::MissingIdentity { path } => {
                write!(f, "mirror file has no block id: {}", path.display())
            }
            Self::MissingQuote { path } => {
                write!(f, "mirror file has no quote body: {}", path.display())
            }
            Self::BadFrontmatter { path, message } => {
                write!(f, "bad frontmatter in {}: {message}", path.display())
            }
        }
    }
}

impl Error for MirrorParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MirrorParseError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Recognized mirror metadata plus preserved unknown keys.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorMeta {
    pub delete: bool,
    pub favorite: bool,
    pub edited: bool,
    pub version: Option<String>,
    /// Unrecognized frontmatter keys, kept in file order.
    pub extra: Vec<(String, serde_yaml::Value)>,
}

impl Default for MirrorMeta {
    fn default() -> Self {
        Self {
            delete: false,
            favorite: false,
            edited: false,
            version: Some(SCHEMA_VERSION.to_string()),
            extra: Vec::new(),
        }
    }
}

impl MirrorMeta {
    /// Parses a frontmatter YAML block, splitting recognized keys out.
    pub fn from_yaml(block: &str) -> Result<Self, String> {
        let mapping: serde_yaml::Mapping =
            serde_yaml::from_str(block).map_err(|err| err.to_string())?;
        let mut meta = Self {
            version: None,
            ..Self::default()
        };
        for (key, value) in mapping {
            let Some(name) = key.as_str().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "delete" => meta.delete = value.as_bool().unwrap_or(false),
                "favorite" => meta.favorite = value.as_bool().unwrap_or(false),
                "edited" => meta.edited = value.as_bool().unwrap_or(false),
                "version" => meta.version = value.as_str().map(str::to_string),
                _ => meta.extra.push((name, value)),
            }
        }
        Ok(meta)
    }

    /// Serializes the metadata block, recognized keys first in fixed order.
    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("delete: {}\n", self.delete));
        out.push_str(&format!("favorite: {}\n", self.favorite));
        out.push_str(&format!("edited: {}\n", self.edited));
        if let Some(version) = &self.version {
            out.push_str(&format!("version: {version}\n"));
        }
        for (key, value) in &self.extra {
            let mut mapping = serde_yaml::Mapping::new();
            mapping.insert(
                serde_yaml::Value::String(key.clone()),
                value.clone(),
            );
            if let Ok(rendered) = serde_yaml::to_string(&mapping) {
                out.push_str(&rendered);
            }
        }
        out
    }
}

/// How a record's identity was established at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// From the backlink URI fragment. Authoritative.
    Backlink,
    /// Reconstructed from the filename. Last-resort fallback only.
    FilenameFallback,
}

/// One mirror file held in memory between load and commit.
#[derive(Debug, Clone)]
pub struct MirrorRecord {
    pub quote: Quote,
    pub meta: MirrorMeta,
    pub book_title: String,
    /// Path of the source document relative to the source vault root.
    pub source_path: Option<PathBuf>,
    /// Current (or planned, for new records) on-disk location.
    pub path: PathBuf,
    pub identity_origin: IdentityOrigin,
    pub is_new: bool,
    pub needs_update: bool,
    pub marked_for_deletion: bool,
}

impl MirrorRecord {
    /// Builds a brand-new record for a source quotation.
    pub fn new(
        mirror_root: &Path,
        book_title: &str,
        quote: Quote,
        source_path: PathBuf,
    ) -> Self {
        let id = quote.block_id.unwrap_or(BlockId(0));
        let filename = quote_filename(book_title, id, &quote.text);
        Self {
            path: mirror_root.join(book_title).join(filename),
            quote,
            meta: MirrorMeta::default(),
            book_title: book_title.to_string(),
            source_path: Some(source_path),
            identity_origin: IdentityOrigin::Backlink,
            is_new: true,
            needs_update: false,
            marked_for_deletion: false,
        }
    }

    /// Loads a mirror record from disk.
    pub fn from_file(path: impl Into<PathBuf>) -> MirrorResult<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;
        Self::from_str(path, &content)
    }

    /// Parses mirror file content.
    pub fn from_str(path: PathBuf, content: &str) -> MirrorResult<Self> {
        let (meta_block, body) = split_frontmatter(content);
        let meta = match meta_block {
            Some(block) => {
                MirrorMeta::from_yaml(block).map_err(|message| MirrorParseError::BadFrontmatter {
                    path: path.clone(),
                    message,
                })?
            }
            None => MirrorMeta {
                version: None,
                ..MirrorMeta::default()
            },
        };

        let text = extract_quote_text(body)
            .ok_or_else(|| MirrorParseError::MissingQuote { path: path.clone() })?;

        let backlink = parse_backlink(body);
        let (block_id, identity_origin) = match backlink.as_ref().and_then(|link| link.block_id) {
            Some(id) => (id, IdentityOrigin::Backlink),
            None => {
                let Some(id) = block_id_from_filename(&path) else {
                    return Err(MirrorParseError::MissingIdentity { path });
                };
                log::debug!(
                    "event=identity_fallback status=warn path={} id={id}",
                    path.display()
                );
                (id, IdentityOrigin::FilenameFallback)
            }
        };

        let book_title = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            quote: Quote::new(text, Some(block_id)),
            meta,
            book_title,
            source_path: backlink.and_then(|link| link.source_path),
            path,
            identity_origin,
            is_new: false,
            needs_update: false,
            marked_for_deletion: false,
        })
    }

    pub fn is_edited(&self) -> bool {
        self.meta.edited
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.meta.delete
    }

    /// The filename this record's current text derives to.
    pub fn derived_filename(&self) -> Option<String> {
        self.quote
            .block_id
            .map(|id| quote_filename(&self.book_title, id, &self.quote.text))
    }

    /// Renders the full mirror file content.
    pub fn render(&self, vault_name: &str) -> String {
        let quote_lines: Vec<String> = self
            .quote
            .text
            .split('\n')
            .map(|line| format!("> {line}"))
            .collect();
        let source_rel = self
            .source_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.md", self.book_title)));
        let link_text = source_rel
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = self.quote.block_id.unwrap_or(BlockId(0));
        let uri = obsidian_uri(vault_name, &source_rel, id);
        format!(
            "---\n{}---\n\n{}\n\n**Source:** [{link_text}]({uri})\n\n{RANDOM_NOTE_LINK}\n",
            self.meta.to_yaml(),
            quote_lines.join("\n"),
        )
    }
}

/// Derives the mirror filename: `<book> - Quote<NNN> - <first words>.md`.
pub fn quote_filename(book_title: &str, id: BlockId, text: &str) -> String {
    let clean_id = id.to_string().trim_start_matches('^').to_string();
    let mut first_words = text
        .trim()
        .split_whitespace()
        .take(MAX_FILENAME_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    if first_words.chars().count() > MAX_FILENAME_CHARS {
        let cut: String = first_words.chars().take(MAX_FILENAME_CHARS).collect();
        first_words = match cut.rfind(' ') {
            Some(pos) if pos > 0 => cut[..pos].to_string(),
            _ => cut,
        };
    }
    let safe = first_words.replace(['\\', '/', ':'], "-");
    let collapsed = HYPHEN_RUN_RE.replace_all(&safe, "-");
    let trimmed = collapsed.trim_matches(['-', ' ']);
    format!("{book_title} - {clean_id} - {trimmed}.md")
}

/// Builds the obsidian open-URI pointing at a quotation in its source.
///
/// The path is relative to the source vault root, `.md` stripped, separators
/// normalized to `/`; path and identity fragment are percent-encoded.
pub fn obsidian_uri(vault_name: &str, source_rel: &Path, id: BlockId) -> String {
    let mut rel = source_rel.to_string_lossy().replace('\\', "/");
    if let Some(stripped) = rel.strip_suffix(".md") {
        rel = stripped.to_string();
    }
    format!(
        "obsidian://open?vault={}&file={}%23{}",
        percent_encode(vault_name),
        percent_encode(&rel),
        percent_encode(&id.to_string()),
    )
}

/// Percent-encodes everything except unreserved characters and `/`.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Decodes percent escapes; invalid escapes are kept literally.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(hex) = bytes.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok()) {
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parsed pieces of a mirror backlink.
#[derive(Debug, Clone)]
pub struct Backlink {
    pub source_path: Option<PathBuf>,
    pub block_id: Option<BlockId>,
}

/// Extracts the `**Source:**` backlink from a mirror body, if present.
pub fn parse_backlink(body: &str) -> Option<Backlink> {
    let uri = BACKLINK_RE
        .captures(body)?
        .get(1)
        .map(|m| m.as_str().to_string())?;
    let file_param = uri
        .split_once("file=")
        .map(|(_, rest)| rest.split('&').next().unwrap_or(rest))?;
    let decoded = percent_decode(file_param);
    let (path_part, id_part) = match decoded.split_once('#') {
        Some((path, id)) => (path, Some(id)),
        None => (decoded.as_str(), None),
    };
    let source_path = if path_part.is_empty() {
        None
    } else {
        Some(PathBuf::from(format!("{path_part}.md")))
    };
    Some(Backlink {
        source_path,
        block_id: id_part.and_then(|token| BlockId::parse(token.trim())),
    })
}

/// Recovers a block id from the `<book> - Quote<NNN> - ...` filename shape.
///
/// Fallback path only; the backlink fragment stays authoritative.
pub fn block_id_from_filename(path: &Path) -> Option<BlockId> {
    let name = path.file_name()?.to_string_lossy();
    let captures = FILENAME_ID_RE.captures(&name)?;
    let suffix = captures.get(1)?.as_str().parse::<u32>().ok()?;
    Some(BlockId(suffix))
}

/// Splits content into (frontmatter block, body after the closing fence).
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    if let Some(rest) = content.strip_prefix("---") {
        if let Some(end) = rest.find("\n---") {
            let body = rest[end + 4..].trim_start_matches('\n');
            return (Some(&rest[..end]), body);
        }
    }
    (None, content)
}

/// Extracts the stripped quote text from a mirror body.
///
/// Quote-marked lines up to the backlink line form the text.
pub fn extract_quote_text(body: &str) -> Option<String> {
    let mut lines = Vec::new();
    for line in body.lines() {
        if line.trim_start().starts_with("**Source:") {
            break;
        }
        if crate::parser::is_quote_line(line) {
            lines.push(crate::parser::strip_quote_marker(line));
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_takes_five_words_and_truncates_at_word_boundary() {
        let name = quote_filename(
            "Walden",
            BlockId(12),
            "The mass of men lead lives of quiet desperation",
        );
        assert_eq!(name, "Walden - Quote012 - The mass of men lead.md");
    }

    #[test]
    fn filename_replaces_unsafe_characters_and_collapses_hyphens() {
        let name = quote_filename("Book", BlockId(1), "a/b\\c: d");
        assert_eq!(name, "Book - Quote001 - a-b-c- d.md");
    }

    #[test]
    fn uri_encodes_path_and_identity() {
        let uri = obsidian_uri("Notes", Path::new("shelf/My Book.md"), BlockId(1));
        assert_eq!(
            uri,
            "obsidian://open?vault=Notes&file=shelf/My%20Book%23%5EQuote001"
        );
    }

    #[test]
    fn backlink_roundtrip_recovers_source_and_identity() {
        let body = "> q\n\n**Source:** [My Book](obsidian://open?vault=Notes&file=shelf/My%20Book%23%5EQuote001)\n";
        let link = parse_backlink(body).unwrap();
        assert_eq!(link.source_path.as_deref(), Some(Path::new("shelf/My Book.md")));
        assert_eq!(link.block_id, Some(BlockId(1)));
    }

    #[test]
    fn backlink_accepts_unencoded_fragment() {
        let body = "**Source:** [Book](obsidian://open?vault=Notes&file=Book%23^Quote007)";
        let link = parse_backlink(body).unwrap();
        assert_eq!(link.block_id, Some(BlockId(7)));
    }

    #[test]
    fn meta_roundtrip_preserves_unknown_keys() {
        let meta = MirrorMeta::from_yaml(
            "delete: false\nfavorite: true\ncustom_tag: keepme\nversion: V0.2\n",
        )
        .unwrap();
        assert!(meta.favorite);
        assert_eq!(meta.version.as_deref(), Some("V0.2"));
        let rendered = meta.to_yaml();
        assert!(rendered.contains("custom_tag: keepme"));
        assert!(rendered.contains("delete: false"));
    }

    #[test]
    fn parse_rejects_file_without_identity() {
        let err = MirrorRecord::from_str(
            PathBuf::from("Book/strange.md"),
            "---\ndelete: false\n---\n\n> text\n",
        )
        .unwrap_err();
        assert!(matches!(err, MirrorParseError::MissingIdentity { .. }));
    }

    #[test]
    fn parse_falls_back_to_filename_identity() {
        let record = MirrorRecord::from_str(
            PathBuf::from("Book/Book - Quote004 - words.md"),
            "---\ndelete: false\n---\n\n> text\n",
        )
        .unwrap();
        assert_eq!(record.quote.block_id, Some(BlockId(4)));
        assert_eq!(record.identity_origin, IdentityOrigin::FilenameFallback);
    }

    #[test]
    fn render_produces_full_template() {
        let record = MirrorRecord::new(
            Path::new("/dest"),
            "Book",
            Quote::new("line one\nline two", Some(BlockId(1))),
            PathBuf::from("Book.md"),
        );
        let content = record.render("Notes");
        assert!(content.starts_with("---\ndelete: false\nfavorite: false\nedited: false\nversion: V0.3\n---\n\n> line one\n> line two\n"));
        assert!(content.contains("**Source:** [Book](obsidian://open?vault=Notes&file=Book%23%5EQuote001)"));
        assert!(content.ends_with(&format!("{RANDOM_NOTE_LINK}\n")));
    }
}
