//! Versioned mirror-metadata migration pipeline.
//!
//! # Responsibility
//! - Register metadata/content transformations in strictly increasing
//!   version order.
//! - Bring every mirror file below the current schema version up to date,
//!   cumulatively, and stamp it.
//!
//! # Invariants
//! - Step versions are monotonic; each file gets exactly the steps
//!   introduced after its stored version, in order.
//! - A failing step leaves the file on disk at its prior version.
//! - A corpus rewrite is preceded by a snapshot when at least one file
//!   needs migration.

use crate::model::list_markdown_files;
use crate::model::mirror_record::{split_frontmatter, MirrorMeta, RANDOM_NOTE_LINK, SCHEMA_VERSION};
use crate::model::mirror_vault::BACKUP_DIR;
use crate::service::backup;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Parsed `V<major>.<minor>` schema version with numeric ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetaVersion {
    major: u32,
    minor: u32,
}

impl MetaVersion {
    /// Version assumed for files that carry no `version` field.
    pub const ZERO: Self = Self { major: 0, minor: 0 };

    /// Parses `V0.3` (case-insensitive). Unparseable input maps to `None`.
    pub fn parse(token: &str) -> Option<Self> {
        let rest = token.trim().strip_prefix(['V', 'v'])?;
        let (major, minor) = rest.split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    fn of_meta(meta: &MirrorMeta) -> Self {
        meta.version
            .as_deref()
            .and_then(Self::parse)
            .unwrap_or(Self::ZERO)
    }
}

impl Display for MetaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{}.{}", self.major, self.minor)
    }
}

/// One migration step failed; the file stays at its prior version.
#[derive(Debug)]
pub struct TransformationError {
    pub file: PathBuf,
    pub message: String,
}

impl Display for TransformationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

impl Error for TransformationError {}

type TransformFn = fn(&mut MirrorMeta, &mut String) -> Result<(), String>;

struct Step {
    introduced: &'static str,
    apply: TransformFn,
}

/// Registry of cumulative transformations, oldest first.
const STEPS: &[Step] = &[
    Step {
        introduced: "V0.1",
        apply: add_version,
    },
    Step {
        introduced: "V0.2",
        apply: add_random_note_link,
    },
    Step {
        introduced: "V0.3",
        apply: add_edited_flag,
    },
];

/// V0.1: give unversioned files a version field.
fn add_version(meta: &mut MirrorMeta, _body: &mut String) -> Result<(), String> {
    if meta.version.is_none() {
        meta.version = Some("V0.1".to_string());
    }
    Ok(())
}

/// V0.2: append the Random Note navigation link when missing.
fn add_random_note_link(_meta: &mut MirrorMeta, body: &mut String) -> Result<(), String> {
    if body.contains(RANDOM_NOTE_LINK) {
        return Ok(());
    }
    while !body.ends_with("\n\n") {
        body.push('\n');
    }
    body.push_str(RANDOM_NOTE_LINK);
    body.push('\n');
    Ok(())
}

/// V0.3: materialize the `edited` flag.
///
/// The typed metadata record always carries `edited`; rewriting the file is
/// what surfaces `edited: false` in older frontmatter.
fn add_edited_flag(_meta: &mut MirrorMeta, _body: &mut String) -> Result<(), String> {
    Ok(())
}

/// Latest version the registry knows.
pub fn current_version() -> &'static str {
    SCHEMA_VERSION
}

/// Result of migrating one mirror corpus.
#[derive(Debug, Default)]
pub struct MigrationOutcome {
    pub files_updated: usize,
    pub errors: Vec<TransformationError>,
}

/// Returns whether file content is below the current schema version.
fn needs_migration(content: &str) -> bool {
    let (meta_block, _) = split_frontmatter(content);
    let stored = meta_block
        .and_then(|block| MirrorMeta::from_yaml(block).ok())
        .map(|meta| MetaVersion::of_meta(&meta))
        .unwrap_or(MetaVersion::ZERO);
    let current = MetaVersion::parse(SCHEMA_VERSION).unwrap_or(MetaVersion::ZERO);
    stored < current
}

/// Applies pending steps to one mirror file.
///
/// Returns whether the file was (or under dry-run, would be) rewritten.
pub fn migrate_file(path: &Path, dry_run: bool) -> Result<bool, TransformationError> {
    let content = fs::read_to_string(path).map_err(|err| TransformationError {
        file: path.to_path_buf(),
        message: err.to_string(),
    })?;
    if !needs_migration(&content) {
        return Ok(false);
    }

    let (meta_block, body) = split_frontmatter(&content);
    let mut meta = match meta_block {
        Some(block) => MirrorMeta::from_yaml(block).map_err(|message| TransformationError {
            file: path.to_path_buf(),
            message,
        })?,
        None => MirrorMeta {
            version: None,
            ..MirrorMeta::default()
        },
    };
    let mut body = body.to_string();
    let file_version = MetaVersion::of_meta(&meta);

    for step in STEPS {
        let introduced = MetaVersion::parse(step.introduced).unwrap_or(MetaVersion::ZERO);
        if introduced <= file_version {
            continue;
        }
        (step.apply)(&mut meta, &mut body).map_err(|message| TransformationError {
            file: path.to_path_buf(),
            message: format!("step {introduced}: {message}"),
        })?;
    }
    meta.version = Some(SCHEMA_VERSION.to_string());

    if !dry_run {
        fs::write(path, format!("---\n{}---\n\n{body}", meta.to_yaml())).map_err(|err| {
            TransformationError {
                file: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;
    }
    log::info!(
        "event=migrate_file status=ok dry_run={dry_run} path={} from={file_version} to={SCHEMA_VERSION}",
        path.display()
    );
    Ok(true)
}

/// Migrates every mirror file under `mirror_root`.
///
/// When at least one file needs migration, snapshots the tree first and
/// sweeps expired snapshots afterwards. Failing files are recorded and the
/// run continues.
pub fn migrate_vault(mirror_root: &Path, dry_run: bool) -> io::Result<MigrationOutcome> {
    let mut outcome = MigrationOutcome::default();
    let files = list_markdown_files(mirror_root, &[BACKUP_DIR])?;

    let pending = files
        .iter()
        .filter(|path| {
            fs::read_to_string(path)
                .map(|content| needs_migration(&content))
                .unwrap_or(false)
        })
        .count();
    if pending == 0 {
        return Ok(outcome);
    }
    if !dry_run {
        backup::create_backup(mirror_root, SCHEMA_VERSION)?;
        backup::cleanup_old_backups(mirror_root)?;
    }

    for path in files {
        match migrate_file(&path, dry_run) {
            Ok(true) => outcome.files_updated += 1,
            Ok(false) => {}
            Err(error) => outcome.errors.push(error),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_is_numeric() {
        let v01 = MetaVersion::parse("V0.1").unwrap();
        let v03 = MetaVersion::parse("V0.3").unwrap();
        let v010 = MetaVersion::parse("V0.10").unwrap();
        assert!(v01 < v03);
        assert!(v03 < v010);
        assert_eq!(MetaVersion::parse("garbage"), None);
    }

    #[test]
    fn step_versions_are_monotonic_and_end_at_current() {
        let mut previous = MetaVersion::ZERO;
        for step in STEPS {
            let version = MetaVersion::parse(step.introduced).unwrap();
            assert!(version > previous);
            previous = version;
        }
        assert_eq!(previous, MetaVersion::parse(SCHEMA_VERSION).unwrap());
    }

    #[test]
    fn random_note_link_is_appended_once() {
        let mut meta = MirrorMeta::default();
        let mut body = "> quote\n".to_string();
        add_random_note_link(&mut meta, &mut body).unwrap();
        assert!(body.ends_with(&format!("{RANDOM_NOTE_LINK}\n")));
        let before = body.clone();
        add_random_note_link(&mut meta, &mut body).unwrap();
        assert_eq!(body, before);
    }
}
