//! Mirror corpus: every mirror file under the destination root.
//!
//! # Responsibility
//! - Load all mirror records into memory at pass start (skipping `.backup`).
//! - Expose per-book and per-identity lookup for the engine.
//! - Commit creations, updates and deletions in one pass.
//!
//! # Invariants
//! - Deletions commit before writes so a rename (delete-old/create-new) can
//!   never leave two files for one identity.

use crate::model::list_markdown_files;
use crate::model::mirror_record::MirrorRecord;
use crate::parser::BlockId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory under the mirror root holding pre-migration snapshots.
pub const BACKUP_DIR: &str = ".backup";

/// All mirror records under one destination root.
#[derive(Debug)]
pub struct MirrorVault {
    root: PathBuf,
    records: Vec<MirrorRecord>,
}

impl MirrorVault {
    /// Reads every mirror file under `root` into memory.
    ///
    /// Files that cannot be interpreted as mirror records are logged and
    /// skipped rather than failing the pass.
    pub fn load(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let mut records = Vec::new();
        for path in list_markdown_files(&root, &[BACKUP_DIR])? {
            match MirrorRecord::from_file(&path) {
                Ok(record) => records.push(record),
                Err(err) => {
                    log::warn!("event=mirror_load status=skipped reason=\"{err}\"");
                }
            }
        }
        Ok(Self { root, records })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records(&self) -> &[MirrorRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [MirrorRecord] {
        &mut self.records
    }

    pub fn push(&mut self, record: MirrorRecord) {
        self.records.push(record);
    }

    /// Indices of live records belonging to one book.
    pub fn indices_for_book(&self, book_title: &str) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.book_title == book_title && !r.marked_for_deletion)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Index of the live record for one (book, identity) pair.
    pub fn find(&self, book_title: &str, id: BlockId) -> Option<usize> {
        self.records.iter().position(|r| {
            r.book_title == book_title
                && r.quote.block_id == Some(id)
                && !r.marked_for_deletion
        })
    }

    /// Applies all queued deletions and writes. No-op under dry-run.
    pub fn commit(&mut self, vault_name: &str, dry_run: bool) -> io::Result<()> {
        for record in &self.records {
            if !record.marked_for_deletion || record.is_new {
                continue;
            }
            if dry_run {
                log::info!(
                    "event=mirror_delete status=skipped dry_run=true path={}",
                    record.path.display()
                );
                continue;
            }
            if record.path.exists() {
                fs::remove_file(&record.path)?;
            }
            log::info!("event=mirror_delete status=ok path={}", record.path.display());
        }

        for record in &mut self.records {
            if record.marked_for_deletion || !(record.is_new || record.needs_update) {
                continue;
            }
            if dry_run {
                log::info!(
                    "event=mirror_write status=skipped dry_run=true path={}",
                    record.path.display()
                );
                continue;
            }
            if let Some(parent) = record.path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&record.path, record.render(vault_name))?;
            log::info!("event=mirror_write status=ok path={}", record.path.display());
            record.is_new = false;
            record.needs_update = false;
        }

        if !dry_run {
            self.records.retain(|r| !r.marked_for_deletion);
        }
        Ok(())
    }
}
