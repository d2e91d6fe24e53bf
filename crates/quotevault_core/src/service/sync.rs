//! Bidirectional reconciliation engine keyed by block id.
//!
//! # Responsibility
//! - Run the ordered sync stages for every opted-in source document:
//!   id assignment, merge-back, propagation, orphan removal, delete flags.
//! - Aggregate per-file results into one structured report.
//!
//! # Invariants
//! - Stages mutate the in-memory snapshot only; disk changes happen at the
//!   single commit at the end of the pass, never under dry-run.
//! - An edited mirror's text is never overwritten by source text; the edit is
//!   merged back into the source first (destination wins).
//! - A second pass with no external changes reports all-zero counts.

use crate::config::Config;
use crate::model::mirror_record::MirrorRecord;
use crate::model::mirror_vault::MirrorVault;
use crate::model::source_vault::SourceVault;
use crate::parser::ValidationError;
use crate::service::migrate;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

/// Aggregated result of one synchronization pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub source_files_processed: usize,
    pub quotes_processed: usize,
    pub quotes_created: usize,
    pub quotes_updated: usize,
    pub block_ids_added: usize,
    /// Orphaned mirrors removed (identity gone from the source).
    pub quotes_deleted: usize,
    /// Source quotations unwrapped by delete-flagged mirrors.
    pub quotes_unwrapped: usize,
    /// Edited mirrors merged back into their source.
    pub edits_merged: usize,
    /// Mirror files rewritten by the migration pipeline.
    pub migration_files_updated: usize,
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    /// Whether the pass changed nothing (errors aside).
    pub fn is_noop(&self) -> bool {
        self.quotes_created == 0
            && self.quotes_updated == 0
            && self.block_ids_added == 0
            && self.quotes_deleted == 0
            && self.quotes_unwrapped == 0
            && self.edits_merged == 0
            && self.migration_files_updated == 0
    }
}

/// Non-fatal errors accumulated during a pass.
#[derive(Debug)]
pub enum SyncError {
    /// A source document failed block-id validation and was skipped.
    Validation {
        file: PathBuf,
        error: ValidationError,
    },
    /// A mirror's backlink points at a source that cannot be located.
    Reference { mirror: PathBuf, source: PathBuf },
    /// A migration step failed; the file stays at its prior version.
    Transformation { file: PathBuf, message: String },
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { file, error } => {
                write!(f, "{}: {error}", file.display())
            }
            Self::Reference { mirror, source } => write!(
                f,
                "could not find source {} for mirror {}",
                source.display(),
                mirror.display()
            ),
            Self::Transformation { file, message } => {
                write!(f, "migration failed for {}: {message}", file.display())
            }
        }
    }
}

impl Error for SyncError {}

/// Runs one full synchronization pass between the configured vaults.
///
/// Order: metadata migration (with backup guard), then per-document stages,
/// then one commit. Under dry-run every disk write is skipped while the
/// report still carries the full planned counts.
pub fn sync_vaults(config: &Config, dry_run: bool) -> io::Result<SyncReport> {
    let mut report = SyncReport::default();
    log::info!(
        "event=sync_start status=ok dry_run={dry_run} source={} destination={}",
        config.source_vault_path.display(),
        config.destination_vault_path.display()
    );

    // Migration rewrites mirror files on disk, so it runs before the corpus
    // snapshot is taken.
    let migration = migrate::migrate_vault(&config.destination_vault_path, dry_run)?;
    report.migration_files_updated = migration.files_updated;
    for error in migration.errors {
        log::error!("event=migrate status=error reason=\"{error}\"");
        report.errors.push(SyncError::Transformation {
            file: error.file,
            message: error.message,
        });
    }

    let mut sources = SourceVault::load(&config.source_vault_path)?;
    let mut mirrors = MirrorVault::load(&config.destination_vault_path)?;
    let vault_name = sources.vault_name();

    let doc_count = sources.documents().len();
    for doc_idx in 0..doc_count {
        if !sources.documents()[doc_idx].sync_enabled() {
            continue;
        }
        sync_document(doc_idx, &mut sources, &mut mirrors, &mut report);
    }

    process_delete_flags(&mut sources, &mut mirrors, &mut report);

    sources.save_all(dry_run)?;
    mirrors.commit(&vault_name, dry_run)?;

    log::info!(
        "event=sync_done status=ok dry_run={dry_run} files={} created={} updated={} deleted={} unwrapped={} merged={} errors={}",
        report.source_files_processed,
        report.quotes_created,
        report.quotes_updated,
        report.quotes_deleted,
        report.quotes_unwrapped,
        report.edits_merged,
        report.errors.len()
    );
    Ok(report)
}

/// Stages 1-4 for one source document.
fn sync_document(
    doc_idx: usize,
    sources: &mut SourceVault,
    mirrors: &mut MirrorVault,
    report: &mut SyncReport,
) {
    let rel_path = sources.rel_path(&sources.documents()[doc_idx]);
    let doc = &mut sources.documents_mut()[doc_idx];
    let book_title = doc.book_title();

    // Validation gates every other stage for this document.
    let validation_errors = doc.validate();
    if !validation_errors.is_empty() {
        for error in validation_errors {
            log::error!(
                "event=validate status=error path={} reason=\"{error}\"",
                doc.path().display()
            );
            report.errors.push(SyncError::Validation {
                file: doc.path().to_path_buf(),
                error,
            });
        }
        return;
    }

    // Stage 1: identity assignment.
    let added = doc.assign_missing_ids();
    if added > 0 {
        log::info!(
            "event=assign_ids status=ok path={} added={added}",
            doc.path().display()
        );
    }
    report.block_ids_added += added;

    // Stage 2: merge edited mirrors back into the source. Runs before
    // propagation so a simultaneous source change loses to the mirror edit.
    for idx in mirrors.indices_for_book(&book_title) {
        let record = &mirrors.records()[idx];
        let Some(id) = record.quote.block_id else {
            continue;
        };
        if !record.is_edited() || !doc.contains(id) {
            continue;
        }
        let text = record.quote.text.clone();
        doc.update(id, &text);
        let record = &mut mirrors.records_mut()[idx];
        record.meta.edited = false;
        record.needs_update = true;
        report.edits_merged += 1;
        log::info!("event=merge_back status=ok book={book_title} id={id}");
    }

    // Stage 3: propagate source quotations to mirrors.
    for quote in doc.quotes() {
        report.quotes_processed += 1;
        let Some(id) = quote.block_id else {
            continue;
        };
        match mirrors.find(&book_title, id) {
            None => {
                let record = MirrorRecord::new(
                    mirrors.root(),
                    &book_title,
                    quote.clone(),
                    rel_path.clone(),
                );
                log::info!("event=mirror_create status=ok book={book_title} id={id}");
                mirrors.push(record);
                report.quotes_created += 1;
            }
            Some(idx) => {
                let record = &mirrors.records()[idx];
                if record.is_edited() || !record.quote.differs_from(&quote) {
                    continue;
                }
                let old_name = record
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                let new_name = crate::model::mirror_record::quote_filename(
                    &book_title,
                    id,
                    &quote.text,
                );
                if old_name.as_deref() == Some(new_name.as_str()) {
                    let record = &mut mirrors.records_mut()[idx];
                    record.quote = quote.clone();
                    record.needs_update = true;
                    log::info!("event=mirror_update status=ok book={book_title} id={id}");
                } else {
                    // Filename-affecting change: delete-old/create-new so the
                    // (book, id) pair never has two live files.
                    let meta = record.meta.clone();
                    let source_path = record.source_path.clone();
                    mirrors.records_mut()[idx].marked_for_deletion = true;
                    let mut renamed = MirrorRecord::new(
                        mirrors.root(),
                        &book_title,
                        quote.clone(),
                        source_path.unwrap_or_else(|| rel_path.clone()),
                    );
                    renamed.meta = meta;
                    mirrors.push(renamed);
                    log::info!(
                        "event=mirror_rename status=ok book={book_title} id={id} file={new_name}"
                    );
                }
                report.quotes_updated += 1;
            }
        }
    }

    // Stage 4: orphan removal. The source copy is gone; no unwrap.
    let live_ids = doc.block_ids();
    for idx in mirrors.indices_for_book(&book_title) {
        let record = &mirrors.records()[idx];
        match record.quote.block_id {
            Some(id) if live_ids.contains(&id) => {}
            _ => {
                log::info!(
                    "event=orphan_delete status=ok book={book_title} path={}",
                    record.path.display()
                );
                mirrors.records_mut()[idx].marked_for_deletion = true;
                report.quotes_deleted += 1;
            }
        }
    }

    report.source_files_processed += 1;
}

/// Stage 5: delete-flagged mirrors unwrap their source quotation, then the
/// mirror file itself goes away.
fn process_delete_flags(
    sources: &mut SourceVault,
    mirrors: &mut MirrorVault,
    report: &mut SyncReport,
) {
    for idx in 0..mirrors.records().len() {
        let record = &mirrors.records()[idx];
        if !record.is_marked_for_deletion() || record.marked_for_deletion {
            continue;
        }
        let Some(id) = record.quote.block_id else {
            continue;
        };
        let mirror_path = record.path.clone();
        let book_title = record.book_title.clone();
        let source_rel = record.source_path.clone();

        let doc = match &source_rel {
            Some(rel) => sources.find_by_rel_path(rel),
            None => sources.find_by_book_title(&book_title),
        };
        let Some(doc) = doc else {
            let source = source_rel.unwrap_or_else(|| PathBuf::from(format!("{book_title}.md")));
            log::error!(
                "event=delete_flag status=error mirror={} source={}",
                mirror_path.display(),
                source.display()
            );
            report.errors.push(SyncError::Reference {
                mirror: mirror_path,
                source,
            });
            continue;
        };

        if !doc.unwrap_quote(id) {
            // Identity already absent; orphan removal owns this mirror.
            continue;
        }
        report.quotes_unwrapped += 1;
        mirrors.records_mut()[idx].marked_for_deletion = true;
        log::info!(
            "event=unwrap status=ok book={book_title} id={id} mirror={}",
            mirror_path.display()
        );
    }
}
