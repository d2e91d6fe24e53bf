//! Source corpus: every markdown document under the source root.
//!
//! # Responsibility
//! - Load the full source corpus into memory at pass start.
//! - Expose lookup by relative path / book title for the engine.
//! - Commit all dirty documents in one pass.

use crate::model::list_markdown_files;
use crate::model::source_document::SourceDocument;
use std::io;
use std::path::{Path, PathBuf};

/// All source documents under one vault root.
#[derive(Debug)]
pub struct SourceVault {
    root: PathBuf,
    documents: Vec<SourceDocument>,
}

impl SourceVault {
    /// Reads every `.md` file under `root` into memory.
    pub fn load(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let mut documents = Vec::new();
        for path in list_markdown_files(&root, &[])? {
            documents.push(SourceDocument::from_file(path)?);
        }
        Ok(Self { root, documents })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Vault name: the last component of the root path.
    pub fn vault_name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Notes".to_string())
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut [SourceDocument] {
        &mut self.documents
    }

    /// Path of a document relative to the vault root.
    pub fn rel_path(&self, doc: &SourceDocument) -> PathBuf {
        doc.path()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| doc.path().to_path_buf())
    }

    /// Looks a document up by its root-relative path.
    pub fn find_by_rel_path(&mut self, rel: &Path) -> Option<&mut SourceDocument> {
        let target = self.root.join(rel);
        self.documents.iter_mut().find(|doc| doc.path() == target)
    }

    /// Looks a document up by book title. Fallback for mirrors whose
    /// backlink carries no path.
    pub fn find_by_book_title(&mut self, title: &str) -> Option<&mut SourceDocument> {
        self.documents
            .iter_mut()
            .find(|doc| doc.book_title() == title)
    }

    /// Writes every dirty document back to disk. No-op under dry-run.
    ///
    /// Returns the number of files written.
    pub fn save_all(&mut self, dry_run: bool) -> io::Result<usize> {
        let mut written = 0;
        for doc in &mut self.documents {
            if !doc.is_dirty() {
                continue;
            }
            if dry_run {
                log::info!(
                    "event=source_save status=skipped dry_run=true path={}",
                    doc.path().display()
                );
                continue;
            }
            if doc.save()? {
                log::info!("event=source_save status=ok path={}", doc.path().display());
                written += 1;
            }
        }
        Ok(written)
    }
}
