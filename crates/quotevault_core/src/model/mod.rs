//! Domain models for source documents and mirror files.
//!
//! # Responsibility
//! - Define the in-memory shapes the reconciliation engine works on.
//! - Keep all filesystem commits behind explicit save/commit calls.
//!
//! # Invariants
//! - Models are mutated purely in memory during a pass; disk changes only at
//!   commit points, and never under dry-run.

pub mod mirror_record;
pub mod mirror_vault;
pub mod quote;
pub mod source_document;
pub mod source_vault;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Recursively collects `.md` files under `dir`, sorted for determinism.
///
/// Directory names listed in `skip_dirs` are not descended into.
pub(crate) fn list_markdown_files(dir: &Path, skip_dirs: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_markdown(dir, skip_dirs, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_markdown(dir: &Path, skip_dirs: &[&str], out: &mut Vec<PathBuf>) -> io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name();
            if skip_dirs.iter().any(|skip| name.to_string_lossy() == *skip) {
                continue;
            }
            collect_markdown(&path, skip_dirs, out)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            out.push(path);
        }
    }
    Ok(())
}
