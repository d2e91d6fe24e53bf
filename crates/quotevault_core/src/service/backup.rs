//! Pre-migration snapshots of the mirror corpus and their retention sweep.
//!
//! # Responsibility
//! - Copy the whole mirror tree into a dated, version-tagged directory
//!   before any destructive corpus rewrite.
//! - Purge snapshots older than the retention window.
//!
//! # Invariants
//! - Snapshot directories live under `.backup/` inside the mirror root and
//!   are never re-snapshotted themselves.
//! - Directories whose names do not parse as `v<maj>_<min>_YYYY_MM_DD` are
//!   ignored by the sweep.

use crate::model::list_markdown_files;
use crate::model::mirror_vault::BACKUP_DIR;
use chrono::{Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Snapshots older than this many days are purged after a migration.
const RETENTION_DAYS: i64 = 7;

static BACKUP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v\d+_\d+_(\d{4})_(\d{2})_(\d{2})$").expect("valid backup regex"));

/// Directory name for a snapshot: `v0_3_2026_08_25`.
pub fn backup_dir_name(version: &str, date: NaiveDate) -> String {
    let tag = version.to_lowercase().replace('.', "_");
    format!("{tag}_{}", date.format("%Y_%m_%d"))
}

/// Parses a snapshot directory name back to its date.
///
/// Returns `None` for anything outside the naming convention.
pub fn parse_backup_date(name: &str) -> Option<NaiveDate> {
    let captures = BACKUP_NAME_RE.captures(name)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    let day = captures.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Copies every mirror file into a fresh dated snapshot directory.
///
/// Returns the snapshot path.
pub fn create_backup(mirror_root: &Path, version: &str) -> io::Result<PathBuf> {
    let backup_path = mirror_root
        .join(BACKUP_DIR)
        .join(backup_dir_name(version, Local::now().date_naive()));
    for file in list_markdown_files(mirror_root, &[BACKUP_DIR])? {
        let rel = file.strip_prefix(mirror_root).unwrap_or(&file);
        let target = backup_path.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&file, &target)?;
    }
    log::info!(
        "event=backup_create status=ok path={}",
        backup_path.display()
    );
    Ok(backup_path)
}

/// Removes snapshots older than the retention window.
///
/// Returns the removed directories.
pub fn cleanup_old_backups(mirror_root: &Path) -> io::Result<Vec<PathBuf>> {
    let backup_root = mirror_root.join(BACKUP_DIR);
    if !backup_root.exists() {
        return Ok(Vec::new());
    }
    let cutoff = Local::now().date_naive() - Duration::days(RETENTION_DAYS);
    let mut removed = Vec::new();
    for entry in fs::read_dir(&backup_root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(date) = parse_backup_date(&name) else {
            continue;
        };
        if date < cutoff {
            fs::remove_dir_all(&path)?;
            log::info!("event=backup_purge status=ok path={}", path.display());
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_name_lowercases_version_and_appends_date() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        assert_eq!(backup_dir_name("V0.3", date), "v0_3_2026_08_25");
    }

    #[test]
    fn backup_date_parses_only_conventional_names() {
        assert_eq!(
            parse_backup_date("v0_3_2026_08_25"),
            NaiveDate::from_ymd_opt(2026, 8, 25)
        );
        assert_eq!(parse_backup_date("notes"), None);
        assert_eq!(parse_backup_date("v0_3_2026_13_99"), None);
        assert_eq!(parse_backup_date("v0_3_not_a_date"), None);
    }
}
