use quotevault_core::model::mirror_vault::BACKUP_DIR;
use quotevault_core::service::{backup, migrate};
use quotevault_core::{sync_vaults, Config, RANDOM_NOTE_LINK, SCHEMA_VERSION};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_old_mirror(root: &Path, book: &str, filename: &str, frontmatter: &str) -> PathBuf {
    let dir = root.join(book);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(filename);
    fs::write(
        &path,
        format!(
            "---\n{frontmatter}\n---\n\n> old quote text\n\n**Source:** [{book}](obsidian://open?vault=source&file={book}%23%5EQuote001)\n"
        ),
    )
    .unwrap();
    path
}

fn snapshot_dirs(root: &Path) -> Vec<String> {
    let backup_root = root.join(BACKUP_DIR);
    if !backup_root.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(backup_root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn unversioned_file_is_brought_to_current_schema() {
    let tmp = TempDir::new().unwrap();
    let path = write_old_mirror(
        tmp.path(),
        "Book",
        "Book - Quote001 - old quote text.md",
        "delete: false\nfavorite: true",
    );

    let outcome = migrate::migrate_vault(tmp.path(), false).unwrap();
    assert_eq!(outcome.files_updated, 1);
    assert!(outcome.errors.is_empty());

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains(&format!("version: {SCHEMA_VERSION}")));
    assert!(content.contains("edited: false"));
    assert!(content.contains("favorite: true"));
    assert_eq!(content.matches(RANDOM_NOTE_LINK).count(), 1);
}

#[test]
fn migration_takes_a_snapshot_and_second_run_is_idle() {
    let tmp = TempDir::new().unwrap();
    write_old_mirror(
        tmp.path(),
        "Book",
        "Book - Quote001 - old quote text.md",
        "delete: false",
    );

    migrate::migrate_vault(tmp.path(), false).unwrap();
    let snapshots = snapshot_dirs(tmp.path());
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].starts_with("v0_3_"));
    let copied = tmp
        .path()
        .join(BACKUP_DIR)
        .join(&snapshots[0])
        .join("Book")
        .join("Book - Quote001 - old quote text.md");
    let snapshot_content = fs::read_to_string(copied).unwrap();
    assert!(!snapshot_content.contains("version:"), "snapshot keeps the pre-migration bytes");

    let second = migrate::migrate_vault(tmp.path(), false).unwrap();
    assert_eq!(second.files_updated, 0);
    assert_eq!(snapshot_dirs(tmp.path()).len(), 1, "no new snapshot when nothing is pending");
}

#[test]
fn dry_run_migration_rewrites_nothing() {
    let tmp = TempDir::new().unwrap();
    let path = write_old_mirror(
        tmp.path(),
        "Book",
        "Book - Quote001 - old quote text.md",
        "delete: false",
    );
    let before = fs::read_to_string(&path).unwrap();

    let outcome = migrate::migrate_vault(tmp.path(), true).unwrap();
    assert_eq!(outcome.files_updated, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
    assert!(snapshot_dirs(tmp.path()).is_empty());
}

#[test]
fn partially_versioned_file_gets_only_later_steps() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("Book");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("Book - Quote001 - linked already.md");
    fs::write(
        &path,
        format!(
            "---\ndelete: false\nversion: V0.2\n---\n\n> linked already\n\n**Source:** [Book](obsidian://open?vault=source&file=Book%23%5EQuote001)\n\n{RANDOM_NOTE_LINK}\n"
        ),
    )
    .unwrap();

    let outcome = migrate::migrate_vault(tmp.path(), false).unwrap();
    assert_eq!(outcome.files_updated, 1);
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains(&format!("version: {SCHEMA_VERSION}")));
    assert_eq!(content.matches(RANDOM_NOTE_LINK).count(), 1, "link is not duplicated");
}

#[test]
fn retention_sweep_removes_old_snapshots_and_ignores_foreign_dirs() {
    let tmp = TempDir::new().unwrap();
    let old_snapshot = tmp.path().join(BACKUP_DIR).join("v0_2_2020_01_01");
    fs::create_dir_all(&old_snapshot).unwrap();
    fs::write(old_snapshot.join("stale.md"), "old bytes\n").unwrap();
    let foreign = tmp.path().join(BACKUP_DIR).join("keepers");
    fs::create_dir_all(&foreign).unwrap();
    fs::write(foreign.join("manual.md"), "hands off\n").unwrap();
    write_old_mirror(
        tmp.path(),
        "Book",
        "Book - Quote001 - old quote text.md",
        "delete: false",
    );

    migrate::migrate_vault(tmp.path(), false).unwrap();
    assert!(!old_snapshot.exists());
    assert!(foreign.join("manual.md").exists());
}

#[test]
fn recent_snapshot_survives_the_sweep() {
    let tmp = TempDir::new().unwrap();
    let recent = backup::create_backup(tmp.path(), SCHEMA_VERSION).unwrap();
    fs::create_dir_all(&recent).unwrap();

    let removed = backup::cleanup_old_backups(tmp.path()).unwrap();
    assert!(removed.is_empty());
    assert!(recent.exists());
}

#[test]
fn sync_pass_migrates_before_reconciling() {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        source_vault_path: tmp.path().join("source"),
        destination_vault_path: tmp.path().join("quotes"),
        log_dir: tmp.path().join("logs"),
        log_level: None,
    };
    fs::create_dir_all(&config.source_vault_path).unwrap();
    fs::write(
        config.source_vault_path.join("Book.md"),
        "---\nsync_quotes: true\n---\n> old quote text\n^Quote001\n",
    )
    .unwrap();
    let mirror = write_old_mirror(
        &config.destination_vault_path,
        "Book",
        "Book - Quote001 - old quote text.md",
        "delete: false",
    );

    let report = sync_vaults(&config, false).unwrap();
    assert_eq!(report.migration_files_updated, 1);
    assert!(report.errors.is_empty());
    let content = fs::read_to_string(&mirror).unwrap();
    assert!(content.contains(&format!("version: {SCHEMA_VERSION}")));

    let second = sync_vaults(&config, false).unwrap();
    assert!(second.is_noop());
}
