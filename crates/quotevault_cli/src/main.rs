//! CLI entry point for one synchronization pass.
//!
//! # Responsibility
//! - Parse `--config <path>` and `--dry-run`, load config, initialize
//!   logging and run the pass.
//! - Keep all domain logic inside `quotevault_core`.

use quotevault_core::{default_log_level, init_logging, load_config, sync_vaults};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "usage: quotevault --config <path> [--dry-run]";

struct Args {
    config: PathBuf,
    dry_run: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut config = None;
    let mut dry_run = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(PathBuf::from(
                    args.next().ok_or("--config requires a path")?,
                ));
            }
            "--dry-run" => dry_run = true,
            "--help" | "-h" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument `{other}`\n{USAGE}")),
        }
    }
    Ok(Args {
        config: config.ok_or(format!("--config is required\n{USAGE}"))?,
        dry_run,
    })
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    // Configuration failure is fatal: abort before touching either vault.
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let level = config
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    if let Err(message) = init_logging(&level, &config.log_dir) {
        eprintln!("{message}");
        return ExitCode::FAILURE;
    }

    match sync_vaults(&config, args.dry_run) {
        Ok(report) => {
            let prefix = if args.dry_run { "[dry-run] " } else { "" };
            println!(
                "{prefix}processed {} source files, {} quotes",
                report.source_files_processed, report.quotes_processed
            );
            println!(
                "{prefix}created {}, updated {}, deleted {}, unwrapped {}, merged {}, ids added {}, migrated {}",
                report.quotes_created,
                report.quotes_updated,
                report.quotes_deleted,
                report.quotes_unwrapped,
                report.edits_merged,
                report.block_ids_added,
                report.migration_files_updated
            );
            if !report.errors.is_empty() {
                for error in &report.errors {
                    eprintln!("error: {error}");
                }
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            log::error!("event=sync status=error reason=\"{error}\"");
            eprintln!("sync failed: {error}");
            ExitCode::FAILURE
        }
    }
}
