//! Runtime configuration loading.
//!
//! # Responsibility
//! - Load and validate the YAML configuration file.
//!
//! # Invariants
//! - Configuration failure is fatal: nothing syncs without valid paths.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fatal configuration failure; aborts before any sync.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "invalid config `{}`: {message}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { .. } => None,
        }
    }
}

/// Vault paths and logging settings for one run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of the source vault holding documents with embedded quotations.
    pub source_vault_path: PathBuf,
    /// Root of the mirror vault holding one file per quotation.
    pub destination_vault_path: PathBuf,
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Log level; defaults per build mode when absent.
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Loads configuration from a YAML file.
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_complete_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "source_vault_path: /vaults/notes\ndestination_vault_path: /vaults/quotes\nlog_dir: /var/log/quotevault\n"
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.source_vault_path, PathBuf::from("/vaults/notes"));
        assert!(config.log_level.is_none());
    }

    #[test]
    fn missing_required_key_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "source_vault_path: /vaults/notes\n").unwrap();
        let error = load_config(file.path()).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = load_config(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(error, ConfigError::Io { .. }));
    }
}
