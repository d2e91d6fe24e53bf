//! Core domain logic for quotevault.
//!
//! Keeps a source vault of markdown documents with embedded quotations and a
//! mirror vault with one metadata-carrying file per quotation in sync, in
//! both directions, keyed by stable `^QuoteNNN` block ids.

pub mod config;
pub mod logging;
pub mod model;
pub mod parser;
pub mod service;

pub use config::{load_config, Config, ConfigError};
pub use logging::{default_log_level, init_logging};
pub use model::mirror_record::{MirrorMeta, MirrorRecord, RANDOM_NOTE_LINK, SCHEMA_VERSION};
pub use model::mirror_vault::MirrorVault;
pub use model::quote::Quote;
pub use model::source_document::SourceDocument;
pub use model::source_vault::SourceVault;
pub use parser::{BlockId, BlockIdAllocator, ValidationError};
pub use service::sync::{sync_vaults, SyncError, SyncReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
