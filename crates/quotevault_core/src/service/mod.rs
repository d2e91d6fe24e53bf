//! Engine-level services: reconciliation, migration, backup.
//!
//! # Responsibility
//! - Orchestrate model mutations into full vault passes.
//! - Keep commit/dry-run policy in one place per pass.

pub mod backup;
pub mod migrate;
pub mod sync;
