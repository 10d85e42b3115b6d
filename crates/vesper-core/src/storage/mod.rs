//! Relational Store Adapter
//!
//! Durable storage for memory rows, the semantic graph, skills, and
//! conflicts, on an embedded SQLite file with versioned migrations.

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::{BackupInfo, MemoryStore, NamespaceStats};
