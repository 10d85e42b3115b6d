//! Database Migrations
//!
//! Schema migration definitions for the relational store. Every table
//! carries a `namespace` column defaulting to `'default'`; no query may
//! cross namespaces except through explicit tool operations.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, semantic graph, skills, conflicts",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Backup metadata and agent attribution indexes",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'episodic',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    namespace TEXT NOT NULL DEFAULT 'default',
    agent_id TEXT,
    agent_role TEXT,
    task_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_ns_created ON memories(namespace, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_ns_type ON memories(namespace, memory_type);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    description TEXT,
    confidence REAL NOT NULL DEFAULT 0.8,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 1,
    namespace TEXT NOT NULL DEFAULT 'default',
    UNIQUE(name, namespace)
);

CREATE INDEX IF NOT EXISTS idx_entities_ns_type ON entities(namespace, entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_ns_created ON entities(namespace, created_at DESC);

CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.5,
    evidence TEXT,
    created_at TEXT NOT NULL,
    last_reinforced TEXT NOT NULL,
    namespace TEXT NOT NULL DEFAULT 'default',
    UNIQUE(source_id, target_id, relation_type, namespace)
);

CREATE INDEX IF NOT EXISTS idx_relationships_ns_source ON relationships(namespace, source_id);
CREATE INDEX IF NOT EXISTS idx_relationships_ns_target ON relationships(namespace, target_id);
CREATE INDEX IF NOT EXISTS idx_relationships_strength ON relationships(strength);

CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    property TEXT NOT NULL,
    value TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.8,
    valid_from TEXT,
    valid_until TEXT,
    source_conversation TEXT,
    namespace TEXT NOT NULL DEFAULT 'default'
);

CREATE INDEX IF NOT EXISTS idx_facts_ns_entity ON facts(namespace, entity_id);
CREATE INDEX IF NOT EXISTS idx_facts_ns_source ON facts(namespace, source_conversation);

CREATE TABLE IF NOT EXISTS conflicts (
    id TEXT PRIMARY KEY,
    fact_id_1 TEXT NOT NULL,
    fact_id_2 TEXT NOT NULL,
    conflict_type TEXT NOT NULL,
    description TEXT NOT NULL,
    severity TEXT NOT NULL,
    resolution_status TEXT NOT NULL DEFAULT 'flagged',
    created_at TEXT NOT NULL,
    namespace TEXT NOT NULL DEFAULT 'default',
    UNIQUE(fact_id_1, fact_id_2, conflict_type)
);

CREATE INDEX IF NOT EXISTS idx_conflicts_ns_status ON conflicts(namespace, resolution_status);

CREATE TABLE IF NOT EXISTS skills (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    summary TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    triggers TEXT NOT NULL DEFAULT '[]',
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    avg_user_satisfaction REAL NOT NULL DEFAULT 0.5,
    is_archived INTEGER NOT NULL DEFAULT 0,
    last_used TEXT,
    code TEXT,
    code_type TEXT,
    prerequisites TEXT NOT NULL DEFAULT '[]',
    uses_skills TEXT NOT NULL DEFAULT '[]',
    version INTEGER NOT NULL DEFAULT 1,
    namespace TEXT NOT NULL DEFAULT 'default',
    UNIQUE(name, namespace)
);

CREATE INDEX IF NOT EXISTS idx_skills_ns_archived ON skills(namespace, is_archived);
CREATE INDEX IF NOT EXISTS idx_skills_ns_category ON skills(namespace, category);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Backup metadata and agent attribution indexes
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS backup_metadata (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    memory_count INTEGER NOT NULL,
    namespace TEXT NOT NULL DEFAULT 'default'
);

CREATE INDEX IF NOT EXISTS idx_memories_ns_agent ON memories(namespace, agent_id);
CREATE INDEX IF NOT EXISTS idx_memories_ns_task ON memories(namespace, task_id);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (2, datetime('now'));
"#;

/// Apply all pending migrations, returning how many ran
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // execute_batch handles multi-statement SQL
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

/// Current schema version, or 0 for a fresh database
fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_migrations_apply_in_order() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(
            get_current_version(&conn).unwrap(),
            MIGRATIONS.last().unwrap().version
        );
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let second = apply_migrations(&conn).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn test_versions_strictly_increase() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last);
            last = migration.version;
        }
    }

    #[test]
    fn test_all_tables_present() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        for table in [
            "memories",
            "entities",
            "relationships",
            "facts",
            "conflicts",
            "skills",
            "backup_metadata",
        ] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }
}
