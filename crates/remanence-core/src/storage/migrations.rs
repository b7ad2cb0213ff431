//! Database Migrations
//!
//! Versioned, forward-only schema definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: six item tables, FTS5 indexes, tenant indexes",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "FTS5 porter tokenizer for stemmed keyword recall",
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
///
/// Each kind gets its own table carrying the shared temporal envelope
/// (tenant scope, importance, counters, audit stamp) plus kind-specific
/// content columns and embedding blobs. An external-content FTS5 table per
/// kind indexes the lexical columns, kept in sync by triggers.
const MIGRATION_V1_UP: &str = r#"
-- ============================================================================
-- CHAT MESSAGES
-- ============================================================================

CREATE TABLE IF NOT EXISTS chat_messages (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    created_at TEXT NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    rehearsal_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    last_modified_at TEXT NOT NULL,
    last_modified_op TEXT NOT NULL DEFAULT 'created',

    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    content_embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_tenant ON chat_messages(organization_id, user_id);
CREATE INDEX IF NOT EXISTS idx_chat_messages_created ON chat_messages(created_at DESC);

CREATE VIRTUAL TABLE IF NOT EXISTS chat_messages_fts USING fts5(
    id,
    content,
    content='chat_messages',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS chat_messages_ai AFTER INSERT ON chat_messages BEGIN
    INSERT INTO chat_messages_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS chat_messages_ad AFTER DELETE ON chat_messages BEGIN
    INSERT INTO chat_messages_fts(chat_messages_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS chat_messages_au AFTER UPDATE ON chat_messages BEGIN
    INSERT INTO chat_messages_fts(chat_messages_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO chat_messages_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

-- ============================================================================
-- EPISODIC EVENTS
-- ============================================================================

CREATE TABLE IF NOT EXISTS episodic_events (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    created_at TEXT NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    rehearsal_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    last_modified_at TEXT NOT NULL,
    last_modified_op TEXT NOT NULL DEFAULT 'created',

    actor TEXT NOT NULL,
    event_type TEXT NOT NULL,
    summary TEXT NOT NULL,
    details TEXT NOT NULL,
    tree_path TEXT,
    summary_embedding BLOB,
    details_embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_episodic_events_tenant ON episodic_events(organization_id, user_id);
CREATE INDEX IF NOT EXISTS idx_episodic_events_created ON episodic_events(created_at DESC);

CREATE VIRTUAL TABLE IF NOT EXISTS episodic_events_fts USING fts5(
    id,
    summary,
    details,
    content='episodic_events',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS episodic_events_ai AFTER INSERT ON episodic_events BEGIN
    INSERT INTO episodic_events_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;

CREATE TRIGGER IF NOT EXISTS episodic_events_ad AFTER DELETE ON episodic_events BEGIN
    INSERT INTO episodic_events_fts(episodic_events_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
END;

CREATE TRIGGER IF NOT EXISTS episodic_events_au AFTER UPDATE ON episodic_events BEGIN
    INSERT INTO episodic_events_fts(episodic_events_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
    INSERT INTO episodic_events_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;

-- ============================================================================
-- SEMANTIC ITEMS
-- ============================================================================

CREATE TABLE IF NOT EXISTS semantic_items (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    created_at TEXT NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    rehearsal_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    last_modified_at TEXT NOT NULL,
    last_modified_op TEXT NOT NULL DEFAULT 'created',

    name TEXT NOT NULL,
    summary TEXT NOT NULL,
    details TEXT NOT NULL,
    source TEXT,
    tree_path TEXT,
    summary_embedding BLOB,
    details_embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_semantic_items_tenant ON semantic_items(organization_id, user_id);
CREATE INDEX IF NOT EXISTS idx_semantic_items_created ON semantic_items(created_at DESC);

CREATE VIRTUAL TABLE IF NOT EXISTS semantic_items_fts USING fts5(
    id,
    summary,
    details,
    content='semantic_items',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS semantic_items_ai AFTER INSERT ON semantic_items BEGIN
    INSERT INTO semantic_items_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;

CREATE TRIGGER IF NOT EXISTS semantic_items_ad AFTER DELETE ON semantic_items BEGIN
    INSERT INTO semantic_items_fts(semantic_items_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
END;

CREATE TRIGGER IF NOT EXISTS semantic_items_au AFTER UPDATE ON semantic_items BEGIN
    INSERT INTO semantic_items_fts(semantic_items_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
    INSERT INTO semantic_items_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;

-- ============================================================================
-- PROCEDURAL ITEMS
-- ============================================================================

CREATE TABLE IF NOT EXISTS procedural_items (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    created_at TEXT NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    rehearsal_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    last_modified_at TEXT NOT NULL,
    last_modified_op TEXT NOT NULL DEFAULT 'created',

    skill_name TEXT NOT NULL,
    description TEXT NOT NULL,
    steps TEXT NOT NULL DEFAULT '[]',
    description_embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_procedural_items_tenant ON procedural_items(organization_id, user_id);
CREATE INDEX IF NOT EXISTS idx_procedural_items_created ON procedural_items(created_at DESC);

CREATE VIRTUAL TABLE IF NOT EXISTS procedural_items_fts USING fts5(
    id,
    description,
    content='procedural_items',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS procedural_items_ai AFTER INSERT ON procedural_items BEGIN
    INSERT INTO procedural_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;

CREATE TRIGGER IF NOT EXISTS procedural_items_ad AFTER DELETE ON procedural_items BEGIN
    INSERT INTO procedural_items_fts(procedural_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
END;

CREATE TRIGGER IF NOT EXISTS procedural_items_au AFTER UPDATE ON procedural_items BEGIN
    INSERT INTO procedural_items_fts(procedural_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
    INSERT INTO procedural_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;

-- ============================================================================
-- RESOURCE ITEMS
-- ============================================================================

CREATE TABLE IF NOT EXISTS resource_items (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    created_at TEXT NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    rehearsal_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    last_modified_at TEXT NOT NULL,
    last_modified_op TEXT NOT NULL DEFAULT 'created',

    resource_name TEXT NOT NULL,
    description TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    location TEXT NOT NULL,
    description_embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_resource_items_tenant ON resource_items(organization_id, user_id);
CREATE INDEX IF NOT EXISTS idx_resource_items_created ON resource_items(created_at DESC);

CREATE VIRTUAL TABLE IF NOT EXISTS resource_items_fts USING fts5(
    id,
    description,
    content='resource_items',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS resource_items_ai AFTER INSERT ON resource_items BEGIN
    INSERT INTO resource_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;

CREATE TRIGGER IF NOT EXISTS resource_items_ad AFTER DELETE ON resource_items BEGIN
    INSERT INTO resource_items_fts(resource_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
END;

CREATE TRIGGER IF NOT EXISTS resource_items_au AFTER UPDATE ON resource_items BEGIN
    INSERT INTO resource_items_fts(resource_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
    INSERT INTO resource_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;

-- ============================================================================
-- KNOWLEDGE VAULT ITEMS
-- ============================================================================

CREATE TABLE IF NOT EXISTS vault_items (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    created_at TEXT NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    rehearsal_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    last_modified_at TEXT NOT NULL,
    last_modified_op TEXT NOT NULL DEFAULT 'created',

    title TEXT NOT NULL,
    content TEXT NOT NULL,
    vault_type TEXT NOT NULL,
    content_embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_vault_items_tenant ON vault_items(organization_id, user_id);
CREATE INDEX IF NOT EXISTS idx_vault_items_created ON vault_items(created_at DESC);

CREATE VIRTUAL TABLE IF NOT EXISTS vault_items_fts USING fts5(
    id,
    content,
    content='vault_items',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS vault_items_ai AFTER INSERT ON vault_items BEGIN
    INSERT INTO vault_items_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS vault_items_ad AFTER DELETE ON vault_items BEGIN
    INSERT INTO vault_items_fts(vault_items_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS vault_items_au AFTER UPDATE ON vault_items BEGIN
    INSERT INTO vault_items_fts(vault_items_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO vault_items_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

-- ============================================================================
-- SCHEMA VERSION
-- ============================================================================

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: FTS5 porter tokenizer upgrade (stemming for better keyword recall)
///
/// External-content FTS tables cannot be altered in place, so each is
/// dropped, recreated with `tokenize='porter ascii'`, rebuilt from its
/// content table, and its sync triggers re-created.
const MIGRATION_V2_UP: &str = r#"
-- chat_messages
DROP TRIGGER IF EXISTS chat_messages_ai;
DROP TRIGGER IF EXISTS chat_messages_ad;
DROP TRIGGER IF EXISTS chat_messages_au;
DROP TABLE IF EXISTS chat_messages_fts;

CREATE VIRTUAL TABLE chat_messages_fts USING fts5(
    id, content,
    content='chat_messages',
    content_rowid='rowid',
    tokenize='porter ascii'
);
INSERT INTO chat_messages_fts(chat_messages_fts) VALUES('rebuild');

CREATE TRIGGER chat_messages_ai AFTER INSERT ON chat_messages BEGIN
    INSERT INTO chat_messages_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;
CREATE TRIGGER chat_messages_ad AFTER DELETE ON chat_messages BEGIN
    INSERT INTO chat_messages_fts(chat_messages_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;
CREATE TRIGGER chat_messages_au AFTER UPDATE ON chat_messages BEGIN
    INSERT INTO chat_messages_fts(chat_messages_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO chat_messages_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

-- episodic_events
DROP TRIGGER IF EXISTS episodic_events_ai;
DROP TRIGGER IF EXISTS episodic_events_ad;
DROP TRIGGER IF EXISTS episodic_events_au;
DROP TABLE IF EXISTS episodic_events_fts;

CREATE VIRTUAL TABLE episodic_events_fts USING fts5(
    id, summary, details,
    content='episodic_events',
    content_rowid='rowid',
    tokenize='porter ascii'
);
INSERT INTO episodic_events_fts(episodic_events_fts) VALUES('rebuild');

CREATE TRIGGER episodic_events_ai AFTER INSERT ON episodic_events BEGIN
    INSERT INTO episodic_events_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;
CREATE TRIGGER episodic_events_ad AFTER DELETE ON episodic_events BEGIN
    INSERT INTO episodic_events_fts(episodic_events_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
END;
CREATE TRIGGER episodic_events_au AFTER UPDATE ON episodic_events BEGIN
    INSERT INTO episodic_events_fts(episodic_events_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
    INSERT INTO episodic_events_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;

-- semantic_items
DROP TRIGGER IF EXISTS semantic_items_ai;
DROP TRIGGER IF EXISTS semantic_items_ad;
DROP TRIGGER IF EXISTS semantic_items_au;
DROP TABLE IF EXISTS semantic_items_fts;

CREATE VIRTUAL TABLE semantic_items_fts USING fts5(
    id, summary, details,
    content='semantic_items',
    content_rowid='rowid',
    tokenize='porter ascii'
);
INSERT INTO semantic_items_fts(semantic_items_fts) VALUES('rebuild');

CREATE TRIGGER semantic_items_ai AFTER INSERT ON semantic_items BEGIN
    INSERT INTO semantic_items_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;
CREATE TRIGGER semantic_items_ad AFTER DELETE ON semantic_items BEGIN
    INSERT INTO semantic_items_fts(semantic_items_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
END;
CREATE TRIGGER semantic_items_au AFTER UPDATE ON semantic_items BEGIN
    INSERT INTO semantic_items_fts(semantic_items_fts, rowid, id, summary, details)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.details);
    INSERT INTO semantic_items_fts(rowid, id, summary, details)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.details);
END;

-- procedural_items
DROP TRIGGER IF EXISTS procedural_items_ai;
DROP TRIGGER IF EXISTS procedural_items_ad;
DROP TRIGGER IF EXISTS procedural_items_au;
DROP TABLE IF EXISTS procedural_items_fts;

CREATE VIRTUAL TABLE procedural_items_fts USING fts5(
    id, description,
    content='procedural_items',
    content_rowid='rowid',
    tokenize='porter ascii'
);
INSERT INTO procedural_items_fts(procedural_items_fts) VALUES('rebuild');

CREATE TRIGGER procedural_items_ai AFTER INSERT ON procedural_items BEGIN
    INSERT INTO procedural_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;
CREATE TRIGGER procedural_items_ad AFTER DELETE ON procedural_items BEGIN
    INSERT INTO procedural_items_fts(procedural_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
END;
CREATE TRIGGER procedural_items_au AFTER UPDATE ON procedural_items BEGIN
    INSERT INTO procedural_items_fts(procedural_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
    INSERT INTO procedural_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;

-- resource_items
DROP TRIGGER IF EXISTS resource_items_ai;
DROP TRIGGER IF EXISTS resource_items_ad;
DROP TRIGGER IF EXISTS resource_items_au;
DROP TABLE IF EXISTS resource_items_fts;

CREATE VIRTUAL TABLE resource_items_fts USING fts5(
    id, description,
    content='resource_items',
    content_rowid='rowid',
    tokenize='porter ascii'
);
INSERT INTO resource_items_fts(resource_items_fts) VALUES('rebuild');

CREATE TRIGGER resource_items_ai AFTER INSERT ON resource_items BEGIN
    INSERT INTO resource_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;
CREATE TRIGGER resource_items_ad AFTER DELETE ON resource_items BEGIN
    INSERT INTO resource_items_fts(resource_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
END;
CREATE TRIGGER resource_items_au AFTER UPDATE ON resource_items BEGIN
    INSERT INTO resource_items_fts(resource_items_fts, rowid, id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.description);
    INSERT INTO resource_items_fts(rowid, id, description)
    VALUES (NEW.rowid, NEW.id, NEW.description);
END;

-- vault_items
DROP TRIGGER IF EXISTS vault_items_ai;
DROP TRIGGER IF EXISTS vault_items_ad;
DROP TRIGGER IF EXISTS vault_items_au;
DROP TABLE IF EXISTS vault_items_fts;

CREATE VIRTUAL TABLE vault_items_fts USING fts5(
    id, content,
    content='vault_items',
    content_rowid='rowid',
    tokenize='porter ascii'
);
INSERT INTO vault_items_fts(vault_items_fts) VALUES('rebuild');

CREATE TRIGGER vault_items_ai AFTER INSERT ON vault_items BEGIN
    INSERT INTO vault_items_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;
CREATE TRIGGER vault_items_ad AFTER DELETE ON vault_items BEGIN
    INSERT INTO vault_items_fts(vault_items_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;
CREATE TRIGGER vault_items_au AFTER UPDATE ON vault_items BEGIN
    INSERT INTO vault_items_fts(vault_items_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO vault_items_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
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

            // Use execute_batch to handle multi-statement SQL including triggers
            conn.execute_batch(migration.up)?;

            applied += 1;
        }
    }

    Ok(applied)
}
