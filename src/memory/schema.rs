//! SQLite schema and migrations for the rule memory.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Milliseconds a connection waits on a lock held by another writer.
pub const BUSY_TIMEOUT_MS: i64 = 5000;

/// Apply per-connection pragmas.
///
/// WAL lets a maintenance pass write while other connections keep reading.
pub fn apply_pragmas(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = {};
         PRAGMA foreign_keys = ON;",
        BUSY_TIMEOUT_MS
    ))
}

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

/// Apply version 1 schema.
fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "BEGIN;

        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            scope TEXT NOT NULL,
            confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT,
            last_accessed_at TEXT,
            access_count INTEGER NOT NULL DEFAULT 0,
            metadata TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_records_scope ON records(scope);
        CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
        CREATE INDEX IF NOT EXISTS idx_records_confidence ON records(confidence);
        CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);

        -- Append-only audit trail; outlives the records it mentions
        CREATE TABLE IF NOT EXISTS event_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_event_record ON event_log(record_id);

        -- Pairs a user chose to keep side by side
        CREATE TABLE IF NOT EXISTS conflict_acks (
            pair_key TEXT PRIMARY KEY,
            record_a TEXT NOT NULL,
            record_b TEXT NOT NULL,
            acknowledged_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS legacy_imports (
            fingerprint TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            imported INTEGER NOT NULL,
            imported_at TEXT NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
            content,
            content='records',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS records_ai AFTER INSERT ON records BEGIN
            INSERT INTO records_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
        END;
        CREATE TRIGGER IF NOT EXISTS records_ad AFTER DELETE ON records BEGIN
            INSERT INTO records_fts(records_fts, rowid, content) VALUES ('delete', OLD.rowid, OLD.content);
        END;
        CREATE TRIGGER IF NOT EXISTS records_au AFTER UPDATE OF content ON records BEGIN
            INSERT INTO records_fts(records_fts, rowid, content) VALUES ('delete', OLD.rowid, OLD.content);
            INSERT INTO records_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
        END;

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;",
    )
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='records'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}
