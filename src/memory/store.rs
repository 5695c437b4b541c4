//! SQLite-backed record store.

use crate::error::{Error, Result};
use crate::memory::schema::{apply_pragmas, initialize_schema, is_initialized};
use crate::memory::scope::{Scope, ScopePattern, ScopeTier};
use crate::memory::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Column list shared by every record query.
pub(crate) const RECORD_COLUMNS: &str = "r.id, r.content, r.category, r.scope, r.confidence, \
     r.status, r.created_at, r.last_accessed_at, r.access_count, r.metadata";

/// SQLite-backed memory store.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemoryStore {
    /// Open or create a memory store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;

        if !is_initialized(&conn) {
            initialize_schema(&conn)?;
        }

        info!(path = %path.display(), "opened memory store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn)
    }

    /// Run `f` inside one transaction; any error rolls everything back.
    pub(crate) fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        let tx = conn.transaction()?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ==================== Record Operations ====================

    /// Validate and insert a record.
    pub fn insert(&self, record: &MemoryRecord) -> Result<RecordId> {
        record.validate()?;
        let row = RecordRow::encode(record)?;
        self.with_tx(|conn| {
            insert_row(conn, &row)?;
            log_event(conn, &record.id, "insert", Some(record.scope.to_string().as_str()))?;
            Ok(())
        })?;
        debug!(id = %record.id, scope = %record.scope, "inserted record");
        Ok(record.id.clone())
    }

    /// Insert many records atomically. Nothing is written if any record is invalid.
    pub fn insert_batch(&self, records: &[MemoryRecord]) -> Result<Vec<RecordId>> {
        let rows = records
            .iter()
            .map(|r| {
                r.validate()?;
                RecordRow::encode(r)
            })
            .collect::<Result<Vec<_>>>()?;

        self.with_tx(|conn| {
            for (row, record) in rows.iter().zip(records) {
                insert_row(conn, row)?;
                log_event(conn, &record.id, "insert", Some(record.scope.to_string().as_str()))?;
            }
            Ok(())
        })?;

        info!(count = records.len(), "inserted record batch");
        Ok(records.iter().map(|r| r.id.clone()).collect())
    }

    /// Get a record by ID, archived or not.
    pub fn get(&self, id: &RecordId) -> Result<MemoryRecord> {
        self.with_conn(|conn| fetch(conn, id)?.ok_or_else(|| Error::not_found(id)))
    }

    /// Delete a record.
    pub fn delete(&self, id: &RecordId) -> Result<()> {
        self.with_tx(|conn| delete_row(conn, id, "delete", None))?;
        info!(id = %id, "deleted record");
        Ok(())
    }

    /// Delete `deletes` and insert `insert` as one unit.
    ///
    /// Fails with `NotFound` and leaves the store unchanged if any id is
    /// missing.
    pub fn replace(
        &self,
        deletes: &[RecordId],
        insert: Option<&MemoryRecord>,
        reason: &str,
    ) -> Result<()> {
        let row = match insert {
            Some(record) => {
                record.validate()?;
                Some(RecordRow::encode(record)?)
            }
            None => None,
        };

        self.with_tx(|conn| {
            for id in deletes {
                delete_row(conn, id, "delete", Some(reason))?;
            }
            if let (Some(row), Some(record)) = (row.as_ref(), insert) {
                insert_row(conn, row)?;
                log_event(conn, &record.id, "insert", Some(reason))?;
            }
            Ok(())
        })
    }

    /// Active records whose scope matches an exact or trailing-`*` pattern.
    pub fn list_by_scope(&self, pattern: &str) -> Result<Vec<MemoryRecord>> {
        let pattern = ScopePattern::parse(pattern)?;
        let (clause, value) = pattern.to_sql("r.scope");
        let sql = format!(
            "SELECT {} FROM records r WHERE r.status = 'active' AND {} ORDER BY r.rowid",
            RECORD_COLUMNS, clause
        );
        self.with_conn(|conn| query_records(conn, &sql, [value]))
    }

    /// Every active record in insertion order.
    pub fn list_active(&self) -> Result<Vec<MemoryRecord>> {
        let sql = format!(
            "SELECT {} FROM records r WHERE r.status = 'active' ORDER BY r.rowid",
            RECORD_COLUMNS
        );
        self.with_conn(|conn| query_records(conn, &sql, [] as [String; 0]))
    }

    /// Archived records, kept for audit.
    pub fn list_archived(&self) -> Result<Vec<MemoryRecord>> {
        let sql = format!(
            "SELECT {} FROM records r WHERE r.status = 'archived' ORDER BY r.rowid",
            RECORD_COLUMNS
        );
        self.with_conn(|conn| query_records(conn, &sql, [] as [String; 0]))
    }

    /// Exclude a record from retrieval without deleting it.
    pub fn archive(&self, id: &RecordId, reason: &str) -> Result<()> {
        self.with_tx(|conn| {
            let rows = conn.execute(
                "UPDATE records SET status = 'archived' WHERE id = ?1",
                params![id.to_string()],
            )?;
            if rows == 0 {
                return Err(Error::not_found(id));
            }
            log_event(conn, id, "archive", Some(reason))
        })?;
        info!(id = %id, reason, "archived record");
        Ok(())
    }

    // ==================== Conflict Acknowledgements ====================

    /// Remember that a pair was deliberately kept side by side.
    pub fn acknowledge_pair(&self, a: &RecordId, b: &RecordId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO conflict_acks (pair_key, record_a, record_b, acknowledged_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![pair_key(a, b), a.to_string(), b.to_string(), timestamp(Utc::now())],
            )?;
            Ok(())
        })
    }

    /// Keys of every acknowledged pair.
    pub fn acknowledged_pairs(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT pair_key FROM conflict_acks")?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(keys)
        })
    }

    // ==================== Audit ====================

    /// Audit history for a record, oldest first. Survives deletion.
    pub fn history(&self, id: &RecordId) -> Result<Vec<AuditEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT operation, detail, created_at FROM event_log
                 WHERE record_id = ?1 ORDER BY id",
            )?;
            let events = stmt
                .query_map(params![id.to_string()], |row| {
                    Ok(AuditEvent {
                        operation: row.get(0)?,
                        detail: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
    }

    /// Get statistics about the memory store.
    pub fn stats(&self) -> Result<MemoryStats> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT scope, category, status, COUNT(*) FROM records GROUP BY 1, 2, 3")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stats = MemoryStats::default();
            for (scope, category, status, count) in rows {
                let count = count as u64;
                stats.total += count;
                if status == "archived" {
                    stats.archived += count;
                    continue;
                }
                if let Ok(scope) = Scope::parse(&scope) {
                    *stats.by_tier.entry(scope.tier()).or_default() += count;
                }
                if let Ok(category) = Category::parse(&category) {
                    *stats.by_category.entry(category).or_default() += count;
                }
            }
            Ok(stats)
        })
    }
}

/// Entry in the audit log.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub operation: String,
    pub detail: Option<String>,
    pub timestamp: String,
}

/// Statistics about the memory store. Tier and category counts cover active records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub total: u64,
    pub archived: u64,
    pub by_tier: HashMap<ScopeTier, u64>,
    pub by_category: HashMap<Category, u64>,
}

/// Order-independent key for a pair of records.
pub(crate) fn pair_key(a: &RecordId, b: &RecordId) -> String {
    if a <= b {
        format!("{}|{}", a, b)
    } else {
        format!("{}|{}", b, a)
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Pre-serialized column values for one record.
pub(crate) struct RecordRow {
    id: String,
    content: String,
    category: String,
    scope: String,
    confidence: f64,
    status: String,
    created_at: Option<String>,
    last_accessed_at: Option<String>,
    access_count: i64,
    metadata: Option<String>,
}

impl RecordRow {
    pub(crate) fn encode(record: &MemoryRecord) -> Result<Self> {
        let metadata = if record.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.metadata)?)
        };
        Ok(Self {
            id: record.id.to_string(),
            content: record.content.clone(),
            category: record.category.to_string(),
            scope: record.scope.to_string(),
            confidence: record.confidence,
            status: record.status.to_string(),
            created_at: record.created_at.map(timestamp),
            last_accessed_at: record.last_accessed_at.map(timestamp),
            access_count: record.access_count as i64,
            metadata,
        })
    }
}

pub(crate) fn insert_row(conn: &Connection, row: &RecordRow) -> Result<()> {
    conn.execute(
        "INSERT INTO records (
            id, content, category, scope, confidence, status,
            created_at, last_accessed_at, access_count, metadata
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            row.id,
            row.content,
            row.category,
            row.scope,
            row.confidence,
            row.status,
            row.created_at,
            row.last_accessed_at,
            row.access_count,
            row.metadata,
        ],
    )?;
    Ok(())
}

fn delete_row(conn: &Connection, id: &RecordId, operation: &str, detail: Option<&str>) -> Result<()> {
    let rows = conn.execute("DELETE FROM records WHERE id = ?1", params![id.to_string()])?;
    if rows == 0 {
        return Err(Error::not_found(id));
    }
    log_event(conn, id, operation, detail)
}

pub(crate) fn log_event(
    conn: &Connection,
    id: &RecordId,
    operation: &str,
    detail: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO event_log (record_id, operation, detail, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id.to_string(), operation, detail, timestamp(Utc::now())],
    )?;
    Ok(())
}

fn fetch(conn: &Connection, id: &RecordId) -> Result<Option<MemoryRecord>> {
    let sql = format!("SELECT {} FROM records r WHERE r.id = ?1", RECORD_COLUMNS);
    let record = conn
        .query_row(&sql, params![id.to_string()], row_to_record)
        .optional()?;
    Ok(record)
}

pub(crate) fn query_records<P>(conn: &Connection, sql: &str, params: P) -> Result<Vec<MemoryRecord>>
where
    P: IntoIterator,
    P::Item: rusqlite::ToSql,
{
    let mut stmt = conn.prepare(sql)?;
    let records = stmt
        .query_map(params_from_iter(params), row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Map the first ten columns (see `RECORD_COLUMNS`) to a record.
pub(crate) fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
    let id_str: String = row.get(0)?;
    let category_str: String = row.get(2)?;
    let scope_str: String = row.get(3)?;
    let status_str: String = row.get(5)?;

    let id = RecordId::parse(&id_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let category = Category::parse(&category_str).map_err(|e| conversion(2, e))?;
    let scope = Scope::parse(&scope_str).map_err(|e| conversion(3, e))?;
    let status = match status_str.as_str() {
        "archived" => RecordStatus::Archived,
        _ => RecordStatus::Active,
    };

    let metadata = row
        .get::<_, Option<String>>(9)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(MemoryRecord {
        id,
        content: row.get(1)?,
        category,
        scope,
        confidence: row.get(4)?,
        status,
        created_at: parse_datetime(row.get(6)?),
        last_accessed_at: parse_datetime(row.get(7)?),
        access_count: row.get::<_, i64>(8)?.max(0) as u64,
        metadata,
    })
}

fn conversion(idx: usize, err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rule(content: &str, scope: Scope) -> MemoryRecord {
        MemoryRecord::new(content, Category::Rule, scope)
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let record = rule("Use tabs for indentation", Scope::project_task("acme", "ci"))
            .with_confidence(0.72)
            .with_rationale("team style guide");

        let id = store.insert(&record).unwrap();
        let fetched = store.get(&id).unwrap();

        assert_eq!(fetched.content, record.content);
        assert_eq!(fetched.category, record.category);
        assert_eq!(fetched.scope, record.scope);
        assert_eq!(fetched.confidence, record.confidence);
        assert_eq!(fetched.rationale(), Some("team style guide"));
        assert_eq!(fetched.access_count, 0);
    }

    #[test]
    fn test_invalid_records_never_persist() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let bad = rule("x", Scope::Universal).with_confidence(1.2);

        assert!(matches!(store.insert(&bad), Err(Error::InvalidConfidence { .. })));
        assert!(matches!(store.get(&bad.id), Err(Error::NotFound { .. })));

        let bad_scope = rule("y", Scope::language("c sharp"));
        assert!(matches!(store.insert(&bad_scope), Err(Error::InvalidScope { .. })));
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn test_insert_batch_is_all_or_nothing() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let good = rule("a", Scope::Universal);
        let bad = rule("b", Scope::Universal).with_confidence(-0.1);

        assert!(store.insert_batch(&[good.clone(), bad]).is_err());
        assert!(store.get(&good.id).is_err());

        let ids = store
            .insert_batch(&[good.clone(), rule("c", Scope::language("go"))])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.list_active().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let err = store.delete(&RecordId::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_list_by_scope_patterns() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store
            .insert_batch(&[
                rule("u", Scope::Universal),
                rule("p", Scope::project("x")),
                rule("pt", Scope::project_task("x", "y")),
                rule("other", Scope::project("z")),
                rule("l", Scope::language("x")),
            ])
            .unwrap();

        let prefixed: Vec<String> = store
            .list_by_scope("project:x*")
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(prefixed, vec!["p", "pt"]);

        assert_eq!(store.list_by_scope("project:x").unwrap().len(), 1);
        assert_eq!(store.list_by_scope("universal").unwrap().len(), 1);
        assert!(matches!(
            store.list_by_scope("lang:x"),
            Err(Error::InvalidScope { .. })
        ));
    }

    #[test]
    fn test_archive_hides_from_listing() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let record = rule("old habit", Scope::Universal);
        store.insert(&record).unwrap();

        store.archive(&record.id, "stale").unwrap();

        assert!(store.list_by_scope("universal").unwrap().is_empty());
        assert_eq!(store.list_archived().unwrap().len(), 1);
        assert_eq!(store.get(&record.id).unwrap().status, RecordStatus::Archived);
        assert!(store.archive(&RecordId::new(), "x").is_err());
    }

    #[test]
    fn test_replace_rolls_back_on_missing_id() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let keep = rule("keep me", Scope::Universal);
        store.insert(&keep).unwrap();
        let merged = rule("merged", Scope::Universal);

        let err = store
            .replace(&[keep.id.clone(), RecordId::new()], Some(&merged), "merge")
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        assert!(store.get(&keep.id).is_ok());
        assert!(store.get(&merged.id).is_err());
    }

    #[test]
    fn test_history_survives_delete() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let record = rule("temporary", Scope::Universal);
        store.insert(&record).unwrap();
        store.delete(&record.id).unwrap();

        let ops: Vec<String> = store
            .history(&record.id)
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, vec!["insert", "delete"]);
    }

    #[test]
    fn test_acknowledged_pairs_are_order_independent() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let (a, b) = (RecordId::new(), RecordId::new());
        store.acknowledge_pair(&b, &a).unwrap();

        let keys = store.acknowledged_pairs().unwrap();
        assert!(keys.contains(&pair_key(&a, &b)));
    }

    #[test]
    fn test_stats() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let old = rule("old", Scope::Universal).with_created_at(Utc::now() - Duration::days(3));
        store
            .insert_batch(&[
                old.clone(),
                rule("go", Scope::language("go")),
                MemoryRecord::new("pref", Category::Preference, Scope::project("acme")),
            ])
            .unwrap();
        store.archive(&old.id, "test").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.by_tier.get(&ScopeTier::Universal), None);
        assert_eq!(stats.by_tier.get(&ScopeTier::Language), Some(&1));
        assert_eq!(stats.by_category.get(&Category::Preference), Some(&1));
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let record = rule("persist me", Scope::language("rust"));

        {
            let store = SqliteMemoryStore::open(&path).unwrap();
            store.insert(&record).unwrap();
        }

        let store = SqliteMemoryStore::open(&path).unwrap();
        assert_eq!(store.get(&record.id).unwrap().content, "persist me");
    }

    #[test]
    fn test_open_non_database_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        std::fs::write(&path, b"this is not a sqlite database\n".repeat(128)).unwrap();

        let result = SqliteMemoryStore::open(&path);
        assert!(
            matches!(result, Err(Error::StoreUnavailable(_))),
            "{:?}",
            result.err()
        );
    }
}
