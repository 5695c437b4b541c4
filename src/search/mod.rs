//! Full-text and filtered search over the record store.
//!
//! Text queries go through the FTS5 index and are ranked by its bm25 rank,
//! mapped to a 0.1..=1.0 relevance score. Queries without text are sorted by
//! the requested [`OrderBy`].
//!
//! Reading through [`SqliteMemoryStore::search`] is the only path that
//! updates access statistics.

mod query;
mod snippet;

pub use query::{OrderBy, SearchHit, SearchQuery, DEFAULT_LIMIT};
pub use snippet::extract_snippet;

use crate::error::Result;
use crate::memory::{row_to_record, timestamp, RecordId, SqliteMemoryStore, RECORD_COLUMNS};
use chrono::Utc;
use rusqlite::{params_from_iter, Connection, ToSql};
use tracing::debug;

/// Relevance assigned when no rank signal is available.
pub const NEUTRAL_RELEVANCE: f64 = 0.5;

/// Map an FTS5 rank to a relevance score.
///
/// rank >= -1 maps to 1.0, rank <= -30 maps to 0.1, linear in between.
/// A missing or non-finite rank degrades to the neutral 0.5.
pub fn normalize_rank(rank: Option<f64>) -> f64 {
    match rank {
        Some(r) if r.is_finite() => {
            if r >= -1.0 {
                1.0
            } else if r <= -30.0 {
                0.1
            } else {
                0.1 + (r + 30.0) / 29.0 * 0.9
            }
        }
        _ => NEUTRAL_RELEVANCE,
    }
}

impl SqliteMemoryStore {
    /// Search active records and record an access for every hit returned.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let now = Utc::now();
        self.with_tx(|conn| {
            let mut hits = run_query(conn, query)?;
            let ids: Vec<RecordId> = hits.iter().map(|h| h.record.id.clone()).collect();
            bump_access(conn, &ids)?;
            for hit in &mut hits {
                hit.record.access_count += 1;
                hit.record.last_accessed_at = Some(now);
            }
            Ok(hits)
        })
    }

    /// Search without touching access statistics.
    ///
    /// Retrieval gathers candidates this way and reports the records it
    /// actually delivers through [`record_access`](Self::record_access).
    pub(crate) fn search_untracked(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        self.with_conn(|conn| run_query(conn, query))
    }

    /// Record a read of the given records.
    pub fn record_access(&self, ids: &[RecordId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.with_tx(|conn| bump_access(conn, ids))
    }
}

fn run_query(conn: &Connection, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let fts = query.fts_expression();
    let mut clauses = vec!["r.status = 'active'".to_string()];
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref expr) = fts {
        clauses.push("records_fts MATCH ?".to_string());
        values.push(Box::new(expr.clone()));
    }
    if let Some(ref pattern) = query.scope {
        let (clause, value) = pattern.to_sql("r.scope");
        clauses.push(clause);
        values.push(Box::new(value));
    }
    if let Some(category) = query.category {
        clauses.push("r.category = ?".to_string());
        values.push(Box::new(category.to_string()));
    }
    if let Some(min) = query.min_confidence {
        clauses.push("r.confidence >= ?".to_string());
        values.push(Box::new(min));
    }

    let sql = if fts.is_some() {
        format!(
            "SELECT {}, records_fts.rank FROM records_fts
             JOIN records r ON r.rowid = records_fts.rowid
             WHERE {} ORDER BY records_fts.rank, r.rowid LIMIT {} OFFSET {}",
            RECORD_COLUMNS,
            clauses.join(" AND "),
            query.limit,
            query.offset
        )
    } else {
        let order = match query.order_by {
            OrderBy::Recency => "r.created_at DESC, r.rowid",
            OrderBy::Confidence => "r.confidence DESC, r.rowid",
            OrderBy::Relevance => "r.confidence DESC, r.last_accessed_at DESC, r.rowid",
        };
        format!(
            "SELECT {}, NULL FROM records r WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            RECORD_COLUMNS,
            clauses.join(" AND "),
            order,
            query.limit,
            query.offset
        )
    };

    let first_word = query.first_word();
    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let record = row_to_record(row)?;
            let rank: Option<f64> = row.get(10)?;
            Ok((record, rank))
        })?
        .map(|r| {
            r.map(|(record, rank)| {
                let snippet = extract_snippet(&record.content, first_word.as_deref());
                SearchHit {
                    relevance: normalize_rank(rank),
                    snippet,
                    record,
                }
            })
        })
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(
        hits = hits.len(),
        text = fts.is_some(),
        order = ?query.order_by,
        "search"
    );
    Ok(hits)
}

fn bump_access(conn: &Connection, ids: &[RecordId]) -> Result<()> {
    let now = timestamp(Utc::now());
    let mut stmt = conn.prepare(
        "UPDATE records SET last_accessed_at = ?1, access_count = access_count + 1 WHERE id = ?2",
    )?;
    for id in ids {
        stmt.execute([now.as_str(), id.to_string().as_str()])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Category, MemoryRecord, Scope, ScopePattern};
    use chrono::Duration;

    fn seeded() -> SqliteMemoryStore {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .insert_batch(&[
                MemoryRecord::new("Use tabs for indentation", Category::Rule, Scope::Universal)
                    .with_confidence(0.6)
                    .with_created_at(now - Duration::days(10)),
                MemoryRecord::new(
                    "Avoid tabs in YAML files",
                    Category::Correction,
                    Scope::language("yaml"),
                )
                .with_confidence(0.9)
                .with_created_at(now - Duration::days(1)),
                MemoryRecord::new(
                    "Run the linter before committing",
                    Category::Rule,
                    Scope::project("acme"),
                )
                .with_confidence(0.3)
                .with_created_at(now - Duration::days(5)),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_normalize_rank() {
        assert_eq!(normalize_rank(Some(-0.5)), 1.0);
        assert_eq!(normalize_rank(Some(-1.0)), 1.0);
        assert_eq!(normalize_rank(Some(-30.0)), 0.1);
        assert_eq!(normalize_rank(Some(-45.0)), 0.1);
        assert!((normalize_rank(Some(-15.5)) - 0.55).abs() < 1e-9);
        assert_eq!(normalize_rank(None), NEUTRAL_RELEVANCE);
        assert_eq!(normalize_rank(Some(f64::NAN)), NEUTRAL_RELEVANCE);
    }

    #[test]
    fn test_text_search_matches_and_snippets() {
        let store = seeded();
        let hits = store.search(&SearchQuery::text("tabs")).unwrap();

        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!(hit.record.content.to_lowercase().contains("tabs"));
            assert!((0.1..=1.0).contains(&hit.relevance));
            assert!(hit.snippet.to_lowercase().contains("tabs"));
        }
    }

    #[test]
    fn test_filters_combine_with_text() {
        let store = seeded();
        let hits = store
            .search(
                &SearchQuery::text("tabs")
                    .scope(ScopePattern::parse("language:*").unwrap())
                    .min_confidence(0.8),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.category, Category::Correction);
    }

    #[test]
    fn test_order_without_text() {
        let store = seeded();

        let by_recency: Vec<String> = store
            .search(&SearchQuery::new().order_by(OrderBy::Recency))
            .unwrap()
            .into_iter()
            .map(|h| h.record.content)
            .collect();
        assert_eq!(by_recency[0], "Avoid tabs in YAML files");
        assert_eq!(by_recency[2], "Use tabs for indentation");

        let by_confidence = store
            .search(&SearchQuery::new().order_by(OrderBy::Confidence).limit(1))
            .unwrap();
        assert_eq!(by_confidence.len(), 1);
        assert_eq!(by_confidence[0].record.confidence, 0.9);
        assert_eq!(by_confidence[0].relevance, NEUTRAL_RELEVANCE);
    }

    #[test]
    fn test_category_filter() {
        let store = seeded();
        let hits = store
            .search(&SearchQuery::new().category(Category::Rule))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_bumps_access_stats() {
        let store = seeded();
        let first = store.search(&SearchQuery::text("linter")).unwrap();
        assert_eq!(first[0].record.access_count, 1);

        let id = first[0].record.id.clone();
        store.search(&SearchQuery::text("linter")).unwrap();
        let stored = store.get(&id).unwrap();
        assert_eq!(stored.access_count, 2);
        assert!(stored.last_accessed_at.is_some());
    }

    #[test]
    fn test_untracked_search_leaves_stats() {
        let store = seeded();
        let hits = store.search_untracked(&SearchQuery::text("linter")).unwrap();
        assert_eq!(store.get(&hits[0].record.id).unwrap().access_count, 0);

        store.record_access(&[hits[0].record.id.clone()]).unwrap();
        assert_eq!(store.get(&hits[0].record.id).unwrap().access_count, 1);
    }

    #[test]
    fn test_archived_records_never_match() {
        let store = seeded();
        let hit = store.search(&SearchQuery::text("linter")).unwrap().remove(0);
        store.archive(&hit.record.id, "test").unwrap();
        assert!(store.search(&SearchQuery::text("linter")).unwrap().is_empty());
    }

    #[test]
    fn test_zero_limit_returns_nothing() {
        let store = seeded();
        assert!(store.search(&SearchQuery::new().limit(0)).unwrap().is_empty());
    }

    #[test]
    fn test_offset_pages_through_results() {
        let store = seeded();
        let page = |offset| {
            store
                .search_untracked(
                    &SearchQuery::new()
                        .order_by(OrderBy::Recency)
                        .limit(2)
                        .offset(offset),
                )
                .unwrap()
                .into_iter()
                .map(|h| h.record.content)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            page(0),
            vec!["Avoid tabs in YAML files", "Run the linter before committing"]
        );
        assert_eq!(page(2), vec!["Use tabs for indentation"]);
        assert!(page(3).is_empty());
    }
}
