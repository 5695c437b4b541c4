//! Budgeted, context-aware retrieval.
//!
//! A retrieval runs in four steps:
//!
//! 1. Gather candidates for every scope the context admits
//! 2. Score each candidate and drop those under the relevance floor
//! 3. Allocate the survivors into per-tier size budgets
//! 4. Render the selection and record an access for each delivered record

mod budget;
mod context;
mod format;
mod proptest;
mod scorer;

pub use budget::{allocate, Allocation, ScoredRecord, TierBudget, DEFAULT_TOTAL_BUDGET};
pub use context::RetrievalContext;
pub use format::render;
pub use scorer::{
    breakdown, frequency_signal, is_relevant, recency_signal, scope_signal, score, task_keywords,
    task_signal, ScoreBreakdown, FREQUENCY_WEIGHT, RECENCY_WEIGHT, RELEVANCE_FLOOR,
    SCOPE_WEIGHT, TASK_WEIGHT,
};

use crate::error::{Error, Result};
use crate::memory::{RecordId, SqliteMemoryStore};
use crate::search::{OrderBy, SearchQuery};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Result of a retrieval: the selection and its rendered text.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub allocation: Allocation,
    pub text: String,
    /// Candidates dropped by the relevance floor
    pub below_floor: usize,
}

/// Run the retrieval pipeline against a store.
///
/// Every admitted record is scored; `page_size` only bounds how many rows a
/// single gathering statement reads.
pub fn retrieve(
    store: &SqliteMemoryStore,
    context: &RetrievalContext,
    budget: &TierBudget,
    page_size: usize,
    now: DateTime<Utc>,
) -> Result<Retrieved> {
    budget.validate()?;
    if page_size == 0 {
        return Err(Error::Config("retrieval page size must be positive".to_string()));
    }

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for pattern in context.scope_patterns() {
        let mut offset = 0;
        loop {
            let query = SearchQuery::new()
                .scope(pattern.clone())
                .order_by(OrderBy::Recency)
                .limit(page_size)
                .offset(offset);
            let page = store.search_untracked(&query)?;
            let fetched = page.len();
            for hit in page {
                if context.admits(&hit.record.scope) && seen.insert(hit.record.id.clone()) {
                    candidates.push(hit.record);
                }
            }
            if fetched < page_size {
                break;
            }
            offset += fetched;
        }
    }

    let total = candidates.len();
    let scored: Vec<ScoredRecord> = candidates
        .into_iter()
        .map(|record| {
            let score = score(&record, context, now);
            ScoredRecord { record, score }
        })
        .filter(|s| is_relevant(s.score))
        .collect();
    let below_floor = total - scored.len();

    let allocation = allocate(scored, budget);
    let text = render(&allocation, context);

    let delivered: Vec<RecordId> = allocation.records().map(|s| s.record.id.clone()).collect();
    store.record_access(&delivered)?;

    debug!(
        candidates = total,
        below_floor,
        delivered = delivered.len(),
        skipped = allocation.skipped,
        "retrieval"
    );

    Ok(Retrieved {
        allocation,
        text,
        below_floor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Category, MemoryRecord, Scope, ScopeTier};
    use chrono::Duration;

    #[test]
    fn test_retrieve_filters_scopes_and_tracks_access() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        let go = MemoryRecord::new("Wrap errors with %w", Category::Rule, Scope::language("go"))
            .with_frequency(8);
        let py = MemoryRecord::new("Use type hints", Category::Rule, Scope::language("python"))
            .with_frequency(8);
        store.insert_batch(&[go.clone(), py.clone()]).unwrap();

        let ctx = RetrievalContext::new().with_language("go");
        let out = retrieve(&store, &ctx, &TierBudget::default(), 100, now).unwrap();

        assert_eq!(out.text, "### Go Preferences\n- Wrap errors with %w");
        assert_eq!(store.get(&go.id).unwrap().access_count, 1);
        assert_eq!(store.get(&py.id).unwrap().access_count, 0);
    }

    #[test]
    fn test_retrieve_drops_records_below_floor() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        // 0.4*0.4 + 0.3*0.1 + 0.2*0.1 + 0.1*0.0 = 0.21
        let weak = MemoryRecord::new("Prefer small commits", Category::Preference, Scope::Universal)
            .with_created_at(now - Duration::days(365));
        store.insert(&weak).unwrap();

        let ctx = RetrievalContext::new().with_task("testing");
        let out = retrieve(&store, &ctx, &TierBudget::default(), 100, now).unwrap();

        assert_eq!(out.text, "");
        assert_eq!(out.below_floor, 1);
        assert!(out.allocation.tier(ScopeTier::Universal).is_empty());
        assert_eq!(store.get(&weak.id).unwrap().access_count, 0);
    }

    #[test]
    fn test_retrieve_rejects_invalid_budget() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let budget = TierBudget {
            total: 10,
            universal: 10,
            language: 10,
            project: 10,
        };
        assert!(retrieve(&store, &RetrievalContext::new(), &budget, 10, Utc::now()).is_err());
    }

    #[test]
    fn test_retrieve_matches_language_case_insensitively() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let rule = MemoryRecord::new("Wrap errors with context", Category::Rule, Scope::language("go"))
            .with_frequency(10);
        store.insert(&rule).unwrap();

        let ctx = RetrievalContext::new().with_language("Go");
        let out = retrieve(&store, &ctx, &TierBudget::default(), 100, Utc::now()).unwrap();

        assert_eq!(out.text, "### Go Preferences\n- Wrap errors with context");
        assert_eq!(store.get(&rule.id).unwrap().access_count, 1);
    }

    // Old rules score 0.38 and the fresh one 0.71; a page holds three rows.
    #[test]
    fn test_retrieve_scores_records_beyond_one_page() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        let old: Vec<MemoryRecord> = (0..3)
            .map(|i| {
                MemoryRecord::new(
                    format!("Old confident rule {}", i),
                    Category::Rule,
                    Scope::Universal,
                )
                .with_confidence(0.99)
                .with_frequency(5)
                .with_created_at(now - Duration::days(200))
            })
            .collect();
        let fresh = MemoryRecord::new("Run the linter before pushing", Category::Rule, Scope::Universal)
            .with_confidence(0.5)
            .with_frequency(10)
            .with_created_at(now);
        store.insert_batch(&old).unwrap();
        store.insert(&fresh).unwrap();

        let out = retrieve(&store, &RetrievalContext::new(), &TierBudget::default(), 3, now).unwrap();

        let universal = out.allocation.tier(ScopeTier::Universal);
        assert_eq!(universal.len(), 4);
        assert_eq!(universal[0].record.id, fresh.id);
        assert!(out
            .text
            .starts_with("### Universal Rules\n- Run the linter before pushing"));
    }

    #[test]
    fn test_retrieve_rejects_zero_page_size() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let err = retrieve(&store, &RetrievalContext::new(), &TierBudget::default(), 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
