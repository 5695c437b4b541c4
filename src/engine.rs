//! The engine facade.
//!
//! [`MemoryEngine`] ties the store, retrieval and conflict handling together
//! behind the operations callers use: accepting proposals, retrieving a
//! budgeted rule set, and maintenance.

use std::collections::HashSet;
use std::fs;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::conflict::{
    apply, ConflictDetector, ConflictRecord, MaintenanceSummary, ResolutionAction,
    ResolutionOutcome, TextSimilarity,
};
use crate::error::{Error, Result};
use crate::memory::{MemoryStats, Proposal, RecordId, ScopePattern, SqliteMemoryStore};
use crate::retrieval::{self, RetrievalContext, Retrieved, TierBudget};
use crate::search::{SearchHit, SearchQuery};

/// Confidence below which an unread record may be archived.
const STALE_CONFIDENCE: f64 = 0.5;

/// Rule memory engine.
pub struct MemoryEngine {
    store: SqliteMemoryStore,
    config: EngineConfig,
    detector: ConflictDetector,
}

impl MemoryEngine {
    /// Open the engine on the configured database file.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let path = config.resolved_database_path()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let store = SqliteMemoryStore::open(&path)?;
        info!(path = %path.display(), "opened memory engine");
        Ok(Self::with_store(store, config))
    }

    /// Load configuration from a JSON file and open the engine.
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::open(EngineConfig::load(path)?)
    }

    /// Engine over an in-memory store with default configuration.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::with_store(
            SqliteMemoryStore::in_memory()?,
            EngineConfig::default(),
        ))
    }

    pub fn with_store(store: SqliteMemoryStore, config: EngineConfig) -> Self {
        let detector = ConflictDetector::new(config.conflict.clone());
        Self {
            store,
            config,
            detector,
        }
    }

    /// Replace the text similarity used for redundancy detection.
    pub fn with_similarity(mut self, similarity: Box<dyn TextSimilarity>) -> Self {
        self.detector = ConflictDetector::with_similarity(self.config.conflict.clone(), similarity);
        self
    }

    pub fn store(&self) -> &SqliteMemoryStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ==================== Write ====================

    /// Persist approved proposals as one batch.
    ///
    /// Any invalid proposal rejects the whole batch.
    pub fn accept_proposals(&self, proposals: Vec<Proposal>) -> Result<Vec<RecordId>> {
        let records = proposals
            .into_iter()
            .map(Proposal::into_record)
            .collect::<Result<Vec<_>>>()?;
        let ids = self.store.insert_batch(&records)?;
        info!(count = ids.len(), "accepted proposals");
        Ok(ids)
    }

    // ==================== Query ====================

    /// Retrieve rules for a context as prompt-ready text.
    ///
    /// `budget` is the total size budget; the configured split is used when
    /// it matches, otherwise the default ratio is scaled to it.
    pub fn retrieve(&self, context: &RetrievalContext, budget: usize) -> Result<String> {
        let tiers = if budget == self.config.budget.total {
            self.config.budget
        } else {
            TierBudget::split(budget)
        };
        Ok(self.retrieve_with(context, &tiers)?.text)
    }

    /// Retrieve with an explicit per-tier budget, returning the full selection.
    pub fn retrieve_with(&self, context: &RetrievalContext, budget: &TierBudget) -> Result<Retrieved> {
        retrieval::retrieve(
            &self.store,
            context,
            budget,
            self.config.retrieval_page_size,
            Utc::now(),
        )
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        self.store.search(query)
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        self.store.stats()
    }

    // ==================== Maintenance ====================

    /// Detect conflicts among active records.
    ///
    /// `scope_filter` is an exact scope or trailing-`*` pattern; a pair is
    /// included when either side matches.
    pub fn detect_conflicts(&self, scope_filter: Option<&str>) -> Result<Vec<ConflictRecord>> {
        let filter = scope_filter.map(ScopePattern::parse).transpose()?;
        let records = self.store.list_active()?;
        let acknowledged = self.store.acknowledged_pairs()?;
        Ok(self
            .detector
            .detect(&records, &acknowledged, filter.as_ref(), Utc::now()))
    }

    /// Apply a decision to a conflict from the current store state.
    pub fn resolve(&self, conflict_id: &str, decision: ResolutionAction) -> Result<ResolutionOutcome> {
        let conflict = self
            .detect_conflicts(None)?
            .into_iter()
            .find(|c| c.id.as_str() == conflict_id)
            .ok_or_else(|| Error::conflict_not_found(conflict_id))?;
        apply(&self.store, &conflict, &decision, false)
    }

    /// Run one maintenance pass.
    ///
    /// Executes every auto-resolvable conflict with its recommended action,
    /// most severe first, and leaves the rest pending. A conflict whose
    /// record was already removed earlier in the pass is skipped. Stale
    /// records are archived afterwards when `archive_after_days` is set.
    #[instrument(skip(self))]
    pub fn run_auto_maintenance(&self) -> Result<MaintenanceSummary> {
        let now = Utc::now();
        let conflicts = self.detect_conflicts(None)?;
        let mut summary = MaintenanceSummary {
            detected: conflicts.len(),
            ..MaintenanceSummary::default()
        };
        let mut touched: HashSet<RecordId> = HashSet::new();

        for conflict in &conflicts {
            *summary.by_severity.entry(conflict.severity).or_default() += 1;
            if !conflict.auto_resolvable {
                summary.pending_user += 1;
                continue;
            }
            if touched.contains(&conflict.record_a) || touched.contains(&conflict.record_b) {
                debug!(conflict = %conflict.id, "skipping conflict on a resolved record");
                summary.skipped += 1;
                continue;
            }

            let outcome = apply(&self.store, conflict, &conflict.recommended, true)?;
            touched.extend(outcome.deleted);
            summary.auto_resolved += 1;
            *summary.by_kind.entry(conflict.kind).or_default() += 1;
        }

        if let Some(days) = self.config.archive_after_days {
            summary.archived = self.archive_stale(days, now)?;
        }

        info!(
            detected = summary.detected,
            auto_resolved = summary.auto_resolved,
            pending_user = summary.pending_user,
            archived = summary.archived,
            "maintenance pass complete"
        );
        Ok(summary)
    }

    /// Archive low-confidence records not read for `days` days.
    fn archive_stale(&self, days: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(i64::from(days));
        let mut archived = 0;
        for record in self.store.list_active()? {
            let last_seen = record.last_accessed_at.or(record.created_at);
            let stale = last_seen.is_some_and(|t| t < cutoff);
            if stale && record.confidence < STALE_CONFIDENCE {
                match self.store.archive(&record.id, "stale") {
                    Ok(()) => archived += 1,
                    Err(Error::NotFound { .. }) => {
                        warn!(id = %record.id, "record vanished before archival")
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(archived)
    }
}
