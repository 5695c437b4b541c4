//! # rule-memory
//!
//! Durable, scoped rule memory for coding agents: corrected behaviors are
//! stored at universal, language, or project scope, retrieved under a strict
//! size budget, and kept consistent by detecting contradictory, duplicate and
//! superseded rules.
//!
//! ## Core Components
//!
//! - **Memory**: SQLite record store with full-text index and audit log
//! - **Search**: FTS5 search with rank-normalized relevance and snippets
//! - **Retrieval**: context scoring and per-tier budget allocation
//! - **Conflict**: pairwise detection, severity, and transactional resolution
//! - **Engine**: the facade tying these together
//!
//! ## Example
//!
//! ```rust,ignore
//! use rule_memory::{MemoryEngine, Proposal, RetrievalContext, Category};
//!
//! let engine = MemoryEngine::in_memory()?;
//! engine.accept_proposals(vec![Proposal {
//!     content: "Wrap errors with context".into(),
//!     category: Category::Rule,
//!     scope: "language:go".into(),
//!     confidence: 0.9,
//!     source_evidence: vec![],
//! }])?;
//!
//! let ctx = RetrievalContext::new().with_project("acme").with_language("go");
//! let prompt = engine.retrieve(&ctx, 1500)?;
//!
//! let summary = engine.run_auto_maintenance()?;
//! println!("{} conflicts pending review", summary.pending_user);
//! ```

pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod memory;
pub mod retrieval;
pub mod search;

// Re-exports for convenience
pub use config::{ConflictConfig, EngineConfig};
pub use conflict::{
    ConflictDetector, ConflictId, ConflictKind, ConflictRecord, ConflictState,
    MaintenanceSummary, ResolutionAction, ResolutionOutcome, Severity, TermCosine,
    TextSimilarity,
};
pub use engine::MemoryEngine;
pub use error::{Error, Result};
pub use memory::{
    Category, ImportReport, MemoryRecord, MemoryStats, Proposal, RecordId, RecordStatus, Scope,
    ScopePattern, ScopeTier, SqliteMemoryStore,
};
pub use retrieval::{RetrievalContext, Retrieved, TierBudget};
pub use search::{OrderBy, SearchHit, SearchQuery};
