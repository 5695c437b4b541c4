//! Durable store for scoped behavioral rules.
//!
//! Records carry one of three applicability tiers:
//!
//! - **Universal**: applies in every session
//! - **Language**: applies when working in a given language
//! - **Project**: applies inside one project, optionally narrowed to a task
//!
//! Content is never edited in place. A change is a delete plus an insert,
//! and every write lands in an audit log.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rule_memory::memory::{Category, MemoryRecord, Scope, SqliteMemoryStore};
//!
//! let store = SqliteMemoryStore::in_memory()?;
//!
//! let rule = MemoryRecord::new("Prefer early returns", Category::Preference, Scope::language("go"))
//!     .with_confidence(0.9);
//! store.insert(&rule)?;
//!
//! let go_rules = store.list_by_scope("language:go")?;
//! ```

mod legacy;
mod schema;
mod scope;
mod store;
mod types;

pub use legacy::ImportReport;
pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use scope::{Scope, ScopePattern, ScopeTier};
pub use store::{AuditEvent, MemoryStats, SqliteMemoryStore};
pub(crate) use store::{pair_key, row_to_record, timestamp, RECORD_COLUMNS};
pub use types::{meta, size_estimate, Category, MemoryRecord, Proposal, RecordId, RecordStatus};
