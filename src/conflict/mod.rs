//! Conflict detection and resolution.
//!
//! Conflicts are recomputed from the store on every pass and never persisted.
//! Their ids are derived from the kind and the ordered record pair, so the
//! same conflict keeps its id across passes as long as both records exist.
//!
//! # Resolution
//!
//! Every destructive action runs in a single store transaction. Choosing
//! `keep_both` records an acknowledgement so the pair is not flagged again.

mod detect;
mod resolve;
mod severity;
mod similarity;
mod types;

pub use detect::{has_supersession_phrasing, polarity, ConflictDetector, Polarity};
pub use resolve::{apply, merge_records, recommend};
pub use severity::{severity, severity_score};
pub use similarity::{tokenize, topic_keywords, topic_overlap, TermCosine, TextSimilarity};
pub use types::{
    ConflictId, ConflictKind, ConflictRecord, ConflictState, MaintenanceSummary,
    ResolutionAction, ResolutionOutcome, Severity,
};
