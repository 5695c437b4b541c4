//! Conflict types.

use crate::memory::RecordId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Relationship between two records that needs resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same topic, opposite polarity
    Contradiction,
    /// Near-identical statements
    Redundancy,
    /// The newer record replaces the older one
    Obsolescence,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contradiction => "contradiction",
            Self::Redundancy => "redundancy",
            Self::Obsolescence => "obsolescence",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucketed urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Bucket an additive severity score.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 7 => Self::Critical,
            s if s >= 5 => Self::High,
            s if s >= 3 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a conflict.
///
/// `Detected` moves to `AutoResolved` when policy executes it, or to
/// `PendingUser` when it needs a decision. A decision ends in `Resolved`
/// or `Deferred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictState {
    Detected,
    AutoResolved,
    PendingUser,
    Resolved,
    Deferred,
}

impl ConflictState {
    /// Whether `next` is a legal successor.
    pub fn can_transition_to(self, next: ConflictState) -> bool {
        use ConflictState::*;
        matches!(
            (self, next),
            (Detected, AutoResolved)
                | (Detected, PendingUser)
                | (PendingUser, Resolved)
                | (PendingUser, Deferred)
        )
    }
}

/// Stable conflict identifier derived from kind and the ordered pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictId(pub String);

impl ConflictId {
    pub fn derive(kind: ConflictKind, a: &RecordId, b: &RecordId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}|{}", kind, a, b).as_bytes());
        let hex = format!("{:x}", hasher.finalize());
        Self(hex[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decision applied to a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolutionAction {
    KeepA,
    KeepB,
    KeepBoth,
    Merge { content: String },
    DeleteBoth,
    Defer,
}

impl ResolutionAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeepA => "keep_a",
            Self::KeepB => "keep_b",
            Self::KeepBoth => "keep_both",
            Self::Merge { .. } => "merge",
            Self::DeleteBoth => "delete_both",
            Self::Defer => "defer",
        }
    }
}

/// A detected conflict. Recomputed on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    /// The older record of the pair
    pub record_a: RecordId,
    /// The newer record of the pair
    pub record_b: RecordId,
    pub kind: ConflictKind,
    pub similarity: f64,
    pub severity: Severity,
    pub auto_resolvable: bool,
    pub recommended: ResolutionAction,
    pub preview_a: String,
    pub preview_b: String,
    pub description: String,
}

impl ConflictRecord {
    /// State after triage.
    pub fn state(&self) -> ConflictState {
        if self.auto_resolvable {
            ConflictState::Detected
        } else {
            ConflictState::PendingUser
        }
    }

    pub fn involves(&self, id: &RecordId) -> bool {
        &self.record_a == id || &self.record_b == id
    }
}

/// What a resolution changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub conflict_id: ConflictId,
    pub action: String,
    pub state: ConflictState,
    pub deleted: Vec<RecordId>,
    pub inserted: Option<RecordId>,
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceSummary {
    pub detected: usize,
    pub auto_resolved: usize,
    pub pending_user: usize,
    /// Auto-resolvable conflicts skipped because an earlier resolution in
    /// the same pass already removed one of their records
    pub skipped: usize,
    pub archived: usize,
    pub by_kind: HashMap<ConflictKind, usize>,
    pub by_severity: HashMap<Severity, usize>,
}
