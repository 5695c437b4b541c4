//! Additive severity scoring.

use super::types::{ConflictKind, Severity};
use crate::memory::{MemoryRecord, Scope};
use chrono::{DateTime, Utc};

/// Records younger than this many days count as fresh.
pub const FRESH_DAYS: i64 = 7;
/// Confidence above which a record counts as strongly held.
pub const HIGH_CONFIDENCE: f64 = 0.9;

/// Raw additive score before bucketing.
pub fn severity_score(
    kind: ConflictKind,
    a: &MemoryRecord,
    b: &MemoryRecord,
    now: DateTime<Utc>,
) -> u32 {
    let mut score = 0;
    if a.scope == Scope::Universal || b.scope == Scope::Universal {
        score += 3;
    }
    let fresh = |r: &MemoryRecord| r.age_days(now).is_some_and(|d| d < FRESH_DAYS);
    if fresh(a) && fresh(b) {
        score += 2;
    }
    if a.confidence > HIGH_CONFIDENCE || b.confidence > HIGH_CONFIDENCE {
        score += 2;
    }
    score += match kind {
        ConflictKind::Contradiction => 2,
        ConflictKind::Obsolescence => 1,
        ConflictKind::Redundancy => 0,
    };
    score
}

pub fn severity(
    kind: ConflictKind,
    a: &MemoryRecord,
    b: &MemoryRecord,
    now: DateTime<Utc>,
) -> Severity {
    Severity::from_score(severity_score(kind, a, b, now))
}
