//! Context-aware relevance scoring.
//!
//! A record's score is a fixed weighted sum of four signals, each in [0, 1]:
//!
//! | signal    | weight |
//! |-----------|--------|
//! | scope     | 0.4    |
//! | frequency | 0.3    |
//! | recency   | 0.2    |
//! | task      | 0.1    |
//!
//! Records scoring below [`RELEVANCE_FLOOR`] are never retrieved.

use crate::memory::{MemoryRecord, Scope};
use crate::retrieval::context::RetrievalContext;
use chrono::{DateTime, Utc};

pub const SCOPE_WEIGHT: f64 = 0.4;
pub const FREQUENCY_WEIGHT: f64 = 0.3;
pub const RECENCY_WEIGHT: f64 = 0.2;
pub const TASK_WEIGHT: f64 = 0.1;

/// Minimum score a record needs to be considered for retrieval.
pub const RELEVANCE_FLOOR: f64 = 0.3;

/// Observations at which the frequency signal saturates.
const FREQUENCY_SATURATION: f64 = 10.0;

/// Signal value used when a record's age or the task is unknown.
const NEUTRAL_SIGNAL: f64 = 0.5;

/// Keyword sets for the tasks the scorer knows about.
const TASK_KEYWORDS: &[(&str, &[&str])] = &[
    ("testing", &["test", "assert", "mock", "fixture", "coverage"]),
    ("debugging", &["debug", "error", "log", "trace", "stack"]),
    ("refactoring", &["refactor", "rename", "extract", "simplify", "duplicate"]),
    ("documentation", &["doc", "comment", "readme", "example", "explain"]),
    ("review", &["review", "style", "convention", "naming", "readab"]),
    ("deployment", &["deploy", "release", "build", "migration", "config"]),
    ("feature", &["api", "interface", "design", "validate", "implement"]),
    ("performance", &["performance", "cache", "alloc", "latency", "benchmark"]),
    ("security", &["secret", "auth", "token", "sanitize", "permission"]),
];

/// Individual signal values behind a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub scope: f64,
    pub frequency: f64,
    pub recency: f64,
    pub task: f64,
}

impl ScoreBreakdown {
    /// Weighted sum of the signals.
    pub fn total(&self) -> f64 {
        (SCOPE_WEIGHT * self.scope
            + FREQUENCY_WEIGHT * self.frequency
            + RECENCY_WEIGHT * self.recency
            + TASK_WEIGHT * self.task)
            .clamp(0.0, 1.0)
    }
}

/// Score a record for a context at time `now`.
pub fn score(record: &MemoryRecord, context: &RetrievalContext, now: DateTime<Utc>) -> f64 {
    breakdown(record, context, now).total()
}

/// Compute every signal for a record.
pub fn breakdown(
    record: &MemoryRecord,
    context: &RetrievalContext,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    ScoreBreakdown {
        scope: scope_signal(&record.scope, context),
        frequency: frequency_signal(record.observed_frequency()),
        recency: recency_signal(record.created_at, now),
        task: task_signal(&record.content, context.task.as_deref()),
    }
}

/// Whether a score clears the irrelevance floor.
pub fn is_relevant(score: f64) -> bool {
    score >= RELEVANCE_FLOOR
}

pub fn scope_signal(scope: &Scope, context: &RetrievalContext) -> f64 {
    match scope {
        Scope::Universal => 0.4,
        Scope::Language(_) if context.admits(scope) => 0.7,
        Scope::Language(_) => 0.1,
        Scope::Project { .. } if context.admits(scope) => 1.0,
        Scope::Project { .. } => 0.05,
    }
}

pub fn frequency_signal(observed: u64) -> f64 {
    (observed as f64 / FREQUENCY_SATURATION).min(1.0)
}

pub fn recency_signal(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(created_at) = created_at else {
        return NEUTRAL_SIGNAL;
    };
    let days = (now - created_at).num_days();
    match days {
        d if d < 7 => 1.0,
        d if d < 30 => 0.7,
        d if d < 90 => 0.4,
        _ => 0.1,
    }
}

/// Fraction of the task's keywords present in the content.
pub fn task_signal(content: &str, task: Option<&str>) -> f64 {
    let Some(task) = task else {
        return NEUTRAL_SIGNAL;
    };
    let keywords = task_keywords(task);
    if keywords.is_empty() {
        return NEUTRAL_SIGNAL;
    }
    let content = content.to_lowercase();
    let found = keywords.iter().filter(|k| content.contains(k.as_str())).count();
    found as f64 / keywords.len() as f64
}

/// Keyword set for a task. Unknown tasks use the words of their own name.
pub fn task_keywords(task: &str) -> Vec<String> {
    let task = task.to_lowercase();
    if let Some((_, words)) = TASK_KEYWORDS.iter().find(|(name, _)| *name == task) {
        return words.iter().map(|w| w.to_string()).collect();
    }
    task.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}
