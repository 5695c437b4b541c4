//! Pairwise conflict detection.
//!
//! Detection runs two passes over the active records:
//! - contradiction and redundancy, compared pair by pair
//! - obsolescence, over pairs the first pass left unflagged
//!
//! Pairs whose scopes can never apply together are skipped, as are pairs a
//! user chose to keep side by side.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::resolve::recommend;
use super::severity::severity;
use super::similarity::{topic_keywords, topic_overlap, TermCosine, TextSimilarity};
use super::types::{ConflictId, ConflictKind, ConflictRecord};
use crate::config::ConflictConfig;
use crate::memory::{pair_key, MemoryRecord, ScopePattern};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Negative directives. Checked before affirmative ones.
static NEGATIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(avoid|never|don[’']?t|do not|must not|mustn[’']?t|should not|shouldn[’']?t|stop)\b")
        .expect("Invalid regex")
});

/// Affirmative directives.
static AFFIRMATIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(use|prefer|always|do|must|should|keep|choose)\b").expect("Invalid regex")
});

/// Phrasing that marks a record as replacing earlier guidance.
static SUPERSESSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(no longer|instead of|from now on|not anymore|switched to|replaces?)\b")
        .expect("Invalid regex")
});

/// Directive polarity of a rule text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Affirmative,
    Negative,
}

/// Polarity of a text; negative markers win when both kinds appear.
pub fn polarity(text: &str) -> Option<Polarity> {
    if NEGATIVE_PATTERN.is_match(text) {
        Some(Polarity::Negative)
    } else if AFFIRMATIVE_PATTERN.is_match(text) {
        Some(Polarity::Affirmative)
    } else {
        None
    }
}

pub fn has_supersession_phrasing(text: &str) -> bool {
    SUPERSESSION_PATTERN.is_match(text)
}

/// Finds conflicts among a set of records.
pub struct ConflictDetector {
    config: ConflictConfig,
    similarity: Box<dyn TextSimilarity>,
}

impl ConflictDetector {
    /// Detector using term-frequency cosine similarity.
    pub fn new(config: ConflictConfig) -> Self {
        Self::with_similarity(config, Box::new(TermCosine))
    }

    pub fn with_similarity(config: ConflictConfig, similarity: Box<dyn TextSimilarity>) -> Self {
        Self { config, similarity }
    }

    pub fn config(&self) -> &ConflictConfig {
        &self.config
    }

    /// Detect conflicts, sorted by severity (highest first) then id.
    ///
    /// With a scope filter, only pairs where at least one side matches are
    /// considered.
    pub fn detect(
        &self,
        records: &[MemoryRecord],
        acknowledged: &HashSet<String>,
        scope_filter: Option<&ScopePattern>,
        now: DateTime<Utc>,
    ) -> Vec<ConflictRecord> {
        let active: Vec<&MemoryRecord> = records.iter().filter(|r| r.is_active()).collect();
        let keywords: Vec<HashSet<String>> =
            active.iter().map(|r| topic_keywords(&r.content)).collect();

        let mut conflicts = Vec::new();
        let mut unflagged = Vec::new();

        for i in 0..active.len() {
            for j in (i + 1)..active.len() {
                if !self.comparable(active[i], active[j], acknowledged, scope_filter) {
                    continue;
                }
                let (a, b, ka, kb) = oriented(active[i], active[j], &keywords[i], &keywords[j]);
                let overlap = topic_overlap(ka, kb);
                let similarity = self.similarity.similarity(&a.content, &b.content);

                let kind = if overlap >= self.config.topic_overlap && opposed(a, b) {
                    Some(ConflictKind::Contradiction)
                } else if similarity > self.config.redundancy_threshold {
                    Some(ConflictKind::Redundancy)
                } else {
                    None
                };

                match kind {
                    Some(kind) => conflicts.push(self.build(kind, a, b, similarity, now)),
                    None => unflagged.push((a, b, overlap, similarity)),
                }
            }
        }

        for (a, b, overlap, similarity) in unflagged {
            if self.obsoletes(b, a, overlap) {
                conflicts.push(self.build(ConflictKind::Obsolescence, a, b, similarity, now));
            }
        }

        conflicts.sort_by(|x, y| y.severity.cmp(&x.severity).then_with(|| x.id.cmp(&y.id)));
        debug!(
            records = active.len(),
            conflicts = conflicts.len(),
            "conflict detection"
        );
        conflicts
    }

    fn comparable(
        &self,
        x: &MemoryRecord,
        y: &MemoryRecord,
        acknowledged: &HashSet<String>,
        scope_filter: Option<&ScopePattern>,
    ) -> bool {
        if !x.scope.overlaps(&y.scope) {
            return false;
        }
        if let Some(filter) = scope_filter {
            if !filter.matches(&x.scope.to_string()) && !filter.matches(&y.scope.to_string()) {
                return false;
            }
        }
        !acknowledged.contains(&pair_key(&x.id, &y.id))
    }

    /// Whether `newer` replaces `older`.
    ///
    /// An explicit `supersedes` link is authoritative. Phrasing alone needs
    /// a shared topic and a known age gap of at least the configured days.
    fn obsoletes(&self, newer: &MemoryRecord, older: &MemoryRecord, overlap: f64) -> bool {
        if newer.supersedes().as_ref() == Some(&older.id) {
            return true;
        }
        has_supersession_phrasing(&newer.content)
            && overlap >= self.config.topic_overlap
            && gap_days(older, newer).is_some_and(|d| d >= self.config.obsolescence_min_gap_days)
    }

    fn build(
        &self,
        kind: ConflictKind,
        a: &MemoryRecord,
        b: &MemoryRecord,
        similarity: f64,
        now: DateTime<Utc>,
    ) -> ConflictRecord {
        let (auto_resolvable, recommended) = recommend(kind, a, b, &self.config);
        ConflictRecord {
            id: ConflictId::derive(kind, &a.id, &b.id),
            record_a: a.id.clone(),
            record_b: b.id.clone(),
            kind,
            similarity,
            severity: severity(kind, a, b, now),
            auto_resolvable,
            recommended,
            preview_a: preview(&a.content),
            preview_b: preview(&b.content),
            description: describe(kind, a, b, similarity),
        }
    }
}

/// Order a pair older first; ties and unknown timestamps fall back to id.
fn oriented<'a>(
    x: &'a MemoryRecord,
    y: &'a MemoryRecord,
    kx: &'a HashSet<String>,
    ky: &'a HashSet<String>,
) -> (&'a MemoryRecord, &'a MemoryRecord, &'a HashSet<String>, &'a HashSet<String>) {
    if (x.created_at, &x.id) <= (y.created_at, &y.id) {
        (x, y, kx, ky)
    } else {
        (y, x, ky, kx)
    }
}

fn opposed(a: &MemoryRecord, b: &MemoryRecord) -> bool {
    matches!(
        (polarity(&a.content), polarity(&b.content)),
        (Some(Polarity::Affirmative), Some(Polarity::Negative))
            | (Some(Polarity::Negative), Some(Polarity::Affirmative))
    )
}

/// Whole days from `older` to `newer`, if both timestamps are known.
pub(crate) fn gap_days(older: &MemoryRecord, newer: &MemoryRecord) -> Option<i64> {
    match (older.created_at, newer.created_at) {
        (Some(o), Some(n)) => Some((n - o).num_days()),
        _ => None,
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 80;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let head: String = content.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

fn describe(kind: ConflictKind, a: &MemoryRecord, b: &MemoryRecord, similarity: f64) -> String {
    match kind {
        ConflictKind::Contradiction => format!(
            "opposing directives on the same topic ({} vs {})",
            a.scope, b.scope
        ),
        ConflictKind::Redundancy => format!("near-duplicate rules (similarity {:.2})", similarity),
        ConflictKind::Obsolescence => match gap_days(a, b) {
            Some(days) => format!("newer rule replaces one {} days older", days),
            None => "newer rule replaces an older one".to_string(),
        },
    }
}
