//! Resolution policy and execution.

use super::detect::gap_days;
use super::types::{ConflictKind, ConflictRecord, ConflictState, ResolutionAction, ResolutionOutcome};
use crate::config::ConflictConfig;
use crate::error::{Error, Result};
use crate::memory::{meta, MemoryRecord, SqliteMemoryStore};
use serde_json::Value;
use tracing::info;

/// Decide whether a conflict may be resolved without a human, and what to do.
///
/// `a` is the older record. Redundancy and obsolescence keep the newer one.
/// A contradiction resolves itself only when the newer record is more than
/// the configured days younger, or one side is clearly more confident; the
/// age rule is checked first. Otherwise the more confident side (newer on a
/// tie) is only recommended.
pub fn recommend(
    kind: ConflictKind,
    a: &MemoryRecord,
    b: &MemoryRecord,
    config: &ConflictConfig,
) -> (bool, ResolutionAction) {
    match kind {
        ConflictKind::Redundancy | ConflictKind::Obsolescence => (true, ResolutionAction::KeepB),
        ConflictKind::Contradiction => {
            let more_confident = if a.confidence > b.confidence {
                ResolutionAction::KeepA
            } else {
                ResolutionAction::KeepB
            };

            if gap_days(a, b).is_some_and(|d| d > config.contradiction_age_gap_days) {
                (true, ResolutionAction::KeepB)
            } else if (a.confidence - b.confidence).abs() > config.contradiction_confidence_gap {
                (true, more_confident)
            } else {
                (false, more_confident)
            }
        }
    }
}

/// Apply an action to a conflict in one transaction.
///
/// `automatic` marks execution by maintenance policy; the outcome state is
/// then `AutoResolved`, otherwise `Resolved` (or `Deferred`).
pub fn apply(
    store: &SqliteMemoryStore,
    conflict: &ConflictRecord,
    action: &ResolutionAction,
    automatic: bool,
) -> Result<ResolutionOutcome> {
    let (from, to) = match (automatic, action) {
        (true, _) => (ConflictState::Detected, ConflictState::AutoResolved),
        (false, ResolutionAction::Defer) => (ConflictState::PendingUser, ConflictState::Deferred),
        (false, _) => (ConflictState::PendingUser, ConflictState::Resolved),
    };
    if !from.can_transition_to(to) || (automatic && *action == ResolutionAction::Defer) {
        return Err(Error::Internal(format!(
            "cannot {} conflict {} automatically",
            action.name(),
            conflict.id
        )));
    }

    let a = &conflict.record_a;
    let b = &conflict.record_b;
    let reason = format!("{} {} ({})", action.name(), conflict.id, conflict.kind);

    let (deleted, inserted) = match action {
        ResolutionAction::KeepA => {
            store.replace(std::slice::from_ref(b), None, &reason)?;
            (vec![b.clone()], None)
        }
        ResolutionAction::KeepB => {
            store.replace(std::slice::from_ref(a), None, &reason)?;
            (vec![a.clone()], None)
        }
        ResolutionAction::DeleteBoth => {
            let both = [a.clone(), b.clone()];
            store.replace(&both, None, &reason)?;
            (both.to_vec(), None)
        }
        ResolutionAction::Merge { content } => {
            if content.trim().is_empty() {
                return Err(Error::Merge(format!(
                    "empty merge content for conflict {}",
                    conflict.id
                )));
            }
            let merged = merge_records(&store.get(a)?, &store.get(b)?, content);
            let both = [a.clone(), b.clone()];
            store.replace(&both, Some(&merged), &reason)?;
            (both.to_vec(), Some(merged.id))
        }
        ResolutionAction::KeepBoth => {
            store.acknowledge_pair(a, b)?;
            (Vec::new(), None)
        }
        ResolutionAction::Defer => (Vec::new(), None),
    };

    info!(
        conflict = %conflict.id,
        action = action.name(),
        deleted = deleted.len(),
        automatic,
        "resolved conflict"
    );

    Ok(ResolutionOutcome {
        conflict_id: conflict.id.clone(),
        action: action.name().to_string(),
        state: to,
        deleted,
        inserted,
    })
}

/// Build the replacement for a merged pair.
///
/// Scope and category come from the originals, or from the more confident
/// one (newer on a tie) when they differ. Confidence and priority take the
/// maximum, evidence the union.
pub fn merge_records(a: &MemoryRecord, b: &MemoryRecord, content: &str) -> MemoryRecord {
    let dominant = if a.confidence > b.confidence { a } else { b };

    let mut merged = MemoryRecord::new(
        content.trim(),
        dominant.category,
        dominant.scope.clone(),
    )
    .with_confidence(a.confidence.max(b.confidence));

    let mut evidence = a.evidence();
    for item in b.evidence() {
        if !evidence.contains(&item) {
            evidence.push(item);
        }
    }
    if !evidence.is_empty() {
        merged = merged.with_evidence(evidence);
    }

    let priority = match (a.priority(), b.priority()) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    };
    if let Some(p) = priority {
        merged = merged.with_metadata(meta::PRIORITY, p);
    }
    if a.metadata.contains_key(meta::FREQUENCY) || b.metadata.contains_key(meta::FREQUENCY) {
        merged = merged.with_frequency(a.observed_frequency().max(b.observed_frequency()));
    }

    merged.with_metadata(
        meta::MERGED_FROM,
        Value::from(vec![a.id.to_string(), b.id.to_string()]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::types::{ConflictId, Severity};
    use crate::memory::{Category, Scope};
    use chrono::{Duration, Utc};

    fn conflict(a: &MemoryRecord, b: &MemoryRecord, kind: ConflictKind) -> ConflictRecord {
        ConflictRecord {
            id: ConflictId::derive(kind, &a.id, &b.id),
            record_a: a.id.clone(),
            record_b: b.id.clone(),
            kind,
            similarity: 0.5,
            severity: Severity::Medium,
            auto_resolvable: false,
            recommended: ResolutionAction::KeepB,
            preview_a: a.content.clone(),
            preview_b: b.content.clone(),
            description: String::new(),
        }
    }

    fn pair(store: &SqliteMemoryStore) -> (MemoryRecord, MemoryRecord) {
        let now = Utc::now();
        let a = MemoryRecord::new("Use tabs", Category::Preference, Scope::language("go"))
            .with_confidence(0.6)
            .with_created_at(now - Duration::days(10))
            .with_evidence(vec!["s1".into()]);
        let b = MemoryRecord::new("Avoid tabs", Category::Preference, Scope::language("go"))
            .with_confidence(0.7)
            .with_metadata(meta::PRIORITY, 2.0)
            .with_evidence(vec!["s1".into(), "s2".into()]);
        store.insert_batch(&[a.clone(), b.clone()]).unwrap();
        (a, b)
    }

    #[test]
    fn test_recommend_contradiction_rules() {
        let now = Utc::now();
        let config = ConflictConfig::default();
        let old = |c: f64, days: i64| {
            MemoryRecord::new("x", Category::Rule, Scope::Universal)
                .with_confidence(c)
                .with_created_at(now - Duration::days(days))
        };

        // Age gap wins first, even against a more confident older record.
        let (auto, action) =
            recommend(ConflictKind::Contradiction, &old(0.9, 45), &old(0.5, 0), &config);
        assert!(auto);
        assert_eq!(action, ResolutionAction::KeepB);

        let (auto, action) =
            recommend(ConflictKind::Contradiction, &old(0.9, 5), &old(0.5, 0), &config);
        assert!(auto);
        assert_eq!(action, ResolutionAction::KeepA);

        let (auto, action) =
            recommend(ConflictKind::Contradiction, &old(0.6, 5), &old(0.7, 0), &config);
        assert!(!auto);
        assert_eq!(action, ResolutionAction::KeepB);

        assert!(recommend(ConflictKind::Redundancy, &old(0.6, 5), &old(0.7, 0), &config).0);
    }

    #[test]
    fn test_keep_a_deletes_b() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let (a, b) = pair(&store);
        let outcome = apply(&store, &conflict(&a, &b, ConflictKind::Contradiction), &ResolutionAction::KeepA, false).unwrap();

        assert_eq!(outcome.state, ConflictState::Resolved);
        assert_eq!(outcome.deleted, vec![b.id.clone()]);
        assert!(store.get(&a.id).is_ok());
        assert!(matches!(store.get(&b.id), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_merge_inherits_from_originals() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let (a, b) = pair(&store);
        let action = ResolutionAction::Merge {
            content: "Use spaces; tabs only in Makefiles".to_string(),
        };
        let outcome = apply(&store, &conflict(&a, &b, ConflictKind::Contradiction), &action, false).unwrap();

        let merged = store.get(&outcome.inserted.unwrap()).unwrap();
        assert_eq!(merged.content, "Use spaces; tabs only in Makefiles");
        assert_eq!(merged.scope, Scope::language("go"));
        assert_eq!(merged.category, Category::Preference);
        assert_eq!(merged.confidence, 0.7);
        assert_eq!(merged.priority(), Some(2.0));
        assert_eq!(merged.evidence(), vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(store.list_active().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_merge_leaves_originals() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let (a, b) = pair(&store);
        let action = ResolutionAction::Merge {
            content: "   ".to_string(),
        };
        let err = apply(&store, &conflict(&a, &b, ConflictKind::Contradiction), &action, false).unwrap_err();

        assert!(matches!(err, Error::Merge(_)));
        assert!(store.get(&a.id).is_ok());
        assert!(store.get(&b.id).is_ok());
    }

    #[test]
    fn test_missing_record_rolls_back() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let (a, b) = pair(&store);
        let c = conflict(&a, &b, ConflictKind::Redundancy);
        store.delete(&b.id).unwrap();

        let err = apply(&store, &c, &ResolutionAction::DeleteBoth, false).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(store.get(&a.id).is_ok());
    }

    #[test]
    fn test_keep_both_acknowledges() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let (a, b) = pair(&store);
        let outcome = apply(&store, &conflict(&a, &b, ConflictKind::Contradiction), &ResolutionAction::KeepBoth, false).unwrap();

        assert!(outcome.deleted.is_empty());
        assert_eq!(store.list_active().unwrap().len(), 2);
        assert!(store
            .acknowledged_pairs()
            .unwrap()
            .contains(&crate::memory::pair_key(&a.id, &b.id)));
    }

    #[test]
    fn test_defer_is_noop() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let (a, b) = pair(&store);
        let c = conflict(&a, &b, ConflictKind::Contradiction);

        let outcome = apply(&store, &c, &ResolutionAction::Defer, false).unwrap();
        assert_eq!(outcome.state, ConflictState::Deferred);
        assert_eq!(store.list_active().unwrap().len(), 2);

        assert!(apply(&store, &c, &ResolutionAction::Defer, true).is_err());
    }
}
