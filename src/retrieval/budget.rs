//! Per-tier size budget enforcement.
//!
//! Selection within a tier is greedy: candidates are taken in descending
//! score order while they fit, and a candidate that would overflow is
//! skipped without ending the scan. This is not a knapsack optimum; it is
//! deterministic and cheap, and ties keep their input order.

use crate::error::{Error, Result};
use crate::memory::{MemoryRecord, ScopeTier};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default total budget in size-estimate units.
pub const DEFAULT_TOTAL_BUDGET: usize = 1500;

/// A total size budget partitioned across the three scope tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBudget {
    pub total: usize,
    pub universal: usize,
    pub language: usize,
    pub project: usize,
}

impl Default for TierBudget {
    fn default() -> Self {
        Self {
            total: DEFAULT_TOTAL_BUDGET,
            universal: 700,
            language: 500,
            project: 300,
        }
    }
}

impl TierBudget {
    /// Build a budget, rejecting partitions that do not sum to the total.
    pub fn new(total: usize, universal: usize, language: usize, project: usize) -> Result<Self> {
        let budget = Self {
            total,
            universal,
            language,
            project,
        };
        budget.validate()?;
        Ok(budget)
    }

    /// Scale the default 7:5:3 split to `total`.
    ///
    /// Rounding remainder goes to the universal tier, so the parts always sum
    /// to the total. Any total is accepted.
    pub fn split(total: usize) -> Self {
        let base = Self::default();
        let share = |part: usize| (total as u128 * part as u128 / base.total as u128) as usize;
        let language = share(base.language);
        let project = share(base.project);
        Self {
            total,
            universal: total - language - project,
            language,
            project,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let sum = self
            .universal
            .checked_add(self.language)
            .and_then(|s| s.checked_add(self.project));
        match sum {
            Some(sum) if sum == self.total => Ok(()),
            Some(sum) => Err(Error::Config(format!(
                "tier budgets sum to {} but the total is {}",
                sum, self.total
            ))),
            None => Err(Error::Config("tier budgets overflow".to_string())),
        }
    }

    /// Budget for one tier.
    pub fn for_tier(&self, tier: ScopeTier) -> usize {
        match tier {
            ScopeTier::Universal => self.universal,
            ScopeTier::Language => self.language,
            ScopeTier::Project => self.project,
        }
    }
}

/// A record with its relevance score for the current context.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub score: f64,
}

/// Records chosen for each tier, in descending score order.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub selected: HashMap<ScopeTier, Vec<ScoredRecord>>,
    pub used: HashMap<ScopeTier, usize>,
    /// Candidates that did not fit their tier
    pub skipped: usize,
}

impl Allocation {
    /// Selected records of one tier.
    pub fn tier(&self, tier: ScopeTier) -> &[ScoredRecord] {
        self.selected.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn used(&self, tier: ScopeTier) -> usize {
        self.used.get(&tier).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.values().all(Vec::is_empty)
    }

    /// Every selected record, tier by tier.
    pub fn records(&self) -> impl Iterator<Item = &ScoredRecord> {
        ScopeTier::ALL.into_iter().flat_map(move |t| self.tier(t))
    }
}

/// Select the records that fit each tier's budget.
pub fn allocate(scored: Vec<ScoredRecord>, budget: &TierBudget) -> Allocation {
    let mut by_tier: HashMap<ScopeTier, Vec<ScoredRecord>> = HashMap::new();
    for candidate in scored {
        by_tier
            .entry(candidate.record.scope.tier())
            .or_default()
            .push(candidate);
    }

    let mut allocation = Allocation::default();
    for tier in ScopeTier::ALL {
        let mut candidates = by_tier.remove(&tier).unwrap_or_default();
        // Stable sort: equal scores keep their input order.
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let limit = budget.for_tier(tier);
        let mut used = 0;
        let mut chosen = Vec::new();
        for candidate in candidates {
            let size = candidate.record.size_estimate();
            if used + size <= limit {
                used += size;
                chosen.push(candidate);
            } else {
                allocation.skipped += 1;
            }
        }

        allocation.used.insert(tier, used);
        allocation.selected.insert(tier, chosen);
    }
    allocation
}
