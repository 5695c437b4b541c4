//! Engine configuration.
//!
//! Everything has a default; a JSON file can override any subset:
//!
//! ```json
//! {
//!   "database_path": "~/.agent/memory.db",
//!   "budget": { "total": 2000, "universal": 900, "language": 700, "project": 400 },
//!   "conflict": { "redundancy_threshold": 0.9 }
//! }
//! ```

use crate::error::{Error, Result};
use crate::retrieval::TierBudget;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Thresholds for conflict detection and auto-resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Similarity above which two records are redundant
    pub redundancy_threshold: f64,
    /// Minimum share of the smaller keyword set two records must share to be on the same topic
    pub topic_overlap: f64,
    /// Age gap (days) beyond which the newer side of a contradiction wins
    pub contradiction_age_gap_days: i64,
    /// Confidence gap beyond which the more confident side of a contradiction wins
    pub contradiction_confidence_gap: f64,
    /// Age gap (days) required before phrasing alone marks a record obsolete
    pub obsolescence_min_gap_days: i64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            redundancy_threshold: 0.85,
            topic_overlap: 0.3,
            contradiction_age_gap_days: 30,
            contradiction_confidence_gap: 0.2,
            obsolescence_min_gap_days: 30,
        }
    }
}

impl ConflictConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("redundancy_threshold", self.redundancy_threshold),
            ("topic_overlap", self.topic_overlap),
            ("contradiction_confidence_gap", self.contradiction_confidence_gap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be within [0, 1]", name)));
            }
        }
        if self.contradiction_age_gap_days < 0 || self.obsolescence_min_gap_days < 0 {
            return Err(Error::Config("day gaps must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite file; `~` and environment variables are expanded
    pub database_path: String,
    pub budget: TierBudget,
    pub conflict: ConflictConfig,
    /// Rows read per statement while gathering retrieval candidates
    pub retrieval_page_size: usize,
    /// Archive records never read for this many days (and below 0.5
    /// confidence) during maintenance. Off when None.
    pub archive_after_days: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "~/.agent-memory/memory.db".to_string(),
            budget: TierBudget::default(),
            conflict: ConflictConfig::default(),
            retrieval_page_size: 200,
            archive_after_days: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file, filling unset fields with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.budget.validate()?;
        self.conflict.validate()?;
        if self.retrieval_page_size == 0 {
            return Err(Error::Config(
                "retrieval_page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Database path with `~` and `$VARS` expanded.
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.database_path)
            .map_err(|e| Error::Config(format!("cannot expand database path: {}", e)))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = EngineConfig::from_json(
            r#"{"conflict": {"redundancy_threshold": 0.9}, "archive_after_days": 120}"#,
        )
        .unwrap();
        assert_eq!(config.conflict.redundancy_threshold, 0.9);
        assert_eq!(config.conflict.contradiction_age_gap_days, 30);
        assert_eq!(config.archive_after_days, Some(120));
        assert_eq!(config.budget, TierBudget::default());
    }

    #[test]
    fn test_budget_must_sum_to_total() {
        let err = EngineConfig::from_json(
            r#"{"budget": {"total": 1500, "universal": 700, "language": 500, "project": 100}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_out_of_range_threshold() {
        let err = EngineConfig::from_json(r#"{"conflict": {"topic_overlap": 1.5}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"retrieval_page_size": 50}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.retrieval_page_size, 50);
    }

    #[test]
    fn test_tilde_expansion() {
        let config = EngineConfig {
            database_path: "/tmp/memory.db".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(
            config.resolved_database_path().unwrap(),
            PathBuf::from("/tmp/memory.db")
        );

        let home = EngineConfig::default().resolved_database_path().unwrap();
        assert!(!home.to_string_lossy().starts_with('~'));
    }
}
