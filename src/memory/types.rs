//! Record types for the rule memory.

use crate::error::{Error, Result};
use crate::memory::scope::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a memory record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string.
    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of behavioral rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Preference,
    Rule,
    Correction,
    Decision,
    Pattern,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Preference,
        Category::Rule,
        Category::Correction,
        Category::Decision,
        Category::Pattern,
    ];

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "preference" => Ok(Self::Preference),
            "rule" => Ok(Self::Rule),
            "correction" => Ok(Self::Correction),
            "decision" => Ok(Self::Decision),
            "pattern" => Ok(Self::Pattern),
            other => Err(Error::InvalidCategory(other.to_string())),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preference => write!(f, "preference"),
            Self::Rule => write!(f, "rule"),
            Self::Correction => write!(f, "correction"),
            Self::Decision => write!(f, "decision"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// Whether a record takes part in retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    /// Kept for audit, never retrieved
    Archived,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Well-known metadata keys.
pub mod meta {
    pub const RATIONALE: &str = "rationale";
    pub const EVIDENCE: &str = "evidence";
    pub const FREQUENCY: &str = "frequency";
    pub const SUPERSEDES: &str = "supersedes";
    pub const PRIORITY: &str = "priority";
    pub const MERGED_FROM: &str = "merged_from";
}

/// A stored behavioral rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub content: String,
    pub category: Category,
    pub scope: Scope,
    pub confidence: f64,
    pub status: RecordStatus,
    /// None only for imported rows whose timestamp could not be read
    pub created_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub metadata: HashMap<String, Value>,
}

impl MemoryRecord {
    /// Create a new active record created now.
    pub fn new(content: impl Into<String>, category: Category, scope: Scope) -> Self {
        Self {
            id: RecordId::new(),
            content: content.into(),
            category,
            scope,
            confidence: 1.0,
            status: RecordStatus::Active,
            created_at: Some(Utc::now()),
            last_accessed_at: None,
            access_count: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_evidence(self, evidence: Vec<String>) -> Self {
        self.with_metadata(meta::EVIDENCE, evidence)
    }

    pub fn with_frequency(self, frequency: u64) -> Self {
        self.with_metadata(meta::FREQUENCY, frequency)
    }

    pub fn with_rationale(self, rationale: impl Into<String>) -> Self {
        self.with_metadata(meta::RATIONALE, rationale.into())
    }

    pub fn superseding(self, older: &RecordId) -> Self {
        self.with_metadata(meta::SUPERSEDES, older.to_string())
    }

    /// Reject records that must never be persisted.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidConfidence {
                value: self.confidence,
            });
        }
        self.scope.validate()
    }

    pub fn rationale(&self) -> Option<&str> {
        self.metadata.get(meta::RATIONALE).and_then(Value::as_str)
    }

    pub fn evidence(&self) -> Vec<String> {
        self.metadata
            .get(meta::EVIDENCE)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// How many times the rule was observed: explicit frequency, else the
    /// evidence count, else one.
    pub fn observed_frequency(&self) -> u64 {
        if let Some(n) = self.metadata.get(meta::FREQUENCY).and_then(Value::as_u64) {
            return n;
        }
        (self.evidence().len() as u64).max(1)
    }

    pub fn supersedes(&self) -> Option<RecordId> {
        self.metadata
            .get(meta::SUPERSEDES)
            .and_then(Value::as_str)
            .and_then(|s| RecordId::parse(s).ok())
    }

    pub fn priority(&self) -> Option<f64> {
        self.metadata.get(meta::PRIORITY).and_then(Value::as_f64)
    }

    /// Age in whole days at `now`, if the creation time is known.
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.created_at.map(|t| (now - t).num_days())
    }

    /// Budget cost of the content in size-estimate units (~4 bytes each).
    pub fn size_estimate(&self) -> usize {
        size_estimate(&self.content)
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

/// Approximate size units for a piece of text.
pub fn size_estimate(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// A proposed memory handed over by the external approval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub content: String,
    pub category: Category,
    pub scope: String,
    pub confidence: f64,
    #[serde(default)]
    pub source_evidence: Vec<String>,
}

impl Proposal {
    /// Validate and convert into a fresh record.
    pub fn into_record(self) -> Result<MemoryRecord> {
        let scope = Scope::parse(&self.scope)?;
        let mut record = MemoryRecord::new(self.content, self.category, scope)
            .with_confidence(self.confidence);
        if !self.source_evidence.is_empty() {
            record = record.with_evidence(self.source_evidence);
        }
        record.validate()?;
        Ok(record)
    }
}
