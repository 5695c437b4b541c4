//! Search query and result types.

use crate::memory::{Category, MemoryRecord, ScopePattern};
use serde::{Deserialize, Serialize};

/// Default number of hits when a caller does not set a limit.
pub const DEFAULT_LIMIT: usize = 20;

/// Sort order used when a query carries no text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Full-text rank with text; confidence then last access without
    #[default]
    Relevance,
    /// Newest first
    Recency,
    /// Most confident first
    Confidence,
}

/// A search request. Every query carries an explicit limit.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub scope: Option<ScopePattern>,
    pub category: Option<Category>,
    pub min_confidence: Option<f64>,
    pub limit: usize,
    /// Rows skipped before the first hit
    pub offset: usize,
    pub order_by: OrderBy,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            scope: None,
            category: None,
            min_confidence: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            order_by: OrderBy::default(),
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full-text query.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn scope(mut self, pattern: ScopePattern) -> Self {
        self.scope = Some(pattern);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    /// Query words as FTS5 terms: quoted and OR-joined.
    ///
    /// Returns None when the text has no searchable words.
    pub(crate) fn fts_expression(&self) -> Option<String> {
        let terms: Vec<String> = query_words(self.text.as_deref()?)
            .map(|w| format!("\"{}\"", w))
            .collect();
        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" OR "))
        }
    }

    /// First searchable word, used to anchor snippets.
    pub(crate) fn first_word(&self) -> Option<String> {
        query_words(self.text.as_deref()?).next()
    }
}

fn query_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
}

/// One ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: MemoryRecord,
    /// Normalized relevance in [0.1, 1.0]; 0.5 when no rank is available
    pub relevance: f64,
    pub snippet: String,
}
