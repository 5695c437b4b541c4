//! One-time import from the legacy flat-file format.
//!
//! The legacy file holds one JSON object per line:
//!
//! ```text
//! {"content": "Prefer early returns", "category": "preference", "scope": "language:go",
//!  "confidence": 0.8, "created_at": "2024-03-01T12:00:00Z", "evidence": ["..."]}
//! ```
//!
//! Only `content` and `scope` are required. The file is read, never written,
//! and a given file content is imported at most once.

use crate::error::Result;
use crate::memory::scope::Scope;
use crate::memory::store::{insert_row, log_event, timestamp, RecordRow, SqliteMemoryStore};
use crate::memory::types::{Category, MemoryRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    #[serde(alias = "rule")]
    content: String,
    scope: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    evidence: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

/// Outcome of a legacy import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Lines that failed to parse or validate; never persisted
    pub rejected: usize,
    /// The same file content was imported before
    pub already_imported: bool,
}

impl LegacyEntry {
    fn into_record(self) -> Result<MemoryRecord> {
        let scope = Scope::parse(&self.scope)?;
        let category = match self.category.as_deref() {
            Some(c) => Category::parse(c)?,
            None => Category::Rule,
        };
        let mut record =
            MemoryRecord::new(self.content, category, scope).with_confidence(self.confidence);
        record.created_at = self.created_at;
        if !self.evidence.is_empty() {
            record = record.with_evidence(self.evidence);
        }
        record.validate()?;
        Ok(record)
    }
}

impl SqliteMemoryStore {
    /// Import a legacy JSON Lines file once.
    pub fn import_legacy(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let fingerprint = format!("{:x}", Sha256::digest(&bytes));
        let text = String::from_utf8_lossy(&bytes);

        let mut report = ImportReport::default();
        let mut rows = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<LegacyEntry>(line)
                .map_err(Into::into)
                .and_then(LegacyEntry::into_record);
            match parsed {
                Ok(record) => {
                    let row = RecordRow::encode(&record)?;
                    rows.push((record, row));
                }
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping legacy entry");
                    report.rejected += 1;
                }
            }
        }

        let source = path.display().to_string();
        let imported = self.with_tx(|conn| {
            let seen: Option<String> = conn
                .query_row(
                    "SELECT fingerprint FROM legacy_imports WHERE fingerprint = ?1",
                    params![fingerprint],
                    |row| row.get(0),
                )
                .optional()?;
            if seen.is_some() {
                return Ok(None);
            }

            for (record, row) in &rows {
                insert_row(conn, row)?;
                log_event(conn, &record.id, "import", Some(source.as_str()))?;
            }
            conn.execute(
                "INSERT INTO legacy_imports (fingerprint, source_path, imported, imported_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![fingerprint, source, rows.len() as i64, timestamp(Utc::now())],
            )?;
            Ok(Some(rows.len()))
        })?;

        match imported {
            Some(n) => {
                report.imported = n;
                info!(path = %source, imported = n, rejected = report.rejected, "imported legacy memory");
            }
            None => {
                report.already_imported = true;
                report.rejected = 0;
                info!(path = %source, "legacy file already imported");
            }
        }
        Ok(report)
    }
}
