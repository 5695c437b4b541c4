//! Error types for rule-memory.

use thiserror::Error;

/// Result type alias using rule-memory's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during memory operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Scope string outside the universal / language / project grammar
    #[error("Invalid scope '{scope}': {reason}")]
    InvalidScope { scope: String, reason: String },

    /// Confidence outside [0, 1]
    #[error("Invalid confidence {value}: must be within [0, 1]")]
    InvalidConfidence { value: f64 },

    /// Unknown record category
    #[error("Invalid category '{0}'")]
    InvalidCategory(String),

    /// No record with the given id
    #[error("Record not found: {id}")]
    NotFound { id: String },

    /// No conflict with the given id in the current store state
    #[error("Conflict not found: {id}")]
    ConflictNotFound { id: String },

    /// Store file locked, corrupted, or cannot be opened
    #[error("Memory store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other storage failure
    #[error("Memory storage error: {0}")]
    Storage(String),

    /// Merge resolution rejected; nothing was deleted
    #[error("Merge error: {0}")]
    Merge(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid scope error.
    pub fn invalid_scope(scope: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidScope {
            scope: scope.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Create a conflict not found error.
    pub fn conflict_not_found(id: impl ToString) -> Self {
        Self::ConflictNotFound { id: id.to_string() }
    }

    /// Whether this is a validation failure rejected before any write.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidScope { .. } | Self::InvalidConfidence { .. } | Self::InvalidCategory(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::CannotOpen,
            ) => Self::StoreUnavailable(err.to_string()),
            _ => Self::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(Error::invalid_scope("lang:go", "unknown tier").is_validation());
        assert!(Error::InvalidConfidence { value: 1.5 }.is_validation());
        assert!(!Error::not_found("abc").is_validation());
    }

    #[test]
    fn test_busy_maps_to_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(matches!(Error::from(err), Error::StoreUnavailable(_)));
    }

    #[test]
    fn test_other_sqlite_errors_map_to_storage() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(Error::from(err), Error::Storage(_)));
    }
}
