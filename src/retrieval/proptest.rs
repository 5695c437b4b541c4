//! Property-based tests for scoring and budgeting.
//!
//! - Scores stay within [0, 1] for any well-formed record and context
//! - No tier ever receives more content than its budget
//! - Allocation is deterministic for identical input
