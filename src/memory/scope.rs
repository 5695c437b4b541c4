//! Three-tier applicability scope and scope patterns.
//!
//! A scope string is exactly one of:
//!
//! - `universal`
//! - `language:<name>`
//! - `project:<name>` or `project:<name>:task:<name>`
//!
//! Names are non-empty and may not contain `:`, `*`, or whitespace.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Applicability tier of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Applies everywhere
    Universal,
    /// Applies when working in the named language
    Language(String),
    /// Applies inside the named project, optionally narrowed to a task
    Project { name: String, task: Option<String> },
}

/// Coarse tier of a scope, used for budgeting and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeTier {
    Universal,
    Language,
    Project,
}

impl ScopeTier {
    /// All tiers in output order.
    pub const ALL: [ScopeTier; 3] = [ScopeTier::Universal, ScopeTier::Language, ScopeTier::Project];
}

impl fmt::Display for ScopeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Universal => write!(f, "universal"),
            Self::Language => write!(f, "language"),
            Self::Project => write!(f, "project"),
        }
    }
}

impl Scope {
    /// Universal scope.
    pub fn universal() -> Self {
        Self::Universal
    }

    /// Language scope. The name is validated on `parse`, not here.
    pub fn language(name: impl Into<String>) -> Self {
        Self::Language(name.into())
    }

    /// Project scope without task narrowing.
    pub fn project(name: impl Into<String>) -> Self {
        Self::Project {
            name: name.into(),
            task: None,
        }
    }

    /// Project scope narrowed to a task.
    pub fn project_task(name: impl Into<String>, task: impl Into<String>) -> Self {
        Self::Project {
            name: name.into(),
            task: Some(task.into()),
        }
    }

    /// Parse a scope string, rejecting anything outside the grammar.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let scope = match parts.as_slice() {
            ["universal"] => Self::Universal,
            ["language", name] => Self::Language(valid_name(s, name)?),
            ["project", name] => Self::Project {
                name: valid_name(s, name)?,
                task: None,
            },
            ["project", name, "task", task] => Self::Project {
                name: valid_name(s, name)?,
                task: Some(valid_name(s, task)?),
            },
            _ => {
                return Err(Error::invalid_scope(
                    s,
                    "expected universal, language:<name>, or project:<name>[:task:<name>]",
                ))
            }
        };
        Ok(scope)
    }

    /// Check that every name component is well formed.
    pub fn validate(&self) -> Result<()> {
        Self::parse(&self.to_string()).map(|_| ())
    }

    /// The tier this scope belongs to.
    pub fn tier(&self) -> ScopeTier {
        match self {
            Self::Universal => ScopeTier::Universal,
            Self::Language(_) => ScopeTier::Language,
            Self::Project { .. } => ScopeTier::Project,
        }
    }

    /// Whether two scopes can ever be active in the same session.
    ///
    /// Universal overlaps everything. Two languages or two projects overlap
    /// only when they name the same thing.
    pub fn overlaps(&self, other: &Scope) -> bool {
        match (self, other) {
            (Self::Universal, _) | (_, Self::Universal) => true,
            (Self::Language(a), Self::Language(b)) => a.eq_ignore_ascii_case(b),
            (Self::Project { name: a, task: ta }, Self::Project { name: b, task: tb }) => {
                a == b
                    && match (ta, tb) {
                        (Some(x), Some(y)) => x == y,
                        _ => true,
                    }
            }
            _ => true,
        }
    }
}

fn valid_name(scope: &str, name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::invalid_scope(scope, "empty name"));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '*') {
        return Err(Error::invalid_scope(
            scope,
            "names may not contain whitespace or '*'",
        ));
    }
    Ok(name.to_string())
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Universal => write!(f, "universal"),
            Self::Language(name) => write!(f, "language:{}", name),
            Self::Project { name, task: None } => write!(f, "project:{}", name),
            Self::Project {
                name,
                task: Some(task),
            } => write!(f, "project:{}:task:{}", name, task),
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Scope::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// An exact scope string or a trailing-wildcard prefix (`project:x*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopePattern {
    Exact(String),
    Prefix(String),
}

impl ScopePattern {
    /// Parse a pattern. Only a single trailing `*` is accepted as a wildcard.
    pub fn parse(pattern: &str) -> Result<Self> {
        match pattern.strip_suffix('*') {
            Some(prefix) if !prefix.contains('*') => Ok(Self::Prefix(prefix.to_string())),
            Some(_) => Err(Error::invalid_scope(
                pattern,
                "only a single trailing '*' is supported",
            )),
            None => {
                Scope::parse(pattern)?;
                Ok(Self::Exact(pattern.to_string()))
            }
        }
    }

    /// Pattern matching exactly one scope.
    pub fn exact(scope: &Scope) -> Self {
        Self::Exact(scope.to_string())
    }

    /// Whether the pattern matches a scope string.
    ///
    /// Exact language patterns ignore ASCII case, like [`Scope::overlaps`].
    pub fn matches(&self, scope: &str) -> bool {
        match self {
            Self::Exact(s) if self.folds_case() => s.eq_ignore_ascii_case(scope),
            Self::Exact(s) => s == scope,
            Self::Prefix(p) => scope.starts_with(p.as_str()),
        }
    }

    fn folds_case(&self) -> bool {
        matches!(self, Self::Exact(s) if s.starts_with("language:"))
    }

    /// SQL fragment and bound value for filtering a `scope` column.
    pub(crate) fn to_sql(&self, column: &str) -> (String, String) {
        match self {
            Self::Exact(s) if self.folds_case() => {
                (format!("LOWER({}) = LOWER(?)", column), s.clone())
            }
            Self::Exact(s) => (format!("{} = ?", column), s.clone()),
            Self::Prefix(p) => (
                format!("{} LIKE ? ESCAPE '\\'", column),
                format!("{}%", escape_like(p)),
            ),
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for ScopePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, "{}", s),
            Self::Prefix(p) => write!(f, "{}*", p),
        }
    }
}
