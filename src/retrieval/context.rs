//! Retrieval context: where the agent is currently working.

use crate::memory::{Scope, ScopePattern};
use serde::{Deserialize, Serialize};

/// The session a retrieval is for. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub project: Option<String>,
    pub language: Option<String>,
    pub task: Option<String>,
}

impl RetrievalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Whether a record with this scope applies to the session.
    ///
    /// Task-narrowed project records apply only when the session names the
    /// same task.
    pub fn admits(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Universal => true,
            Scope::Language(lang) => self
                .language
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(lang)),
            Scope::Project { name, task } => {
                self.project.as_deref() == Some(name.as_str())
                    && task
                        .as_deref()
                        .map_or(true, |t| self.task.as_deref() == Some(t))
            }
        }
    }

    /// Exact scope patterns covering every scope this context admits.
    pub fn scope_patterns(&self) -> Vec<ScopePattern> {
        let mut patterns = vec![ScopePattern::exact(&Scope::Universal)];
        if let Some(ref lang) = self.language {
            patterns.push(ScopePattern::exact(&Scope::language(lang.clone())));
        }
        if let Some(ref project) = self.project {
            patterns.push(ScopePattern::exact(&Scope::project(project.clone())));
            if let Some(ref task) = self.task {
                patterns.push(ScopePattern::exact(&Scope::project_task(
                    project.clone(),
                    task.clone(),
                )));
            }
        }
        patterns
    }
}
