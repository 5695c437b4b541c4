//! Render an allocation as prompt-ready text.

use crate::memory::ScopeTier;
use crate::retrieval::budget::Allocation;
use crate::retrieval::context::RetrievalContext;

/// Render selected records grouped by tier.
///
/// Sections appear in fixed order (universal, language, project) and empty
/// sections are omitted. Returns an empty string when nothing was selected.
pub fn render(allocation: &Allocation, context: &RetrievalContext) -> String {
    let mut sections = Vec::new();

    for tier in ScopeTier::ALL {
        let records = allocation.tier(tier);
        if records.is_empty() {
            continue;
        }

        let mut section = heading(tier, context);
        for scored in records {
            section.push_str("\n- ");
            section.push_str(&scored.record.content);
        }
        sections.push(section);
    }

    sections.join("\n\n")
}

fn heading(tier: ScopeTier, context: &RetrievalContext) -> String {
    match tier {
        ScopeTier::Universal => "### Universal Rules".to_string(),
        ScopeTier::Language => format!(
            "### {} Preferences",
            capitalize(context.language.as_deref().unwrap_or("Language"))
        ),
        ScopeTier::Project => format!(
            "### {} Decisions",
            capitalize(context.project.as_deref().unwrap_or("Project"))
        ),
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Category, MemoryRecord, Scope};
    use crate::retrieval::budget::ScoredRecord;
    use pretty_assertions::assert_eq;

    fn pick(allocation: &mut Allocation, content: &str, scope: Scope) {
        allocation
            .selected
            .entry(scope.tier())
            .or_default()
            .push(ScoredRecord {
                record: MemoryRecord::new(content, Category::Rule, scope),
                score: 0.9,
            });
    }

    #[test]
    fn test_render_all_sections_in_order() {
        let ctx = RetrievalContext::new().with_project("acme").with_language("go");
        let mut allocation = Allocation::default();
        pick(&mut allocation, "Wrap errors with context", Scope::language("go"));
        pick(&mut allocation, "Keep summaries short", Scope::Universal);
        pick(&mut allocation, "Deploy on Tuesdays", Scope::project("acme"));
        pick(&mut allocation, "Never commit secrets", Scope::Universal);

        let expected = "### Universal Rules\n\
                        - Keep summaries short\n\
                        - Never commit secrets\n\
                        \n\
                        ### Go Preferences\n\
                        - Wrap errors with context\n\
                        \n\
                        ### Acme Decisions\n\
                        - Deploy on Tuesdays";
        assert_eq!(render(&allocation, &ctx), expected);
    }

    #[test]
    fn test_render_omits_empty_sections() {
        let ctx = RetrievalContext::new().with_project("acme");
        let mut allocation = Allocation::default();
        pick(&mut allocation, "Deploy on Tuesdays", Scope::project("acme"));

        assert_eq!(
            render(&allocation, &ctx),
            "### Acme Decisions\n- Deploy on Tuesdays"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&Allocation::default(), &RetrievalContext::new()), "");
    }
}
