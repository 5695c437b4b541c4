//! Match snippets for search hits.

/// Characters kept before the match.
const BEFORE: usize = 30;
/// Characters kept after the end of the match.
const AFTER: usize = 50;
/// Length of the fallback snippet.
const FALLBACK: usize = 100;

const ELLIPSIS: &str = "...";

/// Extract the text around the first case-insensitive occurrence of `word`.
///
/// Falls back to the first 100 characters when there is no word or no match.
pub fn extract_snippet(content: &str, word: Option<&str>) -> String {
    let found = word
        .filter(|w| !w.is_empty())
        .and_then(|w| find_case_insensitive(content, w).map(|pos| (pos, w.len())));

    let Some((pos, len)) = found else {
        return fallback(content);
    };

    let start = floor_boundary(content, pos.saturating_sub(BEFORE));
    let end = ceil_boundary(content, (pos + len + AFTER).min(content.len()));

    let mut snippet = String::with_capacity(end - start + 2 * ELLIPSIS.len());
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.push_str(&content[start..end]);
    if end < content.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

fn fallback(content: &str) -> String {
    match content.char_indices().nth(FALLBACK) {
        Some((cut, _)) => format!("{}{}", &content[..cut], ELLIPSIS),
        None => content.to_string(),
    }
}

/// Byte offset of the first ASCII-case-insensitive match.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    // ASCII lowering keeps byte offsets aligned with the original text.
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_match_has_no_ellipsis() {
        assert_eq!(
            extract_snippet("Use tabs for indentation", Some("TABS")),
            "Use tabs for indentation"
        );
    }

    #[test]
    fn test_long_content_is_windowed() {
        let content = format!("{}needle{}", "a".repeat(40), "b".repeat(80));
        let snippet = extract_snippet(&content, Some("needle"));

        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        let body = &snippet[3..snippet.len() - 3];
        assert_eq!(body, format!("{}needle{}", "a".repeat(30), "b".repeat(50)));
    }

    #[test]
    fn test_no_match_falls_back() {
        let content = "x".repeat(150);
        let snippet = extract_snippet(&content, Some("missing"));
        assert_eq!(snippet, format!("{}...", "x".repeat(100)));

        assert_eq!(extract_snippet("short", None), "short");
    }

    #[test]
    fn test_multibyte_boundaries() {
        let content = format!("{}tabs{}", "é".repeat(40), "ü".repeat(60));
        let snippet = extract_snippet(&content, Some("tabs"));
        assert!(snippet.contains("tabs"));
    }
}
