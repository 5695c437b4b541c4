//! Text similarity and topic keywords.

use std::collections::{HashMap, HashSet};

/// A deterministic similarity between two texts in [0, 1].
pub trait TextSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Cosine similarity over term-frequency vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermCosine;

impl TextSimilarity for TermCosine {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let ta = term_frequencies(a);
        let tb = term_frequencies(b);
        if ta.is_empty() || tb.is_empty() {
            return 0.0;
        }

        let dot: f64 = ta
            .iter()
            .filter_map(|(term, &x)| tb.get(term).map(|&y| x * y))
            .sum();
        let norm_a = ta.values().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b = tb.values().map(|x| x * x).sum::<f64>().sqrt();

        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    tf
}

/// Lowercased alphanumeric words longer than two characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| w.len() > 2 && !is_stop_word(w))
        .collect()
}

/// Topic keywords: tokens minus polarity and supersession markers.
pub fn topic_keywords(text: &str) -> HashSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| !is_marker_word(w))
        .collect()
}

/// Share of the smaller keyword set found in the other.
pub fn topic_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the"
            | "and"
            | "for"
            | "are"
            | "but"
            | "you"
            | "all"
            | "can"
            | "was"
            | "one"
            | "our"
            | "with"
            | "this"
            | "that"
            | "from"
            | "they"
            | "will"
            | "have"
            | "has"
            | "been"
            | "when"
            | "into"
            | "than"
            | "then"
            | "them"
            | "only"
            | "its"
            | "also"
            | "each"
            | "which"
            | "their"
            | "there"
            | "these"
            | "those"
            | "should"
            | "would"
            | "could"
    )
}

fn is_marker_word(word: &str) -> bool {
    matches!(
        word,
        "use"
            | "using"
            | "prefer"
            | "always"
            | "keep"
            | "choose"
            | "avoid"
            | "never"
            | "dont"
            | "not"
            | "must"
            | "stop"
            | "longer"
            | "instead"
            | "now"
            | "anymore"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_identical_texts() {
        let s = TermCosine.similarity("Run tests before pushing", "run tests before pushing!");
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_and_empty() {
        assert_eq!(TermCosine.similarity("tabs indentation", "deploy tuesday"), 0.0);
        assert_eq!(TermCosine.similarity("", "anything here"), 0.0);
        assert_eq!(TermCosine.similarity("a an", "of to"), 0.0);
    }

    #[test]
    fn test_similarity_is_symmetric_and_bounded() {
        let a = "Keep summaries short and focused";
        let b = "Keep summaries concise";
        let ab = TermCosine.similarity(a, b);
        assert_eq!(ab, TermCosine.similarity(b, a));
        assert!(ab > 0.0 && ab < 1.0);
    }

    #[test]
    fn test_topic_keywords_drop_markers() {
        assert_eq!(
            topic_keywords("Use tabs for indentation"),
            set(&["tabs", "indentation"])
        );
        assert_eq!(
            topic_keywords("Avoid tabs, use spaces"),
            set(&["tabs", "spaces"])
        );
        assert_eq!(topic_keywords("Don't commit secrets"), set(&["commit", "secrets"]));
    }

    #[test]
    fn test_topic_overlap() {
        let a = set(&["tabs", "indentation"]);
        let b = set(&["tabs", "spaces"]);
        assert_eq!(topic_overlap(&a, &b), 0.5);
        assert_eq!(topic_overlap(&a, &HashSet::new()), 0.0);
        assert_eq!(topic_overlap(&a, &set(&["deploy"])), 0.0);
    }
}
