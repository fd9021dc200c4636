//! Keyword extraction from free-text justifications

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Punctuation stripped before splitting. Characters are deleted, not
/// replaced, so `don't` becomes `dont`.
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[.,/#!$%^&*;:{}=\-_`~()'"?]"#).expect("punctuation pattern is valid")
});

/// Minimum keyword length in characters
pub const MIN_KEYWORD_LEN: usize = 3;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "has", "have", "had",
        "in", "on", "at", "by", "for", "with", "of", "to", "from", "as", "it", "its", "which",
        "that", "this", "these", "those", "must", "should", "would", "could", "can", "will",
        "what", "when", "where", "who", "why", "how", "do", "does", "did", "not", "no", "yes",
        "be", "been", "being", "about", "just", "only", "so", "then", "than", "them", "they",
        "i", "me", "my", "you", "your", "we", "our", "us",
    ]
    .into_iter()
    .collect()
});

/// Whether `word` (already lowercased) is ignored as a stop word
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Extract unique keywords from `text`, in order of first appearance
pub fn generate_keywords(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");

    let mut seen = HashSet::new();
    stripped
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN && !is_stop_word(word))
        .filter(|word| seen.insert(*word))
        .map(str::to_string)
        .collect()
}

/// Normalize a stored or submitted keyword for comparison
pub fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_keywords() {
        assert!(generate_keywords("").is_empty());
        assert!(generate_keywords("   ").is_empty());
    }

    #[test]
    fn strips_stop_words_and_short_words() {
        let kws = generate_keywords("The list is a mutable sequence of items in Python");
        assert_eq!(kws, vec!["list", "mutable", "sequence", "items", "python"]);
    }

    #[test]
    fn punctuation_is_deleted_not_replaced() {
        let kws = generate_keywords("Don't re-assign; use dict.get()!");
        assert_eq!(kws, vec!["dont", "reassign", "use", "dictget"]);
    }

    #[test]
    fn keeps_first_occurrence_order_without_duplicates() {
        let kws = generate_keywords("Loop, LOOP and loop again: iteration loop");
        assert_eq!(kws, vec!["loop", "again", "iteration"]);
    }

    #[test]
    fn characters_outside_the_set_are_kept() {
        // '[' and '+' are not in the stripped set
        let kws = generate_keywords("use [slice] c++ syntax");
        assert_eq!(kws, vec!["use", "[slice]", "c++", "syntax"]);
    }

    #[test]
    fn comma_separated_lists_collapse() {
        // Model output is a comma-separated string; commas vanish and words join
        // only when there is no space after the comma.
        let kws = generate_keywords("tuple, immutable, hashable");
        assert_eq!(kws, vec!["tuple", "immutable", "hashable"]);
    }

    #[test]
    fn normalizes_keywords() {
        assert_eq!(normalize_keyword("  Recursion "), "recursion");
    }
}
