//! Text helpers for collaborator output.

use regex::Regex;
use std::sync::LazyLock;

static REFERENCES_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\n\s*(?:###\s*)?references\s*\n").unwrap());
static INLINE_CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());

/// Remove a trailing "References" section and inline `[n]` citations.
pub fn strip_references(text: &str) -> String {
    let body = match REFERENCES_HEADING.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };
    INLINE_CITATION.replace_all(body, "").trim().to_string()
}

/// Split text into pieces of at most `words_per_chunk` whitespace-separated words.
pub fn chunk_words(text: &str, words_per_chunk: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(words_per_chunk.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_references_section() {
        let text = "Apply 2 kg per acre [1].\nRepeat after 20 days [2].\n\n### References\n\n- [1] guide.pdf\n- [2] faq.md\n";
        assert_eq!(
            strip_references(text),
            "Apply 2 kg per acre .\nRepeat after 20 days ."
        );
    }

    #[test]
    fn test_strip_references_plain_heading() {
        let text = "Poshak is a nutrient mix.\nREFERENCES\n[1] catalogue";
        assert_eq!(strip_references(text), "Poshak is a nutrient mix.");
    }

    #[test]
    fn test_strip_references_untouched() {
        assert_eq!(strip_references("  no citations here \n"), "no citations here");
        assert_eq!(strip_references("see references below"), "see references below");
    }

    #[test]
    fn test_chunk_words() {
        let chunks = chunk_words("one two three four five six seven", 3);
        assert_eq!(chunks, vec!["one two three", "four five six", "seven"]);
        assert!(chunk_words("   ", 6).is_empty());
        assert_eq!(chunk_words("a b", 0), vec!["a", "b"]);
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(truncate_with_ellipsis("नमस्ते", 20), "नमस्ते");
        assert_eq!(truncate_with_ellipsis("ab", 2), "ab");
    }
}
