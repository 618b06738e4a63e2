//! Keyword ranking, counts and suggestions over extracted text.
//!
//! Everything here is pure and total: any string, including the empty
//! string, produces a complete [`AnalysisResult`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{AnalysisResult, Sentiment};

/// Tokens never reported as keywords.
pub const STOP_WORDS: &[&str] = &[
    "the", "is", "and", "a", "of", "to", "in", "it", "on", "for", "with",
];

/// Maximum number of keywords kept in an analysis.
pub const MAX_KEYWORDS: usize = 10;

/// Number of keywords quoted in the first suggestion.
const SUGGESTED_KEYWORDS: usize = 5;

/// Above this many words the length suggestion recommends summarizing.
pub const LONG_TEXT_WORDS: usize = 500;

const STRUCTURE_SUGGESTION: &str =
    "Use headings, short paragraphs and bullet points to make the structure easier to scan.";
const EXAMPLES_SUGGESTION: &str =
    "Add concrete examples or case studies to support the main points.";

/// Analyze extracted text.
pub fn analyze(text: &str) -> AnalysisResult {
    let word_count = count_words(text);
    let sentence_count = count_sentences(text);
    let keywords = top_keywords(text, MAX_KEYWORDS);
    let suggestions = suggestions(&keywords, word_count);

    AnalysisResult {
        // Placeholder: no sentiment model is applied.
        sentiment: Sentiment::Positive,
        keywords,
        word_count,
        sentence_count,
        suggestions,
    }
}

/// Number of whitespace-separated runs.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of segments between `.`, `!` and `?` that contain anything other
/// than whitespace.
pub fn count_sentences(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|segment| !segment.trim().is_empty())
        .count()
}

/// Lowercased word-character runs, in document order.
pub fn tokenize(text: &str) -> Vec<String> {
    static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// The `limit` most frequent non-stop-word tokens.
///
/// Tokens with equal counts keep the order in which they first appear.
pub fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for token in tokenize(text) {
        if is_stop_word(&token) {
            continue;
        }
        match positions.get(&token) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                positions.insert(token.clone(), counts.len());
                counts.push((token, 1));
            }
        }
    }

    // sort_by is stable, so first-occurrence order survives among ties.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    counts.into_iter().map(|(token, _)| token).collect()
}

/// The four suggestions, in fixed order.
pub fn suggestions(keywords: &[String], word_count: usize) -> Vec<String> {
    let focus = keywords
        .iter()
        .take(SUGGESTED_KEYWORDS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let length = if word_count > LONG_TEXT_WORDS {
        format!(
            "The text is long ({} words). Consider summarizing it into its key points.",
            word_count
        )
    } else {
        format!(
            "The text length ({} words) is appropriate for its content.",
            word_count
        )
    };

    vec![
        format!("Focus on the key topics: {}", focus),
        length,
        STRUCTURE_SUGGESTION.to_string(),
        EXAMPLES_SUGGESTION.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text() {
        let result = analyze("");
        assert_eq!(result.word_count, 0);
        assert_eq!(result.sentence_count, 0);
        assert!(result.keywords.is_empty());
        assert_eq!(result.suggestions.len(), 4);
        assert_eq!(result.suggestions[0], "Focus on the key topics: ");
        assert_eq!(result.sentiment, Sentiment::Positive);
    }

    #[test]
    fn whitespace_only_text() {
        let result = analyze("  \n\t \n");
        assert_eq!(result.word_count, 0);
        assert_eq!(result.sentence_count, 0);
        assert!(result.keywords.is_empty());
    }

    #[test]
    fn ties_keep_first_occurrence_order() {
        assert_eq!(top_keywords("b a b a c", MAX_KEYWORDS), vec!["b", "a", "c"]);
    }

    #[test]
    fn higher_count_wins_over_earlier_occurrence() {
        assert_eq!(
            top_keywords("alpha beta beta gamma beta gamma", MAX_KEYWORDS),
            vec!["beta", "gamma", "alpha"]
        );
    }

    #[test]
    fn stop_words_excluded() {
        assert!(analyze("the the and and").keywords.is_empty());
        assert_eq!(
            top_keywords("The cat is on the mat with a hat", MAX_KEYWORDS),
            vec!["cat", "mat", "hat"]
        );
    }

    #[test]
    fn keywords_are_lowercased_and_merged() {
        assert_eq!(top_keywords("Rust rust RUST go", MAX_KEYWORDS), vec!["rust", "go"]);
    }

    #[test]
    fn keywords_capped_at_ten() {
        let text = (0..25)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let result = analyze(&text);
        assert_eq!(result.keywords.len(), MAX_KEYWORDS);
        assert_eq!(result.keywords[0], "word0");
        assert_eq!(result.keywords[9], "word9");
    }

    #[test]
    fn tokenizer_splits_on_punctuation() {
        assert_eq!(
            tokenize("Hello, world! snake_case 42x"),
            vec!["hello", "world", "snake_case", "42x"]
        );
        assert!(tokenize("... !!! ???").is_empty());
    }

    #[test]
    fn word_count_splits_on_any_whitespace() {
        assert_eq!(count_words("one  two\tthree\nfour "), 4);
        assert_eq!(count_words("Hello world.\nFoo bar baz.\nThe end.\n"), 7);
    }

    #[test]
    fn sentence_count_ignores_blank_segments() {
        assert_eq!(count_sentences("Hello world.\nFoo bar baz.\nThe end.\n"), 3);
        assert_eq!(count_sentences("Really?! Yes. No"), 3);
        assert_eq!(count_sentences("..."), 0);
        assert_eq!(count_sentences("no terminator"), 1);
    }

    #[test]
    fn first_suggestion_quotes_top_five() {
        let result = analyze("one two three four five six seven");
        assert_eq!(
            result.suggestions[0],
            "Focus on the key topics: one, two, three, four, five"
        );
    }

    #[test]
    fn length_suggestion_threshold() {
        let short = suggestions(&[], LONG_TEXT_WORDS);
        assert!(short[1].contains("appropriate"));

        let long = suggestions(&[], LONG_TEXT_WORDS + 1);
        assert!(long[1].contains("summarizing"));
        assert!(long[1].contains("501 words"));
    }

    #[test]
    fn fixed_suggestions_are_constant() {
        let a = analyze("anything at all");
        let b = analyze(&"lorem ipsum ".repeat(400));
        assert_eq!(a.suggestions[2], b.suggestions[2]);
        assert_eq!(a.suggestions[3], b.suggestions[3]);
        assert_eq!(b.suggestions.len(), 4);
    }
}
