//! Locates the passage excerpt most likely to ground a question.
//!
//! Scoring is plain distinct-term overlap: the question's significant words
//! against each paragraph's words. No embeddings, no fuzz; exam passages
//! are short enough that lexical overlap finds the right paragraph when the
//! question genuinely quotes or paraphrases it, and the first paragraph is
//! an honest fallback when it does not.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9']+").unwrap());
static PARAGRAPH_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Words too common to tell paragraphs apart, plus the exam-prompt
/// vocabulary that appears in nearly every question.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
        "one", "our", "out", "has", "his", "him", "she", "its", "who", "does", "did", "get",
        "this", "that", "with", "from", "they", "them", "then", "than", "these", "those",
        "there", "their", "what", "when", "where", "which", "while", "will", "would", "could",
        "should", "into", "onto", "over", "under", "about", "above", "below", "between",
        "because", "been", "being", "have", "having", "were", "more", "most", "some", "such",
        "only", "other", "others", "each", "every", "many", "much", "how", "why", "also",
        "after", "before", "during", "both", "any", "may", "might", "must", "shall",
        // Exam-prompt vocabulary.
        "according", "passage", "paragraph", "writer", "author", "statement", "statements",
        "following", "choose", "correct", "answer", "answers", "question", "questions",
        "complete", "sentence", "sentences", "word", "words", "true", "false", "given",
        "agree", "information", "mentioned",
    ]
    .into_iter()
    .collect()
});

/// Shorter snippets are padded with neighboring paragraphs up to roughly
/// this many characters.
const MIN_SNIPPET_CHARS: usize = 200;

/// Lower-cased words of `text` that are long enough and not stop words.
pub fn significant_words(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(w.as_str()))
        .collect()
}

/// Returns the passage excerpt that best matches `question`.
///
/// Never returns an empty string for a non-empty passage: with no overlap
/// anywhere the first paragraph wins, and short winners are extended with
/// surrounding paragraphs.
pub fn locate_snippet(question: &str, full_text: &str) -> String {
    let paragraphs: Vec<&str> = PARAGRAPH_SPLIT_RE
        .split(full_text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.is_empty() {
        let trimmed = full_text.trim();
        if trimmed.is_empty() {
            // Whitespace-only text has nothing better to offer than itself.
            return full_text.to_string();
        }
        return trimmed.to_string();
    }

    let terms = significant_words(question);
    let term_set: HashSet<&str> = terms.iter().map(String::as_str).collect();

    let mut best_index = 0;
    let mut best_score = 0;
    for (index, paragraph) in paragraphs.iter().enumerate() {
        let score = overlap_score(paragraph, &term_set);
        // Strictly greater keeps the earliest paragraph on ties.
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }
    expand_window(&paragraphs, best_index)
}

/// How many distinct question terms appear in the paragraph.
fn overlap_score(paragraph: &str, terms: &HashSet<&str>) -> usize {
    if terms.is_empty() {
        return 0;
    }
    let paragraph_words: HashSet<String> = WORD_RE
        .find_iter(paragraph)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    terms
        .iter()
        .filter(|t| paragraph_words.contains(**t))
        .count()
}

fn expand_window(paragraphs: &[&str], center: usize) -> String {
    let mut low = center;
    let mut high = center;
    let mut length = paragraphs[center].len();
    while length < MIN_SNIPPET_CHARS {
        if high + 1 < paragraphs.len() {
            high += 1;
            length += paragraphs[high].len();
        } else if low > 0 {
            low -= 1;
            length += paragraphs[low].len();
        } else {
            break;
        }
    }
    paragraphs[low..=high].join("\n\n")
}
