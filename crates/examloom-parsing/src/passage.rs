//! Passage cleanup and paragraph formatting.
//!
//! PDF extraction leaves typographic ligatures, end-of-line hyphenation and
//! ragged line breaks in the text. Cleanup expands the ligatures, rejoins
//! words split across lines and then splits on blank lines into trimmed
//! paragraphs with single-spaced interiors.

use once_cell::sync::Lazy;
use regex::Regex;

static PARAGRAPH_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

static EOL_HYPHEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-[ \t]*\n[ \t]*(\p{L}\w*)").unwrap());

/// Expands the Unicode typographic ligatures PDF fonts commonly emit.
fn expand_ligatures(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace('\u{FB05}', "st")
        .replace('\u{FB06}', "st")
}

/// Rejoins words hyphenated across a line break. The hyphen is kept when
/// the continuation starts with a capital, which marks a real compound
/// ("non-European") rather than a printer's break.
fn rejoin_hyphenation(text: &str) -> String {
    EOL_HYPHEN_RE
        .replace_all(text, |caps: &regex::Captures| {
            let before = &caps[1];
            let after = &caps[2];
            if after.chars().next().is_some_and(char::is_uppercase) {
                format!("{before}-{after}")
            } else {
                format!("{before}{after}")
            }
        })
        .into_owned()
}

/// Cleans a passage and splits it into paragraphs.
///
/// Paragraph boundaries are runs of two or more linebreaks. Each paragraph
/// is trimmed and its internal whitespace collapsed to single spaces; empty
/// paragraphs are dropped.
pub fn format_passage(text: &str) -> Vec<String> {
    let cleaned = rejoin_hyphenation(&expand_ligatures(text));
    PARAGRAPH_SPLIT_RE
        .split(&cleaned)
        .map(|paragraph| {
            paragraph
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}
