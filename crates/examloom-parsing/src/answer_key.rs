//! Parses the printed answer key region line by line.
//!
//! A key line is a question number, an optional separator and the answer
//! text: "7. technology", "12) B", "3 NOT GIVEN". Lines that do not fit are
//! skipped, not guessed at; a later reconciliation default covers the gap.

use once_cell::sync::Lazy;
use regex::Regex;

use examloom_core::AnswerKey;

static KEY_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,3})\s*[.):\-]?\s+(.+)$").unwrap());

/// Parses every recognizable line of the key region. Duplicate question
/// numbers keep the first entry.
pub fn parse_answer_key(region: &str) -> AnswerKey {
    let mut key = AnswerKey::new();
    for line in region.lines() {
        let Some(caps) = KEY_LINE_RE.captures(line) else {
            if !line.trim().is_empty() {
                tracing::debug!(line = %line.trim(), "skipping unrecognized answer key line");
            }
            continue;
        };
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        if !key.insert(number, &caps[2]) {
            tracing::debug!(number, "duplicate answer key number, keeping first entry");
        }
    }
    key
}
