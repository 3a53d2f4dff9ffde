//! Segments extracted exam text into parts and an answer-key region.
//!
//! Part headers ("READING PASSAGE 1", "PART 2", "SECTION 3") open a chunk;
//! the first "Questions N-M" header inside a chunk splits it into passage
//! and question regions. An "ANSWERS" or "ANSWER KEY" heading ends the body
//! and starts the key region. Chunks missing either region are skipped with
//! a warning; a document yielding no parts at all is rejected rather than
//! guessed at.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Minimum trimmed document length, in characters, to attempt segmentation.
pub const MIN_DOCUMENT_CHARS: usize = 100;

static PART_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*(?:READING[ \t]+)?(?:PASSAGE|PART|SECTION)[ \t]+\d+[^\n]*$").unwrap()
});

static QUESTIONS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*QUESTIONS?[ \t]+\d+(?:[ \t]*[-\u{2013}\u{2014}][ \t]*\d+)?\b[^\n]*$")
        .unwrap()
});

static ANSWERS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*(?:ANSWER[ \t]+KEY|ANSWERS?)[ \t]*:?[ \t]*$").unwrap()
});

/// One segmented part: everything between two part headers, split at its
/// first questions header.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPart {
    /// 1-based position among the parts that survived segmentation.
    pub ordinal: u32,
    /// The header line, whitespace-collapsed, e.g. "READING PASSAGE 1".
    pub title: String,
    pub passage_text: String,
    pub question_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedExam {
    pub parts: Vec<RawPart>,
    /// Text after the ANSWERS heading, if the document printed a key.
    pub answer_region: Option<String>,
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("document text too short to be an exam ({chars} chars, need {min})")]
    TooShort { chars: usize, min: usize },
    #[error("no passage/question structure found in document")]
    NoParts,
}

pub fn segment_document(text: &str) -> Result<SegmentedExam, SegmentError> {
    let chars = text.trim().chars().count();
    if chars < MIN_DOCUMENT_CHARS {
        return Err(SegmentError::TooShort {
            chars,
            min: MIN_DOCUMENT_CHARS,
        });
    }

    let (body, answer_region) = split_answer_region(text);

    let headers: Vec<regex::Match> = PART_HEADER_RE.find_iter(body).collect();
    if headers.is_empty() {
        return Err(SegmentError::NoParts);
    }

    let mut parts = Vec::new();
    for (index, header) in headers.iter().enumerate() {
        let chunk_start = header.end();
        let chunk_end = headers
            .get(index + 1)
            .map(|next| next.start())
            .unwrap_or(body.len());
        let chunk = &body[chunk_start..chunk_end];
        let title = collapse_whitespace(header.as_str());
        match split_part_regions(chunk) {
            Some((passage, questions)) => parts.push(RawPart {
                ordinal: parts.len() as u32 + 1,
                title,
                passage_text: passage.to_string(),
                question_text: questions.to_string(),
            }),
            None => {
                tracing::warn!(
                    header = %title,
                    "skipping part without distinct passage and question regions"
                );
            }
        }
    }
    if parts.is_empty() {
        return Err(SegmentError::NoParts);
    }
    Ok(SegmentedExam {
        parts,
        answer_region,
    })
}

/// Splits at the first ANSWERS heading. Returns the body before it and the
/// key region after it, if any.
fn split_answer_region(text: &str) -> (&str, Option<String>) {
    match ANSWERS_RE.find(text) {
        Some(m) => (&text[..m.start()], Some(text[m.end()..].to_string())),
        None => (text, None),
    }
}

/// Splits a chunk at its first questions header. The header line itself
/// stays with the question text so downstream structuring sees the printed
/// number ranges.
fn split_part_regions(chunk: &str) -> Option<(&str, &str)> {
    let header = QUESTIONS_RE.find(chunk)?;
    let passage = chunk[..header.start()].trim();
    let questions = chunk[header.start()..].trim();
    if passage.is_empty() || questions.is_empty() {
        return None;
    }
    Some((passage, questions))
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
