//! Deterministic text parsing for exam documents.
//!
//! Everything in this crate is plain pattern matching over extracted text:
//! segmenting a document into passage/question parts and an answer-key
//! region, parsing printed answer-key lines and formatting passages into
//! clean paragraphs. No generation service is involved; ambiguity is
//! reported as an error or skipped with a log line, never guessed at.

pub mod answer_key;
pub mod backend;
pub mod passage;
pub mod segment;

pub use answer_key::parse_answer_key;
pub use backend::{ExtractError, PdfBackend};
pub use passage::format_passage;
pub use segment::{MIN_DOCUMENT_CHARS, RawPart, SegmentError, SegmentedExam, segment_document};

// Canonical answer-key types live in the core crate.
pub use examloom_core::{AnswerKey, AnswerKeyEntry};
