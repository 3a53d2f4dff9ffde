//! Core library for examloom: the canonical exam document model, the
//! structuring client that turns raw question text into typed question
//! groups, answer-key reconciliation and final document assembly.
//!
//! Deterministic text parsing (segmentation, answer-key lines, passage
//! formatting) lives in `examloom-parsing`; this crate owns everything
//! downstream of it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod assemble;
pub mod config_file;
pub mod generate;
pub mod reconcile;
pub mod retry;
pub mod snippet;
pub mod structure;
pub mod verify;

pub use assemble::{assemble_document, new_document_id};
pub use generate::{GenerationBackend, GenerationError, MockGenerator, MockReply, OpenAiBackend};
pub use reconcile::{ReconcileSummary, apply_answer_key, resolve_answer};
pub use retry::{RetryError, RetryPolicy, retry_with_backoff};
pub use snippet::locate_snippet;
pub use structure::{NormalizeError, RepairStats, StructureError, StructuringClient, normalize_groups};
pub use verify::{AnswerCheck, Verdict, VerifyError, check_answer};

/// The three question formats a reading exam uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Fill a gap with words copied from the passage.
    GapFill,
    /// Pick one option from a lettered list.
    MultipleChoice,
    /// Judge a statement as TRUE, FALSE or NOT GIVEN.
    Tfng,
}

impl GroupKind {
    /// Parses the serialized form, tolerating the spellings generation
    /// services actually produce.
    pub fn parse(value: &str) -> Option<GroupKind> {
        match value.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "gap_fill" | "gapfill" | "fill_in_the_blank" => Some(GroupKind::GapFill),
            "multiple_choice" | "multiplechoice" | "mc" => Some(GroupKind::MultipleChoice),
            "tfng" | "true_false_not_given" | "true_false" => Some(GroupKind::Tfng),
            _ => None,
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GroupKind::GapFill => "gap_fill",
            GroupKind::MultipleChoice => "multiple_choice",
            GroupKind::Tfng => "tfng",
        };
        write!(f, "{name}")
    }
}

/// A question as proposed by the structuring step, before global ids exist.
///
/// Which fields are meaningful depends on the owning group's [`GroupKind`]:
/// gap-fill questions use `pre`/`post`/`words`, multiple-choice questions use
/// `question`/`options`, TFNG questions use `statement`. The unused fields
/// hold their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftQuestion {
    /// Text rendered before the gap.
    pub pre: String,
    /// Text rendered after the gap.
    pub post: String,
    /// Number of words the gap expects, always at least 1.
    pub words: u32,
    /// The question stem for multiple choice.
    pub question: String,
    /// Candidate options, usually labelled "A. ...", "B. ...".
    pub options: Vec<String>,
    /// The statement to judge for TFNG.
    pub statement: String,
    /// Proposed answer, later reconciled against the printed answer key.
    pub answer: String,
}

/// A titled cluster of questions sharing one format and one instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftGroup {
    pub kind: GroupKind,
    pub title: String,
    pub instruction: String,
    pub questions: Vec<DraftQuestion>,
}

/// One part of an exam before numbering: its passage split into paragraphs
/// plus the structured question groups. Part ordinals follow slice position.
#[derive(Debug, Clone, PartialEq)]
pub struct PartDraft {
    pub title: String,
    pub paragraphs: Vec<String>,
    pub groups: Vec<DraftGroup>,
}

/// A question in the final document, carrying its global 1-based id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    #[serde(default)]
    pub pre: String,
    #[serde(default)]
    pub post: String,
    #[serde(default)]
    pub words: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub statement: String,
    pub answer: String,
}

impl Question {
    /// The human-readable prompt for this question, used to ground snippet
    /// lookups and answer checks.
    pub fn prompt_text(&self) -> String {
        if !self.statement.trim().is_empty() {
            return self.statement.clone();
        }
        if !self.question.trim().is_empty() {
            return self.question.clone();
        }
        format!("{} {}", self.pre.trim(), self.post.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGroup {
    pub kind: GroupKind,
    pub title: String,
    pub instruction: String,
    pub questions: Vec<Question>,
}

/// One reading passage with its questions, as it appears in the final
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamPart {
    /// 1-based position within the exam.
    pub ordinal: u32,
    /// The header line that introduced the part, e.g. "READING PASSAGE 1".
    pub title: String,
    /// Cleaned passage paragraphs in reading order.
    pub paragraphs: Vec<String>,
    /// Global id of the first question in this part, 0 if the part has none.
    pub first_question: u32,
    /// Global id of the last question in this part, 0 if the part has none.
    pub last_question: u32,
    pub groups: Vec<QuestionGroup>,
}

/// The assembled, machine-gradable exam document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamDocument {
    /// Random 12-hex-digit identifier assigned at assembly.
    pub id: String,
    pub title: String,
    /// Total question count; equal to the highest global question id.
    pub total_questions: u32,
    /// All passage paragraphs joined with blank lines, used for snippet
    /// location and answer verification.
    pub full_text: String,
    pub parts: Vec<ExamPart>,
}

impl ExamDocument {
    /// Looks a question up by its global id.
    pub fn question(&self, id: u32) -> Option<&Question> {
        self.parts
            .iter()
            .flat_map(|p| &p.groups)
            .flat_map(|g| &g.questions)
            .find(|q| q.id == id)
    }
}

/// One printed answer-key entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKeyEntry {
    /// The answer text exactly as printed, trimmed.
    pub raw: String,
    /// Upper-cased form used for grading comparisons.
    pub token: String,
}

/// Printed answer key: question number to answer entry.
///
/// Duplicate numbers keep the first entry seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerKey {
    entries: HashMap<u32, AnswerKeyEntry>,
}

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry unless the number is already present. Returns false
    /// when the number was a duplicate and the existing entry was kept.
    pub fn insert(&mut self, number: u32, raw: &str) -> bool {
        if self.entries.contains_key(&number) {
            return false;
        }
        let trimmed = raw.trim();
        self.entries.insert(
            number,
            AnswerKeyEntry {
                raw: trimmed.to_string(),
                token: trimmed.to_uppercase(),
            },
        );
        true
    }

    pub fn get(&self, number: u32) -> Option<&AnswerKeyEntry> {
        self.entries.get(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Progress events emitted while an exam is ingested.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Raw text was extracted from the source file.
    Extracted { chars: usize },
    /// The document was segmented into parts and an answer key region.
    Segmented { parts: usize, key_entries: usize },
    /// A part's question text was handed to the structuring service.
    PartStarted { ordinal: u32, total: u32 },
    /// A structuring attempt failed and will be retried after `backoff`.
    PartRetrying {
        ordinal: u32,
        attempt: u32,
        backoff: Duration,
    },
    /// A part came back structured.
    PartStructured {
        ordinal: u32,
        groups: usize,
        questions: usize,
        repairs: u32,
    },
    /// A part failed structuring for good.
    PartFailed { ordinal: u32, error: String },
    /// The final document was assembled.
    Assembled { total_questions: u32 },
}

/// Connection settings for the generation service.
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    /// API key, sent as a bearer token when present.
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible endpoint, without trailing slash.
    pub base_url: String,
    /// Model name passed through to the service.
    pub model: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Retry behavior for structuring calls.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}
