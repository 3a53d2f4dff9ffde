//! Checks a submitted answer against the reconciled one, grounded in the
//! passage excerpt the question came from.
//!
//! The generation service gets the snippet, the question and both answers
//! and returns a JSON verdict. A malformed verdict falls back to plain
//! normalized string comparison, so checking degrades rather than fails
//! when the service rambles.

use serde_json::Value;
use thiserror::Error;

use crate::generate::GenerationError;
use crate::snippet::locate_snippet;
use crate::structure::{StructuringClient, extract_json_payload};

const VERIFY_SYSTEM_PROMPT: &str = "You judge answers to reading exam questions against a \
passage excerpt. The expected answer comes from the exam's printed answer key. Respond with \
only a JSON object {\"correct\": true | false, \"explanation\": string} where the \
explanation cites the excerpt. Accept minor spelling and casing differences.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
}

/// Outcome of checking one submitted answer.
#[derive(Debug, Clone)]
pub struct AnswerCheck {
    pub verdict: Verdict,
    pub explanation: String,
    /// The passage excerpt the judgment was grounded in.
    pub snippet: String,
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// Checks `submitted` against `expected` for a question, using `full_text`
/// to ground the judgment.
pub async fn check_answer(
    client: &StructuringClient,
    question: &str,
    expected: &str,
    submitted: &str,
    full_text: &str,
) -> Result<AnswerCheck, VerifyError> {
    let snippet = locate_snippet(question, full_text);
    let user_prompt = format!(
        "Passage excerpt:\n{snippet}\n\nQuestion: {question}\nExpected answer: {expected}\n\
         Submitted answer: {submitted}\n\nIs the submitted answer correct?"
    );
    let raw = client
        .backend
        .generate(
            &client.http,
            VERIFY_SYSTEM_PROMPT,
            &user_prompt,
            client.config.request_timeout,
        )
        .await?;
    Ok(parse_verdict(&raw, expected, submitted, snippet))
}

fn parse_verdict(raw: &str, expected: &str, submitted: &str, snippet: String) -> AnswerCheck {
    let payload = extract_json_payload(raw);
    if let Ok(value) = serde_json::from_str::<Value>(payload)
        && let Some(correct) = value.get("correct").and_then(Value::as_bool)
    {
        let explanation = value
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        return AnswerCheck {
            verdict: if correct {
                Verdict::Correct
            } else {
                Verdict::Incorrect
            },
            explanation,
            snippet,
        };
    }
    tracing::debug!("verdict reply not parseable, falling back to string comparison");
    let verdict = if normalize(submitted) == normalize(expected) {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    };
    AnswerCheck {
        verdict,
        explanation: "Compared directly against the answer key.".to_string(),
        snippet,
    }
}

fn normalize(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
