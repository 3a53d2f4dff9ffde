//! Structuring client: turns a part's raw question text into typed
//! [`DraftGroup`]s via a generation service.
//!
//! Responses are never trusted as-is. The validating normalizer repairs
//! what it can (missing types, instructions, fields), discards what it
//! cannot (question-less groups, service-invented ids) and counts every
//! repair. A response with no usable groups at all counts as a failed
//! attempt and is retried like a network error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::generate::GenerationBackend;
use crate::retry::{RetryError, retry_with_backoff};
use crate::{ClientConfig, DraftGroup, DraftQuestion, GroupKind};

const SYSTEM_PROMPT: &str = "You convert raw exam question text into structured JSON. \
Respond with only a JSON array of question groups and no prose. Each group is an object \
{\"type\": \"gap_fill\" | \"multiple_choice\" | \"tfng\", \"title\": string, \
\"instruction\": string, \"questions\": [...]}. Questions in a gap_fill group are \
{\"pre\": text before the gap, \"post\": text after the gap, \"words\": word count, \
\"answer\": string}. Questions in a multiple_choice group are {\"question\": string, \
\"options\": [\"A. ...\", \"B. ...\", ...], \"answer\": string}. Questions in a tfng \
group are {\"statement\": string, \"answer\": \"TRUE\" | \"FALSE\" | \"NOT GIVEN\"}. \
Keep questions in the order they appear and do not invent ids or numbering.";

const PLACEHOLDER_QUESTION: &str = "Question text unavailable";
const PLACEHOLDER_STATEMENT: &str = "Statement unavailable";

const GAP_FILL_INSTRUCTION: &str = "Complete each sentence with words taken from the passage.";
const MULTIPLE_CHOICE_INSTRUCTION: &str = "Choose the correct answer for each question.";
const TFNG_INSTRUCTION: &str = "Do the following statements agree with the information in \
the passage? Answer TRUE, FALSE or NOT GIVEN.";

fn default_instruction(kind: GroupKind) -> &'static str {
    match kind {
        GroupKind::GapFill => GAP_FILL_INSTRUCTION,
        GroupKind::MultipleChoice => MULTIPLE_CHOICE_INSTRUCTION,
        GroupKind::Tfng => TFNG_INSTRUCTION,
    }
}

fn placeholder_options() -> Vec<String> {
    vec![
        "Option A".to_string(),
        "Option B".to_string(),
        "Option C".to_string(),
        "Option D".to_string(),
    ]
}

/// Counts of repairs applied while normalizing one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Groups discarded because they contained no questions.
    pub empty_groups: u32,
    /// Groups whose type was missing or unrecognized and had to be inferred.
    pub inferred_types: u32,
    /// Instructions synthesized because the response supplied none.
    pub synthesized_instructions: u32,
    /// Question fields replaced with defaults or placeholders.
    pub defaulted_fields: u32,
    /// Service-invented question ids that were dropped.
    pub stripped_ids: u32,
}

impl RepairStats {
    pub fn total(&self) -> u32 {
        self.empty_groups
            + self.inferred_types
            + self.synthesized_instructions
            + self.defaulted_fields
            + self.stripped_ids
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("response is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("response contained no usable question groups")]
    NoGroups,
}

#[derive(Error, Debug)]
pub enum StructureError {
    #[error("no usable structure after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("structuring cancelled")]
    Cancelled,
}

/// Client for the structuring step. Cheap to clone; clones share the
/// underlying HTTP connection pool and backend.
#[derive(Clone)]
pub struct StructuringClient {
    pub(crate) backend: Arc<dyn GenerationBackend>,
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
}

impl StructuringClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: ClientConfig) -> Self {
        StructuringClient {
            backend,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Structures one part's question text into draft groups.
    ///
    /// Every failure mode of an attempt is retriable: transport errors,
    /// non-success statuses, empty or non-JSON replies and replies with no
    /// usable groups. `on_retry` fires before each backoff sleep with the
    /// failed attempt number and the delay.
    pub async fn structure(
        &self,
        question_text: &str,
        cancel: &CancellationToken,
        mut on_retry: impl FnMut(u32, Duration),
    ) -> Result<(Vec<DraftGroup>, RepairStats), StructureError> {
        let user_prompt = build_user_prompt(question_text);
        let outcome = retry_with_backoff(
            self.config.retry,
            cancel,
            |_attempt| self.attempt(&user_prompt),
            |attempt, delay| on_retry(attempt, delay),
        )
        .await;
        match outcome {
            Ok((groups, stats)) => {
                if !stats.is_clean() {
                    tracing::warn!(
                        repairs = stats.total(),
                        empty_groups = stats.empty_groups,
                        inferred_types = stats.inferred_types,
                        synthesized_instructions = stats.synthesized_instructions,
                        defaulted_fields = stats.defaulted_fields,
                        stripped_ids = stats.stripped_ids,
                        "structuring response needed repairs"
                    );
                }
                Ok((groups, stats))
            }
            Err(RetryError::Cancelled) => Err(StructureError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => {
                Err(StructureError::Exhausted { attempts, last })
            }
        }
    }

    async fn attempt(&self, user_prompt: &str) -> Result<(Vec<DraftGroup>, RepairStats), String> {
        let raw = self
            .backend
            .generate(&self.http, SYSTEM_PROMPT, user_prompt, self.config.request_timeout)
            .await
            .map_err(|e| e.to_string())?;
        normalize_groups(&raw).map_err(|e| e.to_string())
    }
}

fn build_user_prompt(question_text: &str) -> String {
    format!(
        "Convert the following reading exam questions into the JSON schema:\n\n{question_text}"
    )
}

/// Pulls the JSON payload out of a generation reply: a fenced code block if
/// present, otherwise the outermost array or object, otherwise the trimmed
/// text itself.
pub(crate) fn extract_json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    let arr = trimmed.find('[');
    let obj = trimmed.find('{');
    let (open, close) = match (arr, obj) {
        (Some(a), Some(o)) if a < o => (Some(a), trimmed.rfind(']')),
        (Some(a), None) => (Some(a), trimmed.rfind(']')),
        (_, Some(o)) => (Some(o), trimmed.rfind('}')),
        _ => (None, None),
    };
    if let (Some(start), Some(end)) = (open, close)
        && start <= end
    {
        return &trimmed[start..=end];
    }
    trimmed
}

/// Parses and repairs a raw structuring reply into draft groups.
pub fn normalize_groups(raw: &str) -> Result<(Vec<DraftGroup>, RepairStats), NormalizeError> {
    let payload = extract_json_payload(raw);
    let value: Value = serde_json::from_str(payload)?;
    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(ref map) => {
            if let Some(groups) = map
                .get("groups")
                .or_else(|| map.get("question_groups"))
                .and_then(Value::as_array)
            {
                groups.clone()
            } else if map.contains_key("questions") {
                // A single group returned without the surrounding array.
                vec![value.clone()]
            } else {
                return Err(NormalizeError::NoGroups);
            }
        }
        _ => return Err(NormalizeError::NoGroups),
    };

    let mut stats = RepairStats::default();
    let mut groups = Vec::new();
    for item in &items {
        if let Some(group) = normalize_group(item, &mut stats) {
            groups.push(group);
        }
    }
    if groups.is_empty() {
        return Err(NormalizeError::NoGroups);
    }
    Ok((groups, stats))
}

fn normalize_group(value: &Value, stats: &mut RepairStats) -> Option<DraftGroup> {
    let questions_raw: Vec<Value> = value
        .get("questions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if questions_raw.is_empty() {
        stats.empty_groups += 1;
        return None;
    }

    let kind = match value
        .get("type")
        .and_then(Value::as_str)
        .and_then(GroupKind::parse)
    {
        Some(kind) => kind,
        None => {
            stats.inferred_types += 1;
            infer_kind(&questions_raw[0])
        }
    };

    let title = string_field(value, "title").unwrap_or_default();
    let instruction = match string_field(value, "instruction") {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            stats.synthesized_instructions += 1;
            default_instruction(kind).to_string()
        }
    };

    let questions = questions_raw
        .iter()
        .map(|q| normalize_question(q, kind, stats))
        .collect();

    Some(DraftGroup {
        kind,
        title,
        instruction,
        questions,
    })
}

/// Guesses the format from the shape of the group's first question.
fn infer_kind(first: &Value) -> GroupKind {
    if first.get("options").is_some_and(Value::is_array) {
        GroupKind::MultipleChoice
    } else if first.get("statement").is_some() {
        GroupKind::Tfng
    } else {
        GroupKind::GapFill
    }
}

fn normalize_question(value: &Value, kind: GroupKind, stats: &mut RepairStats) -> DraftQuestion {
    if value.get("id").is_some() || value.get("number").is_some() {
        stats.stripped_ids += 1;
    }
    let answer = match string_field(value, "answer") {
        Some(answer) => answer.trim().to_string(),
        None => {
            stats.defaulted_fields += 1;
            String::new()
        }
    };

    let mut question = DraftQuestion {
        pre: " ".to_string(),
        post: " ".to_string(),
        words: 1,
        answer,
        ..Default::default()
    };

    match kind {
        GroupKind::GapFill => {
            question.pre = match string_field(value, "pre") {
                Some(pre) => pre,
                None => {
                    stats.defaulted_fields += 1;
                    " ".to_string()
                }
            };
            question.post = match string_field(value, "post") {
                Some(post) => post,
                None => {
                    stats.defaulted_fields += 1;
                    " ".to_string()
                }
            };
            question.words = match count_field(value, "words") {
                Some(n) if n >= 1 => n,
                _ => {
                    stats.defaulted_fields += 1;
                    1
                }
            };
        }
        GroupKind::MultipleChoice => {
            question.question = match string_field(value, "question") {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    stats.defaulted_fields += 1;
                    PLACEHOLDER_QUESTION.to_string()
                }
            };
            let options = value.get("options").map(string_items).unwrap_or_default();
            question.options = if options.len() >= 2 {
                options
            } else {
                stats.defaulted_fields += 1;
                placeholder_options()
            };
        }
        GroupKind::Tfng => {
            question.statement = match string_field(value, "statement") {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    stats.defaulted_fields += 1;
                    PLACEHOLDER_STATEMENT.to_string()
                }
            };
            // TFNG options are optional; keep them when supplied since the
            // key may reference answers by option letter.
            question.options = value.get("options").map(string_items).unwrap_or_default();
        }
    }
    question
}

fn string_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}

fn count_field(value: &Value, name: &str) -> Option<u32> {
    let field = value.get(name)?;
    if let Some(n) = field.as_u64() {
        return u32::try_from(n).ok();
    }
    field.as_str().and_then(|s| s.trim().parse().ok())
}

fn string_items(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{MockGenerator, MockReply};

    // ── payload extraction ──

    #[test]
    fn payload_from_fenced_block() {
        let text = "Here you go:\n```json\n[{\"a\": 1}]\n```\nLet me know!";
        assert_eq!(extract_json_payload(text), "[{\"a\": 1}]");
    }

    #[test]
    fn payload_from_prose_wrapped_object() {
        let text = "The result is {\"groups\": []} as requested.";
        assert_eq!(extract_json_payload(text), "{\"groups\": []}");
    }

    #[test]
    fn payload_prefers_array_that_opens_first() {
        let text = "x [{\"a\": 1}] y";
        assert_eq!(extract_json_payload(text), "[{\"a\": 1}]");
    }

    #[test]
    fn payload_falls_back_to_trimmed_text() {
        assert_eq!(extract_json_payload("  not json  "), "not json");
    }

    // ── normalization: shapes ──

    fn gap_fill_reply() -> &'static str {
        r#"[{
            "type": "gap_fill",
            "title": "Questions 1-3",
            "instruction": "Complete the sentences below.",
            "questions": [
                {"pre": "The looms were powered by ", "post": ".", "words": 1, "answer": "steam"},
                {"pre": "Output doubled within ", "post": " years.", "words": 2, "answer": "twenty five"},
                {"pre": "", "post": " drove the expansion.", "words": 1, "answer": "demand"}
            ]
        }]"#
    }

    #[test]
    fn well_formed_reply_needs_no_repairs() {
        let (groups, stats) = normalize_groups(gap_fill_reply()).unwrap();
        assert!(stats.is_clean());
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.kind, GroupKind::GapFill);
        assert_eq!(group.title, "Questions 1-3");
        assert_eq!(group.questions.len(), 3);
        assert_eq!(group.questions[0].answer, "steam");
        assert_eq!(group.questions[1].words, 2);
    }

    #[test]
    fn object_wrapper_with_groups_key_accepted() {
        let raw = format!("{{\"groups\": {}}}", gap_fill_reply());
        let (groups, stats) = normalize_groups(&raw).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(stats.is_clean());
    }

    #[test]
    fn bare_single_group_object_accepted() {
        let raw = r#"{"type": "tfng", "instruction": "Decide.", "questions": [{"statement": "Wool replaced cotton.", "answer": "FALSE"}]}"#;
        let (groups, _) = normalize_groups(raw).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind, GroupKind::Tfng);
    }

    #[test]
    fn non_json_reply_is_rejected() {
        assert!(matches!(
            normalize_groups("I'm sorry, I cannot help with that."),
            Err(NormalizeError::NotJson(_))
        ));
    }

    #[test]
    fn scalar_json_is_rejected() {
        assert!(matches!(
            normalize_groups("42"),
            Err(NormalizeError::NoGroups)
        ));
    }

    // ── normalization: repairs ──

    #[test]
    fn question_less_groups_are_discarded() {
        let raw = r#"[
            {"type": "gap_fill", "instruction": "i", "questions": []},
            {"type": "tfng", "instruction": "i", "questions": [{"statement": "S.", "answer": "TRUE"}]}
        ]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(stats.empty_groups, 1);
    }

    #[test]
    fn all_groups_empty_is_no_groups() {
        let raw = r#"[{"type": "gap_fill", "questions": []}]"#;
        assert!(matches!(
            normalize_groups(raw),
            Err(NormalizeError::NoGroups)
        ));
    }

    #[test]
    fn missing_type_inferred_from_options() {
        let raw = r#"[{"instruction": "Pick one.", "questions": [
            {"question": "What powered the looms?", "options": ["A. Wind", "B. Steam", "C. Water"], "answer": "B"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].kind, GroupKind::MultipleChoice);
        assert_eq!(stats.inferred_types, 1);
    }

    #[test]
    fn missing_type_inferred_from_statement() {
        let raw = r#"[{"instruction": "Decide.", "questions": [
            {"statement": "The mills closed by 1900.", "answer": "NOT GIVEN"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].kind, GroupKind::Tfng);
        assert_eq!(stats.inferred_types, 1);
    }

    #[test]
    fn missing_type_defaults_to_gap_fill() {
        let raw = r#"[{"instruction": "Fill.", "questions": [
            {"pre": "a ", "post": " b", "words": 1, "answer": "x"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].kind, GroupKind::GapFill);
        assert_eq!(stats.inferred_types, 1);
    }

    #[test]
    fn unknown_type_string_is_inferred_too() {
        let raw = r#"[{"type": "matching", "instruction": "i", "questions": [
            {"statement": "S.", "answer": "TRUE"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].kind, GroupKind::Tfng);
        assert_eq!(stats.inferred_types, 1);
    }

    #[test]
    fn missing_instruction_synthesized_per_kind() {
        let raw = r#"[{"type": "tfng", "questions": [{"statement": "S.", "answer": "TRUE"}]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].instruction, TFNG_INSTRUCTION);
        assert_eq!(stats.synthesized_instructions, 1);
    }

    #[test]
    fn gap_fill_defaults_missing_fields() {
        let raw = r#"[{"type": "gap_fill", "instruction": "i", "questions": [{"answer": "mill"}]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        let q = &groups[0].questions[0];
        assert_eq!(q.pre, " ");
        assert_eq!(q.post, " ");
        assert_eq!(q.words, 1);
        assert_eq!(q.answer, "mill");
        assert_eq!(stats.defaulted_fields, 3);
    }

    #[test]
    fn zero_words_clamped_to_one() {
        let raw = r#"[{"type": "gap_fill", "instruction": "i", "questions": [
            {"pre": "a", "post": "b", "words": 0, "answer": "x"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].questions[0].words, 1);
        assert_eq!(stats.defaulted_fields, 1);
    }

    #[test]
    fn words_as_string_parsed() {
        let raw = r#"[{"type": "gap_fill", "instruction": "i", "questions": [
            {"pre": "a", "post": "b", "words": "2", "answer": "x"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].questions[0].words, 2);
        assert!(stats.is_clean());
    }

    #[test]
    fn multiple_choice_placeholders_for_missing_parts() {
        let raw = r#"[{"type": "multiple_choice", "instruction": "i", "questions": [{"answer": "A"}]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        let q = &groups[0].questions[0];
        assert_eq!(q.question, PLACEHOLDER_QUESTION);
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.pre, " ");
        assert_eq!(q.post, " ");
        assert_eq!(q.words, 1);
        // question + options defaulted
        assert_eq!(stats.defaulted_fields, 2);
    }

    #[test]
    fn single_option_replaced_with_placeholders() {
        let raw = r#"[{"type": "multiple_choice", "instruction": "i", "questions": [
            {"question": "Q?", "options": ["A. only one"], "answer": "A"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].questions[0].options, placeholder_options());
        assert_eq!(stats.defaulted_fields, 1);
    }

    #[test]
    fn tfng_placeholder_statement_and_kept_options() {
        let raw = r#"[{"type": "tfng", "instruction": "i", "questions": [
            {"options": ["A. True statement", "B. False statement", "C. Neither"], "answer": "B"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        let q = &groups[0].questions[0];
        assert_eq!(q.statement, PLACEHOLDER_STATEMENT);
        assert_eq!(q.options.len(), 3);
        assert_eq!(stats.defaulted_fields, 1);
    }

    #[test]
    fn missing_answer_becomes_empty_string() {
        let raw = r#"[{"type": "tfng", "instruction": "i", "questions": [{"statement": "S."}]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].questions[0].answer, "");
        assert_eq!(stats.defaulted_fields, 1);
    }

    #[test]
    fn service_ids_are_stripped_and_counted() {
        let raw = r#"[{"type": "tfng", "instruction": "i", "questions": [
            {"id": 14, "statement": "S.", "answer": "TRUE"},
            {"number": 15, "statement": "T.", "answer": "FALSE"}
        ]}]"#;
        let (groups, stats) = normalize_groups(raw).unwrap();
        assert_eq!(groups[0].questions.len(), 2);
        assert_eq!(stats.stripped_ids, 2);
    }

    // ── client retry behavior ──

    fn tfng_reply() -> String {
        r#"[{"type": "tfng", "title": "Questions 1-2", "instruction": "Decide.", "questions": [
            {"statement": "Cotton was spun by hand until 1770.", "answer": "TRUE"},
            {"statement": "The mills employed children.", "answer": "NOT GIVEN"}
        ]}]"#
            .to_string()
    }

    fn client_with(mock: MockGenerator) -> (std::sync::Arc<MockGenerator>, StructuringClient) {
        let mock = std::sync::Arc::new(mock);
        let client = StructuringClient::new(mock.clone(), ClientConfig::default());
        (mock, client)
    }

    #[tokio::test(start_paused = true)]
    async fn clean_reply_structures_on_first_attempt() {
        let (mock, client) = client_with(MockGenerator::new(MockReply::Reply(tfng_reply())));
        let cancel = CancellationToken::new();
        let (groups, stats) = client
            .structure("Questions 1-2 ...", &cancel, |_, _| {})
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].questions.len(), 2);
        assert!(stats.is_clean());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reply_retried_then_accepted() {
        let (mock, client) = client_with(MockGenerator::with_sequence(vec![
            MockReply::Reply("Sorry, no structured output this time.".to_string()),
            MockReply::Reply(tfng_reply()),
        ]));
        let cancel = CancellationToken::new();
        let mut retries = Vec::new();
        let start = tokio::time::Instant::now();
        let (groups, _) = client
            .structure("Questions 1-2 ...", &cancel, |attempt, delay| {
                retries.push((attempt, delay))
            })
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(retries, vec![(1, Duration::from_secs(2))]);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_with_only_empty_groups_is_retried() {
        let (mock, client) = client_with(MockGenerator::with_sequence(vec![
            MockReply::Reply(r#"[{"type": "tfng", "questions": []}]"#.to_string()),
            MockReply::Reply(tfng_reply()),
        ]));
        let cancel = CancellationToken::new();
        let (groups, _) = client
            .structure("Questions 1-2 ...", &cancel, |_, _| {})
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_exhausts_after_three_attempts() {
        let (mock, client) =
            client_with(MockGenerator::new(MockReply::Fail("service down".to_string())));
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let err = client
            .structure("Questions 1-2 ...", &cancel, |_, _| {})
            .await
            .unwrap_err();
        match err {
            StructureError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("service down"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(mock.call_count(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_short_circuits() {
        let (mock, client) = client_with(MockGenerator::new(MockReply::Reply(tfng_reply())));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .structure("Questions 1-2 ...", &cancel, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StructureError::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }
}
