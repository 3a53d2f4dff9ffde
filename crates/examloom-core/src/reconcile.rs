//! Reconciles structured drafts with the printed answer key.
//!
//! The printed key always beats an AI-proposed answer. TFNG answers end up
//! canonical (TRUE, FALSE or NOT GIVEN) no matter how the key spelled them,
//! including keys that reference a lettered option ("B") instead of the
//! verdict itself. When neither source yields a defensible TFNG answer the
//! question gets NOT GIVEN rather than a guess.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{AnswerKey, AnswerKeyEntry, GroupKind, PartDraft};

static OPTION_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z])[.):]\s*").unwrap()
});

const TRUE_TEXT: &str = "TRUE";
const FALSE_TEXT: &str = "FALSE";
const NOT_GIVEN_TEXT: &str = "NOT GIVEN";

/// What reconciliation did across a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Questions whose answer came from the printed key.
    pub from_key: u32,
    /// TFNG questions that fell back to NOT GIVEN for lack of a usable
    /// answer on either side.
    pub tfng_defaults: u32,
    /// Lettered options whose printed label disagreed with their position.
    pub label_mismatches: u32,
}

/// Overwrites draft answers with reconciled ones, numbering questions in
/// document order to match them against key entries. The same walk order is
/// used later when global ids are assigned, so key number N always lands on
/// the question that will carry id N.
pub fn apply_answer_key(parts: &mut [PartDraft], key: &AnswerKey) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    let mut number: u32 = 0;
    for part in parts.iter_mut() {
        for group in &mut part.groups {
            let kind = group.kind;
            for question in &mut group.questions {
                number += 1;
                question.answer = resolve_answer(
                    kind,
                    number,
                    key.get(number),
                    &question.answer,
                    &question.options,
                    &mut summary,
                );
            }
        }
    }
    summary
}

/// Resolves the final answer for one question.
pub fn resolve_answer(
    kind: GroupKind,
    number: u32,
    entry: Option<&AnswerKeyEntry>,
    proposed: &str,
    options: &[String],
    summary: &mut ReconcileSummary,
) -> String {
    match entry {
        Some(entry) => {
            summary.from_key += 1;
            match kind {
                GroupKind::Tfng => keyed_tfng(number, entry, options, summary),
                _ => entry.token.clone(),
            }
        }
        None => match kind {
            GroupKind::Tfng => match canonical_tfng(proposed) {
                Some(verdict) => verdict.to_string(),
                None => {
                    summary.tfng_defaults += 1;
                    NOT_GIVEN_TEXT.to_string()
                }
            },
            _ => proposed.to_string(),
        },
    }
}

fn keyed_tfng(
    number: u32,
    entry: &AnswerKeyEntry,
    options: &[String],
    summary: &mut ReconcileSummary,
) -> String {
    if let Some(index) = letter_index(&entry.token)
        && options.len() >= 3
    {
        let Some(option) = options.get(index) else {
            return NOT_GIVEN_TEXT.to_string();
        };
        if let Some(caps) = OPTION_LABEL_RE.captures(option) {
            let label = caps[1].chars().next().map(|c| c.to_ascii_uppercase());
            let expected = (b'A' + index as u8) as char;
            if let Some(label) = label
                && label != expected
            {
                summary.label_mismatches += 1;
                tracing::warn!(
                    question = number,
                    key_letter = %expected,
                    option_label = %label,
                    "option label disagrees with its position; trusting position"
                );
            }
        }
        let stripped = OPTION_LABEL_RE.replace(option, "");
        return verdict_from_option(stripped.trim()).to_string();
    }
    normalize_tfng_token(&entry.token).to_string()
}

/// Letter position for a single-character A, B or C token.
fn letter_index(token: &str) -> Option<usize> {
    let trimmed = token.trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let upper = first.to_ascii_uppercase();
    if ('A'..='C').contains(&upper) {
        Some((upper as u8 - b'A') as usize)
    } else {
        None
    }
}

fn verdict_from_option(option_text: &str) -> &'static str {
    let upper = option_text.to_uppercase();
    if upper.starts_with(TRUE_TEXT) {
        TRUE_TEXT
    } else if upper.starts_with(FALSE_TEXT) {
        FALSE_TEXT
    } else {
        NOT_GIVEN_TEXT
    }
}

fn normalize_tfng_token(token: &str) -> &'static str {
    match token.trim() {
        "T" | "TRUE" => TRUE_TEXT,
        "F" | "FALSE" => FALSE_TEXT,
        _ => NOT_GIVEN_TEXT,
    }
}

/// Canonical form of an AI-proposed TFNG answer, if it already is one of the
/// three verdicts.
fn canonical_tfng(proposed: &str) -> Option<&'static str> {
    match proposed.trim().to_uppercase().as_str() {
        TRUE_TEXT => Some(TRUE_TEXT),
        FALSE_TEXT => Some(FALSE_TEXT),
        NOT_GIVEN_TEXT => Some(NOT_GIVEN_TEXT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DraftGroup, DraftQuestion};

    fn entry(raw: &str) -> AnswerKeyEntry {
        AnswerKeyEntry {
            raw: raw.trim().to_string(),
            token: raw.trim().to_uppercase(),
        }
    }

    fn tfng_options() -> Vec<String> {
        vec![
            "A. True statement".to_string(),
            "B. False statement".to_string(),
            "C. Neither".to_string(),
        ]
    }

    fn resolve(
        kind: GroupKind,
        key: Option<&str>,
        proposed: &str,
        options: &[String],
    ) -> (String, ReconcileSummary) {
        let mut summary = ReconcileSummary::default();
        let entry = key.map(entry);
        let answer = resolve_answer(kind, 1, entry.as_ref(), proposed, options, &mut summary);
        (answer, summary)
    }

    // ── keyed TFNG ──

    #[test]
    fn letter_key_maps_through_option_position() {
        let (answer, summary) = resolve(GroupKind::Tfng, Some("B"), "TRUE", &tfng_options());
        assert_eq!(answer, "FALSE");
        assert_eq!(summary.from_key, 1);
        assert_eq!(summary.label_mismatches, 0);
    }

    #[test]
    fn lowercase_letter_key_works() {
        let (answer, _) = resolve(GroupKind::Tfng, Some("a"), "", &tfng_options());
        assert_eq!(answer, "TRUE");
    }

    #[test]
    fn letter_key_to_neither_option_is_not_given() {
        let (answer, _) = resolve(GroupKind::Tfng, Some("C"), "", &tfng_options());
        assert_eq!(answer, "NOT GIVEN");
    }

    #[test]
    fn mismatched_option_label_still_trusts_position() {
        let options = vec![
            "B. True statement".to_string(),
            "C. False statement".to_string(),
            "D. Neither".to_string(),
        ];
        let (answer, summary) = resolve(GroupKind::Tfng, Some("A"), "", &options);
        assert_eq!(answer, "TRUE");
        assert_eq!(summary.label_mismatches, 1);
    }

    #[test]
    fn letter_key_without_enough_options_normalizes_directly() {
        let options = vec!["A. True".to_string(), "B. False".to_string()];
        let (answer, _) = resolve(GroupKind::Tfng, Some("B"), "", &options);
        // "B" is not T/TRUE/F/FALSE, so the safe default wins.
        assert_eq!(answer, "NOT GIVEN");
    }

    #[test]
    fn verbatim_tfng_tokens_round_trip() {
        for (raw, expected) in [
            ("TRUE", "TRUE"),
            ("true", "TRUE"),
            ("T", "TRUE"),
            ("F", "FALSE"),
            ("false", "FALSE"),
            ("NOT GIVEN", "NOT GIVEN"),
            ("NG", "NOT GIVEN"),
            ("maybe", "NOT GIVEN"),
        ] {
            let (answer, _) = resolve(GroupKind::Tfng, Some(raw), "", &[]);
            assert_eq!(answer, expected, "key token {raw:?}");
        }
    }

    // ── keyed gap fill and multiple choice ──

    #[test]
    fn gap_fill_key_token_is_uppercased_verbatim() {
        let (answer, summary) = resolve(GroupKind::GapFill, Some("technology"), "machines", &[]);
        assert_eq!(answer, "TECHNOLOGY");
        assert_eq!(summary.from_key, 1);
    }

    #[test]
    fn multiple_choice_letter_stays_a_letter() {
        let options = vec!["A. Wind".to_string(), "B. Steam".to_string(), "C. Water".to_string()];
        let (answer, _) = resolve(GroupKind::MultipleChoice, Some("c"), "B", &options);
        assert_eq!(answer, "C");
    }

    // ── no key entry ──

    #[test]
    fn unkeyed_tfng_keeps_valid_proposal() {
        let (answer, summary) = resolve(GroupKind::Tfng, None, "FALSE", &[]);
        assert_eq!(answer, "FALSE");
        assert_eq!(summary.tfng_defaults, 0);
    }

    #[test]
    fn unkeyed_tfng_canonicalizes_case() {
        let (answer, _) = resolve(GroupKind::Tfng, None, "not given", &[]);
        assert_eq!(answer, "NOT GIVEN");
    }

    #[test]
    fn unkeyed_tfng_defaults_invalid_proposal() {
        let (answer, summary) = resolve(GroupKind::Tfng, None, "Probably true", &[]);
        assert_eq!(answer, "NOT GIVEN");
        assert_eq!(summary.tfng_defaults, 1);
    }

    #[test]
    fn unkeyed_gap_fill_keeps_proposal_verbatim() {
        let (answer, _) = resolve(GroupKind::GapFill, None, "steam power", &[]);
        assert_eq!(answer, "steam power");
    }

    #[test]
    fn not_given_default_is_idempotent() {
        let (first, _) = resolve(GroupKind::Tfng, None, "???", &[]);
        let (second, summary) = resolve(GroupKind::Tfng, None, &first, &[]);
        assert_eq!(second, "NOT GIVEN");
        assert_eq!(summary.tfng_defaults, 0);
    }

    // ── document walk ──

    fn tfng_question(proposed: &str) -> DraftQuestion {
        DraftQuestion {
            statement: "S.".to_string(),
            answer: proposed.to_string(),
            words: 1,
            ..Default::default()
        }
    }

    fn gap_question(proposed: &str) -> DraftQuestion {
        DraftQuestion {
            pre: "a ".to_string(),
            post: ".".to_string(),
            words: 1,
            answer: proposed.to_string(),
            ..Default::default()
        }
    }

    fn two_part_draft() -> Vec<PartDraft> {
        vec![
            PartDraft {
                title: "Part 1".to_string(),
                paragraphs: vec![],
                groups: vec![DraftGroup {
                    kind: GroupKind::GapFill,
                    title: String::new(),
                    instruction: String::new(),
                    questions: vec![gap_question("one"), gap_question("two"), gap_question("three")],
                }],
            },
            PartDraft {
                title: "Part 2".to_string(),
                paragraphs: vec![],
                groups: vec![DraftGroup {
                    kind: GroupKind::Tfng,
                    title: String::new(),
                    instruction: String::new(),
                    questions: vec![tfng_question("FALSE"), tfng_question("perhaps")],
                }],
            },
        ]
    }

    #[test]
    fn numbering_continues_across_parts() {
        let mut parts = two_part_draft();
        let mut key = AnswerKey::new();
        key.insert(4, "TRUE");
        let summary = apply_answer_key(&mut parts, &key);
        // Question 4 is the first TFNG question in part 2.
        assert_eq!(parts[1].groups[0].questions[0].answer, "TRUE");
        // Unkeyed neighbors reconcile from their proposals.
        assert_eq!(parts[0].groups[0].questions[2].answer, "three");
        assert_eq!(parts[1].groups[0].questions[1].answer, "NOT GIVEN");
        assert_eq!(summary.from_key, 1);
        assert_eq!(summary.tfng_defaults, 1);
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let mut parts = two_part_draft();
        let mut key = AnswerKey::new();
        key.insert(1, "cloth");
        key.insert(4, "B");
        apply_answer_key(&mut parts, &key);
        let first_pass = parts.clone();
        apply_answer_key(&mut parts, &key);
        assert_eq!(parts, first_pass);
    }
}
