//! Final document assembly and global question numbering.
//!
//! This is the only place question ids are created. A single fold over
//! parts, groups and questions hands out 1-based ids in document order,
//! which makes them contiguous by construction and keeps them aligned with
//! the answer-key numbering used during reconciliation.

use crate::{ExamDocument, ExamPart, PartDraft, Question, QuestionGroup};

/// Random 12-hex-digit document identifier.
pub fn new_document_id() -> String {
    format!("{:012x}", fastrand::u64(..) & 0xffff_ffff_ffff)
}

/// Numbers every question and assembles the final document.
pub fn assemble_document(title: &str, parts: Vec<PartDraft>) -> ExamDocument {
    let mut next_id: u32 = 0;
    let mut full_text = String::new();
    let mut out_parts = Vec::with_capacity(parts.len());

    for (index, part) in parts.into_iter().enumerate() {
        let first_candidate = next_id + 1;
        let mut groups = Vec::with_capacity(part.groups.len());
        for draft in part.groups {
            let questions = draft
                .questions
                .into_iter()
                .map(|q| {
                    next_id += 1;
                    Question {
                        id: next_id,
                        pre: q.pre,
                        post: q.post,
                        words: q.words,
                        question: q.question,
                        options: q.options,
                        statement: q.statement,
                        answer: q.answer,
                    }
                })
                .collect();
            groups.push(QuestionGroup {
                kind: draft.kind,
                title: draft.title,
                instruction: draft.instruction,
                questions,
            });
        }
        let (first_question, last_question) = if next_id >= first_candidate {
            (first_candidate, next_id)
        } else {
            (0, 0)
        };
        for paragraph in &part.paragraphs {
            if !full_text.is_empty() {
                full_text.push_str("\n\n");
            }
            full_text.push_str(paragraph);
        }
        out_parts.push(ExamPart {
            ordinal: (index + 1) as u32,
            title: part.title,
            paragraphs: part.paragraphs,
            first_question,
            last_question,
            groups,
        });
    }

    ExamDocument {
        id: new_document_id(),
        title: title.to_string(),
        total_questions: next_id,
        full_text,
        parts: out_parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DraftGroup, DraftQuestion, GroupKind};

    fn question(answer: &str) -> DraftQuestion {
        DraftQuestion {
            words: 1,
            answer: answer.to_string(),
            ..Default::default()
        }
    }

    fn part(title: &str, paragraphs: &[&str], question_counts: &[usize]) -> PartDraft {
        PartDraft {
            title: title.to_string(),
            paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
            groups: question_counts
                .iter()
                .map(|&n| DraftGroup {
                    kind: GroupKind::GapFill,
                    title: String::new(),
                    instruction: String::new(),
                    questions: (0..n).map(|i| question(&format!("a{i}"))).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn ids_are_contiguous_across_groups_and_parts() {
        let doc = assemble_document(
            "Exam",
            vec![
                part("Part 1", &["P1."], &[3, 2]),
                part("Part 2", &["P2."], &[4]),
            ],
        );
        let ids: Vec<u32> = doc
            .parts
            .iter()
            .flat_map(|p| &p.groups)
            .flat_map(|g| &g.questions)
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, (1..=9).collect::<Vec<u32>>());
        assert_eq!(doc.total_questions, 9);
    }

    #[test]
    fn part_ranges_cover_their_questions() {
        let doc = assemble_document(
            "Exam",
            vec![part("Part 1", &[], &[3, 2]), part("Part 2", &[], &[4])],
        );
        assert_eq!(doc.parts[0].first_question, 1);
        assert_eq!(doc.parts[0].last_question, 5);
        assert_eq!(doc.parts[1].first_question, 6);
        assert_eq!(doc.parts[1].last_question, 9);
        assert_eq!(doc.parts[1].ordinal, 2);
    }

    #[test]
    fn question_less_part_has_zero_range() {
        let doc = assemble_document("Exam", vec![part("Part 1", &[], &[])]);
        assert_eq!(doc.parts[0].first_question, 0);
        assert_eq!(doc.parts[0].last_question, 0);
        assert_eq!(doc.total_questions, 0);
    }

    #[test]
    fn full_text_joins_paragraphs_of_all_parts() {
        let doc = assemble_document(
            "Exam",
            vec![
                part("Part 1", &["First para.", "Second para."], &[1]),
                part("Part 2", &["Third para."], &[1]),
            ],
        );
        assert_eq!(doc.full_text, "First para.\n\nSecond para.\n\nThird para.");
    }

    #[test]
    fn draft_content_is_carried_through() {
        let drafts = vec![PartDraft {
            title: "READING PASSAGE 1".to_string(),
            paragraphs: vec!["Text.".to_string()],
            groups: vec![DraftGroup {
                kind: GroupKind::Tfng,
                title: "Questions 1-1".to_string(),
                instruction: "Decide.".to_string(),
                questions: vec![DraftQuestion {
                    statement: "S.".to_string(),
                    answer: "TRUE".to_string(),
                    words: 1,
                    ..Default::default()
                }],
            }],
        }];
        let doc = assemble_document("My exam", drafts);
        assert_eq!(doc.title, "My exam");
        let q = doc.question(1).unwrap();
        assert_eq!(q.statement, "S.");
        assert_eq!(q.answer, "TRUE");
        assert_eq!(doc.parts[0].groups[0].kind, GroupKind::Tfng);
    }

    #[test]
    fn document_id_is_twelve_hex_digits() {
        let id = new_document_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
