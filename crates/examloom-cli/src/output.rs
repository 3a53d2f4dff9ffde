use std::io::Write;

use examloom_core::{AnswerCheck, ExamDocument, Question, Verdict};
use examloom_ingest::IngestReport;
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the part and group outline of an assembled document.
pub fn print_outline(
    w: &mut dyn Write,
    document: &ExamDocument,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", document.title.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", document.title)?;
        writeln!(w, "{}", sep)?;
    }
    if color.enabled() {
        writeln!(w, "{}", format!("id: {}", document.id).dimmed())?;
    } else {
        writeln!(w, "id: {}", document.id)?;
    }
    writeln!(w)?;

    for part in &document.parts {
        if color.enabled() {
            writeln!(
                w,
                "{}",
                format!("[{}] {}", part.ordinal, part.title).bold().yellow()
            )?;
        } else {
            writeln!(w, "[{}] {}", part.ordinal, part.title)?;
        }
        writeln!(
            w,
            "  Questions {}-{}, {} paragraphs",
            part.first_question,
            part.last_question,
            part.paragraphs.len()
        )?;
        for group in &part.groups {
            let first = group.questions.first().map(|q| q.id).unwrap_or(0);
            let last = group.questions.last().map(|q| q.id).unwrap_or(0);
            let line = format!(
                "  {}-{}: {} \"{}\"",
                first,
                last,
                group.kind,
                truncate(&group.instruction, 60)
            );
            if color.enabled() {
                writeln!(w, "{}", line.dimmed())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Print the final ingestion summary.
pub fn print_summary(
    w: &mut dyn Write,
    report: &IngestReport,
    color: ColorMode,
) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  Parts: {}", report.parts.len())?;
    writeln!(w, "  Questions: {}", report.total_questions)?;
    writeln!(w, "  Answer key entries: {}", report.key_entries)?;

    if color.enabled() {
        writeln!(
            w,
            "  {} {}",
            "Answers from key:".green(),
            report.reconcile.from_key
        )?;
    } else {
        writeln!(w, "  Answers from key: {}", report.reconcile.from_key)?;
    }

    if report.reconcile.tfng_defaults > 0 {
        if color.enabled() {
            writeln!(
                w,
                "  {} {}",
                "TFNG answers defaulted to NOT GIVEN:".yellow(),
                report.reconcile.tfng_defaults
            )?;
        } else {
            writeln!(
                w,
                "  TFNG answers defaulted to NOT GIVEN: {}",
                report.reconcile.tfng_defaults
            )?;
        }
    }
    if report.reconcile.label_mismatches > 0 {
        if color.enabled() {
            writeln!(
                w,
                "  {} {}",
                "Option labels disagreeing with position:".yellow(),
                report.reconcile.label_mismatches
            )?;
        } else {
            writeln!(
                w,
                "  Option labels disagreeing with position: {}",
                report.reconcile.label_mismatches
            )?;
        }
    }

    let repairs: u32 = report.parts.iter().map(|p| p.repairs.total()).sum();
    if repairs > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Structure repairs:".yellow(), repairs)?;
        } else {
            writeln!(w, "  Structure repairs: {}", repairs)?;
        }
        for part in &report.parts {
            if part.repairs.is_clean() {
                continue;
            }
            let msg = format!(
                "part {}: {} (empty groups: {}, inferred types: {}, defaulted fields: {})",
                part.ordinal,
                part.repairs.total(),
                part.repairs.empty_groups,
                part.repairs.inferred_types,
                part.repairs.defaulted_fields
            );
            if color.enabled() {
                writeln!(w, "    {}", msg.dimmed())?;
            } else {
                writeln!(w, "    {}", msg)?;
            }
        }
    }

    writeln!(w)?;
    Ok(())
}

/// Print a question and the passage snippet that grounds it.
pub fn print_snippet(
    w: &mut dyn Write,
    question: &Question,
    snippet: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", format!("Question {}:", question.id).bold())?;
        writeln!(w, "  {}", question.prompt_text().cyan())?;
        writeln!(w)?;
        writeln!(w, "{}", "Snippet:".bold())?;
    } else {
        writeln!(w, "Question {}:", question.id)?;
        writeln!(w, "  {}", question.prompt_text())?;
        writeln!(w)?;
        writeln!(w, "Snippet:")?;
    }
    writeln!(w, "  {}", snippet)?;
    Ok(())
}

/// Print the judgment for a submitted answer.
pub fn print_verdict(
    w: &mut dyn Write,
    question: &Question,
    submitted: &str,
    check: &AnswerCheck,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", format!("Question {}:", question.id).bold())?;
        writeln!(w, "  {}", question.prompt_text().cyan())?;
    } else {
        writeln!(w, "Question {}:", question.id)?;
        writeln!(w, "  {}", question.prompt_text())?;
    }
    writeln!(w)?;
    writeln!(w, "  Expected:  {}", question.answer)?;
    writeln!(w, "  Submitted: {}", submitted)?;
    writeln!(w)?;

    match check.verdict {
        Verdict::Correct => {
            if color.enabled() {
                writeln!(w, "  {}", "CORRECT".green())?;
            } else {
                writeln!(w, "  CORRECT")?;
            }
        }
        Verdict::Incorrect => {
            if color.enabled() {
                writeln!(w, "  {}", "INCORRECT".red())?;
            } else {
                writeln!(w, "  INCORRECT")?;
            }
        }
    }
    if !check.explanation.is_empty() {
        writeln!(w, "  {}", check.explanation)?;
    }
    if !check.snippet.is_empty() {
        let grounding = format!("Grounded on: {}", truncate(&check.snippet, 200));
        writeln!(w)?;
        if color.enabled() {
            writeln!(w, "  {}", grounding.dimmed())?;
        } else {
            writeln!(w, "  {}", grounding)?;
        }
    }
    Ok(())
}

/// Shortens display text to `max` characters, appending "..." when cut.
/// Counts characters, not bytes; instructions and snippets routinely carry
/// dashes and curly quotes that a byte slice would split mid-character.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut shortened: String = s.chars().take(max).collect();
    shortened.push_str("...");
    shortened
}
