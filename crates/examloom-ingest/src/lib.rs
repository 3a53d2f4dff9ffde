//! The exam ingestion pipeline.
//!
//! Extraction, segmentation and answer-key parsing run deterministically up
//! front; each part's question text then goes to the structuring service,
//! with a bounded number of parts in flight at once. Results are placed in
//! per-part slots keyed by segment position, so passage order in the final
//! document never depends on completion order. Reconciliation against the
//! printed key and global numbering happen once all parts are back; a part
//! that fails structuring after retries aborts the whole ingestion and
//! nothing is emitted.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use examloom_core::{
    DraftGroup, ExamDocument, PartDraft, ProgressEvent, ReconcileSummary, RepairStats,
    StructureError, StructuringClient, apply_answer_key, assemble_document,
};
use examloom_parsing::{self as parsing, ExtractError, PdfBackend, RawPart, SegmentError};

pub const DEFAULT_WORKERS: usize = 2;
pub const MAX_WORKERS: usize = 3;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractError),
    #[error("document not recognized as an exam: {0}")]
    Malformed(#[from] SegmentError),
    #[error("structuring part {ordinal} failed: {source}")]
    Structuring {
        ordinal: u32,
        #[source]
        source: StructureError,
    },
    #[error("ingestion cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature)")]
    NoPdfSupport,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Clone)]
pub struct IngestOptions {
    /// Document title; when absent the CLI derives one from the file name.
    pub title: Option<String>,
    /// Concurrent structuring calls, clamped to `1..=MAX_WORKERS`.
    pub workers: usize,
    /// Progress callback; may be invoked from worker tasks.
    pub progress: Option<ProgressCallback>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            title: None,
            workers: DEFAULT_WORKERS,
            progress: None,
        }
    }
}

impl std::fmt::Debug for IngestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestOptions")
            .field("title", &self.title)
            .field("workers", &self.workers)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Per-part ingestion outcome for the final report.
#[derive(Debug, Clone)]
pub struct PartReport {
    pub ordinal: u32,
    pub title: String,
    pub groups: usize,
    pub questions: usize,
    pub repairs: RepairStats,
}

/// What an ingestion run did, alongside the document it produced.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub key_entries: usize,
    pub parts: Vec<PartReport>,
    pub reconcile: ReconcileSummary,
    pub total_questions: u32,
}

/// Ingests an exam PDF with the default MuPDF backend.
#[cfg(feature = "pdf")]
pub async fn ingest_pdf(
    path: &Path,
    client: &StructuringClient,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<(ExamDocument, IngestReport), IngestError> {
    let backend = examloom_pdf_mupdf::MupdfBackend::new();
    ingest_pdf_with_backend(path, &backend, client, options, cancel).await
}

#[cfg(not(feature = "pdf"))]
pub async fn ingest_pdf(
    _path: &Path,
    _client: &StructuringClient,
    _options: &IngestOptions,
    _cancel: &CancellationToken,
) -> Result<(ExamDocument, IngestReport), IngestError> {
    Err(IngestError::NoPdfSupport)
}

/// Ingests an exam PDF through the given extraction backend.
pub async fn ingest_pdf_with_backend(
    path: &Path,
    backend: &dyn PdfBackend,
    client: &StructuringClient,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<(ExamDocument, IngestReport), IngestError> {
    sniff_pdf_magic(path)?;
    let text = backend.extract_text(path)?;
    if text.trim().is_empty() {
        return Err(IngestError::Extraction(ExtractError::EmptyText));
    }
    emit(
        options,
        ProgressEvent::Extracted {
            chars: text.chars().count(),
        },
    );
    tracing::info!(path = %path.display(), chars = text.chars().count(), "text extracted");
    ingest_text(&text, client, options, cancel).await
}

/// Runs the pipeline on already-extracted text.
pub async fn ingest_text(
    text: &str,
    client: &StructuringClient,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<(ExamDocument, IngestReport), IngestError> {
    let segmented = parsing::segment_document(text)?;
    let key = segmented
        .answer_region
        .as_deref()
        .map(parsing::parse_answer_key)
        .unwrap_or_default();
    emit(
        options,
        ProgressEvent::Segmented {
            parts: segmented.parts.len(),
            key_entries: key.len(),
        },
    );
    tracing::info!(
        parts = segmented.parts.len(),
        key_entries = key.len(),
        "document segmented"
    );

    let structured = structure_parts(&segmented.parts, client, options, cancel).await?;

    let mut drafts = Vec::with_capacity(segmented.parts.len());
    let mut part_reports = Vec::with_capacity(segmented.parts.len());
    for (raw, (groups, repairs)) in segmented.parts.iter().zip(structured) {
        part_reports.push(PartReport {
            ordinal: raw.ordinal,
            title: raw.title.clone(),
            groups: groups.len(),
            questions: groups.iter().map(|g| g.questions.len()).sum(),
            repairs,
        });
        drafts.push(PartDraft {
            title: raw.title.clone(),
            paragraphs: parsing::format_passage(&raw.passage_text),
            groups,
        });
    }

    let reconcile = apply_answer_key(&mut drafts, &key);
    let title = options
        .title
        .clone()
        .unwrap_or_else(|| "Untitled exam".to_string());
    let document = assemble_document(&title, drafts);
    emit(
        options,
        ProgressEvent::Assembled {
            total_questions: document.total_questions,
        },
    );
    tracing::info!(
        document = %document.id,
        total_questions = document.total_questions,
        "document assembled"
    );

    let report = IngestReport {
        key_entries: key.len(),
        parts: part_reports,
        reconcile,
        total_questions: document.total_questions,
    };
    Ok((document, report))
}

/// Structures every part, bounded-concurrently, returning results in
/// segment order.
async fn structure_parts(
    parts: &[RawPart],
    client: &StructuringClient,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<Vec<(Vec<DraftGroup>, RepairStats)>, IngestError> {
    let total = parts.len() as u32;
    let workers = options.workers.clamp(1, MAX_WORKERS);
    if workers == 1 {
        let mut results = Vec::with_capacity(parts.len());
        for part in parts {
            results.push(structure_one(part, total, client, options, cancel).await?);
        }
        return Ok(results);
    }

    let semaphore = Arc::new(Semaphore::new(workers));
    let child = cancel.child_token();
    let mut join_set = JoinSet::new();
    for (index, part) in parts.iter().enumerate() {
        let semaphore = semaphore.clone();
        let client = client.clone();
        let cancel = child.clone();
        let progress = options.progress.clone();
        let ordinal = part.ordinal;
        let question_text = part.question_text.clone();
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (index, ordinal, Err(StructureError::Cancelled)),
            };
            if cancel.is_cancelled() {
                return (index, ordinal, Err(StructureError::Cancelled));
            }
            if let Some(cb) = &progress {
                cb(ProgressEvent::PartStarted { ordinal, total });
            }
            let result = client
                .structure(&question_text, &cancel, |attempt, backoff| {
                    if let Some(cb) = &progress {
                        cb(ProgressEvent::PartRetrying {
                            ordinal,
                            attempt,
                            backoff,
                        });
                    }
                })
                .await;
            (index, ordinal, result)
        });
    }

    let mut slots: Vec<Option<(Vec<DraftGroup>, RepairStats)>> = vec![None; parts.len()];
    let mut failure: Option<IngestError> = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, ordinal, Ok((groups, repairs)))) => {
                emit(
                    options,
                    ProgressEvent::PartStructured {
                        ordinal,
                        groups: groups.len(),
                        questions: groups.iter().map(|g| g.questions.len()).sum(),
                        repairs: repairs.total(),
                    },
                );
                slots[index] = Some((groups, repairs));
            }
            Ok((_, ordinal, Err(error))) => {
                child.cancel();
                match error {
                    StructureError::Cancelled => {
                        if failure.is_none() {
                            failure = Some(IngestError::Cancelled);
                        }
                    }
                    other => {
                        emit(
                            options,
                            ProgressEvent::PartFailed {
                                ordinal,
                                error: other.to_string(),
                            },
                        );
                        // A part's real failure outranks the cancellations
                        // its siblings observe afterwards.
                        if !matches!(failure, Some(IngestError::Structuring { .. })) {
                            failure = Some(IngestError::Structuring {
                                ordinal,
                                source: other,
                            });
                        }
                    }
                }
            }
            Err(join_error) => {
                child.cancel();
                if failure.is_none() {
                    tracing::error!(error = %join_error, "structuring task aborted");
                    failure = Some(IngestError::Cancelled);
                }
            }
        }
    }
    if let Some(error) = failure {
        return Err(error);
    }
    let mut results = Vec::with_capacity(slots.len());
    for slot in slots {
        results.push(slot.ok_or(IngestError::Cancelled)?);
    }
    Ok(results)
}

async fn structure_one(
    part: &RawPart,
    total: u32,
    client: &StructuringClient,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<(Vec<DraftGroup>, RepairStats), IngestError> {
    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }
    let ordinal = part.ordinal;
    emit(options, ProgressEvent::PartStarted { ordinal, total });
    let progress = options.progress.clone();
    let result = client
        .structure(&part.question_text, cancel, |attempt, backoff| {
            if let Some(cb) = &progress {
                cb(ProgressEvent::PartRetrying {
                    ordinal,
                    attempt,
                    backoff,
                });
            }
        })
        .await;
    match result {
        Ok((groups, repairs)) => {
            emit(
                options,
                ProgressEvent::PartStructured {
                    ordinal,
                    groups: groups.len(),
                    questions: groups.iter().map(|g| g.questions.len()).sum(),
                    repairs: repairs.total(),
                },
            );
            Ok((groups, repairs))
        }
        Err(StructureError::Cancelled) => Err(IngestError::Cancelled),
        Err(error) => {
            emit(
                options,
                ProgressEvent::PartFailed {
                    ordinal,
                    error: error.to_string(),
                },
            );
            Err(IngestError::Structuring {
                ordinal,
                source: error,
            })
        }
    }
}

/// Rejects files that do not start with the `%PDF-` magic before handing
/// them to a native extraction library.
fn sniff_pdf_magic(path: &Path) -> Result<(), IngestError> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut magic = [0u8; 5];
    let read = file.read(&mut magic)?;
    if &magic[..read] != b"%PDF-" {
        return Err(IngestError::Extraction(ExtractError::NotAPdf));
    }
    Ok(())
}

fn emit(options: &IngestOptions, event: ProgressEvent) {
    if let Some(cb) = &options.progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_file(contents: &[u8]) -> std::path::PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "examloom-ingest-test-{}-{id}.bin",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn pdf_magic_accepted() {
        let path = temp_file(b"%PDF-1.7\nrest of file");
        assert!(sniff_pdf_magic(&path).is_ok());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn non_pdf_rejected_by_magic() {
        let path = temp_file(b"<html>not a pdf</html>");
        assert!(matches!(
            sniff_pdf_magic(&path).unwrap_err(),
            IngestError::Extraction(ExtractError::NotAPdf)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn truncated_file_rejected_by_magic() {
        let path = temp_file(b"%P");
        assert!(matches!(
            sniff_pdf_magic(&path).unwrap_err(),
            IngestError::Extraction(ExtractError::NotAPdf)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("examloom-ingest-missing-file.pdf");
        assert!(matches!(
            sniff_pdf_magic(&path).unwrap_err(),
            IngestError::Io(_)
        ));
    }

    #[test]
    fn options_debug_hides_callback() {
        let options = IngestOptions {
            progress: Some(Arc::new(|_| {})),
            ..Default::default()
        };
        let rendered = format!("{options:?}");
        assert!(rendered.contains("<callback>"));
        assert!(rendered.contains("workers: 2"));
    }
}
