use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod output;

use output::ColorMode;

use examloom_core::config_file::{self, ConfigFile};
use examloom_core::{ClientConfig, ExamDocument, OpenAiBackend, ProgressEvent, StructuringClient};
use examloom_ingest::IngestOptions;

/// Exam Ingestion Pipeline - Convert reading-exam PDFs into gradable exam documents
#[derive(Parser, Debug)]
#[command(name = "examloom", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest an exam PDF into a canonical exam document
    Ingest {
        /// Path to the exam PDF
        file_path: PathBuf,

        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Write the assembled document as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model name for the structuring service
        #[arg(long)]
        model: Option<String>,

        /// Base URL of the OpenAI-compatible endpoint
        #[arg(long)]
        base_url: Option<String>,

        /// API key for the structuring service
        #[arg(long)]
        api_key: Option<String>,

        /// Concurrent structuring requests (1-3)
        #[arg(long)]
        workers: Option<usize>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Dry run: extract and segment without calling the structuring service
        #[arg(long)]
        dry_run: bool,
    },

    /// Locate the passage snippet that grounds a question
    Snippet {
        /// Path to an ingested exam document (JSON)
        document: PathBuf,

        /// Question id to look up
        #[arg(long)]
        id: u32,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Judge a submitted answer against an ingested document
    Verify {
        /// Path to an ingested exam document (JSON)
        document: PathBuf,

        /// Question id to judge
        #[arg(long)]
        id: u32,

        /// The submitted answer
        #[arg(long)]
        answer: String,

        /// Model name for the judgment request
        #[arg(long)]
        model: Option<String>,

        /// Base URL of the OpenAI-compatible endpoint
        #[arg(long)]
        base_url: Option<String>,

        /// API key for the judgment request
        #[arg(long)]
        api_key: Option<String>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ingest {
            file_path,
            title,
            output,
            model,
            base_url,
            api_key,
            workers,
            no_color,
            dry_run,
        } => {
            if dry_run {
                dry_run_ingest(file_path, no_color, output).await
            } else {
                ingest(
                    file_path, title, output, model, base_url, api_key, workers, no_color,
                )
                .await
            }
        }
        Command::Snippet {
            document,
            id,
            no_color,
        } => snippet(document, id, no_color),
        Command::Verify {
            document,
            id,
            answer,
            model,
            base_url,
            api_key,
            no_color,
        } => verify(document, id, answer, model, base_url, api_key, no_color).await,
    }
}

/// Resolve connection settings: CLI flags > env vars > config file > defaults.
fn resolve_client_config(
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    file: &ConfigFile,
) -> ClientConfig {
    let defaults = ClientConfig::default();
    let api = file.api.clone().unwrap_or_default();
    let request_timeout = file
        .ingest
        .as_ref()
        .and_then(|i| i.request_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(defaults.request_timeout);
    ClientConfig {
        api_key: api_key
            .or_else(|| std::env::var("EXAMLOOM_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .or(api.key),
        base_url: base_url
            .or_else(|| std::env::var("EXAMLOOM_BASE_URL").ok())
            .or(api.base_url)
            .unwrap_or(defaults.base_url),
        model: model
            .or_else(|| std::env::var("EXAMLOOM_MODEL").ok())
            .or(api.model)
            .unwrap_or(defaults.model),
        request_timeout,
        retry: defaults.retry,
    }
}

#[allow(clippy::too_many_arguments)]
async fn ingest(
    file_path: PathBuf,
    title: Option<String>,
    output: Option<PathBuf>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    workers: Option<usize>,
    no_color: bool,
) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let color = ColorMode(!no_color);
    let file_config = config_file::load_config();
    let config = resolve_client_config(model, base_url, api_key, &file_config);
    let workers = workers
        .or_else(|| file_config.ingest.as_ref().and_then(|i| i.workers))
        .unwrap_or(examloom_ingest::DEFAULT_WORKERS);

    let title = title.or_else(|| {
        file_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
    });

    let backend = Arc::new(OpenAiBackend::new(&config));
    let client = StructuringClient::new(backend, config);

    // indicatif draws on stderr, so the bar never mixes into the report.
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/dim}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_bar = bar.clone();
    let progress: examloom_ingest::ProgressCallback = Arc::new(move |event| match event {
        ProgressEvent::Extracted { chars } => {
            progress_bar.set_message(format!("extracted {} characters", chars));
        }
        ProgressEvent::Segmented { parts, key_entries } => {
            progress_bar.set_length(parts as u64);
            progress_bar.set_message(format!("{} parts, {} answer key entries", parts, key_entries));
        }
        ProgressEvent::PartStarted { ordinal, total } => {
            progress_bar.set_message(format!("structuring part {}/{}", ordinal, total));
        }
        ProgressEvent::PartRetrying {
            ordinal,
            attempt,
            backoff,
        } => {
            progress_bar.set_message(format!(
                "part {}: attempt {} failed, retrying in {:.0?}",
                ordinal, attempt, backoff
            ));
        }
        ProgressEvent::PartStructured {
            ordinal, questions, ..
        } => {
            progress_bar.inc(1);
            progress_bar.set_message(format!("part {}: {} questions", ordinal, questions));
        }
        ProgressEvent::PartFailed { ordinal, error } => {
            progress_bar.set_message(format!("part {} failed: {}", ordinal, error));
        }
        ProgressEvent::Assembled { .. } => {}
    });

    let options = IngestOptions {
        title,
        workers,
        progress: Some(progress),
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let result = examloom_ingest::ingest_pdf(&file_path, &client, &options, &cancel).await;
    bar.finish_and_clear();
    let (document, report) = result?;

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    output::print_outline(&mut writer, &document, color)?;
    output::print_summary(&mut writer, &report, color)?;

    if let Some(ref output_path) = output {
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(output_path, json)?;
        writeln!(writer, "Document written to: {}", output_path.display())?;
    }

    Ok(())
}

async fn dry_run_ingest(
    file_path: PathBuf,
    no_color: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    use examloom_parsing::PdfBackend;
    use owo_colors::OwoColorize;

    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let use_color = !no_color && output.is_none();
    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };

    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.display().to_string());

    let backend = examloom_pdf_mupdf::MupdfBackend::new();
    let text = backend.extract_text(&file_path)?;
    let segmented = examloom_parsing::segment_document(&text)?;
    let key = segmented
        .answer_region
        .as_deref()
        .map(examloom_parsing::parse_answer_key)
        .unwrap_or_default();

    if use_color {
        writeln!(
            writer,
            "{} {} ({} parts, {} answer key entries)\n",
            "DRY RUN:".bold().cyan(),
            file_name.bold(),
            segmented.parts.len(),
            key.len()
        )?;
    } else {
        writeln!(
            writer,
            "DRY RUN: {} ({} parts, {} answer key entries)\n",
            file_name,
            segmented.parts.len(),
            key.len()
        )?;
    }

    for part in &segmented.parts {
        let paragraphs = examloom_parsing::format_passage(&part.passage_text);
        if use_color {
            writeln!(
                writer,
                "{}",
                format!("[{}] {}", part.ordinal, part.title).bold().yellow()
            )?;
        } else {
            writeln!(writer, "[{}] {}", part.ordinal, part.title)?;
        }
        writeln!(
            writer,
            "  Passage:   {} paragraphs, {} characters",
            paragraphs.len(),
            part.passage_text.trim().len()
        )?;

        // Normalize the question region for a one-line preview
        let preview: String = part
            .question_text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let preview = output::truncate(&preview, 200);
        if use_color {
            writeln!(writer, "  Questions: {}", preview.dimmed())?;
        } else {
            writeln!(writer, "  Questions: {}", preview)?;
        }
        writeln!(writer)?;
    }

    if key.is_empty() {
        writeln!(writer, "No answer key found.")?;
    } else {
        writeln!(writer, "Answer key: {} entries", key.len())?;
    }

    Ok(())
}

fn snippet(document_path: PathBuf, id: u32, no_color: bool) -> anyhow::Result<()> {
    let color = ColorMode(!no_color);
    let document = load_document(&document_path)?;
    let question = document
        .question(id)
        .ok_or_else(|| anyhow::anyhow!("No question {} in \"{}\"", id, document.title))?;

    let snippet = examloom_core::locate_snippet(&question.prompt_text(), &document.full_text);

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    output::print_snippet(&mut writer, question, &snippet, color)?;
    Ok(())
}

async fn verify(
    document_path: PathBuf,
    id: u32,
    answer: String,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    no_color: bool,
) -> anyhow::Result<()> {
    let color = ColorMode(!no_color);
    let document = load_document(&document_path)?;
    let question = document
        .question(id)
        .ok_or_else(|| anyhow::anyhow!("No question {} in \"{}\"", id, document.title))?;

    let file_config = config_file::load_config();
    let config = resolve_client_config(model, base_url, api_key, &file_config);
    let backend = Arc::new(OpenAiBackend::new(&config));
    let client = StructuringClient::new(backend, config);

    let prompt = question.prompt_text();
    let check = examloom_core::check_answer(
        &client,
        &prompt,
        &question.answer,
        &answer,
        &document.full_text,
    )
    .await?;

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    output::print_verdict(&mut writer, question, &answer, &check, color)?;
    Ok(())
}

fn load_document(path: &Path) -> anyhow::Result<ExamDocument> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| anyhow::anyhow!("Not an ingested exam document: {}", e))
}
