//! Text-generation backends.
//!
//! A backend turns a system prompt plus a user prompt into generated text.
//! The production backend speaks the OpenAI-compatible chat completions
//! protocol; [`mock`] provides a scriptable backend for tests and offline
//! runs.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub mod mock;
pub mod openai;

pub use mock::{MockGenerator, MockReply};
pub use openai::OpenAiBackend;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response contained no generated text")]
    Empty,
    #[error("{0}")]
    Other(String),
}

/// A text-generation service.
pub trait GenerationBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Generates a completion for the given prompts.
    fn generate<'a>(
        &'a self,
        client: &'a reqwest::Client,
        system: &'a str,
        user: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>>;
}
