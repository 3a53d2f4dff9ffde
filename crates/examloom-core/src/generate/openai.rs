//! OpenAI-compatible chat completions backend.
//!
//! Works against api.openai.com and against any server that mirrors the
//! `/chat/completions` endpoint (llama.cpp, vLLM, LiteLLM proxies). The
//! request pins temperature to 0.0; structuring should be as deterministic
//! as the service allows.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GenerationBackend, GenerationError};
use crate::ClientConfig;

const STATUS_BODY_LIMIT: usize = 200;

pub struct OpenAiBackend {
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiBackend {
    pub fn new(config: &ClientConfig) -> Self {
        OpenAiBackend {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn content_from(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(GenerationError::Empty)
}

impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate<'a>(
        &'a self,
        client: &'a reqwest::Client,
        system: &'a str,
        user: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: system,
                    },
                    ChatMessage {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: 0.0,
            };
            let mut builder = client.post(self.endpoint()).timeout(timeout).json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }
            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body: String = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(STATUS_BODY_LIMIT)
                    .collect();
                return Err(GenerationError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let parsed: ChatResponse = response.json().await?;
            content_from(parsed)
        })
    }
}
