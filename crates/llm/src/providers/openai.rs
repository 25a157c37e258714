//! OpenAI-compatible chat completions provider.
//!
//! Serves both OpenAI and Groq, which expose the same `/chat/completions`
//! surface and stream server-sent events terminated by `data: [DONE]`.

use crate::client::{LlmClient, LlmRequest, LlmStream, LlmStreamChunk, LlmUsage};
use crate::lines::lines;
use crate::types::ChatMessage;
use futures::StreamExt;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GROQ_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// One decoded SSE line.
#[derive(Debug, PartialEq)]
enum SseLine {
    Chunk(LlmStreamChunk),
    Done,
    Skip,
}

/// Client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    provider: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Client for api.openai.com.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_OPENAI_URL, api_key, "openai")
    }

    /// Client for Groq's OpenAI-compatible endpoint.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_GROQ_URL, api_key, "groq")
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            provider: provider.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_completion_request<'a>(&self, request: &'a LlmRequest) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

fn parse_sse_line(line: &str) -> AppResult<SseLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // comments (": keep-alive"), event names and blank separators
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| AppError::ModelStream(format!("Failed to parse chunk: {}", e)))?;

    let content = chunk
        .choices
        .first()
        .and_then(|c| c.delta.content.clone())
        .unwrap_or_default();
    let finished = chunk.choices.iter().any(|c| c.finish_reason.is_some());
    let usage = chunk
        .usage
        .map(|u| LlmUsage::new(u.prompt_tokens, u.completion_tokens));

    if content.is_empty() && !finished && usage.is_none() {
        return Ok(SseLine::Skip);
    }

    Ok(SseLine::Chunk(LlmStreamChunk {
        content,
        model: chunk.model,
        done: false,
        usage,
    }))
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(
            provider = %self.provider,
            model = %request.model,
            messages = request.messages.len(),
            "Starting streaming chat completion"
        );

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.to_completion_request(request))
            .send()
            .await
            .map_err(|e| AppError::ModelStream(format!("Failed to send streaming request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ModelStream(format!(
                "{} API error ({}): {}",
                self.provider, status, error_text
            )));
        }

        let model = request.model.clone();
        let stream = lines(response.bytes_stream())
            .filter_map(move |line| {
                let item = match line.and_then(|text| parse_sse_line(&text)) {
                    Ok(SseLine::Chunk(chunk)) => Some(Ok(chunk)),
                    Ok(SseLine::Done) => Some(Ok(LlmStreamChunk::finished(model.clone(), None))),
                    Ok(SseLine::Skip) => None,
                    Err(e) => Some(Err(e)),
                };
                futures::future::ready(item)
            });

        Ok(Box::pin(stream))
    }
}
