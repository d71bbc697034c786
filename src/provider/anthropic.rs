//! Anthropic Messages API client
//!
//! Implements the [`Provider`] trait for Claude models with streaming (SSE)
//! and blocking request paths.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{AskOptions, Provider, ProviderError, STREAM_BUFFER, StreamChunk, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const API_VERSION: &str = "2023-06-01";

/// The Messages API requires an explicit completion cap
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Anthropic Claude API client
#[derive(Debug)]
pub struct AnthropicProvider {
    name: String,
    model: String,
    base_url: String,
    api_key: String,
    http: Client,
}

impl AnthropicProvider {
    pub fn new(
        model: impl Into<String>,
        base_url: Option<&str>,
        api_key: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        let name = format!("anthropic-{model}");

        if api_key.is_empty() {
            return Err(ProviderError::auth(&name, "API key is required"));
        }

        let base_url = match base_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => DEFAULT_BASE_URL.to_string(),
        };

        let http = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| ProviderError::network(&name, "failed to build HTTP client").with_source(e))?;

        Ok(Self {
            name,
            model,
            base_url,
            api_key: api_key.to_string(),
            http,
        })
    }

    fn build_request_body(&self, prompt: &str, opts: &AskOptions) -> serde_json::Value {
        let max_tokens = if opts.max_tokens > 0 { opts.max_tokens } else { DEFAULT_MAX_TOKENS };

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": opts.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        if !opts.system_prompt.is_empty() {
            body["system"] = serde_json::json!(opts.system_prompt);
        }
        if opts.stream {
            body["stream"] = serde_json::json!(true);
        }

        body
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    async fn stream_request(&self, body: serde_json::Value, tx: mpsc::Sender<StreamChunk>) {
        debug!(model = %self.model, "stream_request: opening event stream");
        let mut es = match EventSource::new(self.request(&body)) {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(StreamChunk::Error(
                        ProviderError::validation(&self.name, "failed to create event stream").with_source(e),
                    ))
                    .await;
                return;
            }
        };

        let mut usage = TokenUsage::default();
        let mut saw_usage = false;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    let data: serde_json::Value = match serde_json::from_str(&msg.data) {
                        Ok(data) => data,
                        Err(_) => continue,
                    };

                    match data["type"].as_str() {
                        Some("message_start") => {
                            if let Some(u) = data["message"].get("usage") {
                                usage.prompt_tokens = u["input_tokens"].as_u64().unwrap_or(0);
                                saw_usage = true;
                            }
                        }
                        Some("content_block_delta") => {
                            if let Some(text) = data["delta"]["text"].as_str()
                                && !text.is_empty()
                                && tx.send(StreamChunk::Delta(text.to_string())).await.is_err()
                            {
                                break;
                            }
                        }
                        Some("message_delta") => {
                            if let Some(u) = data.get("usage") {
                                usage.completion_tokens = u["output_tokens"].as_u64().unwrap_or(0);
                                saw_usage = true;
                            }
                        }
                        Some("message_stop") => {
                            debug!(model = %self.model, "stream_request: message_stop");
                            usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                            let tokens_used = saw_usage.then_some(usage);
                            let _ = tx.send(StreamChunk::Done { tokens_used }).await;
                            es.close();
                            return;
                        }
                        _ => {}
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    let _ = tx
                        .send(StreamChunk::Error(map_error_status(&self.name, status.as_u16(), &body)))
                        .await;
                    es.close();
                    return;
                }
                Err(e) => {
                    debug!(model = %self.model, error = %e, "stream_request: transport error");
                    let _ = tx
                        .send(StreamChunk::Error(
                            ProviderError::network(&self.name, "error reading stream").with_source(e),
                        ))
                        .await;
                    es.close();
                    return;
                }
            }
        }
    }

    async fn blocking_request(&self, body: serde_json::Value, tx: mpsc::Sender<StreamChunk>) {
        debug!(model = %self.model, "blocking_request: sending");
        let response = match self.request(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                let _ = tx
                    .send(StreamChunk::Error(
                        ProviderError::network(&self.name, "request failed").with_source(e),
                    ))
                    .await;
                return;
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let _ = tx
                .send(StreamChunk::Error(map_error_status(&self.name, status, &body)))
                .await;
            return;
        }

        let parsed: AnthropicResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = tx
                    .send(StreamChunk::Error(
                        ProviderError::validation(&self.name, "failed to parse response").with_source(e),
                    ))
                    .await;
                return;
            }
        };

        let content: String = parsed.content.iter().map(|block| block.text.as_str()).collect();
        if tx.send(StreamChunk::Delta(content)).await.is_ok() {
            let _ = tx
                .send(StreamChunk::Done {
                    tokens_used: Some(parsed.usage.into()),
                })
                .await;
        }
    }

    fn clone_for_task(&self) -> Self {
        Self {
            name: self.name.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            http: self.http.clone(),
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn ask(&self, prompt: &str, opts: &AskOptions) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let body = self.build_request_body(prompt, opts);

        let this = self.clone_for_task();
        let stream = opts.stream;
        tokio::spawn(async move {
            if stream {
                this.stream_request(body, tx).await;
            } else {
                this.blocking_request(body, tx).await;
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Map an Anthropic error response to the provider error taxonomy
fn map_error_status(name: &str, status: u16, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<AnthropicErrorResponse>(body)
        .ok()
        .map(|p| p.error.message)
        .filter(|m| !m.is_empty());

    match status {
        401 => ProviderError::auth(name, detail.unwrap_or_else(|| "invalid API key".to_string())),
        429 => ProviderError::rate_limit(name, detail.unwrap_or_else(|| "rate limit exceeded".to_string())),
        400 => ProviderError::validation(name, detail.unwrap_or_else(|| "invalid request".to_string())),
        _ => ProviderError::server(name, detail.unwrap_or_else(|| format!("HTTP {status}"))),
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl From<AnthropicUsage> for TokenUsage {
    fn from(usage: AnthropicUsage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(default)]
    message: String,
}
