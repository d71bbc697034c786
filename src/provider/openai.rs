//! OpenAI Chat Completions client
//!
//! Implements the [`Provider`] trait with streaming (SSE) and blocking
//! request paths.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{AskOptions, Provider, ProviderError, STREAM_BUFFER, StreamChunk, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI API client
#[derive(Debug)]
pub struct OpenAiProvider {
    name: String,
    model: String,
    base_url: String,
    api_key: String,
    http: Client,
}

impl OpenAiProvider {
    pub fn new(
        model: impl Into<String>,
        base_url: Option<&str>,
        api_key: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        let name = format!("openai-{model}");

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
        let mut messages = Vec::new();
        if !opts.system_prompt.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": opts.system_prompt,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": prompt,
        }));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": opts.temperature,
            "stream": opts.stream,
        });

        if opts.max_tokens > 0 {
            body["max_tokens"] = serde_json::json!(opts.max_tokens);
        }

        body
    }

    async fn stream_request(&self, body: serde_json::Value, tx: mpsc::Sender<StreamChunk>) {
        debug!(model = %self.model, "stream_request: opening event stream");
        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&body);

        let mut es = match EventSource::new(request) {
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

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        continue;
                    }

                    // Skip malformed chunks, matching the lenient read path
                    let chunk: OpenAiStreamChunk = match serde_json::from_str(&msg.data) {
                        Ok(chunk) => chunk,
                        Err(_) => continue,
                    };

                    let Some(choice) = chunk.choices.first() else {
                        continue;
                    };

                    if let Some(content) = &choice.delta.content
                        && !content.is_empty()
                        && tx.send(StreamChunk::Delta(content.clone())).await.is_err()
                    {
                        break;
                    }

                    if choice.finish_reason.is_some() {
                        debug!(model = %self.model, "stream_request: finish_reason received");
                        let tokens_used = chunk.usage.map(TokenUsage::from);
                        let _ = tx.send(StreamChunk::Done { tokens_used }).await;
                        es.close();
                        return;
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
        let response = match self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
        {
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

        let parsed: OpenAiResponse = match response.json().await {
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

        let Some(choice) = parsed.choices.into_iter().next() else {
            let _ = tx
                .send(StreamChunk::Error(ProviderError::server(
                    &self.name,
                    "no choices in response",
                )))
                .await;
            return;
        };

        if tx.send(StreamChunk::Delta(choice.message.content)).await.is_ok() {
            let _ = tx
                .send(StreamChunk::Done {
                    tokens_used: parsed.usage.map(TokenUsage::from),
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
impl Provider for OpenAiProvider {
    async fn ask(&self, prompt: &str, opts: &AskOptions) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let body = self.build_request_body(prompt, opts);

        // The request runs detached; results and failures both travel over
        // the channel so the caller has a single path to drain.
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

/// Map an OpenAI error response to the provider error taxonomy
fn map_error_status(name: &str, status: u16, body: &str) -> ProviderError {
    let parsed: Option<OpenAiErrorResponse> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().map(|p| p.error.message.clone()).filter(|m| !m.is_empty());
    let code = parsed.as_ref().map(|p| p.error.code.as_deref().unwrap_or(&p.error.kind));

    if code.is_some_and(|c| c.contains("insufficient_quota")) {
        return ProviderError::quota(name, detail.unwrap_or_else(|| "quota exceeded".to_string()));
    }

    match status {
        401 => ProviderError::auth(name, detail.unwrap_or_else(|| "invalid API key".to_string())),
        429 => ProviderError::rate_limit(name, detail.unwrap_or_else(|| "rate limit exceeded".to_string())),
        400 => ProviderError::validation(name, detail.unwrap_or_else(|| "invalid request".to_string())),
        _ => ProviderError::server(name, detail.unwrap_or_else(|| format!("HTTP {status}"))),
    }
}

// OpenAI API response structures

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
    code: Option<String>,
}
