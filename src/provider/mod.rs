//! LLM provider layer
//!
//! Defines the capability contract every model backend implements, plus the
//! stream-collection and cost-estimation utilities shared by the runner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

mod anthropic;
mod error;
mod openai;
mod registry;

pub use anthropic::AnthropicProvider;
pub use error::{ErrorKind, ProviderError};
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;

/// Buffer size for streaming response channels
const STREAM_BUFFER: usize = 16;

/// Parameters for a single model request
#[derive(Debug, Clone, Default, Serialize)]
pub struct AskOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub stream: bool,
}

/// One chunk of a provider's response stream
///
/// A well-behaved stream is zero or more `Delta`s terminated by exactly one
/// `Done` or `Error`.
#[derive(Debug)]
pub enum StreamChunk {
    /// Incremental text content
    Delta(String),
    /// Final chunk; carries token usage when the provider reports it
    Done { tokens_used: Option<TokenUsage> },
    /// The stream failed; no further chunks follow
    Error(ProviderError),
}

/// Token consumption for cost calculation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Timing and cost record for one provider request
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub provider: String,
    pub model: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub tokens_used: Option<TokenUsage>,
    pub estimated_cost: f64,
    pub success: bool,
    pub error: Option<String>,
}

/// Capability contract for all LLM providers
///
/// `ask` returns a channel of [`StreamChunk`]s; the caller drains it with a
/// [`StreamCollector`]. Implementations must stay responsive to channel
/// closure (receiver dropped means the caller gave up).
#[async_trait]
pub trait Provider: std::fmt::Debug + Send + Sync {
    /// Send a prompt and return the streaming response channel
    async fn ask(&self, prompt: &str, opts: &AskOptions) -> Result<mpsc::Receiver<StreamChunk>, ProviderError>;

    /// Provider name for identification (e.g. `openai-gpt-4o-mini`)
    fn name(&self) -> &str;

    /// Model being used
    fn model(&self) -> &str;

    /// Estimate token count for a text (used for cost fallback)
    fn estimate_tokens(&self, text: &str) -> u64 {
        estimate_tokens_simple(text)
    }

    /// Clean up any resources
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Accumulates a streaming response into content, usage and stats
pub struct StreamCollector {
    pub content: String,
    pub tokens_used: Option<TokenUsage>,
    pub error: Option<ProviderError>,
    provider: String,
    model: String,
    start_time: DateTime<Utc>,
}

impl StreamCollector {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            content: String::new(),
            tokens_used: None,
            error: None,
            provider: provider.to_string(),
            model: model.to_string(),
            start_time: Utc::now(),
        }
    }

    /// Drain the response channel, observing the shared run deadline
    ///
    /// Deadline expiry is converted into a local Timeout error; the stream is
    /// abandoned (dropping the receiver tells the producer to stop).
    pub async fn collect(&mut self, rx: &mut mpsc::Receiver<StreamChunk>, deadline: Instant) {
        loop {
            let chunk = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => {
                    debug!(provider = %self.provider, "collect: deadline expired mid-stream");
                    self.error = Some(ProviderError::timeout(&self.provider, "deadline exceeded while streaming"));
                    return;
                }
                Ok(None) => return,
                Ok(Some(chunk)) => chunk,
            };

            match chunk {
                StreamChunk::Delta(delta) => self.content.push_str(&delta),
                StreamChunk::Done { tokens_used } => {
                    if tokens_used.is_some() {
                        self.tokens_used = tokens_used;
                    }
                    return;
                }
                StreamChunk::Error(err) => {
                    debug!(provider = %self.provider, error = %err, "collect: stream reported error");
                    self.error = Some(err);
                    return;
                }
            }
        }
    }

    /// Finalize the request record
    pub fn finish(&self) -> Stats {
        let end_time = Utc::now();
        let duration = (end_time - self.start_time).to_std().unwrap_or_default();
        Stats {
            provider: self.provider.clone(),
            model: self.model.clone(),
            start_time: self.start_time,
            end_time,
            duration,
            tokens_used: self.tokens_used,
            estimated_cost: self
                .tokens_used
                .map(|usage| estimate_cost(&self.model, &usage))
                .unwrap_or(0.0),
            success: self.error.is_none(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Rough token estimate (4 chars per token)
pub fn estimate_tokens_simple(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Per-1M-token pricing, (input, output)
fn model_pricing(model: &str) -> (f64, f64) {
    match model {
        "gpt-4o" => (5.00, 15.00),
        "gpt-4o-mini" => (0.15, 0.60),
        "gpt-4" => (30.00, 60.00),
        "gpt-3.5-turbo" => (0.50, 1.50),
        "claude-3-opus" => (15.00, 75.00),
        "claude-3-sonnet" => (3.00, 15.00),
        "claude-3-haiku" => (0.25, 1.25),
        // Mid-range default for unlisted models
        _ => (3.00, 15.00),
    }
}

/// Estimated cost in dollars for a request's token usage
pub fn estimate_cost(model: &str, tokens: &TokenUsage) -> f64 {
    let (input, output) = model_pricing(model);
    let input_cost = tokens.prompt_tokens as f64 * input / 1_000_000.0;
    let output_cost = tokens.completion_tokens as f64 * output / 1_000_000.0;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_channel(chunks: Vec<StreamChunk>) -> mpsc::Receiver<StreamChunk> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_collect_accumulates_deltas() {
        let mut rx = chunk_channel(vec![
            StreamChunk::Delta("Hel".to_string()),
            StreamChunk::Delta("lo".to_string()),
            StreamChunk::Done {
                tokens_used: Some(TokenUsage {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                }),
            },
        ]);

        let mut collector = StreamCollector::new("openai-gpt-4o-mini", "gpt-4o-mini");
        collector.collect(&mut rx, far_deadline()).await;

        assert_eq!(collector.content, "Hello");
        assert_eq!(collector.tokens_used.unwrap().total_tokens, 5);
        assert!(collector.error.is_none());
        assert!(collector.finish().success);
    }

    #[tokio::test]
    async fn test_collect_stops_on_error_chunk() {
        let mut rx = chunk_channel(vec![
            StreamChunk::Delta("partial".to_string()),
            StreamChunk::Error(ProviderError::network("openai-gpt-4o", "connection reset")),
        ]);

        let mut collector = StreamCollector::new("openai-gpt-4o", "gpt-4o");
        collector.collect(&mut rx, far_deadline()).await;

        assert_eq!(collector.content, "partial");
        let stats = collector.finish();
        assert!(!stats.success);
        assert!(stats.error.unwrap().contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_converts_deadline_to_timeout_error() {
        // Producer never sends Done; the deadline must cut the collection off.
        let (_tx, mut rx) = mpsc::channel::<StreamChunk>(STREAM_BUFFER);
        let mut collector = StreamCollector::new("anthropic-claude-3-haiku", "claude-3-haiku");
        collector
            .collect(&mut rx, Instant::now() + Duration::from_millis(50))
            .await;

        let err = collector.error.expect("deadline should surface as an error");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_estimate_tokens_simple() {
        assert_eq!(estimate_tokens_simple(""), 0);
        assert_eq!(estimate_tokens_simple("abcdefgh"), 2);
    }

    #[test]
    fn test_estimate_cost_known_and_default_models() {
        let usage = TokenUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 1_000_000,
            total_tokens: 2_000_000,
        };
        assert!((estimate_cost("gpt-4o-mini", &usage) - 0.75).abs() < 1e-9);
        // Unknown models fall back to mid-range pricing
        assert!((estimate_cost("some-new-model", &usage) - 18.00).abs() < 1e-9);
    }
}
