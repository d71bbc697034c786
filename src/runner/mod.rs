//! Worker orchestration
//!
//! Fans a prompt out to every configured worker concurrently, collects the
//! streamed answers in configuration order, and hands the survivors to the
//! consensus engine. A failing worker never takes the run down with it; only
//! configuration-level problems abort the run as a whole.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

mod consensus;
mod judge;
mod types;

pub use consensus::ConsensusError;
pub use judge::{JudgeParseError, parse_judge_response};
pub use types::{Consensus, JudgeResult, RunResult, WorkerResult};

use crate::config::{Config, WorkerConfig};
use crate::provider::{AskOptions, ProviderError, ProviderRegistry, StreamCollector, TokenUsage, estimate_cost};

/// Why a run aborted
///
/// `Consensus` still carries the full per-worker results: a run can hold
/// worker-level successes alongside the overall failure, and callers need
/// both.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no workers configured")]
    NoWorkers,
    #[error("consensus failed: {error}")]
    Consensus {
        #[source]
        error: ConsensusError,
        result: Box<RunResult>,
    },
}

/// Orchestrates multiple workers to process prompts
pub struct Runner {
    config: Arc<Config>,
    registry: Arc<ProviderRegistry>,
}

impl Runner {
    /// Create a runner, building every configured provider up front
    pub fn new(config: Config) -> Result<Self, ProviderError> {
        let registry = ProviderRegistry::from_config(&config)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Create a runner over an existing registry
    ///
    /// Lets tests (and embedders) supply their own provider implementations.
    pub fn with_registry(config: Config, registry: ProviderRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }

    /// Execute the prompt across all configured workers
    pub async fn run(&self, prompt: &str) -> Result<RunResult, RunError> {
        if self.config.workers.is_empty() {
            return Err(RunError::NoWorkers);
        }

        let start_time = Utc::now();
        let started = Instant::now();
        // One deadline shared by every worker task and its nested judges
        let deadline = started + self.config.consensus.timeout();

        info!(
            workers = self.config.workers.len(),
            algorithm = %self.config.consensus.algorithm,
            "starting run"
        );

        let workers = self.run_workers(prompt, deadline).await;

        let mut result = RunResult {
            prompt: prompt.to_string(),
            workers,
            consensus: None,
            total_duration: Default::default(),
            total_tokens: 0,
            estimated_cost: 0.0,
            success: false,
            start_time,
            end_time: start_time,
        };
        aggregate_totals(&mut result);

        let consensus =
            consensus::run_consensus(&self.config, &self.registry, &mut result.workers, prompt, deadline).await;

        result.end_time = Utc::now();
        result.total_duration = started.elapsed();

        match consensus {
            Ok(consensus) => {
                info!(winner = %consensus.winner, confidence = consensus.confidence, "consensus reached");
                result.consensus = Some(consensus);
                result.success = true;
                Ok(result)
            }
            Err(error) => {
                warn!(error = %error, "run finished without consensus");
                Err(RunError::Consensus {
                    error,
                    result: Box::new(result),
                })
            }
        }
    }

    /// Fan the prompt out to all workers
    ///
    /// One task per worker; each writes its result back through the join as
    /// `(index, result)`, so the output lands in a pre-sized slot vector and
    /// the final order is configuration order no matter which task finishes
    /// first.
    async fn run_workers(&self, prompt: &str, deadline: Instant) -> Vec<WorkerResult> {
        let mut slots: Vec<Option<WorkerResult>> = (0..self.config.workers.len()).map(|_| None).collect();
        let mut tasks = JoinSet::new();

        for (i, worker) in self.config.workers.iter().enumerate() {
            let registry = Arc::clone(&self.registry);
            let worker = worker.clone();
            let prompt = prompt.to_string();
            tasks.spawn(async move { (i, run_single_worker(registry, worker, prompt, deadline).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, result)) => slots[i] = Some(result),
                Err(e) => warn!(error = %e, "worker task failed to join"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| {
                    WorkerResult::failed(
                        self.config.workers[i].id.clone(),
                        ProviderError::unknown("runner", "worker task panicked"),
                    )
                })
            })
            .collect()
    }

    /// Close all providers
    pub async fn close(&self) {
        self.registry.close_all().await;
    }
}

/// Execute the prompt on a single worker
///
/// Every failure path returns a populated result; nothing here propagates an
/// error to the surrounding fan-out.
async fn run_single_worker(
    registry: Arc<ProviderRegistry>,
    worker: WorkerConfig,
    prompt: String,
    deadline: Instant,
) -> WorkerResult {
    debug!(worker = %worker.id, provider = %worker.provider, "worker starting");

    let provider = match registry.get(&worker.provider) {
        Ok(provider) => provider,
        Err(e) => return WorkerResult::failed(worker.id, e),
    };

    let opts = AskOptions {
        temperature: worker.temperature,
        max_tokens: worker.max_tokens,
        system_prompt: worker.system_prompt.clone(),
        // Always stream worker answers
        stream: true,
    };

    let mut collector = StreamCollector::new(provider.name(), provider.model());
    match tokio::time::timeout_at(deadline, provider.ask(&prompt, &opts)).await {
        Err(_) => {
            collector.error = Some(ProviderError::timeout(provider.name(), "deadline exceeded"));
        }
        Ok(Err(e)) => {
            collector.error = Some(e);
        }
        Ok(Ok(mut rx)) => collector.collect(&mut rx, deadline).await,
    }

    let mut result = WorkerResult::empty(worker.id);
    result.content = std::mem::take(&mut collector.content);
    result.tokens_used = collector.tokens_used;

    // Providers don't all report usage; fall back to a length-based estimate
    // so cost aggregation still works.
    if result.tokens_used.is_none() && collector.error.is_none() && !result.content.is_empty() {
        let prompt_tokens = provider.estimate_tokens(&prompt) + provider.estimate_tokens(&opts.system_prompt);
        let completion_tokens = provider.estimate_tokens(&result.content);
        result.tokens_used = Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        });
    }

    let mut stats = collector.finish();
    stats.tokens_used = result.tokens_used;
    if let Some(usage) = &result.tokens_used {
        stats.estimated_cost = estimate_cost(provider.model(), usage);
    }

    result.error = collector.error;
    result.stats = Some(stats);

    debug!(
        worker = %result.worker_id,
        success = result.succeeded(),
        chars = result.content.len(),
        "worker finished"
    );
    result
}

/// Totals across all workers
fn aggregate_totals(result: &mut RunResult) {
    let mut total_tokens = 0;
    let mut total_cost = 0.0;

    for worker in &result.workers {
        if worker.error.is_none()
            && let Some(usage) = &worker.tokens_used
        {
            total_tokens += usage.total_tokens;
        }
        if let Some(stats) = &worker.stats {
            total_cost += stats.estimated_cost;
        }
    }

    result.total_tokens = total_tokens;
    result.estimated_cost = total_cost;
}
