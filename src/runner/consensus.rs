//! Consensus selection
//!
//! Selects one winning answer from the successful workers according to the
//! configured algorithm. Selection never invents content; it only picks and
//! explains.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::provider::ProviderRegistry;

use super::judge::{average_score, evaluate_with_judges};
use super::types::{Consensus, WorkerResult};

/// Neutral comparison score for workers no judge managed to evaluate
const DEFAULT_SCORE: f64 = 5.0;

/// Why no consensus could be produced
#[derive(Debug, Error, PartialEq)]
pub enum ConsensusError {
    #[error("no successful workers to build consensus from")]
    NoSuccessfulWorkers,
    #[error("{0} consensus is not implemented")]
    NotImplemented(String),
    #[error("unknown consensus algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("best score {best:.2} does not meet minimum threshold {min:.2}")]
    BelowThreshold { best: f64, min: f64 },
}

/// Run the configured consensus algorithm over the collected worker results
///
/// `workers` is mutated in place for `score_top1`: judge results and average
/// scores are attached to the entries they belong to.
pub(crate) async fn run_consensus(
    config: &Config,
    registry: &Arc<ProviderRegistry>,
    workers: &mut [WorkerResult],
    original_prompt: &str,
    deadline: tokio::time::Instant,
) -> Result<Consensus, ConsensusError> {
    let successful: Vec<usize> = workers
        .iter()
        .enumerate()
        .filter(|(_, w)| w.succeeded())
        .map(|(i, _)| i)
        .collect();

    if successful.is_empty() {
        return Err(ConsensusError::NoSuccessfulWorkers);
    }

    let algorithm = config.consensus.algorithm.as_str();
    debug!(algorithm, participants = successful.len(), "running consensus");

    match algorithm {
        "majority" => Ok(majority(algorithm, workers, &successful)),
        "score_top1" => score_top1(config, registry, workers, &successful, original_prompt, deadline).await,
        "embedding_cluster" | "referee" => Err(ConsensusError::NotImplemented(algorithm.to_string())),
        other => Err(ConsensusError::UnknownAlgorithm(other.to_string())),
    }
}

/// Simple majority
///
/// Picks the first successful response in configuration order. Not a
/// similarity vote; no such vote exists yet, and callers rely on this exact
/// behavior, so keep it until a real one replaces it wholesale.
fn majority(algorithm: &str, workers: &[WorkerResult], successful: &[usize]) -> Consensus {
    let winner = &workers[successful[0]];

    Consensus {
        algorithm: algorithm.to_string(),
        winner: winner.worker_id.clone(),
        content: winner.content.clone(),
        confidence: 1.0 / successful.len() as f64,
        reasoning: format!("Selected response from {} (simple majority algorithm)", winner.worker_id),
        participants: successful.len(),
    }
}

/// Judge-scored selection
///
/// Every successful worker is evaluated by every judge; the strictly highest
/// average wins (ties go to the earliest worker). Workers that no judge
/// evaluated compare at a neutral default rather than zero, so one flaky
/// judge batch cannot bury an answer.
async fn score_top1(
    config: &Config,
    registry: &Arc<ProviderRegistry>,
    workers: &mut [WorkerResult],
    successful: &[usize],
    original_prompt: &str,
    deadline: tokio::time::Instant,
) -> Result<Consensus, ConsensusError> {
    let algorithm = config.consensus.algorithm.as_str();

    if config.judges.is_empty() {
        debug!("no judges configured, falling back to majority");
        return Ok(majority(algorithm, workers, successful));
    }

    for &i in successful {
        let results = evaluate_with_judges(
            registry,
            &config.judges,
            &workers[i].worker_id,
            &workers[i].content,
            original_prompt,
            deadline,
        )
        .await;

        if results.is_empty() {
            warn!(worker = %workers[i].worker_id, "no valid judge evaluations for worker");
        }

        workers[i].average_score = average_score(&results);
        workers[i].judge_results = results;
    }

    let mut best: Option<usize> = None;
    let mut best_score = -1.0;

    for &i in successful {
        let score = if workers[i].judge_results.is_empty() {
            DEFAULT_SCORE
        } else {
            workers[i].average_score
        };
        if score > best_score {
            best_score = score;
            best = Some(i);
        }
    }

    let best = best.ok_or(ConsensusError::NoSuccessfulWorkers)?;

    if best_score < config.consensus.min_score {
        return Err(ConsensusError::BelowThreshold {
            best: best_score,
            min: config.consensus.min_score,
        });
    }

    let winner = &workers[best];
    let mut reasoning = format!(
        "Selected {} with average score {:.2} from {} judges",
        winner.worker_id,
        best_score,
        config.judges.len()
    );

    if !winner.judge_results.is_empty() {
        let scores: Vec<String> = winner
            .judge_results
            .iter()
            .map(|r| format!("{}: {}", r.judge_id, r.score))
            .collect();
        reasoning.push_str(&format!(" ({})", scores.join(", ")));
    }

    Ok(Consensus {
        algorithm: algorithm.to_string(),
        winner: winner.worker_id.clone(),
        content: winner.content.clone(),
        // 0-10 score mapped onto 0-1 confidence
        confidence: best_score / 10.0,
        reasoning,
        participants: successful.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusConfig;
    use crate::runner::types::WorkerResult;

    fn worker(id: &str, content: &str) -> WorkerResult {
        let mut result = WorkerResult::empty(id);
        result.content = content.to_string();
        result
    }

    fn config_for(algorithm: &str) -> Config {
        Config {
            consensus: ConsensusConfig {
                algorithm: algorithm.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn deadline() -> tokio::time::Instant {
        tokio::time::Instant::now() + std::time::Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_majority_picks_first_successful() {
        let config = config_for("majority");
        let registry = Arc::new(ProviderRegistry::new());
        let mut workers = vec![
            WorkerResult::failed("w1", crate::provider::ProviderError::network("p", "down")),
            worker("w2", "B"),
            worker("w3", "C"),
        ];

        let consensus = run_consensus(&config, &registry, &mut workers, "q", deadline())
            .await
            .unwrap();

        assert_eq!(consensus.winner, "w2");
        assert_eq!(consensus.content, "B");
        assert_eq!(consensus.participants, 2);
        assert!((consensus.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_content_is_not_successful() {
        let config = config_for("majority");
        let registry = Arc::new(ProviderRegistry::new());
        let mut workers = vec![worker("w1", ""), worker("w2", "real answer")];

        let consensus = run_consensus(&config, &registry, &mut workers, "q", deadline())
            .await
            .unwrap();

        assert_eq!(consensus.winner, "w2");
        assert_eq!(consensus.participants, 1);
        assert!((consensus.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_successful_workers() {
        let config = config_for("majority");
        let registry = Arc::new(ProviderRegistry::new());
        let mut workers = vec![WorkerResult::failed(
            "w1",
            crate::provider::ProviderError::timeout("p", "deadline exceeded"),
        )];

        let err = run_consensus(&config, &registry, &mut workers, "q", deadline())
            .await
            .unwrap_err();
        assert_eq!(err, ConsensusError::NoSuccessfulWorkers);
    }

    #[tokio::test]
    async fn test_declared_algorithms_fail_explicitly() {
        let registry = Arc::new(ProviderRegistry::new());
        for algorithm in ["embedding_cluster", "referee"] {
            let config = config_for(algorithm);
            let mut workers = vec![worker("w1", "A")];
            let err = run_consensus(&config, &registry, &mut workers, "q", deadline())
                .await
                .unwrap_err();
            assert_eq!(err, ConsensusError::NotImplemented(algorithm.to_string()));
        }
    }

    #[tokio::test]
    async fn test_unknown_algorithm_is_rejected() {
        let config = config_for("plurality");
        let registry = Arc::new(ProviderRegistry::new());
        let mut workers = vec![worker("w1", "A")];
        let err = run_consensus(&config, &registry, &mut workers, "q", deadline())
            .await
            .unwrap_err();
        assert_eq!(err, ConsensusError::UnknownAlgorithm("plurality".to_string()));
    }

    #[tokio::test]
    async fn test_score_top1_without_judges_matches_majority() {
        let registry = Arc::new(ProviderRegistry::new());

        let mut majority_workers = vec![worker("w1", "A"), worker("w2", "B")];
        let majority = run_consensus(&config_for("majority"), &registry, &mut majority_workers, "q", deadline())
            .await
            .unwrap();

        let mut scored_workers = vec![worker("w1", "A"), worker("w2", "B")];
        let scored = run_consensus(&config_for("score_top1"), &registry, &mut scored_workers, "q", deadline())
            .await
            .unwrap();

        // Identical selection; only the algorithm label differs
        assert_eq!(scored.winner, majority.winner);
        assert_eq!(scored.content, majority.content);
        assert_eq!(scored.confidence, majority.confidence);
        assert_eq!(scored.reasoning, majority.reasoning);
        assert_eq!(scored.participants, majority.participants);
        assert_eq!(scored.algorithm, "score_top1");
    }
}
