//! Judge evaluation
//!
//! Fans one worker's answer out to every configured judge concurrently and
//! keeps whichever evaluations come back valid. A failing judge is excluded
//! from the batch, never fatal to it.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::JudgeConfig;
use crate::provider::{AskOptions, ProviderError, ProviderRegistry, StreamCollector};

use super::types::JudgeResult;

/// Low temperature for consistent evaluation
const JUDGE_TEMPERATURE: f64 = 0.1;

/// Judges should be concise
const JUDGE_MAX_TOKENS: u32 = 500;

/// Why a judge response could not be turned into a score
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JudgeParseError {
    #[error("no JSON object found in judge response")]
    NoJsonObject,
    #[error("failed to decode judge response: {0}")]
    Decode(String),
    #[error("score {0} is out of range (0-10)")]
    ScoreOutOfRange(i64),
}

#[derive(Debug, Deserialize)]
struct ScorePayload {
    score: i64,
    #[serde(default)]
    reason: String,
}

/// Evaluate one worker answer with all configured judges
///
/// Returns however many valid results were produced, possibly zero; order
/// follows judge configuration order.
pub(crate) async fn evaluate_with_judges(
    registry: &Arc<ProviderRegistry>,
    judges: &[JudgeConfig],
    worker_id: &str,
    content: &str,
    original_prompt: &str,
    deadline: tokio::time::Instant,
) -> Vec<JudgeResult> {
    let mut slots: Vec<Option<JudgeResult>> = (0..judges.len()).map(|_| None).collect();
    let mut tasks = JoinSet::new();

    for (i, judge) in judges.iter().enumerate() {
        let registry = Arc::clone(registry);
        let judge = judge.clone();
        let worker_id = worker_id.to_string();
        let content = content.to_string();
        let prompt = original_prompt.to_string();
        tasks.spawn(async move {
            (
                i,
                evaluate_single_judge(registry, judge, worker_id, content, prompt, deadline).await,
            )
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((i, result)) => slots[i] = Some(result),
            Err(e) => warn!(error = %e, "judge task failed to join"),
        }
    }

    // Failed evaluations are dropped here; the batch never fails outright.
    slots
        .into_iter()
        .flatten()
        .filter(|result| result.error.is_none())
        .collect()
}

async fn evaluate_single_judge(
    registry: Arc<ProviderRegistry>,
    judge: JudgeConfig,
    worker_id: String,
    content: String,
    original_prompt: String,
    deadline: tokio::time::Instant,
) -> JudgeResult {
    let started = Instant::now();
    let mut result = JudgeResult {
        judge_id: judge.id.clone(),
        worker_id,
        score: 0,
        reason: String::new(),
        error: None,
        duration: Default::default(),
    };

    let provider = match registry.get(&judge.provider) {
        Ok(provider) => provider,
        Err(e) => {
            result.error = Some(e);
            result.duration = started.elapsed();
            return result;
        }
    };

    let evaluation_prompt = format!(
        "Original Question: {original_prompt}\n\n\
         Response to Evaluate: {content}\n\n\
         Please evaluate this response according to the criteria in your system prompt."
    );

    let opts = AskOptions {
        temperature: JUDGE_TEMPERATURE,
        max_tokens: JUDGE_MAX_TOKENS,
        system_prompt: judge.system_prompt.clone(),
        // Non-streaming for easier parsing
        stream: false,
    };

    let mut collector = StreamCollector::new(provider.name(), provider.model());
    match tokio::time::timeout_at(deadline, provider.ask(&evaluation_prompt, &opts)).await {
        Err(_) => {
            result.error = Some(ProviderError::timeout(provider.name(), "deadline exceeded"));
            result.duration = started.elapsed();
            return result;
        }
        Ok(Err(e)) => {
            result.error = Some(e);
            result.duration = started.elapsed();
            return result;
        }
        Ok(Ok(mut rx)) => collector.collect(&mut rx, deadline).await,
    }

    result.duration = started.elapsed();

    if let Some(e) = collector.error {
        result.error = Some(e);
        return result;
    }

    match parse_judge_response(&collector.content) {
        Ok((score, reason)) => {
            debug!(judge = %judge.id, score, "judge evaluation parsed");
            result.score = score;
            result.reason = reason;
        }
        Err(e) => {
            debug!(judge = %judge.id, error = %e, "judge response rejected");
            result.error = Some(ProviderError::validation(
                provider.name(),
                format!("failed to parse judge response: {e}"),
            ));
        }
    }

    result
}

/// Extract a `{score, reason}` object from a judge's free-form reply
///
/// Judges are prompted to answer in JSON but often wrap it in prose; take
/// everything between the first `{` and the last `}` and decode that.
pub fn parse_judge_response(response: &str) -> Result<(i64, String), JudgeParseError> {
    let response = response.trim();

    let start = response.find('{');
    let end = response.rfind('}');

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => return Err(JudgeParseError::NoJsonObject),
    };

    let payload: ScorePayload =
        serde_json::from_str(&response[start..=end]).map_err(|e| JudgeParseError::Decode(e.to_string()))?;

    if !(0..=10).contains(&payload.score) {
        return Err(JudgeParseError::ScoreOutOfRange(payload.score));
    }

    Ok((payload.score, payload.reason))
}

/// Average of valid judge scores, 0 when there are none
pub(crate) fn average_score(results: &[JudgeResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.score).sum::<i64>() as f64 / results.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_embedded_json() {
        let text = r#"Sure! Here is my verdict: {"score": 7, "reason": "ok"} and that's final."#;
        let (score, reason) = parse_judge_response(text).unwrap();
        assert_eq!(score, 7);
        assert_eq!(reason, "ok");
    }

    #[test]
    fn test_parses_bare_json() {
        let (score, reason) = parse_judge_response(r#"{"score": 10, "reason": "perfect"}"#).unwrap();
        assert_eq!(score, 10);
        assert_eq!(reason, "perfect");
    }

    #[test]
    fn test_missing_reason_defaults_empty() {
        let (score, reason) = parse_judge_response(r#"{"score": 0}"#).unwrap();
        assert_eq!(score, 0);
        assert_eq!(reason, "");
    }

    #[test]
    fn test_rejects_out_of_range_scores() {
        assert_eq!(
            parse_judge_response(r#"{"score": 11, "reason": "too good"}"#),
            Err(JudgeParseError::ScoreOutOfRange(11))
        );
        assert_eq!(
            parse_judge_response(r#"{"score": -1, "reason": "awful"}"#),
            Err(JudgeParseError::ScoreOutOfRange(-1))
        );
    }

    #[test]
    fn test_rejects_missing_object() {
        assert_eq!(parse_judge_response("I'd give it an 8."), Err(JudgeParseError::NoJsonObject));
        assert_eq!(parse_judge_response(""), Err(JudgeParseError::NoJsonObject));
        // A `}` before any `{` is not an object either
        assert_eq!(parse_judge_response("} nope {"), Err(JudgeParseError::NoJsonObject));
    }

    #[test]
    fn test_rejects_undecodable_object() {
        assert!(matches!(
            parse_judge_response(r#"{"score": "high"}"#),
            Err(JudgeParseError::Decode(_))
        ));
    }

    #[test]
    fn test_average_score() {
        let make = |score| JudgeResult {
            judge_id: "j".to_string(),
            worker_id: "w".to_string(),
            score,
            reason: String::new(),
            error: None,
            duration: Default::default(),
        };
        assert_eq!(average_score(&[]), 0.0);
        assert_eq!(average_score(&[make(8), make(5)]), 6.5);
    }
}
