//! Run result types
//!
//! Everything here is created fresh per run and never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::provider::{ProviderError, Stats, TokenUsage};

/// The result from a single judge evaluation
#[derive(Debug, Serialize)]
pub struct JudgeResult {
    pub judge_id: String,
    pub worker_id: String,
    /// Integer score in [0, 10]
    pub score: i64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
    pub duration: Duration,
}

/// The result from a single worker
#[derive(Debug, Serialize)]
pub struct WorkerResult {
    pub worker_id: String,
    pub content: String,
    pub tokens_used: Option<TokenUsage>,
    pub stats: Option<Stats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub judge_results: Vec<JudgeResult>,
    pub average_score: f64,
}

impl WorkerResult {
    pub(crate) fn empty(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            content: String::new(),
            tokens_used: None,
            stats: None,
            error: None,
            judge_results: Vec::new(),
            average_score: 0.0,
        }
    }

    pub(crate) fn failed(worker_id: impl Into<String>, error: ProviderError) -> Self {
        let mut result = Self::empty(worker_id);
        result.error = Some(error);
        result
    }

    /// A worker counts toward consensus only if it errored nowhere and
    /// produced actual content.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && !self.content.is_empty()
    }
}

/// The final consensus selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consensus {
    pub algorithm: String,
    /// Worker ID of the winning response
    pub winner: String,
    /// Final consensus content
    pub content: String,
    /// Confidence score (0-1)
    pub confidence: f64,
    /// Why this consensus was chosen
    pub reasoning: String,
    /// Number of workers that succeeded
    pub participants: usize,
}

/// Results from all workers plus the aggregate view
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub prompt: String,
    /// Always in configuration order, regardless of completion order
    pub workers: Vec<WorkerResult>,
    pub consensus: Option<Consensus>,
    pub total_duration: Duration,
    pub total_tokens: u64,
    pub estimated_cost: f64,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    #[test]
    fn test_succeeded_requires_content_and_no_error() {
        let mut result = WorkerResult::empty("w1");
        assert!(!result.succeeded());

        result.content = "answer".to_string();
        assert!(result.succeeded());

        result.error = Some(ProviderError::network("p", "boom"));
        assert!(!result.succeeded());
    }

    #[test]
    fn test_failed_worker_serializes_error() {
        let result = WorkerResult::failed("w1", ProviderError::timeout("p", "deadline exceeded"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error"]["kind"], "timeout");
        assert_eq!(json["worker_id"], "w1");
    }
}
