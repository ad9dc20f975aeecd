//! Scoring service seam and response classification.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{AttemptResult, LatLon, ScoringConfig, TransientFault};

/// External service that accepts a point and scores it.
///
/// Implementations never fail: every outcome, including transport faults,
/// is expressed as an `AttemptResult`.
#[async_trait]
pub trait ScoringClient: Send + Sync {
    async fn submit(&self, point: LatLon) -> AttemptResult;

    /// Endpoint label for reports.
    fn endpoint(&self) -> String {
        "in-memory".to_string()
    }
}

/// Error body shape used by the scoring service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps raw responses onto attempt kinds using configurable markers.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    no_data_markers: Vec<String>,
    duplicate_markers: Vec<String>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(
            vec!["No Street View imagery".to_string()],
            vec!["already exists".to_string()],
        )
    }
}

impl ResponseClassifier {
    pub fn new(no_data_markers: Vec<String>, duplicate_markers: Vec<String>) -> Self {
        let lower = |markers: Vec<String>| {
            markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect()
        };
        Self {
            no_data_markers: lower(no_data_markers),
            duplicate_markers: lower(duplicate_markers),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(
            config.no_data_markers.clone(),
            config.duplicate_markers.clone(),
        )
    }

    fn matches(markers: &[String], text: &str) -> bool {
        let text = text.to_lowercase();
        markers.iter().any(|m| text.contains(m.as_str()))
    }

    /// Classify a completed HTTP exchange.
    pub fn classify(&self, status: u16, body: &str) -> AttemptResult {
        if (200..300).contains(&status) {
            let payload = serde_json::from_str::<serde_json::Value>(body)
                .unwrap_or_else(|_| serde_json::Value::String(body.to_string()));
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            if Self::matches(&self.duplicate_markers, message) {
                return AttemptResult::Duplicate(payload);
            }
            return AttemptResult::Success(payload);
        }

        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { error: Some(e), .. }) => e,
            Ok(ErrorBody {
                message: Some(m), ..
            }) => m,
            _ => body.trim().to_string(),
        };

        if Self::matches(&self.no_data_markers, &message) {
            return AttemptResult::NoData;
        }
        if status == 409 || Self::matches(&self.duplicate_markers, &message) {
            let payload = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
            return AttemptResult::Duplicate(payload);
        }
        AttemptResult::FatalError {
            status: Some(status),
            message,
        }
    }

    /// Classify a request that never produced a response.
    pub fn classify_transport(&self, error: &reqwest::Error, timeout: Duration) -> AttemptResult {
        if error.is_timeout() {
            AttemptResult::TransientError(TransientFault::Timeout(timeout))
        } else {
            AttemptResult::TransientError(TransientFault::Transport(error.to_string()))
        }
    }
}
