//! Attempt outcomes and per-cell results.
//!
//! `AttemptResult` is what the scoring collaborator hands back for one
//! candidate. It is data, not an error: every kind is consumed by the fill
//! loop and folded into coverage and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CandidatePoint, CellId};

/// Outcome of submitting one candidate point to the scoring service.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    /// New point accepted and scored.
    Success(serde_json::Value),
    /// Point already known to the service. Still proves the cell has a usable point.
    Duplicate(serde_json::Value),
    /// No usable external data at this location.
    NoData,
    /// Timeout or transport-layer fault.
    TransientError(TransientFault),
    /// Semantic rejection by the service, for this candidate only.
    FatalError { status: Option<u16>, message: String },
}

/// Why a transient failure happened.
#[derive(Debug, Clone, PartialEq)]
pub enum TransientFault {
    Timeout(Duration),
    Transport(String),
}

/// Payload-free tag of an `AttemptResult`, used for logs and persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Success,
    Duplicate,
    NoData,
    Timeout,
    Transient,
    Fatal,
}

impl AttemptResult {
    /// Success and Duplicate both count toward a cell's density.
    pub fn counts_toward_coverage(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Duplicate(_))
    }

    pub fn kind(&self) -> AttemptKind {
        match self {
            Self::Success(_) => AttemptKind::Success,
            Self::Duplicate(_) => AttemptKind::Duplicate,
            Self::NoData => AttemptKind::NoData,
            Self::TransientError(TransientFault::Timeout(_)) => AttemptKind::Timeout,
            Self::TransientError(TransientFault::Transport(_)) => AttemptKind::Transient,
            Self::FatalError { .. } => AttemptKind::Fatal,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Success(payload) | Self::Duplicate(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Coverage state of a fine cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    /// Below target and still eligible for attempts
    #[default]
    Pending,
    /// Target density reached
    Satisfied,
    /// Candidate budget spent without reaching target
    Exhausted,
}

impl CellStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Final classification of a cell after its fill loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellClassification {
    /// Target reached
    Completed,
    /// Some points but below target
    Partial,
    /// No points at all
    Failed,
}

impl CellClassification {
    pub fn from_count(count: u32, target: u32) -> Self {
        if count >= target {
            Self::Completed
        } else if count > 0 {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

/// A candidate that produced a Success or Duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub cell: CellId,
    pub lat: f64,
    pub lon: f64,
    pub kind: AttemptKind,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl SuccessRecord {
    /// Build a record when the attempt counted toward coverage.
    pub fn from_attempt(candidate: &CandidatePoint, result: &AttemptResult) -> Option<Self> {
        let payload = result.payload()?;
        Some(Self {
            cell: candidate.cell,
            lat: candidate.lat,
            lon: candidate.lon,
            kind: result.kind(),
            payload: payload.clone(),
            recorded_at: Utc::now(),
        })
    }
}

/// Everything one fill loop did for one cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellReport {
    pub cell: CellId,
    /// Count before the loop started (seeded from the coverage authority)
    pub initial_count: u32,
    /// Count when the loop ended
    pub final_count: u32,
    pub attempts: u32,
    /// Backoff delays actually slept, in order
    #[serde(with = "duration_millis")]
    pub backoff: Vec<Duration>,
    pub status: CellStatus,
    pub classification: CellClassification,
    /// Loop stopped by cancellation before reaching a terminal state
    #[serde(default)]
    pub interrupted: bool,
    #[serde(skip)]
    pub successes: Vec<SuccessRecord>,
}

impl CellReport {
    pub fn new(cell: CellId, initial_count: u32) -> Self {
        Self {
            cell,
            initial_count,
            final_count: initial_count,
            attempts: 0,
            backoff: Vec::new(),
            status: CellStatus::Pending,
            classification: CellClassification::Failed,
            interrupted: false,
            successes: Vec::new(),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(delays: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<u64> = delays.iter().map(|d| d.as_millis() as u64).collect();
        millis.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let millis = Vec::<u64>::deserialize(d)?;
        Ok(millis.into_iter().map(Duration::from_millis).collect())
    }
}
