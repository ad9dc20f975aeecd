//! Persisted run report consumed downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CellId, RunStats, SuccessRecord};

/// Run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    /// Scoring endpoint the run talked to
    pub endpoint: String,
    pub max_concurrent: usize,
    pub target_per_cell: u32,
    pub elapsed_secs: f64,
    /// Run stopped early by operator abort
    #[serde(default)]
    pub interrupted: bool,
}

/// Coverage state at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Fine cell id -> satisfied count
    pub cell_counts: BTreeMap<CellId, u32>,
    /// Cells that finished with zero points
    #[serde(default)]
    pub failed_cells: Vec<CellId>,
    /// Cells whose candidate budget ran out below target
    #[serde(default)]
    pub exhausted_cells: Vec<CellId>,
}

/// Full structured record of a gap-fill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub stats: RunStats,
    pub coverage: CoverageSummary,
    pub results: Vec<SuccessRecord>,
}

impl RunReport {
    /// Default file name for a report written at `timestamp`.
    pub fn file_name(timestamp: DateTime<Utc>, interrupted: bool) -> String {
        let prefix = if interrupted {
            "interrupted_coverage"
        } else {
            "coverage"
        };
        format!("{prefix}_{}.json", timestamp.format("%Y%m%d_%H%M%S"))
    }
}
