//! Run statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{AttemptKind, AttemptResult, CellClassification, CellReport, CellStatus};

/// Lock-free attempt counters shared by concurrent fill loops.
#[derive(Debug, Default)]
pub struct AttemptCounters {
    attempted: AtomicU64,
    successful: AtomicU64,
    duplicates: AtomicU64,
    no_data: AtomicU64,
    timeouts: AtomicU64,
    transient_errors: AtomicU64,
    fatal_errors: AtomicU64,
}

impl AttemptCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished attempt.
    pub fn record(&self, result: &AttemptResult) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        let counter = match result.kind() {
            AttemptKind::Success => &self.successful,
            AttemptKind::Duplicate => &self.duplicates,
            AttemptKind::NoData => &self.no_data,
            AttemptKind::Timeout => &self.timeouts,
            AttemptKind::Transient => &self.transient_errors,
            AttemptKind::Fatal => &self.fatal_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the attempt counters into `stats`.
    pub fn fill(&self, stats: &mut RunStats) {
        stats.total_attempted = self.attempted.load(Ordering::Relaxed);
        stats.successful = self.successful.load(Ordering::Relaxed);
        stats.duplicates = self.duplicates.load(Ordering::Relaxed);
        stats.no_data = self.no_data.load(Ordering::Relaxed);
        stats.timeouts = self.timeouts.load(Ordering::Relaxed);
        stats.transient_errors = self.transient_errors.load(Ordering::Relaxed);
        stats.fatal_errors = self.fatal_errors.load(Ordering::Relaxed);
    }
}

/// Aggregate statistics for a gap-fill run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// External calls made
    pub total_attempted: u64,
    pub successful: u64,
    pub duplicates: u64,
    pub no_data: u64,
    pub timeouts: u64,
    pub transient_errors: u64,
    pub fatal_errors: u64,

    /// Fine cells in the plan
    pub total_cells: usize,
    /// Cells already at target when the run started
    pub cells_skipped: usize,
    pub cells_completed: usize,
    pub cells_partial: usize,
    pub cells_failed: usize,
    /// Cells cut short by cancellation
    pub cells_interrupted: usize,

    pub runtime_secs: f64,

    /// (successful + duplicates) / attempted
    pub success_rate: f64,

    /// Attempts per second
    pub attempts_per_sec: f64,
}

impl RunStats {
    /// Fold one finished cell into the cell tallies.
    pub fn record_cell(&mut self, report: &CellReport) {
        if report.status == CellStatus::Satisfied {
            self.cells_completed += 1;
            return;
        }
        if report.interrupted {
            self.cells_interrupted += 1;
            return;
        }
        match report.classification {
            CellClassification::Completed => self.cells_completed += 1,
            CellClassification::Partial => self.cells_partial += 1,
            CellClassification::Failed => self.cells_failed += 1,
        }
    }

    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.total_attempted > 0 {
            self.success_rate =
                (self.successful + self.duplicates) as f64 / self.total_attempted as f64;
        }
        if self.runtime_secs > 0.0 {
            self.attempts_per_sec = self.total_attempted as f64 / self.runtime_secs;
        }
    }
}
