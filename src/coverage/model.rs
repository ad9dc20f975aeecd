//! Concurrent fine-cell coverage map.
//!
//! The single mutable source of truth for "how many usable points does each
//! cell have". Shared as `Arc<CoverageModel>`; every mutation goes through a
//! per-key `DashMap` entry lock, so updates to one cell are linearizable.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};

use crate::models::{AttemptResult, CellId, CellStatus};

/// Coverage state of one fine cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoverageEntry {
    pub count: u32,
    pub status: CellStatus,
}

/// Fine cell id -> satisfied count and status.
#[derive(Debug)]
pub struct CoverageModel {
    target: u32,
    entries: DashMap<CellId, CoverageEntry>,
}

impl CoverageModel {
    /// Empty model with the given target density (points per cell).
    pub fn new(target: u32) -> Self {
        Self {
            target,
            entries: DashMap::new(),
        }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    fn settle(&self, entry: &mut CoverageEntry) {
        if entry.count >= self.target {
            entry.status = CellStatus::Satisfied;
        }
    }

    /// Initialise counts from an authority snapshot.
    ///
    /// Existing entries take the larger of the two counts, so seeding twice
    /// (authority then checkpoint) never loses progress.
    pub fn seed(&self, existing: &HashMap<CellId, u32>) {
        for (cell, count) in existing {
            let mut entry = self.entries.entry(*cell).or_default();
            entry.count = entry.count.max(*count);
            let mut updated = *entry;
            self.settle(&mut updated);
            *entry = updated;
        }
    }

    /// Ensure every planned cell has an entry; absent cells start at 0.
    pub fn register(&self, cells: impl IntoIterator<Item = CellId>) {
        for cell in cells {
            let mut entry = self.entries.entry(cell).or_default();
            let mut updated = *entry;
            self.settle(&mut updated);
            *entry = updated;
        }
    }

    pub fn count(&self, cell: CellId) -> u32 {
        self.entries.get(&cell).map(|e| e.count).unwrap_or(0)
    }

    /// Points still missing: `max(0, target - count)`.
    pub fn needed(&self, cell: CellId) -> u32 {
        self.target.saturating_sub(self.count(cell))
    }

    /// Fold an attempt outcome into the cell.
    ///
    /// Only Success and Duplicate count; frozen cells are left untouched.
    /// Returns whether the count changed.
    pub fn record_outcome(&self, cell: CellId, outcome: &AttemptResult) -> bool {
        if !outcome.counts_toward_coverage() {
            return false;
        }
        let mut entry = self.entries.entry(cell).or_default();
        if entry.status.is_terminal() {
            return false;
        }
        let mut updated = *entry;
        updated.count += 1;
        self.settle(&mut updated);
        *entry = updated;
        true
    }

    pub fn status(&self, cell: CellId) -> CellStatus {
        match self.entries.get(&cell) {
            Some(entry) => entry.status,
            None if self.target == 0 => CellStatus::Satisfied,
            None => CellStatus::Pending,
        }
    }

    /// Freeze a pending cell as exhausted. No effect on satisfied cells.
    pub fn mark_exhausted(&self, cell: CellId) {
        let mut entry = self.entries.entry(cell).or_default();
        if entry.status == CellStatus::Pending {
            entry.status = CellStatus::Exhausted;
        }
    }

    /// Point-in-time copy of every entry, ordered by cell id.
    pub fn snapshot(&self) -> BTreeMap<CellId, CoverageEntry> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Counts only, ordered by cell id.
    pub fn counts(&self) -> BTreeMap<CellId, u32> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().count))
            .collect()
    }

    /// (pending, satisfied, exhausted)
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.entries
            .iter()
            .fold((0, 0, 0), |(p, s, e), entry| match entry.value().status {
                CellStatus::Pending => (p + 1, s, e),
                CellStatus::Satisfied => (p, s + 1, e),
                CellStatus::Exhausted => (p, s, e + 1),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransientFault;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const A: CellId = CellId(0xa);
    const B: CellId = CellId(0xb);

    #[test]
    fn test_seed_and_register() {
        let model = CoverageModel::new(2);
        model.seed(&HashMap::from([(A, 3)]));
        model.register([A, B]);

        assert_eq!(model.count(A), 3);
        assert_eq!(model.needed(A), 0);
        assert_eq!(model.status(A), CellStatus::Satisfied);
        assert_eq!(model.count(B), 0);
        assert_eq!(model.needed(B), 2);
        assert_eq!(model.status(B), CellStatus::Pending);
        assert_eq!(model.status_counts(), (1, 1, 0));
    }

    #[test]
    fn test_seed_keeps_larger_count() {
        let model = CoverageModel::new(5);
        model.seed(&HashMap::from([(A, 3)]));
        model.seed(&HashMap::from([(A, 1)]));
        assert_eq!(model.count(A), 3);
    }

    #[test]
    fn test_only_counted_outcomes_move_needed() {
        let model = CoverageModel::new(2);
        model.register([A]);

        assert!(!model.record_outcome(A, &AttemptResult::NoData));
        assert!(!model.record_outcome(
            A,
            &AttemptResult::TransientError(TransientFault::Timeout(Duration::from_secs(45)))
        ));
        assert!(!model.record_outcome(
            A,
            &AttemptResult::FatalError {
                status: Some(500),
                message: "boom".into()
            }
        ));
        assert_eq!(model.needed(A), 2);

        assert!(model.record_outcome(A, &AttemptResult::Success(json!({}))));
        assert_eq!(model.needed(A), 1);
        assert!(model.record_outcome(A, &AttemptResult::Duplicate(json!({}))));
        assert_eq!(model.needed(A), 0);
        assert_eq!(model.status(A), CellStatus::Satisfied);

        // frozen
        assert!(!model.record_outcome(A, &AttemptResult::Success(json!({}))));
        assert_eq!(model.count(A), 2);
        assert_eq!(model.needed(A), 0);
    }

    #[test]
    fn test_exhausted_is_frozen_and_never_overrides_satisfied() {
        let model = CoverageModel::new(1);
        model.register([A, B]);

        model.mark_exhausted(A);
        assert_eq!(model.status(A), CellStatus::Exhausted);
        assert!(!model.record_outcome(A, &AttemptResult::Success(json!({}))));
        assert_eq!(model.count(A), 0);

        model.record_outcome(B, &AttemptResult::Success(json!({})));
        model.mark_exhausted(B);
        assert_eq!(model.status(B), CellStatus::Satisfied);
    }

    #[test]
    fn test_unknown_cells_are_created_on_first_outcome() {
        let model = CoverageModel::new(1);
        assert_eq!(model.status(A), CellStatus::Pending);
        model.record_outcome(A, &AttemptResult::Success(json!({})));
        assert_eq!(model.len(), 1);
        assert_eq!(model.snapshot()[&A].status, CellStatus::Satisfied);
    }

    #[tokio::test]
    async fn test_concurrent_updates_never_overshoot() {
        let model = Arc::new(CoverageModel::new(10));
        model.register([A]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let model = Arc::clone(&model);
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    model.record_outcome(A, &AttemptResult::Success(json!({})));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(model.count(A), 10);
        assert_eq!(model.needed(A), 0);
    }
}
