//! Scripted in-memory scoring client for tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::ScoringClient;
use crate::grid::testing::SquareIndex;
use crate::models::{AttemptResult, CellId, LatLon, TransientFault};

/// Replays per-cell outcome scripts. Points are mapped to cells with
/// `SquareIndex` at `resolution`; once a script runs dry the fallback is used.
pub struct ScriptedClient {
    resolution: u8,
    scripts: Mutex<HashMap<CellId, VecDeque<AttemptResult>>>,
    fallback: AttemptResult,
    latency: Duration,
    panics_on: Option<CellId>,
    submitted: Mutex<Vec<LatLon>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedClient {
    pub fn new(resolution: u8) -> Self {
        Self {
            resolution,
            scripts: Mutex::new(HashMap::new()),
            fallback: AttemptResult::NoData,
            latency: Duration::ZERO,
            panics_on: None,
            submitted: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(self, cell: CellId, outcomes: Vec<AttemptResult>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(cell, outcomes.into());
        }
        self
    }

    pub fn fallback(mut self, outcome: AttemptResult) -> Self {
        self.fallback = outcome;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Panic inside `submit` for points of `cell`.
    pub fn panicking(mut self, cell: CellId) -> Self {
        self.panics_on = Some(cell);
        self
    }

    pub fn transport() -> AttemptResult {
        AttemptResult::TransientError(TransientFault::Transport("connection reset".into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Points submitted so far, in call order.
    pub fn submitted(&self) -> Vec<LatLon> {
        self.submitted
            .lock()
            .map(|points| points.clone())
            .unwrap_or_default()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringClient for ScriptedClient {
    async fn submit(&self, point: LatLon) -> AttemptResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(point);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let cell = SquareIndex::cell_at(point, self.resolution);
        if self.panics_on == Some(cell) {
            panic!("scripted client failure for {cell}");
        }
        let scripted = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(&cell).and_then(|q| q.pop_front()));
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}
