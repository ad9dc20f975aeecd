//! Gap-fill scheduler.
//!
//! One sequential fill loop per under-covered fine cell, at most
//! `max_concurrent` loops in flight. Each loop keeps submitting shuffled
//! candidates until the cell reaches its target density or the candidate
//! budget runs out, sleeping an exponential backoff between attempts.
//!
//! Per-attempt failures are data (`AttemptResult`) and never abort a cell or
//! the run. Cancellation stops dispatching, cuts backoff sleeps short and lets
//! in-flight attempts finish; cells cut short stay pending.

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Backoff;
use crate::checkpoint::CheckpointManager;
use crate::client::ScoringClient;
use crate::coverage::CoverageModel;
use crate::grid::{Cell, CellSampler, FILL_STREAM};
use crate::models::{
    AttemptCounters, AttemptResult, CandidatePoint, CellClassification, CellId, CellReport,
    CellStatus, RunStats, SchedulerConfig, SuccessRecord, TransientFault,
};

/// Tunables of a gap-fill run.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Fill loops allowed in flight
    pub max_concurrent: usize,
    /// Attempts allowed per missing point
    pub attempt_multiplier: u32,
    pub backoff: Backoff,
    /// Pause between dispatching successive cells
    pub dispatch_delay: Duration,
    /// Upper bound on a single external call
    pub attempt_timeout: Duration,
    /// Save the checkpoint every N finished cells (0 disables periodic saves)
    pub checkpoint_every: usize,
    pub show_progress: bool,
    /// Salt for fill-time candidates, so each run draws new extra points
    pub run_nonce: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default(), Duration::from_secs(45))
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig, attempt_timeout: Duration) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            attempt_multiplier: config.attempt_multiplier,
            backoff: Backoff::from_secs_f64(config.backoff_base_secs, config.backoff_cap_secs),
            dispatch_delay: Duration::from_millis(config.dispatch_delay_ms),
            attempt_timeout,
            checkpoint_every: 25,
            show_progress: false,
            run_nonce: rand::random(),
        }
    }
}

/// A fine cell to fill together with its pre-generated candidates.
#[derive(Debug, Clone)]
pub struct CellWork {
    pub cell: Cell,
    pub seeds: Vec<CandidatePoint>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: RunStats,
    /// Reports of every dispatched cell, in completion order
    pub cells: Vec<CellReport>,
    pub results: Vec<SuccessRecord>,
    pub interrupted: bool,
}

/// Drives fill loops across cells with bounded concurrency.
pub struct GapFillScheduler {
    client: Arc<dyn ScoringClient>,
    sampler: Arc<CellSampler>,
    coverage: Arc<CoverageModel>,
    settings: SchedulerSettings,
    counters: Arc<AttemptCounters>,
    semaphore: Arc<Semaphore>,
}

impl GapFillScheduler {
    pub fn new(
        client: Arc<dyn ScoringClient>,
        sampler: Arc<CellSampler>,
        coverage: Arc<CoverageModel>,
        settings: SchedulerSettings,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            client,
            sampler,
            coverage,
            settings,
            counters: Arc::new(AttemptCounters::new()),
            semaphore,
        }
    }

    pub fn coverage(&self) -> &Arc<CoverageModel> {
        &self.coverage
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Fill every under-covered cell in `work`.
    pub async fn run(&self, work: Vec<CellWork>, cancel: CancellationToken) -> RunOutcome {
        self.run_with_checkpoint(work, cancel, None).await
    }

    /// Fill every under-covered cell, folding finished cells into `checkpoint`.
    pub async fn run_with_checkpoint(
        &self,
        work: Vec<CellWork>,
        cancel: CancellationToken,
        checkpoint: Option<&mut CheckpointManager>,
    ) -> RunOutcome {
        let start = Instant::now();
        self.coverage.register(work.iter().map(|w| w.cell.id));

        let total_cells = work.len();
        let (pending, skipped): (Vec<_>, Vec<_>) = work
            .into_iter()
            .partition(|w| self.coverage.status(w.cell.id) == CellStatus::Pending);

        info!(
            total_cells,
            pending = pending.len(),
            skipped = skipped.len(),
            target = self.coverage.target(),
            max_concurrent = self.settings.max_concurrent,
            "Starting gap fill"
        );

        let mut collector = Collector::new(
            progress_bar(pending.len(), self.settings.show_progress),
            checkpoint,
            self.settings.checkpoint_every,
        );
        collector.stats.total_cells = total_cells;
        collector.stats.cells_skipped = skipped.len();

        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;
        let to_dispatch = pending.len();

        for item in pending {
            if cancel.is_cancelled() {
                break;
            }
            if dispatched > 0 && !self.settings.dispatch_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.dispatch_delay) => {}
                }
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => {
                        warn!("Scheduler semaphore closed, stopping dispatch");
                        break;
                    }
                },
            };

            let cell = item.cell.id;
            let filler = self.filler(cancel.clone());
            let handle = tasks.spawn(async move {
                let _permit = permit;
                filler.fill(item).await
            });
            collector.running.insert(handle.id(), cell);
            dispatched += 1;

            while let Some(joined) = tasks.try_join_next_with_id() {
                collector.absorb(joined, &self.coverage);
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            collector.absorb(joined, &self.coverage);
        }

        let interrupted = cancel.is_cancelled() && (dispatched < to_dispatch || collector.cut_short);
        let never_started = to_dispatch - dispatched;
        if never_started > 0 {
            info!(cells = never_started, "Cells left pending by cancellation");
        }

        let mut stats = collector.finish();
        stats.cells_interrupted += never_started;
        stats.runtime_secs = start.elapsed().as_secs_f64();
        self.counters.fill(&mut stats);
        stats.finalize();

        info!(
            attempted = stats.total_attempted,
            completed = stats.cells_completed,
            partial = stats.cells_partial,
            failed = stats.cells_failed,
            interrupted = stats.cells_interrupted,
            "Gap fill finished"
        );

        RunOutcome {
            stats,
            cells: collector.cells,
            results: collector.results,
            interrupted,
        }
    }

    fn filler(&self, cancel: CancellationToken) -> CellFiller {
        CellFiller {
            client: Arc::clone(&self.client),
            sampler: Arc::clone(&self.sampler),
            coverage: Arc::clone(&self.coverage),
            counters: Arc::clone(&self.counters),
            backoff: self.settings.backoff,
            attempt_multiplier: self.settings.attempt_multiplier,
            attempt_timeout: self.settings.attempt_timeout,
            run_nonce: self.settings.run_nonce,
            cancel,
        }
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
        .map(|s| s.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Folds finished cells into stats, results and the checkpoint.
struct Collector<'a> {
    pb: ProgressBar,
    checkpoint: Option<&'a mut CheckpointManager>,
    checkpoint_every: usize,
    since_save: usize,
    /// Cell of every fill task still in the join set
    running: HashMap<Id, CellId>,
    stats: RunStats,
    cells: Vec<CellReport>,
    results: Vec<SuccessRecord>,
    cut_short: bool,
}

impl<'a> Collector<'a> {
    fn new(
        pb: ProgressBar,
        checkpoint: Option<&'a mut CheckpointManager>,
        checkpoint_every: usize,
    ) -> Self {
        Self {
            pb,
            checkpoint,
            checkpoint_every,
            since_save: 0,
            running: HashMap::new(),
            stats: RunStats::default(),
            cells: Vec::new(),
            results: Vec::new(),
            cut_short: false,
        }
    }

    fn absorb(&mut self, joined: Result<(Id, CellReport), JoinError>, coverage: &CoverageModel) {
        let mut report = match joined {
            Ok((id, report)) => {
                self.running.remove(&id);
                report
            }
            Err(e) => {
                let Some(cell) = self.running.remove(&e.id()) else {
                    warn!(error = %e, "Unknown fill task failed");
                    return;
                };
                warn!(cell = %cell, error = %e, "Fill task panicked, counting cell as failed");
                let mut report = CellReport::new(cell, coverage.count(cell));
                report.status = coverage.status(cell);
                report.classification = CellClassification::Failed;
                report
            }
        };

        self.stats.record_cell(&report);
        self.cut_short |= report.interrupted;

        if let Some(manager) = self.checkpoint.as_deref_mut() {
            if let Some(state) = manager.state_mut() {
                state.record_cell(&report);
            }
            self.since_save += 1;
            if self.checkpoint_every > 0 && self.since_save >= self.checkpoint_every {
                self.since_save = 0;
                if let Some(state) = manager.state_mut() {
                    state.seed_counts(coverage.counts());
                }
                if let Err(e) = manager.save() {
                    warn!(error = %e, "Periodic checkpoint save failed");
                }
            }
        }

        self.results.append(&mut report.successes);
        self.pb.inc(1);
        self.pb.set_message(format!(
            "done: {}, partial: {}, failed: {}",
            self.stats.cells_completed, self.stats.cells_partial, self.stats.cells_failed
        ));
        self.cells.push(report);
    }

    fn finish(&mut self) -> RunStats {
        self.pb.finish_with_message(format!(
            "{} completed, {} partial, {} failed",
            self.stats.cells_completed, self.stats.cells_partial, self.stats.cells_failed
        ));
        std::mem::take(&mut self.stats)
    }
}

/// Owned handle running one cell's fill loop inside a spawned task.
struct CellFiller {
    client: Arc<dyn ScoringClient>,
    sampler: Arc<CellSampler>,
    coverage: Arc<CoverageModel>,
    counters: Arc<AttemptCounters>,
    backoff: Backoff,
    attempt_multiplier: u32,
    attempt_timeout: Duration,
    run_nonce: u64,
    cancel: CancellationToken,
}

impl CellFiller {
    /// Candidate pool: plan seeds topped up with fresh samples, shuffled,
    /// capped at the attempt budget.
    fn candidates(&self, work: CellWork, budget: usize) -> Vec<CandidatePoint> {
        let mut rng = self
            .sampler
            .rng_for_run(work.cell.id, FILL_STREAM, self.run_nonce);
        let mut pool: Vec<CandidatePoint> = work
            .seeds
            .into_iter()
            .filter(|p| p.cell == work.cell.id)
            .collect();
        if pool.len() < budget {
            let extra = self
                .sampler
                .sample_with_rng(&work.cell, budget - pool.len(), &mut rng);
            pool.extend(extra);
        }
        pool.shuffle(&mut rng);
        pool.truncate(budget);
        pool
    }

    async fn submit(&self, candidate: &CandidatePoint) -> AttemptResult {
        match tokio::time::timeout(self.attempt_timeout, self.client.submit(candidate.position()))
            .await
        {
            Ok(result) => result,
            Err(_) => AttemptResult::TransientError(TransientFault::Timeout(self.attempt_timeout)),
        }
    }

    async fn fill(self, work: CellWork) -> CellReport {
        let cell = work.cell.id;
        let target = self.coverage.target();
        let mut report = CellReport::new(cell, self.coverage.count(cell));

        let needed = self.coverage.needed(cell);
        if needed == 0 || self.coverage.status(cell).is_terminal() {
            report.status = self.coverage.status(cell);
            report.classification = CellClassification::from_count(report.final_count, target);
            return report;
        }

        let budget = (needed as usize).saturating_mul(self.attempt_multiplier as usize);
        let pool = self.candidates(work, budget);
        debug!(cell = %cell, needed, candidates = pool.len(), "Filling cell");

        for candidate in &pool {
            if self.coverage.needed(cell) == 0 {
                break;
            }
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let attempt = report.attempts + 1;
            let delay = self.backoff.delay_before(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        report.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                report.backoff.push(delay);
            }

            report.attempts = attempt;
            let result = self.submit(candidate).await;
            self.counters.record(&result);
            debug!(
                cell = %cell,
                attempt,
                point = %candidate.position(),
                outcome = ?result.kind(),
                "Attempt finished"
            );

            if self.coverage.record_outcome(cell, &result) {
                if let Some(record) = SuccessRecord::from_attempt(candidate, &result) {
                    report.successes.push(record);
                }
            }
        }

        if !report.interrupted {
            self.coverage.mark_exhausted(cell);
        }
        report.status = self.coverage.status(cell);
        report.final_count = self.coverage.count(cell);
        report.classification = CellClassification::from_count(report.final_count, target);

        match report.status {
            CellStatus::Satisfied => {
                debug!(cell = %cell, attempts = report.attempts, "Cell satisfied")
            }
            CellStatus::Exhausted => info!(
                cell = %cell,
                attempts = report.attempts,
                count = report.final_count,
                target,
                "Cell exhausted below target"
            ),
            CellStatus::Pending => debug!(cell = %cell, "Cell interrupted"),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::ScriptedClient;
    use crate::grid::testing::SquareIndex;
    use crate::grid::{HexGrid, Level, Resolutions, PLAN_STREAM};
    use crate::models::{AttemptKind, LatLon};
    use serde_json::json;
    use std::collections::HashMap;

    const RES: Resolutions = Resolutions {
        coarse: 1,
        medium: 2,
        fine: 3,
    };

    fn grid(sealed: &[CellId]) -> HexGrid {
        HexGrid::new(
            Arc::new(SquareIndex::sealed(sealed.iter().copied())),
            RES,
            3,
        )
    }

    fn cell_id(lat: f64, lon: f64) -> CellId {
        SquareIndex::cell_at(LatLon::new(lat, lon), RES.fine)
    }

    fn work_for(grid: &HexGrid, sampler: &CellSampler, id: CellId, seeds: usize) -> CellWork {
        let cell = grid.cell(id).unwrap();
        assert_eq!(cell.level, Level::Fine);
        let seeds = if seeds == 1 {
            vec![CandidatePoint::new(cell.center, id)]
        } else {
            sampler.sample(&cell, seeds, PLAN_STREAM)
        };
        CellWork { cell, seeds }
    }

    fn scheduler(
        grid: HexGrid,
        client: Arc<ScriptedClient>,
        target: u32,
        max_concurrent: usize,
    ) -> GapFillScheduler {
        let settings = SchedulerSettings {
            max_concurrent,
            ..SchedulerSettings::default()
        };
        GapFillScheduler::new(
            client,
            Arc::new(CellSampler::new(grid, Some(9))),
            Arc::new(CoverageModel::new(target)),
            settings,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_transient_success() {
        let id = cell_id(10.1, 20.1);
        let grid = grid(&[]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let client = Arc::new(ScriptedClient::new(RES.fine).script(
            id,
            vec![
                ScriptedClient::transport(),
                ScriptedClient::transport(),
                AttemptResult::Success(json!({"score": 7})),
            ],
        ));

        let work = vec![work_for(&grid, &sampler, id, 5)];
        let sched = scheduler(grid, Arc::clone(&client), 1, 4);
        let outcome = sched.run(work, CancellationToken::new()).await;

        assert_eq!(client.calls(), 3);
        let report = &outcome.cells[0];
        assert_eq!(report.attempts, 3);
        assert_eq!(
            report.backoff,
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(report.status, CellStatus::Satisfied);
        assert_eq!(report.classification, CellClassification::Completed);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.stats.transient_errors, 2);
        assert_eq!(outcome.stats.successful, 1);
        assert!(!outcome.interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degenerate_cell_exhausts_without_blocking_others() {
        let sealed = cell_id(10.1, 20.1);
        let healthy = cell_id(11.1, 21.1);
        let grid = grid(&[sealed]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let client = Arc::new(
            ScriptedClient::new(RES.fine)
                .script(sealed, vec![AttemptResult::NoData])
                .fallback(AttemptResult::Duplicate(json!({"message": "already exists"}))),
        );

        let work = vec![
            work_for(&grid, &sampler, sealed, 1),
            work_for(&grid, &sampler, healthy, 3),
        ];
        let sched = scheduler(grid, Arc::clone(&client), 2, 4);
        let outcome = sched.run(work, CancellationToken::new()).await;

        let by_cell: HashMap<CellId, &CellReport> =
            outcome.cells.iter().map(|r| (r.cell, r)).collect();

        let bad = by_cell[&sealed];
        assert_eq!(bad.attempts, 1);
        assert_eq!(bad.status, CellStatus::Exhausted);
        assert_eq!(bad.classification, CellClassification::Failed);

        let good = by_cell[&healthy];
        assert_eq!(good.status, CellStatus::Satisfied);
        assert_eq!(good.final_count, 2);
        assert!(good.successes.is_empty());
        assert!(outcome
            .results
            .iter()
            .all(|r| r.cell == healthy && r.kind == AttemptKind::Duplicate));

        assert_eq!(outcome.stats.cells_failed, 1);
        assert_eq!(outcome.stats.cells_completed, 1);
        assert_eq!(outcome.stats.no_data, 1);
        assert_eq!(sched.coverage().status(sealed), CellStatus::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_cells_make_no_calls() {
        let grid = grid(&[]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let ids = [cell_id(10.1, 20.1), cell_id(10.3, 20.3), cell_id(12.0, 22.0)];
        let client = Arc::new(ScriptedClient::new(RES.fine));

        let sched = scheduler(grid.clone(), Arc::clone(&client), 2, 4);
        sched
            .coverage()
            .seed(&ids.iter().map(|id| (*id, 2)).collect());

        let work = ids
            .iter()
            .map(|id| work_for(&grid, &sampler, *id, 3))
            .collect();
        let outcome = sched.run(work, CancellationToken::new()).await;

        assert_eq!(client.calls(), 0);
        assert_eq!(outcome.stats.cells_skipped, 3);
        assert_eq!(outcome.stats.total_attempted, 0);
        assert!(outcome.cells.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_satisfied_and_leaves_rest_pending() {
        let quick = cell_id(10.1, 20.1);
        let stuck = cell_id(11.1, 21.1);
        let grid = grid(&[]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let client = Arc::new(
            ScriptedClient::new(RES.fine)
                .script(quick, vec![AttemptResult::Success(json!({"id": 1}))])
                .fallback(ScriptedClient::transport()),
        );

        let work = vec![
            work_for(&grid, &sampler, quick, 3),
            work_for(&grid, &sampler, stuck, 3),
        ];
        let sched = scheduler(grid, Arc::clone(&client), 1, 4);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let outcome = sched.run(work, cancel).await;

        assert!(outcome.interrupted);
        assert_eq!(sched.coverage().status(quick), CellStatus::Satisfied);
        assert_eq!(sched.coverage().status(stuck), CellStatus::Pending);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].cell, quick);

        let stuck_report = outcome.cells.iter().find(|r| r.cell == stuck).unwrap();
        assert!(stuck_report.interrupted);
        assert!(stuck_report.attempts < 5);
        assert_eq!(outcome.stats.cells_interrupted, 1);
        assert_eq!(outcome.stats.cells_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_dispatches_nothing() {
        let grid = grid(&[]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let client = Arc::new(ScriptedClient::new(RES.fine));
        let work = vec![work_for(&grid, &sampler, cell_id(10.1, 20.1), 3)];
        let sched = scheduler(grid, Arc::clone(&client), 1, 4);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = sched.run(work, cancel).await;

        assert!(outcome.interrupted);
        assert_eq!(client.calls(), 0);
        assert_eq!(outcome.stats.cells_interrupted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let grid = grid(&[]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let client = Arc::new(
            ScriptedClient::new(RES.fine)
                .fallback(AttemptResult::Success(json!({})))
                .with_latency(Duration::from_millis(400)),
        );

        let work: Vec<_> = (0..10)
            .map(|i| work_for(&grid, &sampler, cell_id(10.1 + i as f64, 20.1), 3))
            .collect();
        let sched = scheduler(grid, Arc::clone(&client), 1, 3);
        let outcome = sched.run(work, CancellationToken::new()).await;

        assert_eq!(outcome.stats.cells_completed, 10);
        assert_eq!(client.calls(), 10);
        assert!(client.max_in_flight() <= 3);
        assert!(client.max_in_flight() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_become_timeouts() {
        let id = cell_id(10.1, 20.1);
        let grid = grid(&[]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let client = Arc::new(
            ScriptedClient::new(RES.fine)
                .fallback(AttemptResult::Success(json!({})))
                .with_latency(Duration::from_secs(60)),
        );
        let sched = GapFillScheduler::new(
            client,
            Arc::new(CellSampler::new(grid.clone(), Some(9))),
            Arc::new(CoverageModel::new(1)),
            SchedulerSettings {
                attempt_multiplier: 2,
                attempt_timeout: Duration::from_secs(45),
                ..SchedulerSettings::default()
            },
        );

        let outcome = sched
            .run(vec![work_for(&grid, &sampler, id, 3)], CancellationToken::new())
            .await;

        assert_eq!(outcome.stats.timeouts, 2);
        assert_eq!(outcome.cells[0].status, CellStatus::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reruns_of_seeded_plan_try_new_candidates() {
        let id = cell_id(10.1, 20.1);
        let grid = grid(&[]);

        let run = |nonce: u64| {
            let grid = grid.clone();
            async move {
                let client = Arc::new(ScriptedClient::new(RES.fine));
                let sched = GapFillScheduler::new(
                    Arc::clone(&client) as Arc<dyn ScoringClient>,
                    Arc::new(CellSampler::new(grid.clone(), Some(42))),
                    Arc::new(CoverageModel::new(1)),
                    SchedulerSettings {
                        run_nonce: nonce,
                        ..SchedulerSettings::default()
                    },
                );
                let work = CellWork {
                    cell: grid.cell(id).unwrap(),
                    seeds: Vec::new(),
                };
                let outcome = sched.run(vec![work], CancellationToken::new()).await;
                assert_eq!(outcome.cells[0].status, CellStatus::Exhausted);
                client.submitted()
            }
        };

        let first = run(1).await;
        let second = run(2).await;
        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 5);
        assert!(first.iter().all(|p| !second.contains(p)));
        // same nonce replays the same candidates
        assert_eq!(run(1).await, first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fill_is_tallied_as_failed() {
        let broken = cell_id(10.1, 20.1);
        let healthy = cell_id(11.1, 21.1);
        let grid = grid(&[]);
        let sampler = CellSampler::new(grid.clone(), Some(9));
        let client = Arc::new(
            ScriptedClient::new(RES.fine)
                .panicking(broken)
                .fallback(AttemptResult::Success(json!({}))),
        );

        let work = vec![
            work_for(&grid, &sampler, broken, 3),
            work_for(&grid, &sampler, healthy, 3),
        ];
        let sched = scheduler(grid, Arc::clone(&client), 1, 4);
        let outcome = sched.run(work, CancellationToken::new()).await;

        let stats = &outcome.stats;
        assert_eq!(stats.cells_failed, 1);
        assert_eq!(stats.cells_completed, 1);
        assert_eq!(
            stats.cells_skipped
                + stats.cells_completed
                + stats.cells_partial
                + stats.cells_failed
                + stats.cells_interrupted,
            stats.total_cells
        );
        let report = outcome.cells.iter().find(|r| r.cell == broken).unwrap();
        assert_eq!(report.classification, CellClassification::Failed);
        assert_eq!(report.status, CellStatus::Pending);
        assert!(!outcome.interrupted);
    }
}
