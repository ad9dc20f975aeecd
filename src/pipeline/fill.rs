//! Gap-fill pipeline.
//!
//! Pipeline flow:
//! Plan → coverage snapshot (+ checkpoint) → scheduler → checkpoint + run report

use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::SamplePlan;
use crate::checkpoint::{write_json_atomic, CheckpointManager};
use crate::client::ScoringClient;
use crate::coverage::{self, CoverageModel, CoverageSource};
use crate::grid::{CellSampler, HexGrid};
use crate::models::{
    CellClassification, CellStatus, Config, CoverageSummary, Result, RunMetadata, RunReport,
};
use crate::scheduler::{GapFillScheduler, SchedulerSettings};

/// Where a finished run left its report.
#[derive(Debug, Clone)]
pub struct FillSummary {
    pub report: RunReport,
    pub report_path: PathBuf,
}

/// Fill pipeline for converging a plan to target density.
pub struct FillPipeline {
    config: Config,
    client: Arc<dyn ScoringClient>,
    grid: HexGrid,
    coverage_source: Box<dyn CoverageSource>,
    show_progress: bool,
}

impl FillPipeline {
    /// Create a new fill pipeline from configuration.
    pub fn new(config: Config, client: Arc<dyn ScoringClient>) -> Self {
        let grid = HexGrid::from_config(&config.grid);
        let coverage_source = coverage::from_config(&config.coverage);
        Self {
            config,
            client,
            grid,
            coverage_source,
            show_progress: false,
        }
    }

    pub fn with_grid(mut self, grid: HexGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_coverage_source(mut self, source: Box<dyn CoverageSource>) -> Self {
        self.coverage_source = source;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run the fill pipeline until convergence or cancellation.
    ///
    /// Plan errors abort before any external call. The report is written even
    /// when the run is interrupted.
    pub async fn run(&self, plan: SamplePlan, cancel: CancellationToken) -> Result<FillSummary> {
        let start = Instant::now();
        let run_uuid = Uuid::new_v4();
        let run_id = run_uuid.to_string();
        let target = self.config.scheduler.target_per_cell;

        let sampler = Arc::new(CellSampler::new(self.grid.clone(), plan.seed));
        let work = plan.into_work(&self.grid)?;
        let planned: HashSet<_> = work.iter().map(|w| w.cell.id).collect();

        let coverage = Arc::new(CoverageModel::new(target));
        let snapshot = coverage::load_snapshot(self.coverage_source.as_ref()).await;
        coverage.seed(&snapshot);

        let mut checkpoint = match &self.config.output.checkpoint_dir {
            Some(dir) => {
                let mut manager = CheckpointManager::new(dir)?;
                let state = manager.init_or_load(&run_id, target)?;
                coverage.seed(&state.counts());
                Some(manager)
            }
            None => None,
        };

        let mut settings =
            SchedulerSettings::from_config(&self.config.scheduler, self.config.scoring.timeout());
        settings.checkpoint_every = self.config.output.checkpoint_every;
        settings.show_progress = self.show_progress;
        settings.run_nonce = run_uuid.as_u64_pair().0;

        let scheduler = GapFillScheduler::new(
            Arc::clone(&self.client),
            sampler,
            Arc::clone(&coverage),
            settings,
        );
        let outcome = scheduler
            .run_with_checkpoint(work, cancel, checkpoint.as_mut())
            .await;

        if outcome.interrupted {
            warn!("Run interrupted, saving partial results");
        }

        let counts = coverage.counts();
        let failed_cells = outcome
            .cells
            .iter()
            .filter(|r| !r.interrupted && r.classification == CellClassification::Failed)
            .map(|r| r.cell)
            .collect();
        let exhausted_cells = outcome
            .cells
            .iter()
            .filter(|r| r.status == CellStatus::Exhausted)
            .map(|r| r.cell)
            .collect();

        let timestamp = Utc::now();
        let report = RunReport {
            metadata: RunMetadata {
                run_id,
                timestamp,
                endpoint: self.client.endpoint(),
                max_concurrent: self.config.scheduler.max_concurrent,
                target_per_cell: target,
                elapsed_secs: start.elapsed().as_secs_f64(),
                interrupted: outcome.interrupted,
            },
            stats: outcome.stats,
            coverage: CoverageSummary {
                cell_counts: counts
                    .iter()
                    .filter(|(cell, _)| planned.contains(*cell))
                    .map(|(cell, count)| (*cell, *count))
                    .collect(),
                failed_cells,
                exhausted_cells,
            },
            results: outcome.results,
        };

        // checkpoint first: a failed report write must not lose progress
        if let Some(manager) = checkpoint.as_mut() {
            if let Some(state) = manager.state_mut() {
                state.seed_counts(counts);
            }
            manager.save()?;
        }

        let report_path = self.write_report(&report)?;

        Ok(FillSummary {
            report,
            report_path,
        })
    }

    fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        let name = RunReport::file_name(report.metadata.timestamp, report.metadata.interrupted);
        let path = self.config.output.report_dir.join(name);
        write_json_atomic(&path, report)?;
        info!(path = %path.display(), "Run report written");
        Ok(path)
    }
}
