//! Sample plan: the grid and its pre-generated candidates, persisted as JSON.
//!
//! Flow: center → coarse cells → medium children → fine children → points.

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::checkpoint::write_json_atomic;
use crate::grid::{CellSampler, HexGrid, Level, Resolutions, PLAN_STREAM};
use crate::models::{CandidatePoint, CellId, GridConfig, HexcoverError, LatLon, Result};
use crate::scheduler::CellWork;

/// Coarse cell with the size of its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSummary {
    pub id: CellId,
    pub center: LatLon,
    pub medium_cells: usize,
    pub fine_cells: usize,
}

/// A fine cell and the points generated inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCell {
    pub id: CellId,
    pub medium: CellId,
    pub coarse: CellId,
    pub points: Vec<CandidatePoint>,
}

/// Persisted output of the `plan` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePlan {
    pub generated_at: DateTime<Utc>,
    pub center: LatLon,
    pub resolutions: Resolutions,
    #[serde(default)]
    pub seed: Option<u64>,
    pub points_per_cell: usize,
    pub coarse_cells: Vec<CellSummary>,
    pub cells: Vec<PlannedCell>,
}

impl SamplePlan {
    pub fn total_points(&self) -> usize {
        self.cells.iter().map(|c| c.points.len()).sum()
    }

    /// Write the plan atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        info!(
            path = %path.display(),
            cells = self.cells.len(),
            points = self.total_points(),
            "Sample plan written"
        );
        Ok(())
    }

    /// Load a plan; unreadable or malformed files are input errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HexcoverError::InvalidInput(format!("cannot read plan {}: {e}", path.display()))
        })?;
        let plan: Self = serde_json::from_str(&content).map_err(|e| {
            HexcoverError::ParseError(format!("plan {}: {e}", path.display()))
        })?;
        info!(cells = plan.cells.len(), points = plan.total_points(), "Loaded sample plan");
        Ok(plan)
    }

    /// Resolve planned cells into scheduler work.
    ///
    /// Every cell must be a fine cell of `grid`; points that do not re-derive
    /// to their cell are dropped.
    pub fn into_work(self, grid: &HexGrid) -> Result<Vec<CellWork>> {
        if grid.resolutions() != self.resolutions {
            return Err(HexcoverError::InvalidInput(format!(
                "plan resolutions {:?} differ from grid {:?}",
                self.resolutions,
                grid.resolutions()
            )));
        }

        let mut dropped = 0usize;
        let work = self
            .cells
            .into_iter()
            .map(|planned| {
                let cell = grid.cell(planned.id)?;
                if cell.level != Level::Fine {
                    return Err(HexcoverError::InvalidCell(format!(
                        "{} is a {:?} cell, expected fine",
                        planned.id, cell.level
                    )));
                }
                let total = planned.points.len();
                let seeds: Vec<CandidatePoint> = planned
                    .points
                    .into_iter()
                    .filter(|p| p.cell == cell.id && grid.contains(p.position(), &cell))
                    .collect();
                dropped += total - seeds.len();
                Ok(CellWork { cell, seeds })
            })
            .collect::<Result<Vec<_>>>()?;

        if dropped > 0 {
            warn!(dropped, "Discarded plan points outside their cells");
        }
        Ok(work)
    }
}

/// Builds a `SamplePlan` from grid parameters.
pub struct PlanBuilder {
    grid: HexGrid,
    sampler: CellSampler,
    coarse_count: usize,
    points_per_cell: usize,
    show_progress: bool,
}

impl PlanBuilder {
    pub fn new(grid: HexGrid, seed: Option<u64>, coarse_count: usize, points_per_cell: usize) -> Self {
        Self {
            sampler: CellSampler::new(grid.clone(), seed),
            grid,
            coarse_count,
            points_per_cell,
            show_progress: false,
        }
    }

    /// H3-backed builder from the `[grid]` section.
    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(
            HexGrid::from_config(config),
            config.seed,
            config.coarse_count,
            config.points_per_cell,
        )
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn build(&self, center: LatLon) -> Result<SamplePlan> {
        let coarse = self.grid.build_coarse_cells(center, self.coarse_count)?;
        info!(coarse = coarse.len(), "Building sample plan");

        let pb = if self.show_progress {
            let pb = ProgressBar::new(coarse.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} coarse cells")
            {
                pb.set_style(style.progress_chars("##-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut summaries = Vec::with_capacity(coarse.len());
        let mut cells = Vec::new();
        let mut short = 0usize;

        for coarse_cell in &coarse {
            let medium = self.grid.children(coarse_cell, Level::Medium)?;
            let mut fine_count = 0;
            for medium_cell in &medium {
                for fine_cell in self.grid.children(medium_cell, Level::Fine)? {
                    let points = self
                        .sampler
                        .sample(&fine_cell, self.points_per_cell, PLAN_STREAM);
                    if points.len() < self.points_per_cell {
                        short += 1;
                    }
                    cells.push(PlannedCell {
                        id: fine_cell.id,
                        medium: medium_cell.id,
                        coarse: coarse_cell.id,
                        points,
                    });
                    fine_count += 1;
                }
            }
            summaries.push(CellSummary {
                id: coarse_cell.id,
                center: coarse_cell.center,
                medium_cells: medium.len(),
                fine_cells: fine_count,
            });
            pb.inc(1);
        }
        pb.finish_and_clear();

        if short > 0 {
            warn!(cells = short, "Some fine cells received fewer points than requested");
        }

        let plan = SamplePlan {
            generated_at: Utc::now(),
            center,
            resolutions: self.grid.resolutions(),
            seed: self.sampler.seed(),
            points_per_cell: self.points_per_cell,
            coarse_cells: summaries,
            cells,
        };
        info!(
            fine = plan.cells.len(),
            points = plan.total_points(),
            "Sample plan built"
        );
        Ok(plan)
    }
}
