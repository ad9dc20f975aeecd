//! hexcover - even-density spatial sampling with idempotent gap filling.
//!
//! ## Architecture
//!
//! hexcover tiles an area with a three-level hexagonal grid and drives sample
//! points through an unreliable external scoring service until every fine
//! cell holds a target number of accepted points:
//! - **Grid**: coarse cells around a center, nested medium and fine cells
//! - **Sampler**: rejection sampling inside a cell, reproducible with a seed
//! - **Coverage**: concurrent per-cell counts seeded from an authority
//! - **Scheduler**: per-cell fill loops with backoff and bounded concurrency
//!
//! ## Pipelines
//!
//! - **Plan**: Center → Coarse → Medium → Fine → Points → plan JSON
//! - **Fill**: Plan → Coverage snapshot → Gap fill → Checkpoint + run report
//!
//! Per-attempt failures (no data, duplicates, timeouts, rejections) are
//! values, not errors; only bad input and infrastructure faults surface as
//! `HexcoverError`.

pub mod checkpoint;
pub mod client;
pub mod coverage;
pub mod grid;
pub mod models;
pub mod pipeline;
pub mod scheduler;

// Re-exports for convenience
pub use checkpoint::{CheckpointManager, CheckpointState};
pub use client::{HttpScoringClient, ResponseClassifier, ScoringClient};
pub use coverage::{CoverageModel, CoverageSource};
pub use grid::{CellSampler, H3Index, HexGrid, SpatialIndex};
pub use models::{AttemptResult, CellId, Config, HexcoverError, LatLon, Result, RunReport};
pub use pipeline::{FillPipeline, PlanBuilder, SamplePlan};
pub use scheduler::{Backoff, GapFillScheduler};
