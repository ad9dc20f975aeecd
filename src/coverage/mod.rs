//! Coverage bookkeeping.
//!
//! - `CoverageModel`: concurrent per-cell counts and status
//! - `CoverageSource`: authorities that seed the model

mod model;
mod source;

pub use model::{CoverageEntry, CoverageModel};
pub use source::{
    from_config, load_snapshot, parse_rows, CommandCoverage, CoverageSnapshot, CoverageSource,
    EmptyCoverage, FileCoverage,
};
