//! Core data models for hexcover.
//!
//! - Geometry primitives: `CellId`, `LatLon`, `CandidatePoint`
//! - Attempt outcomes and per-cell reports
//! - Run statistics and the persisted run report
//! - Configuration and the crate error type

mod config;
mod error;
mod geo;
mod outcome;
mod report;
mod stats;

pub use config::*;
pub use error::*;
pub use geo::*;
pub use outcome::*;
pub use report::*;
pub use stats::*;
