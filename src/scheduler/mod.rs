//! Gap-fill scheduling.

mod backoff;
mod gapfill;

pub use backoff::Backoff;
pub use gapfill::{CellWork, GapFillScheduler, RunOutcome, SchedulerSettings};
