//! Checkpoint module for resumable gap-fill runs.
//!
//! Provides:
//! - `CheckpointState`: per-cell counts, finished cells and accepted points
//! - `CheckpointManager`: atomic persistence with a backup copy
//! - `write_json_atomic`: temp-file-and-rename JSON writer shared with reports

mod state;

pub use state::*;
