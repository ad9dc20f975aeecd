//! Checkpoint state for resumable gap-fill runs.
//!
//! State is persisted atomically (write-then-rename) with a backup of the
//! previous checkpoint. On the next run its counts seed the coverage model,
//! so cells satisfied before a crash or abort are skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::{CellId, CellReport, CellStatus, HexcoverError, Result, SuccessRecord};

/// Checkpoint state for a gap-fill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Run that created the checkpoint
    pub run_id: String,
    pub target_per_cell: u32,
    /// Fine cell id -> best known count
    pub coverage: BTreeMap<CellId, u32>,
    /// Terminal status of cells whose fill loop finished
    #[serde(default)]
    pub cells_done: BTreeMap<CellId, CellStatus>,
    /// Points accepted so far
    #[serde(default)]
    pub results: Vec<SuccessRecord>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    /// Create a new checkpoint state.
    pub fn new(run_id: &str, target_per_cell: u32) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            target_per_cell,
            coverage: BTreeMap::new(),
            cells_done: BTreeMap::new(),
            results: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Fold one finished fill loop into the state.
    pub fn record_cell(&mut self, report: &CellReport) {
        let count = self.coverage.entry(report.cell).or_insert(0);
        *count = (*count).max(report.final_count);
        if !report.interrupted {
            self.cells_done.insert(report.cell, report.status);
        }
        self.results.extend(report.successes.iter().cloned());
        self.updated_at = Utc::now();
    }

    /// Merge counts, keeping the larger value per cell.
    pub fn seed_counts(&mut self, counts: impl IntoIterator<Item = (CellId, u32)>) {
        for (cell, count) in counts {
            let slot = self.coverage.entry(cell).or_insert(0);
            *slot = (*slot).max(count);
        }
        self.updated_at = Utc::now();
    }

    /// Counts in the shape the coverage model is seeded with.
    pub fn counts(&self) -> HashMap<CellId, u32> {
        self.coverage.iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Cells at or above `target`.
    pub fn satisfied_cells(&self, target: u32) -> usize {
        self.coverage.values().filter(|c| **c >= target).count()
    }
}

/// Serialize `value` as pretty JSON to `path` via a temp file and rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| HexcoverError::io(format!("creating {}", parent.display()), e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| HexcoverError::InvalidInput(format!("{} has no file name", path.display())))?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let file = File::create(&temp_path)
        .map_err(|e| HexcoverError::io(format!("creating {}", temp_path.display()), e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| HexcoverError::Internal(format!("Serializing {}: {e}", path.display())))?;
    writer
        .flush()
        .map_err(|e| HexcoverError::io(format!("flushing {}", temp_path.display()), e))?;

    fs::rename(&temp_path, path)
        .map_err(|e| HexcoverError::io(format!("renaming to {}", path.display()), e))
}

/// Checkpoint manager for persisting and loading checkpoint state.
pub struct CheckpointManager {
    /// Directory for checkpoint files
    dir: PathBuf,
    /// Path to main checkpoint file
    checkpoint_path: PathBuf,
    /// Path to backup file
    backup_path: PathBuf,
    /// Current state
    state: Option<CheckpointState>,
}

impl CheckpointManager {
    /// Create a new checkpoint manager.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| HexcoverError::io("creating checkpoint dir", e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            checkpoint_path: dir.join("checkpoint.json"),
            backup_path: dir.join("checkpoint.backup.json"),
            state: None,
        })
    }

    /// Check if a checkpoint exists.
    pub fn exists(&self) -> bool {
        self.checkpoint_path.exists()
    }

    /// Initialize a new checkpoint or load the existing one.
    pub fn init_or_load(&mut self, run_id: &str, target_per_cell: u32) -> Result<&CheckpointState> {
        let state = if self.exists() {
            let state = self.read()?;
            if state.target_per_cell != target_per_cell {
                warn!(
                    checkpoint_target = state.target_per_cell,
                    target = target_per_cell,
                    "Checkpoint was written for a different target density"
                );
            }
            info!(
                run_id = %state.run_id,
                cells = state.coverage.len(),
                satisfied = state.satisfied_cells(target_per_cell),
                "Resuming from checkpoint"
            );
            state
        } else {
            info!(dir = %self.dir.display(), "Created new checkpoint");
            CheckpointState::new(run_id, target_per_cell)
        };
        self.state = Some(state);
        self.save()?;
        self.state
            .as_ref()
            .ok_or_else(|| HexcoverError::Internal("Checkpoint state missing after init".into()))
    }

    /// Load checkpoint from disk.
    pub fn load(&mut self) -> Result<&CheckpointState> {
        let state = self.read()?;
        Ok(self.state.insert(state))
    }

    fn read(&self) -> Result<CheckpointState> {
        let file = File::open(&self.checkpoint_path)
            .map_err(|e| HexcoverError::io("opening checkpoint", e))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| HexcoverError::ParseError(format!("Invalid checkpoint: {e}")))
    }

    /// Save checkpoint to disk (atomic write, previous file kept as backup).
    pub fn save(&self) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| HexcoverError::Internal("No checkpoint state to save".to_string()))?;

        if self.checkpoint_path.exists() {
            fs::copy(&self.checkpoint_path, &self.backup_path)
                .map_err(|e| HexcoverError::io("backing up checkpoint", e))?;
        }

        write_json_atomic(&self.checkpoint_path, state)?;

        debug!(cells = state.coverage.len(), "Checkpoint saved");
        Ok(())
    }

    /// Get mutable reference to state.
    pub fn state_mut(&mut self) -> Option<&mut CheckpointState> {
        self.state.as_mut()
    }

    /// Get reference to state.
    pub fn state(&self) -> Option<&CheckpointState> {
        self.state.as_ref()
    }

    /// Get checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
