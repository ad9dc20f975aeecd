//! Coverage authorities: where the existing `{cell -> count}` snapshot comes from.
//!
//! A failing authority is never fatal. `load_snapshot` degrades to an empty
//! snapshot and the run simply does more work than strictly necessary.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::models::{CellId, CoverageConfig, CoverageSummary, HexcoverError, Result};

/// Existing point counts per fine cell.
pub type CoverageSnapshot = HashMap<CellId, u32>;

/// Collaborator that reports how many points each cell already has.
#[async_trait]
pub trait CoverageSource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<CoverageSnapshot>;
}

/// Fetch a snapshot, falling back to empty on any failure.
pub async fn load_snapshot(source: &dyn CoverageSource) -> CoverageSnapshot {
    match source.fetch().await {
        Ok(snapshot) => {
            info!(
                source = source.name(),
                cells = snapshot.len(),
                points = snapshot.values().map(|c| u64::from(*c)).sum::<u64>(),
                "Loaded existing coverage"
            );
            snapshot
        }
        Err(e) => {
            warn!(source = source.name(), error = %e, "Coverage source failed, assuming no existing coverage");
            CoverageSnapshot::new()
        }
    }
}

/// Build the source selected by the `[coverage]` section.
pub fn from_config(config: &CoverageConfig) -> Box<dyn CoverageSource> {
    match config {
        CoverageConfig::None => Box::new(EmptyCoverage),
        CoverageConfig::File { path } => Box::new(FileCoverage::new(path.clone())),
        CoverageConfig::Command {
            program,
            args,
            cwd,
            key_field,
            count_field,
            timeout_secs,
        } => Box::new(CommandCoverage {
            program: program.clone(),
            args: args.clone(),
            cwd: cwd.clone(),
            key_field: key_field.clone(),
            count_field: count_field.clone(),
            timeout: Duration::from_secs(*timeout_secs),
        }),
    }
}

/// No authority: every cell starts at zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCoverage;

#[async_trait]
impl CoverageSource for EmptyCoverage {
    fn name(&self) -> &str {
        "none"
    }

    async fn fetch(&self) -> Result<CoverageSnapshot> {
        Ok(CoverageSnapshot::new())
    }
}

/// JSON file holding a plain `{cell: count}` map, a run report or a checkpoint.
#[derive(Debug, Clone)]
pub struct FileCoverage {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoverageFile {
    Report { coverage: CoverageSummary },
    Checkpoint { coverage: BTreeMap<CellId, u32> },
    Plain(HashMap<CellId, u32>),
}

impl FileCoverage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CoverageSource for FileCoverage {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> Result<CoverageSnapshot> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| HexcoverError::io(format!("reading {}", self.path.display()), e))?;

        let parsed: CoverageFile = serde_json::from_str(&content).map_err(|e| {
            HexcoverError::ParseError(format!("coverage file {}: {e}", self.path.display()))
        })?;

        Ok(match parsed {
            CoverageFile::Report { coverage } => coverage.cell_counts.into_iter().collect(),
            CoverageFile::Checkpoint { coverage } => coverage.into_iter().collect(),
            CoverageFile::Plain(map) => map,
        })
    }
}

/// External command printing JSON rows, e.g. a database CLI running
/// `SELECT h3_r9, COUNT(*) AS count ... GROUP BY h3_r9`.
#[derive(Debug, Clone)]
pub struct CommandCoverage {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub key_field: String,
    pub count_field: String,
    pub timeout: Duration,
}

impl CommandCoverage {
    fn unavailable(&self, reason: impl Into<String>) -> HexcoverError {
        HexcoverError::CoverageUnavailable {
            source_name: self.program.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CoverageSource for CommandCoverage {
    fn name(&self) -> &str {
        "command"
    }

    async fn fetch(&self) -> Result<CoverageSnapshot> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        debug!(program = %self.program, args = ?self.args, "Querying coverage authority");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| self.unavailable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.unavailable(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_rows(&stdout, &self.key_field, &self.count_field)
    }
}

/// Extract `{key -> count}` from JSON rows.
///
/// Accepts a bare array of rows, an object with a `results` array, or an
/// array of such objects (one per executed statement). Counts may be numbers
/// or numeric strings; rows with unusable keys are skipped.
pub fn parse_rows(output: &str, key_field: &str, count_field: &str) -> Result<CoverageSnapshot> {
    let value: serde_json::Value = serde_json::from_str(output.trim())
        .map_err(|e| HexcoverError::ParseError(format!("coverage rows: {e}")))?;

    let mut rows = Vec::new();
    collect_rows(&value, &mut rows);

    let mut snapshot = CoverageSnapshot::new();
    let mut skipped = 0usize;
    for row in rows {
        let key = row.get(key_field).and_then(|v| v.as_str());
        let count = row.get(count_field).and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        match (key.and_then(|k| k.parse::<CellId>().ok()), count) {
            (Some(cell), Some(count)) => {
                let count = u32::try_from(count).unwrap_or(u32::MAX);
                let slot = snapshot.entry(cell).or_insert(0);
                *slot = slot.saturating_add(count);
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, "Ignored coverage rows without a usable key or count");
    }
    Ok(snapshot)
}

fn collect_rows<'a>(value: &'a serde_json::Value, rows: &mut Vec<&'a serde_json::Value>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                if item.get("results").is_some() {
                    collect_rows(item, rows);
                } else if item.is_object() {
                    rows.push(item);
                }
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(results) = map.get("results") {
                collect_rows(results, rows);
            }
        }
        _ => {}
    }
}
