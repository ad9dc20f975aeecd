//! Configuration models for hexcover.
//!
//! Every tunable of the grid, the scoring collaborator, the scheduler and the
//! coverage authority lives here. The user resolves them via a TOML file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::LatLon;

/// Top-level configuration for hexcover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Grid seed parameters
    pub grid: GridConfig,

    /// Scoring service endpoint
    pub scoring: ScoringConfig,

    /// Gap-fill scheduling policy
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Where the existing coverage snapshot comes from
    #[serde(default)]
    pub coverage: CoverageConfig,

    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,
}

/// Grid seed parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Center of the sampled area
    pub center: LatLon,

    /// Number of coarse cells to collect around the center
    #[serde(default = "default_coarse_count")]
    pub coarse_count: usize,

    /// Index resolution of coarse cells
    #[serde(default = "default_coarse_resolution")]
    pub coarse_resolution: u8,

    /// Index resolution of medium cells
    #[serde(default = "default_medium_resolution")]
    pub medium_resolution: u8,

    /// Index resolution of fine cells (the coverage unit)
    #[serde(default = "default_fine_resolution")]
    pub fine_resolution: u8,

    /// Points generated per fine cell in the sample plan
    #[serde(default = "default_points_per_cell")]
    pub points_per_cell: usize,

    /// Random seed (None for OS entropy)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Ring expansion ceiling when collecting coarse cells
    #[serde(default = "default_max_ring_distance")]
    pub max_ring_distance: u32,
}

fn default_coarse_count() -> usize {
    100
}

fn default_coarse_resolution() -> u8 {
    7
}

fn default_medium_resolution() -> u8 {
    8
}

fn default_fine_resolution() -> u8 {
    9
}

fn default_points_per_cell() -> usize {
    5
}

fn default_max_ring_distance() -> u32 {
    10
}

/// Scoring service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Base URL of the scoring API
    pub base_url: String,

    /// Path that accepts point submissions
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token (may contain ${ENV_VAR})
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Error text fragments meaning "no data for this location"
    #[serde(default = "default_no_data_markers")]
    pub no_data_markers: Vec<String>,

    /// Message fragments meaning "point already exists"
    #[serde(default = "default_duplicate_markers")]
    pub duplicate_markers: Vec<String>,
}

fn default_endpoint() -> String {
    "/point".to_string()
}

fn default_timeout() -> u64 {
    45
}

fn default_no_data_markers() -> Vec<String> {
    vec!["No Street View imagery".to_string()]
}

fn default_duplicate_markers() -> Vec<String> {
    vec!["already exists".to_string()]
}

impl ScoringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full submission URL.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}

/// Gap-fill scheduling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum cell fill loops in flight
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Target satisfied points per fine cell
    #[serde(default = "default_target_per_cell")]
    pub target_per_cell: u32,

    /// Attempts allowed per missing point
    #[serde(default = "default_attempt_multiplier")]
    pub attempt_multiplier: u32,

    /// Backoff before the second attempt of a cell
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: f64,

    /// Upper bound on any single backoff
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: f64,

    /// Pause between dispatching successive cells
    #[serde(default = "default_dispatch_delay")]
    pub dispatch_delay_ms: u64,
}

fn default_max_concurrent() -> usize {
    25
}

fn default_target_per_cell() -> u32 {
    1
}

fn default_attempt_multiplier() -> u32 {
    5
}

/// Longest backoff accepted from configuration, in seconds.
pub const MAX_BACKOFF_SECS: f64 = 3600.0;

fn default_backoff_base() -> f64 {
    1.0
}

fn default_backoff_cap() -> f64 {
    8.0
}

fn default_dispatch_delay() -> u64 {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            target_per_cell: default_target_per_cell(),
            attempt_multiplier: default_attempt_multiplier(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
            dispatch_delay_ms: default_dispatch_delay(),
        }
    }
}

/// Source of the existing-coverage snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CoverageConfig {
    /// Assume nothing exists yet
    #[default]
    None,

    /// JSON file: a `{cell: count}` map or a previous run report
    File { path: PathBuf },

    /// External command printing JSON rows (e.g. a database CLI)
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default = "default_key_field")]
        key_field: String,
        #[serde(default = "default_count_field")]
        count_field: String,
        #[serde(default = "default_command_timeout")]
        timeout_secs: u64,
    },
}

fn default_key_field() -> String {
    "h3_r9".to_string()
}

fn default_count_field() -> String {
    "count".to_string()
}

fn default_command_timeout() -> u64 {
    30
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Sample plan written by `plan` and read by `fill`
    #[serde(default = "default_plan_path")]
    pub plan_path: PathBuf,

    /// Directory receiving run reports
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Checkpoint directory for resume support
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Save the checkpoint every N finished cells
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_plan_path() -> PathBuf {
    PathBuf::from("output/sample_plan.json")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_checkpoint_every() -> usize {
    25
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            plan_path: default_plan_path(),
            report_dir: default_report_dir(),
            checkpoint_dir: None,
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::InlineParse(source) => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::InlineParse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if grid.center.validate().is_err() {
            return Err(invalid("grid.center", "coordinates out of range"));
        }
        if grid.coarse_count == 0 {
            return Err(invalid("grid.coarse_count", "must be at least 1"));
        }
        if grid.fine_resolution > 15 {
            return Err(invalid("grid.fine_resolution", "must be 15 or lower"));
        }
        if !(grid.coarse_resolution < grid.medium_resolution
            && grid.medium_resolution < grid.fine_resolution)
        {
            return Err(invalid(
                "grid",
                "resolutions must strictly increase coarse < medium < fine",
            ));
        }
        if grid.points_per_cell == 0 {
            return Err(invalid("grid.points_per_cell", "must be at least 1"));
        }

        let scheduler = &self.scheduler;
        if scheduler.target_per_cell == 0 {
            return Err(invalid("scheduler.target_per_cell", "must be at least 1"));
        }
        if scheduler.max_concurrent == 0 {
            return Err(invalid("scheduler.max_concurrent", "must be at least 1"));
        }
        if scheduler.attempt_multiplier == 0 {
            return Err(invalid("scheduler.attempt_multiplier", "must be at least 1"));
        }
        let in_range = |v: f64| v.is_finite() && (0.0..=MAX_BACKOFF_SECS).contains(&v);
        if !in_range(scheduler.backoff_base_secs) || !in_range(scheduler.backoff_cap_secs) {
            return Err(invalid(
                "scheduler.backoff",
                "must be between 0 and 3600 seconds",
            ));
        }

        if self.scoring.timeout_secs == 0 {
            return Err(invalid("scoring.timeout_secs", "must be at least 1"));
        }
        if self.scoring.base_url.trim().is_empty() {
            return Err(invalid("scoring.base_url", "must not be empty"));
        }
        Ok(())
    }

    /// Resolve the scoring API key from config or environment.
    ///
    /// A missing key is fine for open endpoints; a named but unset env var is not.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        if let Some(key) = &self.scoring.api_key {
            return Ok(Some(expand_env_vars(key)));
        }

        match &self.scoring.api_key_env {
            Some(env_var) => std::env::var(env_var)
                .map(Some)
                .map_err(|_| ConfigError::MissingApiKey {
                    env_var: env_var.clone(),
                }),
            None => Ok(None),
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to parse config: {0}")]
    InlineParse(toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Missing API key: set the {env_var} env var or scoring.api_key in config")]
    MissingApiKey { env_var: String },
}
