//! hexcover CLI - even-density spatial sampling with idempotent gap filling.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hexcover::{Config, FillPipeline, HttpScoringClient, PlanBuilder, SamplePlan};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "hexcover")]
#[command(version)]
#[command(about = "Even-density hexagonal sampling with idempotent gap filling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the grid and write a sample plan
    Plan {
        /// Path to output plan JSON (defaults to output.plan_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of coarse cells around the center
        #[arg(long)]
        coarse_count: Option<usize>,

        /// Random seed for reproducible plans
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Fill coverage gaps by submitting plan points to the scoring service
    Fill {
        /// Path to plan JSON (defaults to output.plan_path)
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Target points per fine cell
        #[arg(short, long)]
        target: Option<u32>,

        /// Maximum cells filled concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Directory for the run report
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Checkpoint directory for resumable runs
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# hexcover configuration file

[grid]
center = { lat = 51.513281, lon = -0.117465 }
coarse_count = 100
coarse_resolution = 7
medium_resolution = 8
fine_resolution = 9
points_per_cell = 5
# seed = 42
max_ring_distance = 10

[scoring]
base_url = "http://localhost:8787"
endpoint = "/point"
# api_key = "${SCORING_API_KEY}"
# api_key_env = "SCORING_API_KEY"
timeout_secs = 45
no_data_markers = ["No Street View imagery"]
duplicate_markers = ["already exists"]

[scheduler]
max_concurrent = 25
target_per_cell = 1
attempt_multiplier = 5
backoff_base_secs = 1.0
backoff_cap_secs = 8.0
dispatch_delay_ms = 50

[coverage]
source = "none"
# source = "file"
# path = "output/coverage_20250101_120000.json"
# source = "command"
# program = "npx"
# args = ["wrangler", "d1", "execute", "points-db", "--remote", "--json",
#         "--command", "SELECT h3_r9, COUNT(*) AS count FROM points GROUP BY h3_r9"]
# key_field = "h3_r9"
# count_field = "count"
# timeout_secs = 30

[output]
plan_path = "output/sample_plan.json"
report_dir = "output"
# checkpoint_dir = "checkpoints/"
checkpoint_every = 25
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;

            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!(
                "  Grid: {} coarse cells at res {}/{}/{} around {}",
                config.grid.coarse_count,
                config.grid.coarse_resolution,
                config.grid.medium_resolution,
                config.grid.fine_resolution,
                config.grid.center
            );
            info!("  Scoring: {}", config.scoring.url());
            info!(
                "  Scheduler: target {} per cell, {} concurrent",
                config.scheduler.target_per_cell, config.scheduler.max_concurrent
            );
            return Ok(());
        }

        Commands::Plan {
            output,
            coarse_count,
            seed,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(count) = coarse_count {
                config.grid.coarse_count = count;
            }
            if seed.is_some() {
                config.grid.seed = seed;
            }
            config.validate().context("Invalid overrides")?;
            let output = output.unwrap_or_else(|| config.output.plan_path.clone());

            let plan = PlanBuilder::from_config(&config.grid)
                .with_progress(true)
                .build(config.grid.center)
                .context("Failed to build sample plan")?;
            plan.save(&output).context("Failed to write sample plan")?;

            println!("\n=== Sample Plan Complete ===");
            println!("Coarse cells: {}", plan.coarse_cells.len());
            println!("Fine cells:   {}", plan.cells.len());
            println!("Points:       {}", plan.total_points());
            println!("Output:       {output:?}");
        }

        Commands::Fill {
            plan,
            target,
            concurrency,
            report_dir,
            checkpoint,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(target) = target {
                config.scheduler.target_per_cell = target;
            }
            if let Some(concurrency) = concurrency {
                config.scheduler.max_concurrent = concurrency;
            }
            if let Some(dir) = report_dir {
                config.output.report_dir = dir;
            }
            if checkpoint.is_some() {
                config.output.checkpoint_dir = checkpoint;
            }
            config.validate().context("Invalid overrides")?;

            let plan_path = plan.unwrap_or_else(|| config.output.plan_path.clone());
            let sample_plan = SamplePlan::load(&plan_path)
                .with_context(|| format!("Failed to load plan from {plan_path:?}"))?;

            let api_key = config
                .resolve_api_key()
                .context("Failed to resolve API key")?;
            let client = Arc::new(
                HttpScoringClient::from_config(&config.scoring, api_key)
                    .context("Failed to create scoring client")?,
            );

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing in-flight attempts");
                    on_signal.cancel();
                }
            });

            let pipeline = FillPipeline::new(config, client).with_progress(true);
            let summary = pipeline.run(sample_plan, cancel).await?;
            let stats = &summary.report.stats;

            if summary.report.metadata.interrupted {
                println!("\n=== Gap Fill Interrupted ===");
            } else {
                println!("\n=== Gap Fill Complete ===");
            }
            println!("Cells:       {}", stats.total_cells);
            println!("Skipped:     {}", stats.cells_skipped);
            println!("Completed:   {}", stats.cells_completed);
            println!("Partial:     {}", stats.cells_partial);
            println!("Failed:      {}", stats.cells_failed);
            println!("Interrupted: {}", stats.cells_interrupted);
            println!("Attempted:   {}", stats.total_attempted);
            println!("Successful:  {}", stats.successful);
            println!("Duplicates:  {}", stats.duplicates);
            println!("No data:     {}", stats.no_data);
            println!("Timeouts:    {}", stats.timeouts);
            println!("Transient:   {}", stats.transient_errors);
            println!("Fatal:       {}", stats.fatal_errors);
            println!("Success:     {:.1}%", stats.success_rate * 100.0);
            println!("Throughput:  {:.2}/s", stats.attempts_per_sec);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Report:      {:?}", summary.report_path);
        }
    }

    Ok(())
}
