//! Cleaning stage binary
//!
//! Runs the cleaning and aggregation stage once and exits non-zero when it
//! fails, so an orchestrator can stop the rest of the pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use conso_clean::logging::init_logging;
use conso_clean::prelude::*;
use conso_clean::resources::SystemResourceProbe;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Raw consumption CSV
    #[arg(long, env = "CONSO_RAW_CSV")]
    raw: PathBuf,

    /// Building dimension CSV
    #[arg(long, env = "CONSO_BUILDINGS_CSV")]
    buildings: PathBuf,

    /// Output directory of the partitioned hourly aggregate
    #[arg(long, env = "CONSO_OUTPUT_DIR")]
    output: PathBuf,

    /// Key/value file receiving timing and resource metrics
    #[arg(long, env = "CONSO_SCRATCH_FILE")]
    scratch: Option<PathBuf>,

    /// Durable log file, cleared at start unless --append-log is set
    #[arg(long, env = "CONSO_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Append to the log file instead of clearing it
    #[arg(long)]
    append_log: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Only write to the log file, not to stderr
    #[arg(long, requires = "log_file")]
    no_console: bool,

    /// Filter directives, e.g. `warn,conso_clean=debug` (RUST_LOG wins when set)
    #[arg(long)]
    log_filter: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Stage name used in logs and the scratch header
    #[arg(long, default_value = "02_nettoyage")]
    stage_name: String,

    /// Smallest consumption kept
    #[arg(long, default_value_t = 0.0)]
    min_consumption: f64,

    /// Largest consumption kept
    #[arg(long, default_value_t = 10000.0)]
    max_consumption: f64,

    /// DataFusion target partitions (defaults to available parallelism)
    #[arg(long)]
    target_partitions: Option<usize>,

    /// CPU sampling window in seconds
    #[arg(long, default_value_t = 2.0)]
    resource_interval_secs: f64,

    /// Rows shown in debug previews
    #[arg(long, default_value_t = 5)]
    preview_rows: usize,

    /// Print the report as JSON on stdout
    #[arg(long)]
    report_json: bool,
}

impl Args {
    fn stage_config(&self) -> Result<StageConfig> {
        let mut engine = EngineConfig::default();
        if let Some(partitions) = self.target_partitions {
            engine.target_partitions = partitions;
        }
        let interval = Duration::try_from_secs_f64(self.resource_interval_secs)
            .context("invalid --resource-interval-secs")?;

        let mut config = StageConfig::new(&self.raw, &self.buildings, &self.output)
            .with_stage_name(&self.stage_name)
            .with_bounds(self.min_consumption, self.max_consumption)
            .with_preview_rows(self.preview_rows)
            .with_resource_interval(interval)
            .with_engine(engine);
        if let Some(scratch) = &self.scratch {
            config = config.with_scratch_file(scratch);
        }
        Ok(config)
    }

    fn logging_config(&self) -> LoggingConfig {
        let mut logging = match (&self.log_file, self.append_log) {
            (Some(path), false) => LoggingConfig::batch(path),
            (Some(path), true) => LoggingConfig::default().with_log_file(path, FileMode::Append),
            (None, _) => LoggingConfig::default(),
        };
        if self.verbose {
            let levels = LoggingConfig::development();
            logging.level = levels.level;
            logging.crate_level = levels.crate_level;
        }
        if let Some(filter) = &self.log_filter {
            logging = logging.with_env_filter(filter);
        }
        logging
            .with_console(!self.no_console)
            .with_json_format(self.json_logs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.logging_config()).context("failed to initialize logging")?;

    let config = args.stage_config()?;
    let probe = SystemResourceProbe::new(config.resource_interval);
    let report = run_cleaning_stage(&config, &probe)
        .await
        .with_context(|| format!("stage {} failed", config.stage_name))?;

    if args.report_json {
        println!("{}", report.to_json()?);
    }
    Ok(())
}
