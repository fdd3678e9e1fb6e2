//! Configuration for a cleaning-stage run.
//!
//! [`StageConfig`] is built once by the caller (the binary, or an
//! orchestrator embedding the library) and passed into
//! [`run_cleaning_stage`](crate::stage::run_cleaning_stage). Nothing in the
//! crate reads paths from globals.

use crate::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine settings for the DataFusion session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Target number of partitions for parallel execution
    pub target_partitions: usize,
    /// Maximum memory for query execution (in bytes)
    pub max_memory: usize,
    /// Memory fraction to use before spilling (0.0 to 1.0)
    pub memory_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4),
            max_memory: 2 * 1024 * 1024 * 1024, // 2GB
            memory_fraction: 0.9,
        }
    }
}

/// Inclusive range of consumption values kept by the outlier policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionBounds {
    /// Rows strictly below this are rejected as negative
    pub min: f64,
    /// Rows strictly above this are rejected as outliers
    pub max: f64,
}

impl Default for ConsumptionBounds {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 10_000.0,
        }
    }
}

/// Everything one run of the cleaning stage needs.
///
/// # Examples
///
/// ```rust
/// use conso_clean::config::StageConfig;
///
/// let config = StageConfig::new("data/consommations_raw.csv", "data/batiments.csv", "output/02_consommations_clean")
///     .with_scratch_file("my_tmp/tmp_02_resources.txt")
///     .with_preview_rows(10);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Name used in banners, log lines and the scratch file header
    pub stage_name: String,
    /// Raw consumption events (CSV, header row)
    pub raw_consumption_path: PathBuf,
    /// Building dimension (CSV, header row)
    pub buildings_path: PathBuf,
    /// Target directory of the partitioned hourly aggregate
    pub output_dir: PathBuf,
    /// Key/value hand-off file read by the orchestrator
    pub scratch_file: Option<PathBuf>,
    /// Consumption values kept by the validation phase
    pub bounds: ConsumptionBounds,
    /// Decimal places applied to every aggregate statistic
    pub round_scale: i64,
    /// Rows rendered in debug previews (0 disables previews)
    pub preview_rows: usize,
    /// CPU sampling window of the resource probe
    pub resource_interval: Duration,
    /// Rows read for CSV schema inference
    pub schema_infer_max_records: usize,
    /// DataFusion session settings
    pub engine: EngineConfig,
}

impl StageConfig {
    /// Creates a configuration with the three required locations and defaults.
    pub fn new(
        raw_consumption_path: impl Into<PathBuf>,
        buildings_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stage_name: "02_nettoyage".to_string(),
            raw_consumption_path: raw_consumption_path.into(),
            buildings_path: buildings_path.into(),
            output_dir: output_dir.into(),
            scratch_file: None,
            bounds: ConsumptionBounds::default(),
            round_scale: 2,
            preview_rows: 5,
            resource_interval: Duration::from_secs(2),
            schema_infer_max_records: 1000,
            engine: EngineConfig::default(),
        }
    }

    /// Sets the stage name.
    pub fn with_stage_name(mut self, name: impl Into<String>) -> Self {
        self.stage_name = name.into();
        self
    }

    /// Sets the scratch key/value file.
    pub fn with_scratch_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_file = Some(path.into());
        self
    }

    /// Sets the kept consumption range.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = ConsumptionBounds { min, max };
        self
    }

    /// Sets the number of preview rows logged per relation.
    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    /// Sets the CPU sampling window.
    pub fn with_resource_interval(mut self, interval: Duration) -> Self {
        self.resource_interval = interval;
        self
    }

    /// Sets the engine configuration.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Checks the configuration before any work starts.
    pub fn validate(&self) -> Result<()> {
        require_path("raw consumption path", &self.raw_consumption_path)?;
        require_path("buildings path", &self.buildings_path)?;
        require_path("output directory", &self.output_dir)?;
        if let Some(scratch) = &self.scratch_file {
            require_path("scratch file", scratch)?;
        }

        let ConsumptionBounds { min, max } = self.bounds;
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(CleanError::Configuration(format!(
                "invalid consumption bounds [{min}, {max}]"
            )));
        }
        if !(0..=10).contains(&self.round_scale) {
            return Err(CleanError::Configuration(format!(
                "round scale {} outside 0..=10",
                self.round_scale
            )));
        }
        if self.engine.batch_size == 0 {
            return Err(CleanError::Configuration(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.engine.target_partitions == 0 {
            return Err(CleanError::Configuration(
                "target partitions must be greater than zero".to_string(),
            ));
        }
        if !(self.engine.memory_fraction > 0.0 && self.engine.memory_fraction <= 1.0) {
            return Err(CleanError::Configuration(format!(
                "memory fraction {} outside (0, 1]",
                self.engine.memory_fraction
            )));
        }
        Ok(())
    }
}

fn require_path(what: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(CleanError::Configuration(format!("{what} is empty")));
    }
    Ok(())
}
