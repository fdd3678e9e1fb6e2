//! The cleaning report emitted at the end of a run.

use crate::checks::CheckOutcome;
use crate::prelude::*;
use crate::validation::RejectionCounts;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Summary of one run of the stage.
#[derive(Debug, Clone, Serialize)]
pub struct CleaningReport {
    pub stage_name: String,
    /// Rows read from the raw consumption file
    pub input_rows: usize,
    pub counts: RejectionCounts,
    pub total_removed: usize,
    /// Rows left after validation
    pub clean_rows: usize,
    pub hourly_rows: usize,
    pub daily_rows: usize,
    pub monthly_rows: usize,
    /// Upper bound used for outliers
    pub max_consumption: f64,
    /// Location of the partitioned hourly aggregate
    pub output_path: PathBuf,
    /// Seconds spent writing the hourly aggregate
    pub write_secs: f64,
    /// Seconds for the whole stage
    pub total_secs: f64,
    pub resources: ResourceSnapshot,
    pub checks: Vec<CheckOutcome>,
}

fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl CleaningReport {
    /// Number of checks that passed.
    pub fn checks_passed(&self) -> usize {
        self.checks.iter().filter(|c| c.status.is_success()).count()
    }

    /// Report lines, label and value.
    pub fn lines(&self) -> Vec<(String, String)> {
        let count = |n: usize| format!("{:>12}", group_thousands(n));
        vec![
            ("Input rows".into(), count(self.input_rows)),
            ("Invalid timestamps".into(), count(self.counts.invalid_timestamps)),
            ("Non-numeric consumption".into(), count(self.counts.null_count)),
            ("Negative consumption".into(), count(self.counts.negative_count)),
            (
                format!("Outliers (> {})", self.max_consumption),
                count(self.counts.outlier_count),
            ),
            ("Duplicates".into(), count(self.counts.duplicates_removed)),
            ("Total removed".into(), count(self.total_removed)),
            ("Clean rows".into(), count(self.clean_rows)),
            ("Rows after hourly aggregation".into(), count(self.hourly_rows)),
            ("Rows after daily aggregation".into(), count(self.daily_rows)),
            ("Rows after monthly aggregation".into(), count(self.monthly_rows)),
            ("Output".into(), self.output_path.display().to_string()),
            ("Write time".into(), format!("{:.2} s", self.write_secs)),
            ("Stage time".into(), format!("{:.2} s", self.total_secs)),
            (
                "Resources".into(),
                format!(
                    "RAM {:.2} GB, CPU {:.1} % free, cores {:.2} logical / {:.2} physical",
                    self.resources.ram_available_gb,
                    self.resources.cpu_available_pct,
                    self.resources.available_logical_cores,
                    self.resources.available_physical_cores
                ),
            ),
            (
                "Checks passed".into(),
                format!("{}/{}", self.checks_passed(), self.checks.len()),
            ),
        ]
    }

    /// Logs the report, one `info` event per line.
    pub fn log(&self) {
        info!("{:=^60}", format!(" CLEANING REPORT {} ", self.stage_name));
        for (label, value) in self.lines() {
            info!("{label:<32}: {value}");
        }
        info!("{}", "=".repeat(60));
        if self.checks_passed() < self.checks.len() {
            warn!(
                checks.failed = self.checks.len() - self.checks_passed(),
                "Some post-condition checks failed, see errors above"
            );
        }
    }

    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
