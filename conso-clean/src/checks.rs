//! Post-condition checks on the clean relation.
//!
//! These checks re-verify what the validation phase guarantees. A failing
//! check is logged at `error` level and reported, but never aborts the run.

use crate::config::ConsumptionBounds;
use crate::prelude::*;
use crate::validation::{CONSOMMATION_CLEAN, MEASUREMENT_KEY, TIMESTAMP_PARSED};
use datafusion::functions_aggregate::expr_fn::count;
use datafusion::prelude::*;
use serde::Serialize;
use tracing::{error, info, instrument};

/// The status of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// No violating row
    Success,
    /// At least one violating row
    Failure,
}

impl CheckStatus {
    /// Returns true if this is a Success status.
    pub fn is_success(&self) -> bool {
        matches!(self, CheckStatus::Success)
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub status: CheckStatus,
    pub violations: usize,
    pub message: String,
}

impl CheckOutcome {
    fn from_violations(name: &'static str, violations: usize, what: &str) -> Self {
        let (status, message) = if violations == 0 {
            (CheckStatus::Success, format!("no {what}"))
        } else {
            (CheckStatus::Failure, format!("{violations} {what} remain"))
        };
        Self {
            name,
            status,
            violations,
            message,
        }
    }
}

/// Runs the five checks against `frame` and logs each outcome.
#[instrument(skip(frame, bounds))]
pub async fn run_post_checks(
    frame: &DataFrame,
    bounds: &ConsumptionBounds,
) -> Result<Vec<CheckOutcome>> {
    let violations = |predicate: Expr| {
        let frame = frame.clone();
        async move { Ok::<_, CleanError>(frame.filter(predicate)?.count().await?) }
    };

    let mut outcomes = vec![
        CheckOutcome::from_violations(
            "timestamp_parsed_not_null",
            violations(col(TIMESTAMP_PARSED).is_null()).await?,
            "rows with a null timestamp",
        ),
        CheckOutcome::from_violations(
            "consommation_clean_not_null",
            violations(col(CONSOMMATION_CLEAN).is_null()).await?,
            "rows with a null consumption",
        ),
        CheckOutcome::from_violations(
            "consommation_clean_non_negative",
            violations(col(CONSOMMATION_CLEAN).lt(lit(bounds.min))).await?,
            "rows below the minimum consumption",
        ),
        CheckOutcome::from_violations(
            "consommation_clean_within_upper_bound",
            violations(col(CONSOMMATION_CLEAN).gt(lit(bounds.max))).await?,
            "rows above the maximum consumption",
        ),
    ];
    outcomes.push(CheckOutcome::from_violations(
        "unique_measurement_key",
        duplicate_keys(frame).await?,
        "duplicated measurement keys",
    ));

    for outcome in &outcomes {
        if outcome.status.is_success() {
            info!(check.name = outcome.name, "[ok]: {}", outcome.message);
        } else {
            error!(
                check.name = outcome.name,
                check.violations = outcome.violations,
                "[ko]: {}",
                outcome.message
            );
        }
    }
    Ok(outcomes)
}

/// Number of measurement keys appearing more than once.
async fn duplicate_keys(frame: &DataFrame) -> Result<usize> {
    let keys: Vec<Expr> = MEASUREMENT_KEY.iter().map(|c| col(*c)).collect();
    Ok(frame
        .clone()
        .aggregate(keys, vec![count(lit(1)).alias("occurrences")])?
        .filter(col("occurrences").gt(lit(1_i64)))?
        .count()
        .await?)
}
