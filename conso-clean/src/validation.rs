//! Normalization, filtering and deduplication of raw readings.
//!
//! The normalizers add two typed columns to the raw relation. Filtering then
//! runs as a sequence of predicates over the full relation, each preceded by
//! a count of the rows it is about to remove:
//!
//! | step | predicate kept | counter |
//! |------|----------------|---------|
//! | timestamps | `timestamp_parsed IS NOT NULL` | `invalid_timestamps` |
//! | lower bound | `consommation_clean >= min` | `null_count`, `negative_count` |
//! | upper bound | `consommation_clean <= max` | `outlier_count` |
//! | duplicates | one row per measurement key | `duplicates_removed` |
//!
//! `null_count` and `negative_count` are diagnostic counts taken before the
//! lower-bound filter, which removes both kinds of rows in a single pass.

use crate::config::ConsumptionBounds;
use crate::context::CleaningContext;
use crate::prelude::*;
use crate::udf::{CLEAN_CONSOMMATION_UDF, PARSE_TIMESTAMP_UDF};
use datafusion::logical_expr::SortExpr;
use datafusion::prelude::*;
use serde::Serialize;
use tracing::{info, instrument};

/// Typed timestamp added by normalization.
pub const TIMESTAMP_PARSED: &str = "timestamp_parsed";

/// Typed consumption added by normalization.
pub const CONSOMMATION_CLEAN: &str = "consommation_clean";

/// Columns identifying one measurement.
pub const MEASUREMENT_KEY: [&str; 3] = ["batiment_id", TIMESTAMP_PARSED, "type_energie"];

/// Rows removed by each validation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    /// Timestamps matching none of the accepted layouts
    pub invalid_timestamps: usize,
    /// Consumption values that are not numbers
    pub null_count: usize,
    /// Consumption values below the lower bound
    pub negative_count: usize,
    /// Consumption values above the upper bound
    pub outlier_count: usize,
    /// Extra rows sharing a measurement key
    pub duplicates_removed: usize,
}

impl RejectionCounts {
    /// Sum of every category.
    pub fn total_removed(&self) -> usize {
        self.invalid_timestamps
            + self.null_count
            + self.negative_count
            + self.outlier_count
            + self.duplicates_removed
    }
}

/// Result of the validation phase.
#[derive(Debug)]
pub struct ValidationOutcome {
    /// Rows in the raw relation
    pub initial_count: usize,
    /// Rows surviving every step
    pub clean_count: usize,
    /// Per-step rejections
    pub counts: RejectionCounts,
    /// The clean relation
    pub frame: DataFrame,
}

/// Adds `timestamp_parsed` and `consommation_clean` to the raw relation.
pub fn normalize(ctx: &CleaningContext, raw: DataFrame) -> Result<DataFrame> {
    let parse_timestamp = ctx.udf(PARSE_TIMESTAMP_UDF)?;
    let clean_consommation = ctx.udf(CLEAN_CONSOMMATION_UDF)?;
    Ok(raw
        .with_column(TIMESTAMP_PARSED, parse_timestamp.call(vec![col("timestamp")]))?
        .with_column(
            CONSOMMATION_CLEAN,
            clean_consommation.call(vec![col("consommation")]),
        )?)
}

/// Filters and deduplicates a normalized relation.
///
/// Each step forces an evaluation of the relation; cache `normalized`
/// beforehand when the input is expensive to recompute.
#[instrument(skip(normalized, bounds), fields(bounds.min = bounds.min, bounds.max = bounds.max))]
pub async fn validate(normalized: DataFrame, bounds: &ConsumptionBounds) -> Result<ValidationOutcome> {
    let mut counts = RejectionCounts::default();
    let initial_count = normalized.clone().count().await?;
    info!(rows.input = initial_count, "Validation starting");

    counts.invalid_timestamps = normalized
        .clone()
        .filter(col(TIMESTAMP_PARSED).is_null())?
        .count()
        .await?;
    let frame = normalized.filter(col(TIMESTAMP_PARSED).is_not_null())?;
    info!(
        rows.rejected = counts.invalid_timestamps,
        "Invalid timestamps removed"
    );

    counts.null_count = frame
        .clone()
        .filter(col(CONSOMMATION_CLEAN).is_null())?
        .count()
        .await?;
    counts.negative_count = frame
        .clone()
        .filter(col(CONSOMMATION_CLEAN).lt(lit(bounds.min)))?
        .count()
        .await?;
    // Null comparisons are never true, so this drops nulls as well.
    let frame = frame.filter(col(CONSOMMATION_CLEAN).gt_eq(lit(bounds.min)))?;
    info!(
        rows.non_numeric = counts.null_count,
        rows.below_minimum = counts.negative_count,
        "Non-numeric and negative consumption removed"
    );

    counts.outlier_count = frame
        .clone()
        .filter(col(CONSOMMATION_CLEAN).gt(lit(bounds.max)))?
        .count()
        .await?;
    let frame = frame.filter(col(CONSOMMATION_CLEAN).lt_eq(lit(bounds.max)))?;
    info!(
        rows.rejected = counts.outlier_count,
        bounds.max = bounds.max,
        "Outliers removed"
    );

    let before_dedup = frame.clone().count().await?;
    let frame = deduplicate(frame)?;
    let clean_count = frame.clone().count().await?;
    counts.duplicates_removed = before_dedup - clean_count;
    info!(
        rows.rejected = counts.duplicates_removed,
        rows.clean = clean_count,
        "Duplicates removed"
    );

    Ok(ValidationOutcome {
        initial_count,
        clean_count,
        counts,
        frame,
    })
}

/// Keeps one row per measurement key.
///
/// Among duplicates the kept row has the smallest raw `timestamp` text, then
/// the smallest `consommation_clean`, then the smallest raw `consommation`
/// text, so repeated runs keep the same rows.
pub fn deduplicate(frame: DataFrame) -> Result<DataFrame> {
    let on: Vec<Expr> = MEASUREMENT_KEY.iter().map(|c| col(*c)).collect();
    let select: Vec<Expr> = frame
        .schema()
        .fields()
        .iter()
        .map(|field| ident(field.name()))
        .collect();

    // DISTINCT ON requires the ordering to start with the key columns.
    let mut order: Vec<SortExpr> = on.iter().map(|e| e.clone().sort(true, false)).collect();
    order.extend([
        col("timestamp").sort(true, false),
        col(CONSOMMATION_CLEAN).sort(true, false),
        col("consommation").sort(true, false),
    ]);

    Ok(frame.distinct_on(on, select, Some(order))?)
}
