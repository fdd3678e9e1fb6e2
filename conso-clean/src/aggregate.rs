//! The three aggregate views of the enriched relation.
//!
//! Aggregates are independent: each one groups the enriched readings
//! directly, none is computed from another. Statistics are aggregated under
//! their output names, then rounded in a following projection with
//! DataFusion's `round`, which rounds half away from zero on the binary
//! value. `round` cannot wrap an aggregate inside `aggregate` itself.

use crate::enrich::{ANNEE, DATE, HEURE, MOIS};
use crate::prelude::*;
use crate::validation::CONSOMMATION_CLEAN;
use datafusion::common::JoinType;
use datafusion::functions_aggregate::expr_fn::{avg, count, max, min};
use datafusion::prelude::*;

/// Mean consumption column of the hourly and daily views.
pub const CONSOMMATION_MOYENNE: &str = "consommation_moyenne";

fn rounded(name: &str, scale: i64) -> Expr {
    round(vec![col(name), lit(scale)]).alias(name)
}

fn columns(names: &[&str]) -> Vec<Expr> {
    names.iter().map(|name| col(*name)).collect()
}

/// Mean consumption per building, energy type, unit, date and hour.
///
/// Output columns: `batiment_id`, `date`, `heure`, `type_energie`,
/// `consommation_moyenne`, `unite`.
pub fn hourly(enriched: DataFrame, scale: i64) -> Result<DataFrame> {
    Ok(enriched
        .aggregate(
            columns(&["batiment_id", "type_energie", "unite", DATE, HEURE]),
            vec![avg(col(CONSOMMATION_CLEAN)).alias(CONSOMMATION_MOYENNE)],
        )?
        .select(vec![
            col("batiment_id"),
            col(DATE),
            col(HEURE),
            col("type_energie"),
            rounded(CONSOMMATION_MOYENNE, scale),
            col("unite"),
        ])?)
}

/// Mean consumption per building, date, energy type and unit.
///
/// Output columns: `batiment_id`, `date`, `type_energie`,
/// `consommation_moyenne`, `unite`.
pub fn daily(enriched: DataFrame, scale: i64) -> Result<DataFrame> {
    Ok(enriched
        .aggregate(
            columns(&["batiment_id", DATE, "type_energie", "unite"]),
            vec![avg(col(CONSOMMATION_CLEAN)).alias(CONSOMMATION_MOYENNE)],
        )?
        .select(vec![
            col("batiment_id"),
            col(DATE),
            col("type_energie"),
            rounded(CONSOMMATION_MOYENNE, scale),
            col("unite"),
        ])?)
}

/// Monthly statistics per building, energy type and unit, with the
/// building's `commune`.
///
/// Buildings missing from the dimension are kept with a null `commune`.
pub fn monthly_by_commune(
    enriched: DataFrame,
    buildings: DataFrame,
    scale: i64,
) -> Result<DataFrame> {
    let value = || col(CONSOMMATION_CLEAN);
    let stats = enriched.aggregate(
        columns(&["batiment_id", "type_energie", "unite", ANNEE, MOIS]),
        vec![
            avg(value()).alias("consommation_mean"),
            min(value()).alias("consommation_min"),
            max(value()).alias("consommation_max"),
            count(lit(1)).alias("measurement_count"),
        ],
    )?;

    // Renamed so the join output has a single `batiment_id`.
    let communes = buildings.select(vec![
        col("batiment_id").alias("ref_batiment_id"),
        col("commune"),
    ])?;

    Ok(stats
        .join(
            communes,
            JoinType::Left,
            &["batiment_id"],
            &["ref_batiment_id"],
            None,
        )?
        .select(vec![
            col("batiment_id"),
            col("commune"),
            col("type_energie"),
            col("unite"),
            col(ANNEE),
            col(MOIS),
            rounded("consommation_mean", scale),
            rounded("consommation_min", scale),
            rounded("consommation_max", scale),
            col("measurement_count"),
        ])?)
}
