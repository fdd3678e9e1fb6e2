//! The cleaning stage, end to end.

use crate::aggregate;
use crate::checks::run_post_checks;
use crate::enrich::with_calendar_fields;
use crate::prelude::*;
use crate::scratch::ScratchFile;
use crate::sink::{write_partitioned, HOURLY_PARTITIONS};
use crate::sources::{self, load_buildings, load_raw_consumption};
use crate::validation::{normalize, validate};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Runs the stage: ingestion, validation, checks, enrichment, aggregation,
/// persistence and reporting.
///
/// Any failure is logged once at `error` level and returned. Cached tables
/// are released on every exit path.
#[instrument(skip_all, fields(stage = %config.stage_name))]
pub async fn run_cleaning_stage(
    config: &StageConfig,
    probe: &dyn ResourceProbe,
) -> Result<CleaningReport> {
    let started = Instant::now();
    info!(
        raw = %config.raw_consumption_path.display(),
        buildings = %config.buildings_path.display(),
        output = %config.output_dir.display(),
        "Cleaning stage starting"
    );

    match execute(config, probe, started).await {
        Ok(report) => {
            info!(
                elapsed_secs = started.elapsed().as_secs_f64(),
                "[ok]: cleaning stage finished"
            );
            Ok(report)
        }
        Err(e) => {
            if e.is_fatal() {
                error!(error = %e, "[ko]: cleaning stage failed");
            } else {
                error!(error = %e, "[ko]: cleaning stage not started");
            }
            Err(e)
        }
    }
}

async fn execute(
    config: &StageConfig,
    probe: &dyn ResourceProbe,
    started: Instant,
) -> Result<CleaningReport> {
    config.validate()?;
    // Host snapshot at stage start, before ingestion.
    let resources = match probe.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Resource snapshot unavailable, reporting zeros");
            ResourceSnapshot::default()
        }
    };
    // Dropping the context releases every cached table.
    let mut ctx = CleaningContext::new(&config.engine)?;
    let scale = config.round_scale;

    info!("[1/5] Loading raw data");
    let raw = load_raw_consumption(&ctx, config).await?;
    let buildings = load_buildings(&ctx, config).await?;
    sources::log_relation("consommations_raw", &raw, config.preview_rows).await?;
    sources::log_relation("batiments", &buildings, config.preview_rows).await?;

    info!("[2/5] Cleaning");
    let normalized = ctx.cache("normalized", normalize(&ctx, raw)?).await?;
    let outcome = validate(normalized, &config.bounds).await?;
    let clean = ctx.cache("clean", outcome.frame).await?;
    ctx.release("normalized")?;
    let checks = run_post_checks(&clean, &config.bounds).await?;

    info!("[3/5] Temporal enrichment");
    let enriched = with_calendar_fields(clean)?;
    sources::log_relation("enriched", &enriched, config.preview_rows).await?;

    info!("[4/5] Aggregations");
    let hourly = ctx
        .cache("hourly", aggregate::hourly(enriched.clone(), scale)?)
        .await?;
    let daily = aggregate::daily(enriched.clone(), scale)?;
    let monthly = aggregate::monthly_by_commune(enriched, buildings, scale)?;
    let hourly_rows = sources::log_relation("hourly", &hourly, config.preview_rows).await?;
    let daily_rows = sources::log_relation("daily", &daily, config.preview_rows).await?;
    let monthly_rows =
        sources::log_relation("monthly_by_commune", &monthly, config.preview_rows).await?;

    info!("[5/5] Writing partitioned hourly aggregate");
    let written = write_partitioned(hourly, &config.output_dir, &HOURLY_PARTITIONS).await?;

    let report = CleaningReport {
        stage_name: config.stage_name.clone(),
        input_rows: outcome.initial_count,
        counts: outcome.counts,
        total_removed: outcome.counts.total_removed(),
        clean_rows: outcome.clean_count,
        hourly_rows,
        daily_rows,
        monthly_rows,
        max_consumption: config.bounds.max,
        output_path: written.location,
        write_secs: written.elapsed.as_secs_f64(),
        total_secs: started.elapsed().as_secs_f64(),
        resources,
        checks,
    };
    report.log();

    if let Some(path) = &config.scratch_file {
        let now = chrono::Local::now().naive_local();
        ScratchFile::for_stage(&config.stage_name, now, report.total_secs, &resources)
            .write(path)
            .await?;
    }

    let failures = ctx.release_all();
    if failures > 0 {
        warn!(cache.failures = failures, "Some cached tables could not be released");
    }
    Ok(report)
}
