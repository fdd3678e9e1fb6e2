//! End-to-end runs of the cleaning stage over CSV fixtures.

use arrow::array::{Array, Float64Array, StringArray};
use arrow::compute::concat_batches;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use conso_clean::aggregate;
use conso_clean::context::CleaningContext;
use conso_clean::enrich::with_calendar_fields;
use conso_clean::prelude::*;
use conso_clean::resources::FixedResourceProbe;
use conso_clean::scratch::{ScratchFile, CPU_PCT, RAM_GB, TEMPS_EXEC_SEC};
use conso_clean::sink::{read_partitioned, HOURLY_PARTITIONS};
use conso_clean::sources::{load_buildings, load_raw_consumption};
use conso_clean::validation::{normalize, validate};
use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::prelude::*;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const RAW_CSV: &str = "\
batiment_id,timestamp,consommation,type_energie,unite
B1,2024-01-05 10:00:00,\"12,5\",elec,kWh
B1,05/01/2024 10:00,\"12,5\",elec,kWh
B1,2024-01-05 10:30:00,\"14,5\",elec,kWh
B1,2024-01-05 11:00:00,\"-3,0\",elec,kWh
B1,2024-01-05 12:00:00,15000,elec,kWh
B1,2024-01-05 13:00:00,abc,elec,kWh
B1,2024-01-06 09:00:00,\"42,0\",elec,kWh
B2,not a date,10,gaz,m3
B2,2024-01-05T08:00:00,\"3,25\",gaz,m3
B99,2024-02-01 00:15:00,7,elec,kWh
";

const BUILDINGS_CSV: &str = "\
batiment_id,nom,commune
B1,Mairie,Lyon
B2,Ecole,Villeurbanne
";

struct Fixture {
    dir: TempDir,
    config: StageConfig,
}

impl Fixture {
    fn new() -> Self {
        Self::with_raw(RAW_CSV)
    }

    fn with_raw(raw: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("consommations_raw.csv");
        let buildings_path = dir.path().join("batiments.csv");
        std::fs::write(&raw_path, raw).unwrap();
        std::fs::write(&buildings_path, BUILDINGS_CSV).unwrap();

        let config = StageConfig::new(raw_path, buildings_path, dir.path().join("out").join("hourly"))
            .with_scratch_file(dir.path().join("my_tmp").join("tmp_02.txt"))
            .with_preview_rows(3);
        Self { dir, config }
    }

    fn output(&self) -> &Path {
        &self.config.output_dir
    }
}

fn probe() -> FixedResourceProbe {
    FixedResourceProbe(ResourceSnapshot::from_measurements(7.5, 60.0, 8, 4))
}

/// Parquet strings may come back as views; compare them as plain text.
fn text(name: &str) -> Expr {
    cast(col(name), DataType::Utf8).alias(name)
}

async fn read_back(dir: &Path) -> RecordBatch {
    let ctx = SessionContext::new();
    let batches = read_partitioned(&ctx, dir, &HOURLY_PARTITIONS)
        .await
        .unwrap()
        .select(vec![
            text("batiment_id"),
            text("date"),
            col("heure"),
            text("type_energie"),
            col("consommation_moyenne"),
            text("unite"),
        ])
        .unwrap()
        .sort(vec![
            col("batiment_id").sort(true, false),
            col("date").sort(true, false),
            col("heure").sort(true, false),
            col("type_energie").sort(true, false),
        ])
        .unwrap()
        .collect()
        .await
        .unwrap();
    concat_batches(&batches[0].schema(), &batches).unwrap()
}

fn partition_dirs(root: &Path) -> Vec<String> {
    let mut dirs = Vec::new();
    for date in std::fs::read_dir(root).unwrap() {
        let date = date.unwrap().path();
        if !date.is_dir() {
            continue;
        }
        for kind in std::fs::read_dir(&date).unwrap() {
            let kind = kind.unwrap().path();
            dirs.push(format!(
                "{}/{}",
                date.file_name().unwrap().to_string_lossy(),
                kind.file_name().unwrap().to_string_lossy()
            ));
        }
    }
    dirs.sort();
    dirs
}

#[tokio::test]
async fn test_stage_counts_every_rejection() {
    let fixture = Fixture::new();
    let report = run_cleaning_stage(&fixture.config, &probe()).await.unwrap();

    assert_eq!(report.input_rows, 10);
    assert_eq!(report.counts.invalid_timestamps, 1);
    assert_eq!(report.counts.null_count, 1);
    assert_eq!(report.counts.negative_count, 1);
    assert_eq!(report.counts.outlier_count, 1);
    assert_eq!(report.counts.duplicates_removed, 1);
    assert_eq!(report.total_removed, 5);
    assert_eq!(report.clean_rows, 5);
    // Removed rows are fully accounted for before aggregation.
    assert_eq!(report.input_rows - report.clean_rows, report.total_removed);

    // Aggregation groups rows together, it does not reject any.
    assert_eq!(report.hourly_rows, 4);
    assert_eq!(report.daily_rows, 4);
    assert_eq!(report.monthly_rows, 3);
    assert_eq!(report.checks.len(), 5);
    assert!(report.checks.iter().all(|c| c.status.is_success()));
    assert!(report.output_path.is_absolute());
}

#[tokio::test]
async fn test_hourly_output_is_partitioned_by_date_and_type() {
    let fixture = Fixture::new();
    run_cleaning_stage(&fixture.config, &probe()).await.unwrap();

    assert_eq!(
        partition_dirs(fixture.output()),
        vec![
            "date=2024-01-05/type_energie=elec",
            "date=2024-01-05/type_energie=gaz",
            "date=2024-01-06/type_energie=elec",
            "date=2024-02-01/type_energie=elec",
        ]
    );

    let batch = read_back(fixture.output()).await;
    assert_eq!(batch.num_rows(), 4);
    let ids = batch
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let means = batch
        .column(4)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    // B1 at 10h: 12.5 (duplicate dropped) and 14.5
    assert_eq!(ids.value(0), "B1");
    assert_eq!(means.value(0), 13.5);
    assert_eq!(means.value(1), 42.0);
    assert_eq!(ids.value(2), "B2");
    assert_eq!(means.value(2), 3.25);
    assert_eq!(ids.value(3), "B99");
    assert_eq!(means.value(3), 7.0);
}

#[tokio::test]
async fn test_rerun_produces_identical_output() {
    let fixture = Fixture::new();
    run_cleaning_stage(&fixture.config, &probe()).await.unwrap();
    let first = pretty_format_batches(&[read_back(fixture.output()).await])
        .unwrap()
        .to_string();

    run_cleaning_stage(&fixture.config, &probe()).await.unwrap();
    let second = pretty_format_batches(&[read_back(fixture.output()).await])
        .unwrap()
        .to_string();

    assert_eq!(first, second);
    assert_eq!(partition_dirs(fixture.output()).len(), 4);
}

#[tokio::test]
async fn test_scratch_file_is_written() {
    let fixture = Fixture::new();
    let report = run_cleaning_stage(&fixture.config, &probe()).await.unwrap();

    let scratch_path = fixture.config.scratch_file.clone().unwrap();
    let text = std::fs::read_to_string(&scratch_path).unwrap();
    assert!(text.starts_with("# 02_nettoyage "));

    let scratch = ScratchFile::read(&scratch_path).await.unwrap();
    assert_eq!(scratch.len(), 5);
    assert_eq!(scratch.number(RAM_GB).unwrap(), 7.5);
    assert_eq!(scratch.number(CPU_PCT).unwrap(), 60.0);
    // Whole-stage time, not just the write.
    let elapsed = scratch.number(TEMPS_EXEC_SEC).unwrap();
    assert!((elapsed - report.total_secs).abs() < 0.01);
    assert!(report.total_secs >= report.write_secs);
}

/// Counts snapshots and reports a fixed one.
#[derive(Default)]
struct CountingProbe {
    calls: AtomicUsize,
}

#[async_trait]
impl ResourceProbe for CountingProbe {
    async fn snapshot(&self) -> Result<ResourceSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        probe().snapshot().await
    }
}

#[tokio::test]
async fn test_resources_are_sampled_before_ingestion() {
    let fixture = Fixture::new();
    let config = StageConfig {
        raw_consumption_path: fixture.dir.path().join("absent.csv"),
        ..fixture.config.clone()
    };
    let counting = CountingProbe::default();
    run_cleaning_stage(&config, &counting).await.unwrap_err();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

    let counting = CountingProbe::default();
    run_cleaning_stage(&fixture.config, &counting).await.unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_report_json_round_trips_through_serde() {
    let fixture = Fixture::new();
    let report = run_cleaning_stage(&fixture.config, &probe()).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["input_rows"], 10);
    assert_eq!(json["counts"]["outlier_count"], 1);
    assert_eq!(json["resources"]["cpu_available_pct"], 60.0);
}

#[tokio::test]
async fn test_unknown_building_keeps_null_commune() {
    let fixture = Fixture::new();
    let mut ctx = CleaningContext::new(&fixture.config.engine).unwrap();
    let raw = load_raw_consumption(&ctx, &fixture.config).await.unwrap();
    let buildings = load_buildings(&ctx, &fixture.config).await.unwrap();
    let normalized = ctx
        .cache("normalized", normalize(&ctx, raw).unwrap())
        .await
        .unwrap();
    let outcome = validate(normalized, &fixture.config.bounds).await.unwrap();
    let enriched = with_calendar_fields(outcome.frame).unwrap();

    let batches = aggregate::monthly_by_commune(enriched, buildings, 2)
        .unwrap()
        .filter(col("batiment_id").eq(lit("B99")))
        .unwrap()
        .collect()
        .await
        .unwrap();
    let batch = concat_batches(&batches[0].schema(), &batches).unwrap();
    assert_eq!(batch.num_rows(), 1);
    let commune = batch.column_by_name("commune").unwrap();
    assert!(commune.is_null(0));
}

#[tokio::test]
async fn test_missing_input_fails_without_output() {
    let fixture = Fixture::new();
    let config = StageConfig {
        raw_consumption_path: fixture.dir.path().join("absent.csv"),
        ..fixture.config.clone()
    };
    let err = run_cleaning_stage(&config, &probe()).await.unwrap_err();
    assert!(matches!(err, CleanError::DataSource { .. }));
    assert!(err.is_fatal());
    assert!(!fixture.output().exists());
    assert!(!config.scratch_file.unwrap().exists());
}

#[tokio::test]
async fn test_missing_column_fails() {
    let fixture = Fixture::with_raw("batiment_id,timestamp,consommation,unite\nB1,2024-01-05 10:00:00,1,kWh\n");
    let err = run_cleaning_stage(&fixture.config, &probe()).await.unwrap_err();
    assert!(matches!(
        err,
        CleanError::ColumnNotFound { ref column, .. } if column == "type_energie"
    ));
}

#[tokio::test]
async fn test_invalid_configuration_is_not_fatal() {
    let fixture = Fixture::new();
    let config = fixture.config.clone().with_bounds(100.0, 1.0);
    let err = run_cleaning_stage(&config, &probe()).await.unwrap_err();
    assert!(matches!(err, CleanError::Configuration(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_everything_rejected_still_writes_report() {
    let fixture = Fixture::with_raw(
        "batiment_id,timestamp,consommation,type_energie,unite\n\
         B1,yesterday,1,elec,kWh\n\
         B1,2024-01-05 10:00:00,abc,elec,kWh\n",
    );
    let report = run_cleaning_stage(&fixture.config, &probe()).await.unwrap();
    assert_eq!(report.input_rows, 2);
    assert_eq!(report.clean_rows, 0);
    assert_eq!(report.hourly_rows, 0);
    assert_eq!(report.total_removed, 2);
    assert!(PathBuf::from(&report.output_path).exists());
}
