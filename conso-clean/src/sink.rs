//! Partitioned Parquet output of the hourly aggregate.

use crate::prelude::*;
use arrow::datatypes::DataType;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Partition columns of the hourly output, outermost first.
pub const HOURLY_PARTITIONS: [&str; 2] = ["date", "type_energie"];

/// Directory value used for a null partition key.
pub const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// What a write produced.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Absolute output directory
    pub location: PathBuf,
    /// Time spent writing
    pub elapsed: Duration,
}

/// Writes `frame` as Parquet under `dir`, one sub-directory per partition
/// value (`date=2024-01-05/type_energie=elec/`).
///
/// Anything already at `dir` is removed first. Partition columns are
/// written as text and are not repeated inside the data files.
#[instrument(skip(frame, partition_by), fields(sink.partitions = ?partition_by))]
pub async fn write_partitioned(
    frame: DataFrame,
    dir: &Path,
    partition_by: &[&str],
) -> Result<WriteSummary> {
    let mut frame = frame;
    for column in partition_by {
        frame = frame.with_column(
            column,
            coalesce(vec![
                cast(ident(*column), DataType::Utf8),
                lit(NULL_PARTITION),
            ]),
        )?;
    }

    if tokio::fs::try_exists(dir).await? {
        info!(sink.path = %dir.display(), "Removing previous output");
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await?;
    let location = tokio::fs::canonicalize(dir).await?;
    let target = location
        .to_str()
        .map(|path| format!("{path}/"))
        .ok_or_else(|| {
            CleanError::Configuration(format!(
                "output path is not valid UTF-8: {}",
                location.display()
            ))
        })?;

    let options = DataFrameWriteOptions::new().with_partition_by(
        partition_by.iter().map(|column| column.to_string()).collect(),
    );
    let started = Instant::now();
    frame.write_parquet(&target, options, None).await?;
    let elapsed = started.elapsed();

    info!(
        sink.path = %location.display(),
        sink.elapsed_ms = elapsed.as_millis() as u64,
        "[ok]: partitioned Parquet written"
    );
    Ok(WriteSummary { location, elapsed })
}

/// Reads a directory written by [`write_partitioned`] with text partition
/// columns restored.
pub async fn read_partitioned(
    ctx: &SessionContext,
    dir: &Path,
    partition_by: &[&str],
) -> Result<DataFrame> {
    let path = dir.to_str().ok_or_else(|| {
        CleanError::Configuration(format!("path is not valid UTF-8: {}", dir.display()))
    })?;
    let options = ParquetReadOptions::default().table_partition_cols(
        partition_by
            .iter()
            .map(|column| (column.to_string(), DataType::Utf8))
            .collect(),
    );
    Ok(ctx.read_parquet(path, options).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hourly_frame(ctx: &SessionContext) -> DataFrame {
        ctx.sql(
            "SELECT column1 AS batiment_id, CAST(column2 AS DATE) AS date, \
                    column3 AS heure, column4 AS type_energie, \
                    column5 AS consommation_moyenne, 'kWh' AS unite \
             FROM (VALUES \
                ('B1', '2024-01-05', 10, 'elec', 12.5), \
                ('B1', '2024-01-05', 11, 'gaz', 3.0), \
                ('B2', '2024-01-06', 10, 'elec', 7.25))",
        )
        .await
        .unwrap()
    }

    fn partition_dirs(root: &Path) -> Vec<String> {
        let mut dirs = Vec::new();
        for date in std::fs::read_dir(root).unwrap() {
            let date = date.unwrap();
            for kind in std::fs::read_dir(date.path()).unwrap() {
                let kind = kind.unwrap();
                dirs.push(format!(
                    "{}/{}",
                    date.file_name().to_string_lossy(),
                    kind.file_name().to_string_lossy()
                ));
            }
        }
        dirs.sort();
        dirs
    }

    #[tokio::test]
    async fn test_writes_one_directory_per_partition() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hourly");
        let ctx = SessionContext::new();

        let summary = write_partitioned(hourly_frame(&ctx).await, &out, &HOURLY_PARTITIONS)
            .await
            .unwrap();
        assert!(summary.location.is_absolute());
        assert_eq!(
            partition_dirs(&out),
            vec![
                "date=2024-01-05/type_energie=elec",
                "date=2024-01-05/type_energie=gaz",
                "date=2024-01-06/type_energie=elec",
            ]
        );

        let back = read_partitioned(&ctx, &out, &HOURLY_PARTITIONS).await.unwrap();
        assert_eq!(back.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_overwrites_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hourly");
        std::fs::create_dir_all(out.join("date=1999-01-01")).unwrap();
        std::fs::write(out.join("stale.txt"), "old").unwrap();
        let ctx = SessionContext::new();

        write_partitioned(hourly_frame(&ctx).await, &out, &HOURLY_PARTITIONS)
            .await
            .unwrap();
        assert!(!out.join("stale.txt").exists());
        assert!(!out.join("date=1999-01-01").exists());
        assert_eq!(partition_dirs(&out).len(), 3);
    }
}
