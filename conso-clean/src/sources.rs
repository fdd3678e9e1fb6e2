//! Loading the two CSV inputs.
//!
//! Both files carry a header row; column types are inferred by DataFusion.
//! The identifying and free-text columns are then cast to text so the
//! normalizers always see strings, whatever inference decided.

use crate::config::StageConfig;
use crate::context::CleaningContext;
use crate::logging::truncate_field;
use crate::prelude::*;
use arrow::datatypes::{DataType, Schema};
use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::prelude::*;
use std::fmt::Write;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Columns the raw consumption file must provide.
pub const RAW_COLUMNS: [&str; 5] = [
    "batiment_id",
    "timestamp",
    "consommation",
    "type_energie",
    "unite",
];

/// Columns the building dimension must provide.
pub const BUILDING_COLUMNS: [&str; 2] = ["batiment_id", "commune"];

/// Options for configuring CSV file reading.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Whether the CSV file has a header row
    pub has_header: bool,
    /// Field delimiter (default: ',')
    pub delimiter: u8,
    /// Maximum records to read for schema inference
    pub schema_infer_max_records: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            schema_infer_max_records: 1000,
        }
    }
}

impl CsvOptions {
    fn from_config(config: &StageConfig) -> Self {
        Self {
            schema_infer_max_records: config.schema_infer_max_records,
            ..Default::default()
        }
    }
}

/// Reads a CSV file, checks `required` columns exist and casts them to text.
#[instrument(skip(ctx, options, required), fields(source.type = "csv"))]
pub async fn load_csv(
    ctx: &CleaningContext,
    table: &str,
    path: &Path,
    options: &CsvOptions,
    required: &[&str],
) -> Result<DataFrame> {
    if let Err(e) = tokio::fs::metadata(path).await {
        return Err(CleanError::data_source_with_source(
            "CSV",
            format!("cannot open {}", path.display()),
            Box::new(e),
        ));
    }
    let path_str = path.to_str().ok_or_else(|| {
        CleanError::Configuration(format!("path is not valid UTF-8: {}", path.display()))
    })?;

    // DataFusion filters listed files by extension; match the actual one.
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let read_options = CsvReadOptions::new()
        .has_header(options.has_header)
        .delimiter(options.delimiter)
        .schema_infer_max_records(options.schema_infer_max_records)
        .file_extension(&extension);

    let mut frame = ctx
        .inner()
        .read_csv(path_str, read_options)
        .await
        .map_err(|e| {
            CleanError::data_source_with_source(
                "CSV",
                format!("failed to read {}", path.display()),
                Box::new(e),
            )
        })?;

    for column in required {
        if !has_column(&frame, column) {
            return Err(CleanError::column_not_found(table, *column));
        }
        frame = frame.with_column(column, cast(ident(*column), DataType::Utf8))?;
    }

    info!(
        table.name = %table,
        source.path = %path.display(),
        table.columns = frame.schema().fields().len(),
        "Loaded CSV source"
    );
    Ok(frame)
}

/// Loads the raw consumption events.
pub async fn load_raw_consumption(ctx: &CleaningContext, config: &StageConfig) -> Result<DataFrame> {
    load_csv(
        ctx,
        "consommations_raw",
        &config.raw_consumption_path,
        &CsvOptions::from_config(config),
        &RAW_COLUMNS,
    )
    .await
}

/// Loads the building dimension.
pub async fn load_buildings(ctx: &CleaningContext, config: &StageConfig) -> Result<DataFrame> {
    load_csv(
        ctx,
        "batiments",
        &config.buildings_path,
        &CsvOptions::from_config(config),
        &BUILDING_COLUMNS,
    )
    .await
}

fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.schema().fields().iter().any(|f| f.name() == name)
}

/// Renders a schema as an indented tree, one line per field.
///
/// ```rust
/// use arrow::datatypes::{DataType, Field, Schema};
/// use conso_clean::sources::describe_schema;
///
/// let schema = Schema::new(vec![Field::new("batiment_id", DataType::Utf8, true)]);
/// assert_eq!(
///     describe_schema(&schema),
///     "root\n |-- batiment_id: Utf8 (nullable = true)\n"
/// );
/// ```
pub fn describe_schema(schema: &Schema) -> String {
    let mut out = String::from("root\n");
    for field in schema.fields() {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            " |-- {}: {} (nullable = {})",
            field.name(),
            field.data_type(),
            field.is_nullable()
        );
    }
    out
}

/// Renders the first `rows` rows of `frame` as a text table.
pub async fn preview(frame: &DataFrame, rows: usize) -> Result<String> {
    let batches = frame.clone().limit(0, Some(rows))?.collect().await?;
    Ok(pretty_format_batches(&batches)?.to_string())
}

/// Logs row/column counts, the schema tree and a preview of `frame`.
///
/// Counting forces a full evaluation of the relation.
pub async fn log_relation(label: &str, frame: &DataFrame, preview_rows: usize) -> Result<usize> {
    let rows = frame.clone().count().await?;
    let schema = describe_schema(frame.schema().as_arrow());
    info!(
        relation = %label,
        relation.rows = rows,
        relation.columns = frame.schema().fields().len(),
        "Relation summary"
    );
    debug!(relation = %label, "Schema:\n{schema}");
    if preview_rows > 0 {
        let table = preview(frame, preview_rows).await?;
        debug!(relation = %label, "Preview:\n{}", truncate_field(&table, 4096));
    }
    Ok(rows)
}
