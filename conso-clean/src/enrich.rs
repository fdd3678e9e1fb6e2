//! Calendar fields derived from `timestamp_parsed`.

use crate::prelude::*;
use crate::validation::TIMESTAMP_PARSED;
use arrow::datatypes::DataType;
use datafusion::prelude::*;

/// Calendar date of the reading.
pub const DATE: &str = "date";
/// Hour of day, 0 to 23.
pub const HEURE: &str = "heure";
/// Calendar year.
pub const ANNEE: &str = "annee";
/// Month, 1 to 12.
pub const MOIS: &str = "mois";

fn component(part: &str) -> Expr {
    cast(
        date_part(lit(part), col(TIMESTAMP_PARSED)),
        DataType::Int32,
    )
}

/// Adds `date`, `heure`, `annee` and `mois`. Rows are neither added nor removed.
pub fn with_calendar_fields(frame: DataFrame) -> Result<DataFrame> {
    Ok(frame
        .with_column(DATE, cast(col(TIMESTAMP_PARSED), DataType::Date32))?
        .with_column(HEURE, component("hour"))?
        .with_column(ANNEE, component("year"))?
        .with_column(MOIS, component("month"))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, Int32Array};

    #[tokio::test]
    async fn test_calendar_fields() {
        let ctx = SessionContext::new();
        let df = ctx
            .sql(
                "SELECT CAST(column1 AS TIMESTAMP) AS timestamp_parsed \
                 FROM (VALUES ('2024-01-05 00:30:00'), ('2023-12-31 23:59:59'))",
            )
            .await
            .unwrap();

        let enriched = with_calendar_fields(df).unwrap();
        let batches = enriched
            .sort(vec![col(TIMESTAMP_PARSED).sort(true, false)])
            .unwrap()
            .select(vec![col(DATE), col(HEURE), col(ANNEE), col(MOIS)])
            .unwrap()
            .collect()
            .await
            .unwrap();
        let batch = arrow::compute::concat_batches(&batches[0].schema(), &batches).unwrap();

        let date = batch.column(0).as_any().downcast_ref::<Date32Array>().unwrap();
        let heure = batch.column(1).as_any().downcast_ref::<Int32Array>().unwrap();
        let annee = batch.column(2).as_any().downcast_ref::<Int32Array>().unwrap();
        let mois = batch.column(3).as_any().downcast_ref::<Int32Array>().unwrap();

        assert_eq!(
            date.value_as_date(0),
            chrono::NaiveDate::from_ymd_opt(2023, 12, 31)
        );
        assert_eq!(heure.iter().flatten().collect::<Vec<_>>(), vec![23, 0]);
        assert_eq!(annee.iter().flatten().collect::<Vec<_>>(), vec![2023, 2024]);
        assert_eq!(mois.iter().flatten().collect::<Vec<_>>(), vec![12, 1]);
    }
}
