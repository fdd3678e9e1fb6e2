//! Row-level normalizers registered with the DataFusion session.
//!
//! Each normalizer is a pure function over one optional text value plus a
//! [`ScalarUDFImpl`](datafusion::logical_expr::ScalarUDFImpl) that maps it over
//! an Arrow string array. Parse failures become nulls; they never raise.

pub mod numeric;
pub mod timestamp;

pub use numeric::{clean_consommation, CleanConsommationUdf, CLEAN_CONSOMMATION_UDF};
pub use timestamp::{
    parse_multi_format_timestamp, ParseTimestampUdf, PARSE_TIMESTAMP_UDF, TIMESTAMP_FORMATS,
};

use datafusion::logical_expr::ScalarUDF;

/// Returns both normalizers ready for registration.
pub fn all() -> Vec<ScalarUDF> {
    vec![
        ScalarUDF::from(ParseTimestampUdf::new()),
        ScalarUDF::from(CleanConsommationUdf::new()),
    ]
}
