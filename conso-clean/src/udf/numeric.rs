//! Locale-tolerant consumption parsing.

use datafusion::arrow::array::Float64Array;
use datafusion::arrow::datatypes::DataType;
use datafusion::common::cast::as_string_array;
use datafusion::common::exec_err;
use datafusion::logical_expr::{
    ColumnarValue, ScalarFunctionArgs, ScalarUDFImpl, Signature, Volatility,
};
use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;

/// Name under which the consumption normalizer is registered.
pub const CLEAN_CONSOMMATION_UDF: &str = "clean_consommation";

/// Parses a consumption value written with either `,` or `.` as decimal
/// separator.
///
/// Returns `None` for null input and for text that is not a number after
/// the separator swap. `NaN` and infinities parse; validation orders `NaN`
/// above every number, so it is rejected as an outlier. Negative zero and
/// negative `NaN` are returned without their sign.
///
/// ```rust
/// use conso_clean::udf::clean_consommation;
///
/// assert_eq!(clean_consommation(Some("12,5")), Some(12.5));
/// assert_eq!(clean_consommation(Some("12.5")), Some(12.5));
/// assert_eq!(clean_consommation(Some("abc")), None);
/// ```
pub fn clean_consommation(value: Option<&str>) -> Option<f64> {
    let text = value?.trim();
    // Only allocate when there is a separator to swap.
    let normalized: Cow<'_, str> = if text.contains(',') {
        Cow::Owned(text.replace(',', "."))
    } else {
        Cow::Borrowed(text)
    };
    normalized.parse::<f64>().ok().map(|parsed| {
        if parsed.is_nan() {
            f64::NAN
        } else {
            // -0.0 + 0.0 == +0.0
            parsed + 0.0
        }
    })
}

/// `clean_consommation(Utf8) -> Float64`
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CleanConsommationUdf {
    signature: Signature,
}

impl CleanConsommationUdf {
    pub fn new() -> Self {
        Self {
            signature: Signature::exact(vec![DataType::Utf8], Volatility::Immutable),
        }
    }
}

impl Default for CleanConsommationUdf {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarUDFImpl for CleanConsommationUdf {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        CLEAN_CONSOMMATION_UDF
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn return_type(&self, _arg_types: &[DataType]) -> datafusion::error::Result<DataType> {
        Ok(DataType::Float64)
    }

    fn invoke_with_args(
        &self,
        args: ScalarFunctionArgs,
    ) -> datafusion::error::Result<ColumnarValue> {
        let Some(input) = args.args.first() else {
            return exec_err!("{CLEAN_CONSOMMATION_UDF} expects exactly one argument");
        };
        let array = input.to_array(args.number_rows)?;
        let text = as_string_array(&array)?;

        let cleaned: Float64Array = text.iter().map(clean_consommation).collect();

        Ok(ColumnarValue::Array(Arc::new(cleaned)))
    }
}
