//! Multi-format timestamp parsing.

use chrono::NaiveDateTime;
use datafusion::arrow::array::TimestampMicrosecondArray;
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::common::cast::as_string_array;
use datafusion::common::exec_err;
use datafusion::logical_expr::{
    ColumnarValue, ScalarFunctionArgs, ScalarUDFImpl, Signature, Volatility,
};
use std::any::Any;
use std::sync::Arc;

/// Name under which the timestamp parser is registered.
pub const PARSE_TIMESTAMP_UDF: &str = "parse_multi_format_timestamp";

/// Accepted layouts, tried in order. The first match wins.
///
/// French day-first layouts come before US month-first ones, so a value such
/// as `05/01/2024 10:00` is read as 5 January. A US value is only recognized
/// when its day is above 12.
pub const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parses a naive timestamp written in one of [`TIMESTAMP_FORMATS`].
///
/// Surrounding whitespace is ignored. The year must be written with exactly
/// four digits. Returns `None` for null, empty or unrecognized input.
///
/// ```rust
/// use conso_clean::udf::parse_multi_format_timestamp;
///
/// let iso = parse_multi_format_timestamp(Some("2024-01-05 10:00:00"));
/// let fr = parse_multi_format_timestamp(Some(" 05/01/2024 10:00 "));
/// assert!(iso.is_some());
/// assert_eq!(iso, fr);
/// assert_eq!(parse_multi_format_timestamp(Some("yesterday")), None);
/// assert_eq!(parse_multi_format_timestamp(Some("05/01/24 10:00")), None);
/// ```
pub fn parse_multi_format_timestamp(value: Option<&str>) -> Option<NaiveDateTime> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    TIMESTAMP_FORMATS.iter().find_map(|format| {
        if !has_four_digit_year(text, format) {
            return None;
        }
        NaiveDateTime::parse_from_str(text, format).ok()
    })
}

/// chrono's `%Y` also takes one to three digits, so the year field is
/// checked before parsing.
fn has_four_digit_year(text: &str, format: &str) -> bool {
    let year = if format.starts_with("%Y") {
        text.split('-').next()
    } else {
        text.split(' ')
            .next()
            .and_then(|date| date.rsplit('/').next())
    };
    year.is_some_and(|y| y.len() == 4 && y.bytes().all(|b| b.is_ascii_digit()))
}

/// `parse_multi_format_timestamp(Utf8) -> Timestamp(Microsecond, None)`
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ParseTimestampUdf {
    signature: Signature,
}

impl ParseTimestampUdf {
    pub fn new() -> Self {
        Self {
            signature: Signature::exact(vec![DataType::Utf8], Volatility::Immutable),
        }
    }
}

impl Default for ParseTimestampUdf {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarUDFImpl for ParseTimestampUdf {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        PARSE_TIMESTAMP_UDF
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn return_type(&self, _arg_types: &[DataType]) -> datafusion::error::Result<DataType> {
        Ok(DataType::Timestamp(TimeUnit::Microsecond, None))
    }

    fn invoke_with_args(
        &self,
        args: ScalarFunctionArgs,
    ) -> datafusion::error::Result<ColumnarValue> {
        let Some(input) = args.args.first() else {
            return exec_err!("{PARSE_TIMESTAMP_UDF} expects exactly one argument");
        };
        let array = input.to_array(args.number_rows)?;
        let text = as_string_array(&array)?;

        let parsed: TimestampMicrosecondArray = text
            .iter()
            .map(|value| {
                parse_multi_format_timestamp(value).map(|ts| ts.and_utc().timestamp_micros())
            })
            .collect();

        Ok(ColumnarValue::Array(Arc::new(parsed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_each_supported_layout() {
        let cases = [
            ("2024-01-05 10:00:00", at(2024, 1, 5, 10, 0, 0)),
            ("05/01/2024 10:00:30", at(2024, 1, 5, 10, 0, 30)),
            ("05/01/2024 10:00", at(2024, 1, 5, 10, 0, 0)),
            ("12/25/2024 08:15:00", at(2024, 12, 25, 8, 15, 0)),
            ("12/25/2024 08:15", at(2024, 12, 25, 8, 15, 0)),
            ("2024-01-05T10:00:00", at(2024, 1, 5, 10, 0, 0)),
        ];
        for (text, expected) in cases {
            assert_eq!(
                parse_multi_format_timestamp(Some(text)),
                Some(expected),
                "{text}"
            );
        }
    }

    #[test]
    fn test_day_first_wins_when_ambiguous() {
        // 03/04 could be 3 April or 4 March; list order picks French.
        let parsed = parse_multi_format_timestamp(Some("03/04/2024 09:30")).unwrap();
        assert_eq!(parsed, at(2024, 4, 3, 9, 30, 0));
    }

    #[test]
    fn test_us_layout_only_when_day_exceeds_twelve() {
        let parsed = parse_multi_format_timestamp(Some("01/31/2024 23:59:59")).unwrap();
        assert_eq!(parsed, at(2024, 1, 31, 23, 59, 59));
        assert_eq!(parsed.hour(), 23);
    }

    #[test]
    fn test_whitespace_is_stripped() {
        assert_eq!(
            parse_multi_format_timestamp(Some("\t2024-01-05 10:00:00  ")),
            Some(at(2024, 1, 5, 10, 0, 0))
        );
    }

    #[test]
    fn test_rejects_null_empty_and_garbage() {
        assert_eq!(parse_multi_format_timestamp(None), None);
        assert_eq!(parse_multi_format_timestamp(Some("")), None);
        assert_eq!(parse_multi_format_timestamp(Some("   ")), None);
        assert_eq!(parse_multi_format_timestamp(Some("not a date")), None);
        assert_eq!(parse_multi_format_timestamp(Some("2024-01-05")), None);
        assert_eq!(parse_multi_format_timestamp(Some("2024/01/05 10:00")), None);
        // Month and day both out of range for either convention
        assert_eq!(parse_multi_format_timestamp(Some("31/31/2024 10:00")), None);
        assert_eq!(parse_multi_format_timestamp(Some("2024-02-30 10:00:00")), None);
        assert_eq!(parse_multi_format_timestamp(Some("2024-01-05 25:00:00")), None);
    }

    #[test]
    fn test_year_needs_four_digits() {
        for text in [
            "05/01/24 10:00",
            "5/1/202 10:00",
            "01/31/99 23:59:59",
            "24-01-05 10:00:00",
            "202-01-05T10:00:00",
            "+2024-01-05 10:00:00",
            "05/01/02024 10:00",
        ] {
            assert_eq!(parse_multi_format_timestamp(Some(text)), None, "{text}");
        }
        // Day, month and hour may still drop their leading zero.
        assert_eq!(
            parse_multi_format_timestamp(Some("5/1/2024 9:05")),
            Some(at(2024, 1, 5, 9, 5, 0))
        );
    }
}
