//! Shared column helpers used by rules, stages and the quality reporter.
//!
//! Everything here reads a `DataFrame` and returns plain vectors so rule
//! evaluation stays independent of how the stages apply the result.

use crate::error::{CleaningError, Result};
use polars::prelude::*;

const ROW_INDEX: &str = "__row_index";

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is a float type, where NaN also marks a missing value.
#[inline]
fn is_float_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

// =============================================================================
// Column Access
// =============================================================================

/// Get a column as a series, or report which stage needed it.
pub fn require_column<'a>(df: &'a DataFrame, stage: &str, column: &str) -> Result<&'a Series> {
    df.column(column)
        .map(|c| c.as_materialized_series())
        .map_err(|_| CleaningError::SchemaMismatch {
            stage: stage.to_string(),
            column: column.to_string(),
        })
}

/// Per-row missing flags for one series.
///
/// Nulls are missing everywhere. Text cells that are blank after trimming and
/// NaN floats are missing too.
pub fn missing_mask(series: &Series) -> Result<Vec<bool>> {
    let dtype = series.dtype();

    if dtype == &DataType::String {
        return Ok(series
            .str()?
            .into_iter()
            .map(|value| value.is_none_or(|v| v.trim().is_empty()))
            .collect());
    }

    if is_float_dtype(dtype) {
        let values = series.cast(&DataType::Float64)?;
        return Ok(values
            .f64()?
            .into_iter()
            .map(|value| value.is_none_or(f64::is_nan))
            .collect());
    }

    Ok(series
        .is_null()
        .into_iter()
        .map(|flag| flag.unwrap_or(false))
        .collect())
}

/// Read a column as reals. Values that do not parse as numbers become `None`.
pub fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    let as_float = series.cast(&DataType::Float64)?;
    Ok(as_float
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect())
}

/// Read a column as optional text, casting non-text columns first.
pub fn text_values(series: &Series) -> Result<Vec<Option<String>>> {
    let as_text = if series.dtype() == &DataType::String {
        series.clone()
    } else {
        series.cast(&DataType::String)?
    };
    Ok(as_text
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Per-row duplicate flags: `true` for every record that repeats an earlier
/// one across all columns. Nulls compare equal to nulls.
pub fn duplicate_mask(df: &DataFrame) -> Result<Vec<bool>> {
    let columns: Vec<String> = df
        .get_column_names_owned()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let indexed = df.with_row_index(ROW_INDEX.into(), None)?;
    let first_seen = indexed.unique_stable(Some(&columns), UniqueKeepStrategy::First, None)?;

    let mut duplicate = vec![true; df.height()];
    for idx in first_seen
        .column(ROW_INDEX)?
        .as_materialized_series()
        .idx()?
        .into_no_null_iter()
    {
        duplicate[idx as usize] = false;
    }
    Ok(duplicate)
}

/// Keep the rows flagged `true`, preserving order.
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::new("keep".into(), keep);
    Ok(df.filter(&mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_float_dtype() {
        assert!(is_float_dtype(&DataType::Float32));
        assert!(!is_float_dtype(&DataType::Int64));
    }

    #[test]
    fn test_missing_mask_treats_blank_text_as_missing() {
        let series = Series::new("id".into(), &[Some("P001"), Some("  "), None]);
        assert_eq!(missing_mask(&series).unwrap(), vec![false, true, true]);
    }

    #[test]
    fn test_missing_mask_numeric() {
        let series = Series::new("age".into(), &[Some(1.0), Some(f64::NAN), None]);
        assert_eq!(missing_mask(&series).unwrap(), vec![false, true, true]);

        let ints = Series::new("n".into(), &[Some(1i64), None]);
        assert_eq!(missing_mask(&ints).unwrap(), vec![false, true]);
    }

    #[test]
    fn test_numeric_values_from_text() {
        let series = Series::new("age".into(), &[Some("45"), Some("abc"), None]);
        assert_eq!(
            numeric_values(&series).unwrap(),
            vec![Some(45.0), None, None]
        );
    }

    #[test]
    fn test_duplicate_mask_flags_repeats_after_first() {
        let df = df!(
            "id" => [Some("P1"), Some("P1"), Some("P1"), None, None],
            "age" => [Some(10i64), Some(10), Some(11), None, None]
        )
        .unwrap();
        assert_eq!(
            duplicate_mask(&df).unwrap(),
            vec![false, true, false, false, true]
        );
    }

    #[test]
    fn test_filter_rows_preserves_order() {
        let df = df!("n" => [1i64, 2, 3, 4]).unwrap();
        let filtered = filter_rows(&df, &[true, false, true, true]).unwrap();
        let values: Vec<Option<i64>> = filtered
            .column("n")
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(1), Some(3), Some(4)]);
    }

    #[test]
    fn test_require_column_reports_stage() {
        let df = df!("n" => [1i64]).unwrap();
        let err = require_column(&df, "RangeFilter", "Age").unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(err.to_string().contains("RangeFilter"));
    }
}
