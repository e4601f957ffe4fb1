//! CSV import.

use crate::error::{CleaningError, Result, ResultExt};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

/// Read a CSV file with a header row into a dataset.
///
/// Cells equal to one of `null_values` are read as missing. Fails with
/// `InputNotFound` before touching the file when it does not exist.
pub fn load_csv(path: impl AsRef<Path>, null_values: &[String]) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CleaningError::InputNotFound(path.to_path_buf()));
    }

    let null_values = (!null_values.is_empty()).then(|| {
        NullValues::AllColumns(null_values.iter().map(|v| v.as_str().into()).collect())
    });

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .with_parse_options(
            CsvParseOptions::default()
                .with_quote_char(Some(b'"'))
                .with_null_values(null_values),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .context(format!("Failed to parse {}", path.display()))?;

    info!(
        "Imported {}: {} records, {} variables",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}
