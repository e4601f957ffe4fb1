use super::{Stage, StageOutput, names};
use crate::error::Result;
use crate::rules::ValidationRule;
use crate::types::{ColumnMissing, IssueKind, Severity, StageResult};
use crate::utils::missing_mask;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Missing-value counts for a whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingSummary {
    /// Columns in schema order.
    pub columns: Vec<ColumnMissing>,
    pub rows_with_missing: usize,
    pub missing_cells: usize,
    pub total_cells: usize,
}

impl MissingSummary {
    /// Percentage of cells holding a value. An empty dataset scores 0.
    pub fn completeness_pct(&self) -> f64 {
        if self.total_cells == 0 {
            return 0.0;
        }
        let present = self.total_cells - self.missing_cells;
        round2(present as f64 / self.total_cells as f64 * 100.0)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Counts missing values per column without removing anything.
#[derive(Debug, Clone)]
pub struct MissingValueReport {
    rule: ValidationRule,
}

impl Default for MissingValueReport {
    fn default() -> Self {
        Self::new()
    }
}

impl MissingValueReport {
    pub fn new() -> Self {
        Self {
            rule: ValidationRule::complete(),
        }
    }

    /// Measure missing values per column and per row.
    pub fn compute(df: &DataFrame) -> Result<MissingSummary> {
        let height = df.height();
        let mut row_flags = vec![false; height];
        let mut columns = Vec::with_capacity(df.width());
        let mut missing_cells = 0;

        for column in df.get_columns() {
            let mask = missing_mask(column.as_materialized_series())?;
            let mut missing_count = 0;
            for (row, missing) in row_flags.iter_mut().zip(mask) {
                if missing {
                    missing_count += 1;
                    *row = true;
                }
            }
            missing_cells += missing_count;

            let missing_percentage = if height > 0 {
                round2(missing_count as f64 / height as f64 * 100.0)
            } else {
                0.0
            };
            columns.push(ColumnMissing {
                column: column.name().to_string(),
                missing_count,
                missing_percentage,
            });
        }

        Ok(MissingSummary {
            columns,
            rows_with_missing: row_flags.into_iter().filter(|m| *m).count(),
            missing_cells,
            total_cells: height * df.width(),
        })
    }
}

impl Stage for MissingValueReport {
    fn name(&self) -> &str {
        names::MISSING_VALUE_REPORT
    }

    fn rule(&self) -> &ValidationRule {
        &self.rule
    }

    fn apply(&self, df: &DataFrame) -> Result<StageOutput> {
        let summary = Self::compute(df)?;
        let height = df.height();

        debug!(
            "{} missing cells across {} records",
            summary.missing_cells, summary.rows_with_missing
        );

        let per_column: serde_json::Map<String, serde_json::Value> = summary
            .columns
            .iter()
            .map(|c| (c.column.clone(), json!(c.missing_count)))
            .collect();

        let result = StageResult::new(self.name(), &self.rule.id, height, height)
            .with_affected(summary.rows_with_missing)
            .with_severity(Severity::Informational)
            .with_kind(IssueKind::Diagnostic)
            .with_message(format!(
                "{} missing cells in {} records",
                summary.missing_cells, summary.rows_with_missing
            ))
            .with_detail("missing_cells", json!(summary.missing_cells))
            .with_detail("missing_by_column", serde_json::Value::Object(per_column));

        Ok(StageOutput::new(df.clone(), result))
    }
}
