use crate::error::Result;
use crate::pipeline::{AuditLog, PipelineState};
use crate::stages::{MissingValueReport, names};
use crate::types::{IssueKind, QualityMetrics};
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Computes [`QualityMetrics`] for a finished cleaning phase.
pub struct QualityReporter;

impl QualityReporter {
    /// Summarize the cleaned dataset together with the audit log that
    /// produced it.
    ///
    /// Removal counts are summed over the `Cleaned` phase entries. Entries
    /// from the read-only validation checks are ignored, so running a check
    /// twice never inflates a count.
    pub fn compute(df: &DataFrame, audit: &AuditLog) -> Result<QualityMetrics> {
        let missing = MissingValueReport::compute(df)?;

        let affected_by = |stage: &str| -> usize {
            audit
                .find(PipelineState::Cleaned, stage)
                .filter(|entry| entry.kind != IssueKind::UnexpectedCategory)
                .map(|entry| entry.records_affected)
                .sum()
        };

        let mut out_of_range_count_by_field = BTreeMap::new();
        for entry in audit.find(PipelineState::Cleaned, names::RANGE_FILTER) {
            let field = entry.field.clone().unwrap_or_else(|| entry.rule_id.clone());
            *out_of_range_count_by_field.entry(field).or_insert(0) += entry.records_affected;
        }

        let unexpected_category_count = audit
            .in_phase(PipelineState::Cleaned)
            .filter(|entry| entry.kind == IssueKind::UnexpectedCategory)
            .map(|entry| entry.records_affected)
            .sum();

        let metrics = QualityMetrics {
            total_records: df.height(),
            total_variables: df.width(),
            missing_cells: missing.missing_cells,
            completeness_pct: missing.completeness_pct(),
            duplicate_count: affected_by(names::DEDUPLICATE),
            missing_key_count: affected_by(names::REQUIRE_KEY),
            out_of_range_count_by_field,
            unexpected_category_count,
            values_standardized: affected_by(names::CATEGORICAL_STANDARDIZE),
            missing_by_column: missing.columns,
        };

        debug!(
            "Quality metrics: {} records, {:.2}% complete, {} removed",
            metrics.total_records,
            metrics.completeness_pct,
            metrics.records_removed()
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Severity, StageResult};
    use pretty_assertions::assert_eq;

    fn cleaned() -> DataFrame {
        df!(
            "PatientID" => ["P001", "P002", "P003", "P004"],
            "Age" => [Some(45i64), None, Some(30), Some(71)],
            "Sex" => ["Male", "Female", "Female", "Male"]
        )
        .unwrap()
    }

    fn audit() -> AuditLog {
        let mut log = AuditLog::new("quality-test");
        // Read-only checks must not be counted
        log.record(
            PipelineState::Validated,
            StageResult::new("DuplicateCheck", "no_duplicates", 7, 7).with_affected(1),
        );
        log.record(
            PipelineState::Cleaned,
            StageResult::new(names::DEDUPLICATE, "no_duplicates", 7, 6),
        );
        log.record(
            PipelineState::Cleaned,
            StageResult::new(names::REQUIRE_KEY, "key_present:PatientID", 6, 5)
                .with_field("PatientID"),
        );
        log.record(
            PipelineState::Cleaned,
            StageResult::new(names::RANGE_FILTER, "range:Age:0..=120", 5, 4).with_field("Age"),
        );
        log.record(
            PipelineState::Cleaned,
            StageResult::new(names::CATEGORICAL_STANDARDIZE, "category:Sex", 4, 4)
                .with_affected(3)
                .with_field("Sex"),
        );
        log.record(
            PipelineState::Cleaned,
            StageResult::new(names::CATEGORICAL_STANDARDIZE, "category:Sex", 4, 4)
                .with_kind(IssueKind::UnexpectedCategory)
                .with_severity(Severity::Informational)
                .with_affected(1)
                .with_field("Sex"),
        );
        log
    }

    #[test]
    fn test_completeness_four_by_three_one_missing() {
        let metrics = QualityReporter::compute(&cleaned(), &AuditLog::new("d")).unwrap();
        assert_eq!(metrics.total_records, 4);
        assert_eq!(metrics.total_variables, 3);
        assert_eq!(metrics.missing_cells, 1);
        assert_eq!(metrics.completeness_pct, 91.67);
    }

    #[test]
    fn test_counts_come_from_cleaning_entries() {
        let metrics = QualityReporter::compute(&cleaned(), &audit()).unwrap();

        assert_eq!(metrics.duplicate_count, 1);
        assert_eq!(metrics.missing_key_count, 1);
        assert_eq!(metrics.out_of_range_count_by_field.get("Age"), Some(&1));
        assert_eq!(metrics.values_standardized, 3);
        assert_eq!(metrics.unexpected_category_count, 1);
        assert_eq!(metrics.records_removed(), 3);
    }

    #[test]
    fn test_multiple_range_fields() {
        let mut log = AuditLog::new("ranges");
        log.record(
            PipelineState::Cleaned,
            StageResult::new(names::RANGE_FILTER, "range:Age:0..=120", 10, 8).with_field("Age"),
        );
        log.record(
            PipelineState::Cleaned,
            StageResult::new(names::RANGE_FILTER, "range:Hemoglobin:5..=20", 8, 5)
                .with_field("Hemoglobin"),
        );
        let metrics = QualityReporter::compute(&cleaned(), &log).unwrap();

        let expected: BTreeMap<String, usize> =
            [("Age".to_string(), 2), ("Hemoglobin".to_string(), 3)].into();
        assert_eq!(metrics.out_of_range_count_by_field, expected);
    }

    #[test]
    fn test_empty_dataset_scores_zero() {
        let df = df!("Age" => Vec::<i64>::new()).unwrap();
        let metrics = QualityReporter::compute(&df, &AuditLog::new("e")).unwrap();
        assert_eq!(metrics.completeness_pct, 0.0);
        assert_eq!(metrics.total_records, 0);
    }
}
