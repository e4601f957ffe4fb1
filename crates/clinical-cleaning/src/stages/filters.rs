use super::{Stage, StageOutput, names};
use crate::error::{CleaningError, Result};
use crate::rules::{RangeRule, ValidationRule};
use crate::types::{IssueKind, Severity, StageResult};
use crate::utils::filter_rows;
use polars::prelude::*;
use serde_json::json;
use tracing::{debug, warn};

/// Drop every row the rule flags and describe the effect.
fn drop_violations(
    stage: &str,
    rule: &ValidationRule,
    df: &DataFrame,
) -> Result<(DataFrame, StageResult)> {
    let before = df.height();
    let keep: Vec<bool> = rule
        .violations(df, stage)?
        .into_iter()
        .map(|violates| !violates)
        .collect();
    let data = filter_rows(df, &keep)?;
    let mut result = StageResult::new(stage, &rule.id, before, data.height())
        .with_severity(rule.severity);
    if let Some(field) = rule.field() {
        result = result.with_field(field);
    }
    Ok((data, result))
}

/// Removes records whose key field is missing or blank.
///
/// Fails the run when no record keeps a key.
#[derive(Debug, Clone)]
pub struct RequireKey {
    field: String,
    rule: ValidationRule,
}

impl RequireKey {
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            rule: ValidationRule::key_present(&field),
            field,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Stage for RequireKey {
    fn name(&self) -> &str {
        names::REQUIRE_KEY
    }

    fn rule(&self) -> &ValidationRule {
        &self.rule
    }

    fn apply(&self, df: &DataFrame) -> Result<StageOutput> {
        let (data, result) = drop_violations(self.name(), &self.rule, df)?;
        let removed = result.records_affected;

        if data.height() == 0 {
            let reason = format!(
                "no records with a '{}' value remain ({} removed)",
                self.field, removed
            );
            warn!("{}: {}", self.name(), reason);
            let result = result
                .with_severity(Severity::Fatal)
                .with_kind(IssueKind::FatalStageError)
                .with_message(reason.clone());
            return Err(CleaningError::FatalStage {
                stage: self.name().to_string(),
                reason,
                result: Box::new(result),
            });
        }

        debug!("Removed {} records missing '{}'", removed, self.field);
        let result = result.with_message(format!(
            "{} records without '{}' removed",
            removed, self.field
        ));
        Ok(StageOutput::new(data, result))
    }
}

/// Removes records whose numeric field is missing or outside `[min, max]`.
///
/// Values are read as reals; text that does not parse counts as missing.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    range: RangeRule,
    rule: ValidationRule,
}

impl RangeFilter {
    pub fn new(range: RangeRule) -> Self {
        Self {
            rule: ValidationRule::in_range(range.clone()),
            range,
        }
    }

    pub fn bounds(field: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(RangeRule::new(field, min, max))
    }

    pub fn range(&self) -> &RangeRule {
        &self.range
    }

    /// Audit label, e.g. `RangeFilter(Age,0,120)`.
    pub fn label(&self) -> String {
        format!(
            "{}({},{},{})",
            names::RANGE_FILTER,
            self.range.field,
            self.range.min,
            self.range.max
        )
    }
}

impl Stage for RangeFilter {
    fn name(&self) -> &str {
        names::RANGE_FILTER
    }

    fn rule(&self) -> &ValidationRule {
        &self.rule
    }

    fn apply(&self, df: &DataFrame) -> Result<StageOutput> {
        let (data, result) = drop_violations(self.name(), &self.rule, df)?;
        debug!(
            "{}: removed {} records",
            self.label(),
            result.records_affected
        );
        let records_affected = result.records_affected;
        let result = result
            .with_message(format!(
                "{}: {} records missing or out of range removed",
                self.label(),
                records_affected
            ))
            .with_detail("label", json!(self.label()));
        Ok(StageOutput::new(data, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{scenario_patients, string_column};

    #[test]
    fn test_require_key_removes_missing_and_blank() {
        let df = df!(
            "PatientID" => [Some("P1"), None, Some(" "), Some("P4")],
            "Age" => [1i64, 2, 3, 4]
        )
        .unwrap();
        let output = RequireKey::new("PatientID").apply(&df).unwrap();

        assert_eq!(output.records_affected(), 2);
        assert_eq!(output.primary().field.as_deref(), Some("PatientID"));
        assert_eq!(
            string_column(&output.data, "PatientID"),
            vec![Some("P1".into()), Some("P4".into())]
        );
    }

    #[test]
    fn test_require_key_numeric_ids() {
        let df = df!("SubjectID" => [Some(10i64), None, Some(12)]).unwrap();
        let output = RequireKey::new("SubjectID").apply(&df).unwrap();
        assert_eq!(output.data.height(), 2);
    }

    #[test]
    fn test_require_key_fatal_when_nothing_remains() {
        let df = df!(
            "PatientID" => [None::<&str>, None, None],
            "Age" => [1i64, 2, 3]
        )
        .unwrap();
        let err = RequireKey::new("PatientID").apply(&df).unwrap_err();

        assert_eq!(err.error_code(), "FATAL_STAGE_ERROR");
        let result = err.stage_result().expect("fatal error carries its audit entry");
        assert_eq!(result.records_before, 3);
        assert_eq!(result.records_after, 0);
        assert_eq!(result.records_affected, 3);
        assert_eq!(result.severity, Severity::Fatal);
        assert_eq!(result.kind, IssueKind::FatalStageError);
    }

    #[test]
    fn test_require_key_missing_column() {
        let df = df!("Age" => [1i64]).unwrap();
        let err = RequireKey::new("PatientID").apply(&df).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
    }

    #[test]
    fn test_range_filter_generic_over_field() {
        let df = df!(
            "Hemoglobin" => [Some(13.5), Some(2.0), None, Some(20.0)],
            "PatientID" => ["P1", "P2", "P3", "P4"]
        )
        .unwrap();
        let stage = RangeFilter::bounds("Hemoglobin", 5.0, 20.0);
        let output = stage.apply(&df).unwrap();

        assert_eq!(stage.label(), "RangeFilter(Hemoglobin,5,20)");
        assert_eq!(
            output.primary().details["label"],
            json!("RangeFilter(Hemoglobin,5,20)")
        );
        assert_eq!(output.records_affected(), 2);
        assert_eq!(output.primary().field.as_deref(), Some("Hemoglobin"));
        assert_eq!(
            string_column(&output.data, "PatientID"),
            vec![Some("P1".into()), Some("P4".into())]
        );
    }

    #[test]
    fn test_range_filter_reads_numeric_text() {
        let df = df!("Age" => [Some("45"), Some("unknown"), Some("130")]).unwrap();
        let output = RangeFilter::bounds("Age", 0.0, 120.0).apply(&df).unwrap();
        assert_eq!(output.data.height(), 1);
        // The column keeps its original type
        assert_eq!(output.data.column("Age").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_range_filter_empty_match_is_not_an_error() {
        let df = df!("Age" => [10i64, 20]).unwrap();
        let output = RangeFilter::bounds("Age", 0.0, 120.0).apply(&df).unwrap();
        assert_eq!(output.records_affected(), 0);
        assert_eq!(output.primary().kind, IssueKind::Clean);
    }

    #[test]
    fn test_filters_are_idempotent() {
        let df = scenario_patients();
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(RequireKey::new("PatientID")),
            Box::new(RangeFilter::bounds("Age", 0.0, 120.0)),
        ];
        for stage in stages {
            let first = stage.apply(&df).unwrap();
            assert_eq!(first.records_affected(), 1, "{}", stage.name());
            let second = stage.apply(&first.data).unwrap();
            assert_eq!(second.records_affected(), 0, "{}", stage.name());
            assert!(second.data.equals_missing(&first.data));
        }
    }
}
