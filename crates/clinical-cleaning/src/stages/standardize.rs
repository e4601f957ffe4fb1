use super::{Stage, StageOutput, names};
use crate::error::Result;
use crate::rules::{CategoryMapping, ValidationRule};
use crate::types::{IssueKind, StageResult};
use crate::utils::{require_column, text_values};
use polars::prelude::*;
use serde_json::json;
use tracing::{debug, warn};

/// Rewrites a categorical column through a [`CategoryMapping`].
///
/// Never removes records. The primary entry counts rewritten values. Each
/// distinct value outside the expected vocabulary adds one informational
/// `UnexpectedCategory` entry and passes through unchanged.
#[derive(Debug, Clone)]
pub struct CategoricalStandardize {
    mapping: CategoryMapping,
    rule: ValidationRule,
}

impl CategoricalStandardize {
    pub fn new(mapping: CategoryMapping) -> Self {
        Self {
            rule: ValidationRule::known_category(mapping.clone()),
            mapping,
        }
    }

    pub fn mapping(&self) -> &CategoryMapping {
        &self.mapping
    }
}

impl Stage for CategoricalStandardize {
    fn name(&self) -> &str {
        names::CATEGORICAL_STANDARDIZE
    }

    fn rule(&self) -> &ValidationRule {
        &self.rule
    }

    fn apply(&self, df: &DataFrame) -> Result<StageOutput> {
        let field = self.mapping.field.as_str();
        let height = df.height();
        let values = text_values(require_column(df, self.name(), field)?)?;

        let mut rewritten = 0usize;
        // Distinct unexpected values in first-seen order with their counts
        let mut unexpected: Vec<(String, usize)> = Vec::new();

        let standardized: Vec<Option<String>> = values
            .into_iter()
            .map(|value| {
                let raw = value?;
                if let Some(term) = self.mapping.rewrite(&raw) {
                    rewritten += 1;
                    return Some(term.to_string());
                }
                // Blank cells are missing values, not categories
                if !raw.trim().is_empty() && !self.mapping.is_expected(&raw) {
                    match unexpected.iter_mut().find(|(v, _)| *v == raw) {
                        Some((_, count)) => *count += 1,
                        None => unexpected.push((raw.clone(), 1)),
                    }
                }
                Some(raw)
            })
            .collect();

        let mut data = df.clone();
        data.replace(field, Series::new(field.into(), standardized))?;

        debug!("Standardized {} values in '{}'", rewritten, field);

        let primary = StageResult::new(self.name(), &self.rule.id, height, height)
            .with_affected(rewritten)
            .with_field(field)
            .with_message(format!("{} '{}' values standardized", rewritten, field));

        let mut results = vec![primary];
        for (value, count) in unexpected {
            warn!("Unexpected category '{}' in '{}' ({} records)", value, field, count);
            results.push(
                StageResult::new(self.name(), &self.rule.id, height, height)
                    .with_severity(self.rule.severity)
                    .with_kind(IssueKind::UnexpectedCategory)
                    .with_affected(count)
                    .with_field(field)
                    .with_message(format!(
                        "unexpected category '{}' passed through unmapped",
                        value
                    ))
                    .with_detail("value", json!(value)),
            );
        }

        Ok(StageOutput { data, results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::string_column;
    use crate::types::Severity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_values_are_not_unexpected() {
        let df = df!("Sex" => [Some("M"), Some("  "), Some(""), None]).unwrap();
        let output = CategoricalStandardize::new(CategoryMapping::sex("Sex"))
            .apply(&df)
            .unwrap();

        assert_eq!(output.results.len(), 1);
        assert_eq!(output.records_affected(), 1);
        assert_eq!(
            string_column(&output.data, "Sex"),
            vec![Some("Male".into()), Some("  ".into()), Some("".into()), None]
        );
    }

    #[test]
    fn test_maps_known_codes_and_passes_through_others() {
        let df = df!("Sex" => ["M", "F", "X"]).unwrap();
        let output = CategoricalStandardize::new(CategoryMapping::sex("Sex"))
            .apply(&df)
            .unwrap();

        assert_eq!(
            string_column(&output.data, "Sex"),
            vec![Some("Male".into()), Some("Female".into()), Some("X".into())]
        );
        assert_eq!(output.records_affected(), 2);
        assert_eq!(output.primary().records_before, 3);
        assert_eq!(output.primary().records_after, 3);

        assert_eq!(output.results.len(), 2);
        let warning = &output.results[1];
        assert_eq!(warning.kind, IssueKind::UnexpectedCategory);
        assert_eq!(warning.severity, Severity::Informational);
        assert_eq!(warning.records_affected, 1);
        assert_eq!(warning.details["value"], json!("X"));
    }

    #[test]
    fn test_one_warning_per_distinct_value() {
        let df = df!("Sex" => [Some("U"), Some("X"), Some("U"), None]).unwrap();
        let output = CategoricalStandardize::new(CategoryMapping::sex("Sex"))
            .apply(&df)
            .unwrap();

        let warnings: Vec<(String, usize)> = output.results[1..]
            .iter()
            .map(|r| (r.details["value"].as_str().unwrap().to_string(), r.records_affected))
            .collect();
        assert_eq!(warnings, vec![("U".to_string(), 2), ("X".to_string(), 1)]);
        // Nulls are left alone
        assert_eq!(string_column(&output.data, "Sex")[3], None);
    }

    #[test]
    fn test_idempotent() {
        let df = df!("Sex" => ["M", "F", "Female", "X"]).unwrap();
        let stage = CategoricalStandardize::new(CategoryMapping::sex("Sex"));

        let first = stage.apply(&df).unwrap();
        assert_eq!(first.records_affected(), 2);

        let second = stage.apply(&first.data).unwrap();
        assert_eq!(second.records_affected(), 0);
        assert!(second.data.equals_missing(&first.data));
    }

    #[test]
    fn test_numeric_codes_are_read_as_text() {
        let df = df!("Gender" => [1i64, 2, 9]).unwrap();
        let mapping = CategoryMapping::new("Gender").with("1", "Male").with("2", "Female");
        let output = CategoricalStandardize::new(mapping).apply(&df).unwrap();

        assert_eq!(
            string_column(&output.data, "Gender"),
            vec![Some("Male".into()), Some("Female".into()), Some("9".into())]
        );
    }

    #[test]
    fn test_other_columns_untouched() {
        let df = df!(
            "PatientID" => ["P1", "P2"],
            "Sex" => ["M", "F"]
        )
        .unwrap();
        let output = CategoricalStandardize::new(CategoryMapping::sex("Sex"))
            .apply(&df)
            .unwrap();
        assert_eq!(output.data.get_column_names(), df.get_column_names());
        assert!(output.data.column("PatientID").unwrap().equals(df.column("PatientID").unwrap()));
    }
}
