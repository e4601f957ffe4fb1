use super::mapping::CategoryMapping;
use crate::error::Result;
use crate::types::Severity;
use crate::utils::{duplicate_mask, missing_mask, numeric_values, require_column, text_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Inclusive numeric bounds for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

impl RangeRule {
    pub fn new(field: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            field: field.into(),
            min,
            max,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The predicate a rule evaluates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCheck {
    /// The schema has the column. Dataset-level.
    ColumnPresent { field: String },
    /// A record is not an exact copy of an earlier one. Dataset-level.
    NoDuplicates,
    /// The key field is present and not blank.
    KeyPresent { field: String },
    /// The field parses as a number inside the bounds.
    InRange(RangeRule),
    /// The categorical value is mapped or already standard. Nulls pass.
    KnownCategory(CategoryMapping),
    /// Every cell of the record is present.
    Complete,
}

/// A named, pure predicate over records with a severity.
///
/// Rules carry no behaviour beyond evaluation: stages decide what to do with
/// the rows a rule flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub check: RuleCheck,
}

impl ValidationRule {
    pub fn column_present(field: &str) -> Self {
        Self {
            id: format!("column_present:{field}"),
            description: format!("Column '{field}' exists in the dataset"),
            severity: Severity::Fatal,
            check: RuleCheck::ColumnPresent {
                field: field.to_string(),
            },
        }
    }

    pub fn no_duplicates() -> Self {
        Self {
            id: "no_duplicates".to_string(),
            description: "Records are not exact copies of an earlier record".to_string(),
            severity: Severity::Correctable,
            check: RuleCheck::NoDuplicates,
        }
    }

    pub fn key_present(field: &str) -> Self {
        Self {
            id: format!("key_present:{field}"),
            description: format!("Key field '{field}' is present"),
            severity: Severity::Correctable,
            check: RuleCheck::KeyPresent {
                field: field.to_string(),
            },
        }
    }

    pub fn in_range(range: RangeRule) -> Self {
        Self {
            id: format!("range:{}:{}..={}", range.field, range.min, range.max),
            description: format!(
                "'{}' is a number between {} and {}",
                range.field, range.min, range.max
            ),
            severity: Severity::Correctable,
            check: RuleCheck::InRange(range),
        }
    }

    pub fn known_category(mapping: CategoryMapping) -> Self {
        Self {
            id: format!("category:{}", mapping.field),
            description: format!(
                "'{}' uses one of {} known codes or their standard terms",
                mapping.field,
                mapping.len()
            ),
            severity: Severity::Informational,
            check: RuleCheck::KnownCategory(mapping),
        }
    }

    pub fn complete() -> Self {
        Self {
            id: "complete".to_string(),
            description: "Every cell of the record has a value".to_string(),
            severity: Severity::Informational,
            check: RuleCheck::Complete,
        }
    }

    /// Column this rule reads, when it targets one.
    pub fn field(&self) -> Option<&str> {
        match &self.check {
            RuleCheck::ColumnPresent { field } | RuleCheck::KeyPresent { field } => Some(field),
            RuleCheck::InRange(range) => Some(&range.field),
            RuleCheck::KnownCategory(mapping) => Some(&mapping.field),
            RuleCheck::NoDuplicates | RuleCheck::Complete => None,
        }
    }

    /// Flag every record that violates the rule (`true` = violation).
    ///
    /// `stage` names the caller in schema errors.
    pub fn violations(&self, df: &DataFrame, stage: &str) -> Result<Vec<bool>> {
        let height = df.height();
        match &self.check {
            RuleCheck::ColumnPresent { field } => {
                require_column(df, stage, field)?;
                Ok(vec![false; height])
            }
            RuleCheck::NoDuplicates => duplicate_mask(df),
            RuleCheck::KeyPresent { field } => missing_mask(require_column(df, stage, field)?),
            RuleCheck::InRange(range) => {
                let values = numeric_values(require_column(df, stage, &range.field)?)?;
                Ok(values
                    .into_iter()
                    .map(|value| !value.is_some_and(|v| range.contains(v)))
                    .collect())
            }
            RuleCheck::KnownCategory(mapping) => {
                let values = text_values(require_column(df, stage, &mapping.field)?)?;
                Ok(values
                    .iter()
                    .map(|value| {
                        value
                            .as_deref()
                            .is_some_and(|v| !v.trim().is_empty() && !mapping.is_expected(v))
                    })
                    .collect())
            }
            RuleCheck::Complete => {
                let mut any_missing = vec![false; height];
                for column in df.get_columns() {
                    let mask = missing_mask(column.as_materialized_series())?;
                    for (flag, missing) in any_missing.iter_mut().zip(mask) {
                        *flag |= missing;
                    }
                }
                Ok(any_missing)
            }
        }
    }

    /// Number of records violating the rule.
    pub fn count_violations(&self, df: &DataFrame, stage: &str) -> Result<usize> {
        if let RuleCheck::NoDuplicates = self.check {
            let unique = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
            return Ok(df.height() - unique.height());
        }
        Ok(self
            .violations(df, stage)?
            .into_iter()
            .filter(|v| *v)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patients() -> DataFrame {
        df!(
            "PatientID" => [Some("P001"), Some("P002"), Some("P002"), None, Some("P004")],
            "Age" => [Some(45i64), Some(62), Some(62), Some(50), Some(200)],
            "Sex" => [Some("M"), Some("F"), Some("F"), Some("F"), Some("X")]
        )
        .unwrap()
    }

    #[test]
    fn test_no_duplicates_flags_later_copies_only() {
        let flags = ValidationRule::no_duplicates()
            .violations(&patients(), "DuplicateCheck")
            .unwrap();
        assert_eq!(flags, vec![false, false, true, false, false]);
        assert_eq!(
            ValidationRule::no_duplicates()
                .count_violations(&patients(), "DuplicateCheck")
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_key_present() {
        let rule = ValidationRule::key_present("PatientID");
        assert_eq!(rule.count_violations(&patients(), "RequireKey").unwrap(), 1);
    }

    #[test]
    fn test_in_range_inclusive_bounds() {
        let df = df!("Age" => [Some(0i64), Some(120), Some(-1), Some(121), None]).unwrap();
        let rule = ValidationRule::in_range(RangeRule::new("Age", 0.0, 120.0));
        assert_eq!(
            rule.violations(&df, "RangeFilter").unwrap(),
            vec![false, false, true, true, true]
        );
    }

    #[test]
    fn test_known_category_ignores_missing() {
        let df = df!("Sex" => [Some("M"), Some("Male"), Some("X"), None, Some(" ")]).unwrap();
        let rule = ValidationRule::known_category(CategoryMapping::sex("Sex"));
        assert_eq!(
            rule.violations(&df, "CategoryCheck").unwrap(),
            vec![false, false, true, false, false]
        );
    }

    #[test]
    fn test_complete_flags_rows_with_any_gap() {
        let df = df!(
            "a" => [Some(1i64), None, Some(3)],
            "b" => [Some("x"), Some("y"), Some(" ")]
        )
        .unwrap();
        assert_eq!(
            ValidationRule::complete().violations(&df, "MissingCheck").unwrap(),
            vec![false, true, true]
        );
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let rule = ValidationRule::column_present("Weight");
        let err = rule.violations(&patients(), "Validate").unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert_eq!(rule.severity, Severity::Fatal);
    }

    #[test]
    fn test_rule_ids_are_descriptive() {
        assert_eq!(
            ValidationRule::in_range(RangeRule::new("Age", 0.0, 120.0)).id,
            "range:Age:0..=120"
        );
        assert_eq!(ValidationRule::key_present("PatientID").field(), Some("PatientID"));
    }
}
