//! Validation rules.
//!
//! Rules are data: a named predicate plus a severity. They can be listed,
//! serialized and evaluated on their own, independent of the stages that
//! act on their results.

mod mapping;
mod rule;

pub use mapping::CategoryMapping;
pub use rule::{RangeRule, RuleCheck, ValidationRule};

use crate::config::CleaningConfig;
use serde::Serialize;

/// Every rule a configuration implies, in evaluation order.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSet {
    pub schema: Vec<ValidationRule>,
    pub record: Vec<ValidationRule>,
}

impl RuleSet {
    pub fn from_config(config: &CleaningConfig) -> Self {
        let schema = config
            .required_columns()
            .iter()
            .map(|field| ValidationRule::column_present(field))
            .collect();

        let mut record = vec![
            ValidationRule::complete(),
            ValidationRule::no_duplicates(),
            ValidationRule::key_present(&config.key_field),
        ];
        record.extend(
            config
                .range_rules
                .iter()
                .cloned()
                .map(ValidationRule::in_range),
        );
        record.extend(
            config
                .category_rules
                .iter()
                .cloned()
                .map(ValidationRule::known_category),
        );

        Self { schema, record }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationRule> {
        self.schema.iter().chain(self.record.iter())
    }

    pub fn len(&self) -> usize {
        self.schema.len() + self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
