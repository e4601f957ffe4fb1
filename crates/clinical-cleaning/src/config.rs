//! Configuration for the cleaning pipeline.
//!
//! A configuration is a flat set of rule parameters: the key field, numeric
//! bounds per column, categorical rewrite tables and output settings. It can
//! be built in code with [`CleaningConfig::builder()`] or loaded from a JSON
//! or YAML file with [`CleaningConfig::from_path`]. Missing keys take their
//! defaults.

use crate::error::{CleaningError, Result};
use crate::rules::{CategoryMapping, RangeRule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Configuration for one cleaning run.
///
/// # Example
///
/// ```rust,ignore
/// use clinical_cleaning::config::CleaningConfig;
///
/// let config = CleaningConfig::builder()
///     .key_field("SubjectID")
///     .range_rule("Age", 18.0, 90.0)
///     .range_rule("Hemoglobin", 5.0, 20.0)
///     .save_to_disk(false)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Record identifier. Rows without it are removed.
    /// Default: "PatientID"
    pub key_field: String,

    /// Inclusive numeric bounds, applied in order.
    /// Default: Age in [0, 120]
    pub range_rules: Vec<RangeRule>,

    /// Categorical rewrite tables.
    /// Default: Sex {M: Male, F: Female}
    pub category_rules: Vec<CategoryMapping>,

    /// Cell contents read as missing when importing CSV.
    /// Default: "", "NA", "N/A", "NULL"
    pub null_values: Vec<String>,

    /// Directory for the cleaned dataset, audit log and metrics.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Cleaned dataset file name (without extension).
    /// Default: "cleaned_dataset"
    pub output_name: String,

    /// Whether to write outputs and the audit log to disk.
    /// Default: true
    pub save_to_disk: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            key_field: "PatientID".to_string(),
            range_rules: vec![RangeRule::new("Age", 0.0, 120.0)],
            category_rules: vec![CategoryMapping::sex("Sex")],
            null_values: ["", "NA", "N/A", "NULL"]
                .into_iter()
                .map(String::from)
                .collect(),
            output_dir: PathBuf::from("output"),
            output_name: "cleaned_dataset".to_string(),
            save_to_disk: true,
        }
    }
}

impl CleaningConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CleaningConfigBuilder {
        CleaningConfigBuilder::default()
    }

    /// Load a configuration file. `.yaml`/`.yml` files are read as YAML,
    /// everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CleaningError::InputNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let config: CleaningConfig = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        config
            .validate()
            .map_err(|e| CleaningError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Columns every stage together needs, in first-use order.
    pub fn required_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(self.key_field.clone())
            .chain(self.range_rules.iter().map(|r| r.field.clone()))
            .chain(self.category_rules.iter().map(|m| m.field.clone()))
            .filter(|field| seen.insert(field.clone()))
            .collect()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.key_field.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("key_field".to_string()));
        }

        let mut range_fields = HashSet::new();
        for range in &self.range_rules {
            if range.field.trim().is_empty() {
                return Err(ConfigValidationError::EmptyField("range_rules.field".to_string()));
            }
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(ConfigValidationError::InvalidBounds {
                    field: range.field.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
            if !range_fields.insert(range.field.as_str()) {
                return Err(ConfigValidationError::DuplicateRule(range.field.clone()));
            }
        }

        let mut category_fields = HashSet::new();
        for mapping in &self.category_rules {
            if mapping.field.trim().is_empty() {
                return Err(ConfigValidationError::EmptyField(
                    "category_rules.field".to_string(),
                ));
            }
            if mapping.is_empty() {
                return Err(ConfigValidationError::EmptyMapping(mapping.field.clone()));
            }
            if !category_fields.insert(mapping.field.as_str()) {
                return Err(ConfigValidationError::DuplicateRule(mapping.field.clone()));
            }
            // A term that is itself rewritten would change again on a second pass.
            for term in mapping.values.values() {
                if mapping.rewrite(term).is_some() {
                    return Err(ConfigValidationError::ChainedMapping {
                        field: mapping.field.clone(),
                        value: term.clone(),
                    });
                }
            }
        }

        if self.output_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("output_name".to_string()));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("'{0}' must not be empty")]
    EmptyField(String),

    #[error("Invalid bounds for '{field}': [{min}, {max}] (min must not exceed max)")]
    InvalidBounds { field: String, min: f64, max: f64 },

    #[error("More than one rule configured for '{0}'")]
    DuplicateRule(String),

    #[error("Category mapping for '{0}' has no entries")]
    EmptyMapping(String),

    #[error("Category mapping for '{field}' rewrites its own term '{value}'")]
    ChainedMapping { field: String, value: String },
}

impl From<ConfigValidationError> for CleaningError {
    fn from(e: ConfigValidationError) -> Self {
        CleaningError::InvalidConfig(e.to_string())
    }
}

/// Builder for [`CleaningConfig`] with fluent API.
///
/// Range and category rules added through the builder replace the defaults
/// instead of extending them.
#[derive(Debug, Default)]
pub struct CleaningConfigBuilder {
    key_field: Option<String>,
    range_rules: Option<Vec<RangeRule>>,
    category_rules: Option<Vec<CategoryMapping>>,
    null_values: Option<Vec<String>>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
    save_to_disk: Option<bool>,
}

impl CleaningConfigBuilder {
    /// Set the record key field.
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    /// Add an inclusive `[min, max]` bound for a numeric column.
    pub fn range_rule(mut self, field: impl Into<String>, min: f64, max: f64) -> Self {
        self.range_rules
            .get_or_insert_with(Vec::new)
            .push(RangeRule::new(field, min, max));
        self
    }

    /// Disable numeric range filtering entirely.
    pub fn no_range_rules(mut self) -> Self {
        self.range_rules = Some(Vec::new());
        self
    }

    /// Add a categorical rewrite table.
    pub fn category_rule(mut self, mapping: CategoryMapping) -> Self {
        self.category_rules
            .get_or_insert_with(Vec::new)
            .push(mapping);
        self
    }

    /// Disable categorical standardization entirely.
    pub fn no_category_rules(mut self) -> Self {
        self.category_rules = Some(Vec::new());
        self
    }

    /// Set the cell contents treated as missing on import.
    pub fn null_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set the cleaned dataset file name (without extension).
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// Enable or disable writing outputs and the audit log.
    ///
    /// When false, the run keeps everything in memory.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `CleaningConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<CleaningConfig, ConfigValidationError> {
        let defaults = CleaningConfig::default();
        let config = CleaningConfig {
            key_field: self.key_field.unwrap_or(defaults.key_field),
            range_rules: self.range_rules.unwrap_or(defaults.range_rules),
            category_rules: self.category_rules.unwrap_or(defaults.category_rules),
            null_values: self.null_values.unwrap_or(defaults.null_values),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            output_name: self.output_name.unwrap_or(defaults.output_name),
            save_to_disk: self.save_to_disk.unwrap_or(defaults.save_to_disk),
        };

        config.validate()?;
        Ok(config)
    }
}
