use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative rewrite table for one categorical column.
///
/// Looks up raw values exactly as stored. Values absent from the table pass
/// through unchanged.
///
/// ```rust,ignore
/// let sex = CategoryMapping::new("Sex").with("M", "Male").with("F", "Female");
/// assert_eq!(sex.map("M"), Some("Male"));
/// assert_eq!(sex.map("X"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub field: String,
    pub values: BTreeMap<String, String>,
}

impl CategoryMapping {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add one `from -> to` rewrite.
    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.values.insert(from.into(), to.into());
        self
    }

    /// Standardized term for a raw value, if the table has one.
    pub fn map(&self, value: &str) -> Option<&str> {
        self.values.get(value).map(String::as_str)
    }

    /// Whether a value belongs to the expected vocabulary: either a raw code
    /// the table knows or one of its standardized terms.
    pub fn is_expected(&self, value: &str) -> bool {
        self.values.contains_key(value) || self.values.values().any(|term| term == value)
    }

    /// Rewrite a value when it differs from its standardized form.
    ///
    /// Returns `None` when the value is unmapped or already standard.
    pub fn rewrite(&self, value: &str) -> Option<&str> {
        self.map(value).filter(|term| *term != value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sex/gender single-letter codes.
    pub fn sex(field: impl Into<String>) -> Self {
        Self::new(field).with("M", "Male").with("F", "Female")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_known_and_unknown() {
        let mapping = CategoryMapping::sex("Sex");
        assert_eq!(mapping.map("M"), Some("Male"));
        assert_eq!(mapping.map("F"), Some("Female"));
        assert_eq!(mapping.map("X"), None);
        assert_eq!(mapping.map("m"), None);
    }

    #[test]
    fn test_expected_includes_targets() {
        let mapping = CategoryMapping::sex("Sex");
        assert!(mapping.is_expected("M"));
        assert!(mapping.is_expected("Female"));
        assert!(!mapping.is_expected("X"));
    }

    #[test]
    fn test_rewrite_skips_identity_entries() {
        let mapping = CategoryMapping::new("Arm")
            .with("PBO", "Placebo")
            .with("Placebo", "Placebo");
        assert_eq!(mapping.rewrite("PBO"), Some("Placebo"));
        assert_eq!(mapping.rewrite("Placebo"), None);
        assert_eq!(mapping.rewrite("Active"), None);
    }

    #[test]
    fn test_mapping_from_yaml() {
        let yaml = "field: Sex\nvalues:\n  M: Male\n  F: Female\n";
        let mapping: CategoryMapping = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(mapping, CategoryMapping::sex("Sex"));
        assert_eq!(mapping.len(), 2);
    }
}
