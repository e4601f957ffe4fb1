//! Cleaning and validation stages.
//!
//! A stage applies one [`ValidationRule`] to a dataset and returns a new
//! dataset together with the audit entries describing what it did. Stages
//! borrow their input and never modify it, and reapplying a stage to its own
//! output changes nothing.
//!
//! The concrete stages are fixed policies:
//!
//! - [`Deduplicate`]: drop exact copies of an earlier record
//! - [`RequireKey`]: drop records without a key, fail if none remain
//! - [`RangeFilter`]: drop records whose numeric field is missing or out of bounds
//! - [`CategoricalStandardize`]: rewrite categorical codes to standard terms
//! - [`MissingValueReport`]: measure missing values without filtering

mod dedup;
mod filters;
mod missing;
mod standardize;

pub use dedup::Deduplicate;
pub use filters::{RangeFilter, RequireKey};
pub use missing::{MissingSummary, MissingValueReport};
pub use standardize::CategoricalStandardize;

use crate::error::Result;
use crate::rules::ValidationRule;
use crate::types::StageResult;
use polars::prelude::DataFrame;

/// Stage names as they appear in the audit log.
pub mod names {
    pub const DEDUPLICATE: &str = "Deduplicate";
    pub const REQUIRE_KEY: &str = "RequireKey";
    pub const RANGE_FILTER: &str = "RangeFilter";
    pub const CATEGORICAL_STANDARDIZE: &str = "CategoricalStandardize";
    pub const MISSING_VALUE_REPORT: &str = "MissingValueReport";
    pub const EXPORT: &str = "Export";

    // Read-only checks recorded while validating
    pub const SCHEMA_CHECK: &str = "SchemaCheck";
    pub const MISSING_CHECK: &str = "MissingCheck";
    pub const DUPLICATE_CHECK: &str = "DuplicateCheck";
    pub const KEY_CHECK: &str = "KeyCheck";
    pub const RANGE_CHECK: &str = "RangeCheck";
    pub const CATEGORY_CHECK: &str = "CategoryCheck";
}

/// A dataset produced by a stage and the audit entries it generated.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub data: DataFrame,
    /// One entry per rule evaluation, in order. Never empty.
    pub results: Vec<StageResult>,
}

impl StageOutput {
    pub fn new(data: DataFrame, result: StageResult) -> Self {
        Self {
            data,
            results: vec![result],
        }
    }

    /// The primary entry: the rule's own evaluation.
    pub fn primary(&self) -> &StageResult {
        &self.results[0]
    }

    /// Records affected according to the primary entry.
    pub fn records_affected(&self) -> usize {
        self.primary().records_affected
    }
}

/// A named cleaning or validation operation.
pub trait Stage: Send + Sync {
    /// Name recorded in the audit log.
    fn name(&self) -> &str;

    /// The rule this stage enforces.
    fn rule(&self) -> &ValidationRule;

    /// Apply the stage. Must not mutate `df`.
    ///
    /// Returns `SchemaMismatch` when a required column is absent and
    /// `FatalStage` when the result would be unusable downstream.
    fn apply(&self, df: &DataFrame) -> Result<StageOutput>;
}
