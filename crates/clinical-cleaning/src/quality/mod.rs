//! Data quality metrics.
//!
//! Metrics are computed once per run from the cleaned dataset and the audit
//! log. Counts of removed records come from the audit log because those rows
//! no longer exist in the cleaned data.

mod reporter;

pub use reporter::QualityReporter;
