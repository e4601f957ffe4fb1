//! Export and reporting.
//!
//! [`Exporter`] writes the cleaned dataset and the metrics snapshot next to
//! the persisted audit log. [`CleaningReport`] bundles a finished run for
//! JSON output (`--json` CLI flag) or programmatic access.
//!
//! # Example
//!
//! ```rust,ignore
//! use clinical_cleaning::reporting::Exporter;
//!
//! let report = Exporter::build_report("data/patients.csv", &result);
//! println!("{}", serde_json::to_string_pretty(&report)?);
//!
//! print!("{}", Exporter::render_summary(&result.metrics, &result.audit));
//! ```

mod generator;

pub use generator::{CleaningReport, Exporter, IssueCount};
