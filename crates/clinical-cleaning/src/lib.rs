//! Clinical Dataset Cleaning Library
//!
//! A deterministic, auditable cleaning pipeline for tabular clinical data
//! built with Rust and Polars.
//!
//! # Overview
//!
//! A run imports a CSV file, validates it against configured rules, removes
//! duplicate and invalid records, standardizes categorical codes, computes
//! quality metrics and exports the result together with an audit trail:
//!
//! - **Validation**: schema checks and read-only rule checks on the raw data
//! - **Cleaning**: deduplication, key enforcement, range filtering, category mapping
//! - **Audit Log**: one timestamped entry per rule evaluated, persisted as JSON Lines
//! - **Quality Metrics**: completeness and issue counts derived from the audit log
//! - **Progress Reporting**: state transitions with cancellation between stages
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use clinical_cleaning::{CleaningConfig, Pipeline};
//!
//! let config = CleaningConfig::builder()
//!     .key_field("PatientID")
//!     .range_rule("Age", 0.0, 120.0)
//!     .output_dir("output")
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .build()?
//!     .process_file("data/patients.csv")?;
//!
//! println!("{} records kept", result.cleaned.height());
//! println!("Completeness: {:.2}%", result.metrics.completeness_pct);
//! ```
//!
//! # Failures
//!
//! Rule violations are not errors: they are recorded in the audit log and the
//! run continues. Only fatal conditions abort a run. Once the audit log is
//! open, a fatal error comes back as [`CleaningError::RunFailed`] with the
//! partial log attached:
//!
//! ```rust,ignore
//! match pipeline.process(df) {
//!     Ok(result) => println!("Exported to {:?}", result.output_path),
//!     Err(e) => {
//!         eprintln!("{} ({})", e, e.error_code());
//!         if let Some(path) = e.audit_path() {
//!             eprintln!("Audit log: {}", path.display());
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod quality;
pub mod reporting;
pub mod rules;
pub mod stages;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{CleaningConfig, CleaningConfigBuilder, ConfigValidationError};
pub use error::{CleaningError, Result as CleaningResult, ResultExt};
pub use loader::load_csv;
pub use pipeline::{
    AuditLog, CancellationToken, ClosureProgressReporter, PersistedAudit, Pipeline,
    PipelineBuilder, PipelineState, ProgressReporter, ProgressUpdate, StageExecutor,
};
pub use quality::QualityReporter;
pub use reporting::{CleaningReport, Exporter};
pub use rules::{CategoryMapping, RangeRule, RuleCheck, RuleSet, ValidationRule};
pub use stages::{
    CategoricalStandardize, Deduplicate, MissingValueReport, RangeFilter, RequireKey, Stage,
    StageOutput,
};
pub use types::{
    ColumnMissing, IssueKind, PipelineResult, QualityMetrics, Severity, StageResult,
};
