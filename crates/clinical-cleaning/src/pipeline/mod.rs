//! Pipeline module.
//!
//! This module provides the cleaning pipeline, its audit log and the
//! progress and cancellation plumbing around a run.

mod audit;
mod builder;
mod executor;
pub mod progress;

pub use audit::{AuditLog, PersistedAudit};
pub use builder::{Pipeline, PipelineBuilder};
pub use executor::StageExecutor;
pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelineState, ProgressReporter, ProgressUpdate,
};
