//! Error types for the cleaning pipeline.
//!
//! Only fatal conditions are errors. Correctable rule violations and
//! informational findings never surface here; they are recorded as
//! [`StageResult`](crate::types::StageResult) entries in the audit log.
//!
//! Errors are serializable so a caller can forward them as `{code, message}`.

use crate::pipeline::AuditLog;
use crate::types::StageResult;
use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the cleaning pipeline.
#[derive(Error, Debug)]
pub enum CleaningError {
    /// Source file does not exist. Raised before any stage runs.
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A stage needs a column the dataset does not have.
    #[error("Stage '{stage}' requires column '{column}' which is not in the dataset")]
    SchemaMismatch { stage: String, column: String },

    /// A stage left the dataset unusable for the stages after it.
    #[error("Stage '{stage}' failed: {reason}")]
    FatalStage {
        stage: String,
        reason: String,
        /// Audit entry describing the failing evaluation.
        result: Box<StageResult>,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Run was cancelled at a stage boundary.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// A run failed after the audit log was opened.
    ///
    /// Carries the partial audit trail so the caller can inspect it even
    /// when nothing was written to disk.
    #[error("Pipeline run failed: {source}")]
    RunFailed {
        #[source]
        source: Box<CleaningError>,
        audit: Box<AuditLog>,
        audit_path: Option<PathBuf>,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CleaningError>,
    },
}

impl CleaningError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CleaningError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InputNotFound(_) => "INPUT_NOT_FOUND",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Self::FatalStage { .. } => "FATAL_STAGE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Cancelled => "CANCELLED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::RunFailed { source, .. } => source.error_code(),
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::RunFailed { source, .. } | Self::WithContext { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    /// Check if this error halts a run at the stage where it occurred.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InputNotFound(_) | Self::SchemaMismatch { .. } | Self::FatalStage { .. } => true,
            Self::RunFailed { source, .. } | Self::WithContext { source, .. } => {
                source.is_fatal()
            }
            _ => false,
        }
    }

    /// The audit entry attached to a fatal stage error, if any.
    pub fn stage_result(&self) -> Option<&StageResult> {
        match self {
            Self::FatalStage { result, .. } => Some(result),
            Self::RunFailed { source, .. } | Self::WithContext { source, .. } => {
                source.stage_result()
            }
            _ => None,
        }
    }

    /// The partial audit log of a failed run.
    pub fn audit_log(&self) -> Option<&AuditLog> {
        match self {
            Self::RunFailed { audit, .. } => Some(audit),
            Self::WithContext { source, .. } => source.audit_log(),
            _ => None,
        }
    }

    /// Where the partial audit log of a failed run was persisted.
    pub fn audit_path(&self) -> Option<&PathBuf> {
        match self {
            Self::RunFailed { audit_path, .. } => audit_path.as_ref(),
            Self::WithContext { source, .. } => source.audit_path(),
            _ => None,
        }
    }
}

impl Serialize for CleaningError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("CleaningError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for cleaning operations.
pub type Result<T> = std::result::Result<T, CleaningError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CleaningError::Polars(e).with_context(context))
    }
}
