//! Run states, progress reporting and cancellation.
//!
//! A run moves through a fixed sequence of states. Progress updates are
//! emitted at state transitions only; per-rule detail lives in the audit log.
//! Cancellation is checked between stages, never inside one.
//!
//! # Example
//!
//! ```rust,ignore
//! use clinical_cleaning::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     token_clone.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| println!("[{:?}] {}", update.state, update.message))
//!     .build()?
//!     .process(df);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// States of a cleaning run.
///
/// `Imported → Validated → Cleaned → QualityChecked → Exported`, with
/// `Failed` as the terminal state for any fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Dataset loaded, nothing checked yet
    Imported,
    /// Schema and record rules evaluated
    Validated,
    /// Duplicates and invalid records removed, categories standardized
    Cleaned,
    /// Final missing value report and quality metrics computed
    QualityChecked,
    /// Cleaned dataset, metrics and audit log written
    Exported,
    /// Run halted on a fatal error
    Failed,
}

impl PipelineState {
    /// Returns a human-readable name for the state.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Imported => "Imported",
            Self::Validated => "Validated",
            Self::Cleaned => "Cleaned",
            Self::QualityChecked => "Quality Checked",
            Self::Exported => "Exported",
            Self::Failed => "Failed",
        }
    }

    /// The state a successful phase leads to, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Imported => Some(Self::Validated),
            Self::Validated => Some(Self::Cleaned),
            Self::Cleaned => Some(Self::QualityChecked),
            Self::QualityChecked => Some(Self::Exported),
            Self::Exported | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exported | Self::Failed)
    }

    /// Share of the overall run spent reaching this state.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Imported => 0.05,
            Self::Validated => 0.25,
            Self::Cleaned => 0.40,
            Self::QualityChecked => 0.15,
            Self::Exported => 0.15,
            Self::Failed => 0.0,
        }
    }

    /// Cumulative progress once this state is reached.
    pub fn progress(&self) -> f32 {
        match self {
            Self::Imported => 0.05,
            Self::Validated => 0.30,
            Self::Cleaned => 0.70,
            Self::QualityChecked => 0.85,
            Self::Exported => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// A state transition notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// State just reached
    pub state: PipelineState,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Human-readable message describing the transition
    pub message: String,

    /// Rows in the dataset at this point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(state: PipelineState, message: impl Into<String>) -> Self {
        Self {
            state,
            progress: state.progress(),
            message: message.into(),
            records: None,
        }
    }

    pub fn with_records(mut self, records: usize) -> Self {
        self.records = Some(records);
        self
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PipelineState::Failed, message)
    }
}

/// Receives progress updates during a run.
///
/// Implementations must be `Send + Sync` so a run can report from a worker
/// thread.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running pipeline at its next stage boundary.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Thread-safe.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
