//! Main cleaning pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating a cleaning run.

use crate::config::{CleaningConfig, ConfigValidationError};
use crate::error::{CleaningError, Result};
use crate::loader::load_csv;
use crate::pipeline::audit::AuditLog;
use crate::pipeline::executor::StageExecutor;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PipelineState, ProgressReporter, ProgressUpdate,
};
use crate::quality::QualityReporter;
use crate::reporting::Exporter;
use crate::rules::RuleSet;
use crate::stages::{
    CategoricalStandardize, Deduplicate, MissingValueReport, RangeFilter, RequireKey, Stage,
    names,
};
use crate::types::{IssueKind, PipelineResult, QualityMetrics, Severity, StageResult};
use polars::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The main cleaning pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use clinical_cleaning::{CleaningConfig, Pipeline};
///
/// let result = Pipeline::builder()
///     .config(CleaningConfig::builder().save_to_disk(false).build()?)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .process(dataframe)?;
///
/// println!("{} records kept", result.cleaned.height());
/// ```
pub struct Pipeline {
    config: CleaningConfig,
    rules: RuleSet,
    run_id: Option<String>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    executor: StageExecutor,
    exporter: Exporter,
}

// Ensure Pipeline is Send (can be moved to another thread)
static_assertions::assert_impl_all!(Pipeline: Send);

/// Cleaned data and metrics from a run that reached `QualityChecked`.
struct CleanedRun {
    cleaned: DataFrame,
    metrics: QualityMetrics,
}

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Every rule this pipeline evaluates.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The cleaning stages in execution order.
    ///
    /// Deduplication comes first so a duplicated record is never counted
    /// twice by a later filter. Standardization comes last so it only
    /// touches records that survive.
    pub fn cleaning_stages(config: &CleaningConfig) -> Vec<Box<dyn Stage>> {
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(Deduplicate::new()),
            Box::new(RequireKey::new(config.key_field.clone())),
        ];
        for range in &config.range_rules {
            stages.push(Box::new(RangeFilter::new(range.clone())));
        }
        for mapping in &config.category_rules {
            stages.push(Box::new(CategoricalStandardize::new(mapping.clone())));
        }
        stages
    }

    /// Import a CSV file and process it.
    ///
    /// A missing file fails with `InputNotFound` before any audit entry is
    /// written.
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<PipelineResult> {
        let df = load_csv(path, &self.config.null_values)?;
        self.process(df)
    }

    /// Process a dataset through validation, cleaning, quality checks and
    /// (when configured) export.
    ///
    /// # Errors
    ///
    /// Any fatal condition returns `CleaningError::RunFailed` carrying the
    /// cause and the partial audit log. The log is persisted first when
    /// `save_to_disk` is set.
    pub fn process(&self, df: DataFrame) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(AuditLog::generate_run_id);
        let mut audit = AuditLog::new(run_id.clone());
        let records_imported = df.height();

        info!(
            "Starting cleaning run {} ({} records, {} variables)",
            run_id,
            records_imported,
            df.width()
        );
        self.report_progress(
            ProgressUpdate::new(PipelineState::Imported, "Dataset imported")
                .with_records(records_imported),
        );

        let mut phase = PipelineState::Validated;
        let run = match self.process_internal(df, &mut audit, &mut phase) {
            Ok(run) => run,
            Err(e) => return Err(self.fail(e, audit, phase, records_imported)),
        };

        let height = run.cleaned.height();
        let mut final_state = PipelineState::QualityChecked;
        let (mut output_path, mut metrics_path, mut audit_path) = (None, None, None);

        if self.config.save_to_disk {
            let (dataset, metrics) = match self.export(&run.cleaned, &run.metrics, &mut audit) {
                Ok(paths) => paths,
                Err(e) => return Err(self.fail(e, audit, PipelineState::Exported, height)),
            };
            // Persist a copy so a write failure still hands the log to `fail`
            match audit.clone().persist(self.exporter.output_dir()) {
                Ok(persisted) => {
                    audit = persisted.log;
                    audit_path = Some(persisted.path);
                }
                Err(e) => {
                    self.exporter.discard(&[dataset.as_path(), metrics.as_path()]);
                    return Err(self.fail(e, audit, PipelineState::Exported, height));
                }
            }
            output_path = Some(dataset);
            metrics_path = Some(metrics);
            final_state = PipelineState::Exported;
            self.report_progress(
                ProgressUpdate::new(PipelineState::Exported, "Outputs written").with_records(height),
            );
        }

        let result = PipelineResult {
            run_id,
            final_state,
            records_imported,
            cleaned: run.cleaned,
            metrics: run.metrics,
            audit,
            output_path,
            audit_path,
            metrics_path,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(
            "Run {} finished in {}ms: {} -> {} records, {:.2}% complete",
            result.run_id,
            result.duration_ms,
            records_imported,
            height,
            result.metrics.completeness_pct
        );
        Ok(result)
    }

    /// Check if cancellation has been requested.
    fn check_cancelled(&self) -> Result<()> {
        self.executor.check_cancelled()
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn process_internal(
        &self,
        df: DataFrame,
        audit: &mut AuditLog,
        phase: &mut PipelineState,
    ) -> Result<CleanedRun> {
        // Validated: schema first, then read-only record checks on the raw data
        *phase = PipelineState::Validated;
        self.check_cancelled()?;
        info!("Validating {} rules...", self.rules.len());
        self.executor
            .check_rules(&df, &self.rules.schema, *phase, audit)?;
        self.executor
            .check_rules(&df, &self.rules.record, *phase, audit)?;
        self.report_progress(
            ProgressUpdate::new(PipelineState::Validated, "Validation checks complete")
                .with_records(df.height()),
        );

        // Cleaned
        *phase = PipelineState::Cleaned;
        self.check_cancelled()?;
        info!("Cleaning...");
        let stages = Self::cleaning_stages(&self.config);
        let cleaned = self.executor.apply_stages(df, &stages, *phase, audit)?;
        self.report_progress(
            ProgressUpdate::new(PipelineState::Cleaned, "Cleaning stages complete")
                .with_records(cleaned.height()),
        );

        // QualityChecked
        *phase = PipelineState::QualityChecked;
        self.check_cancelled()?;
        let report: Vec<Box<dyn Stage>> = vec![Box::new(MissingValueReport::new())];
        let cleaned = self.executor.apply_stages(cleaned, &report, *phase, audit)?;
        let metrics = QualityReporter::compute(&cleaned, audit)?;
        self.report_progress(
            ProgressUpdate::new(
                PipelineState::QualityChecked,
                format!("Quality metrics computed ({:.2}% complete)", metrics.completeness_pct),
            )
            .with_records(cleaned.height()),
        );

        Ok(CleanedRun { cleaned, metrics })
    }

    /// Write the cleaned dataset and metrics, and record the export.
    ///
    /// Either both files are written or neither is left behind.
    fn export(
        &self,
        cleaned: &DataFrame,
        metrics: &QualityMetrics,
        audit: &mut AuditLog,
    ) -> Result<(PathBuf, PathBuf)> {
        self.check_cancelled()?;
        let output_path = self.exporter.write_dataset(cleaned)?;
        let metrics_path = match self.exporter.write_metrics(metrics, audit.run_id()) {
            Ok(path) => path,
            Err(e) => {
                self.exporter.discard(&[output_path.as_path()]);
                return Err(e);
            }
        };

        let height = cleaned.height();
        audit.record(
            PipelineState::Exported,
            StageResult::new(names::EXPORT, "export", height, height)
                .with_severity(Severity::Informational)
                .with_kind(IssueKind::Diagnostic)
                .with_message(format!(
                    "{} records written to {}",
                    height,
                    output_path.display()
                ))
                .with_detail("dataset_path", json!(output_path.display().to_string()))
                .with_detail("metrics_path", json!(metrics_path.display().to_string())),
        );
        Ok((output_path, metrics_path))
    }

    /// Record the fatal entry, persist the partial log and wrap the cause.
    fn fail(
        &self,
        cause: CleaningError,
        mut audit: AuditLog,
        phase: PipelineState,
        records: usize,
    ) -> CleaningError {
        let entry = Self::fatal_entry(&cause, records);
        audit.record(phase, entry);

        if cause.is_cancelled() {
            self.report_progress(ProgressUpdate::failed("Pipeline cancelled"));
        } else {
            self.report_progress(ProgressUpdate::failed(cause.to_string()));
        }
        error!("Run {} failed during {}: {}", audit.run_id(), phase.display_name(), cause);

        let mut audit_path = None;
        if self.config.save_to_disk {
            // Persist a copy so the caller still gets the log if writing fails
            match audit.clone().persist(self.exporter.output_dir()) {
                Ok(persisted) => {
                    audit = persisted.log;
                    audit_path = Some(persisted.path);
                }
                Err(e) => warn!("Could not persist audit log: {}", e),
            }
        }

        CleaningError::RunFailed {
            source: Box::new(cause),
            audit: Box::new(audit),
            audit_path,
        }
    }

    /// The audit entry describing why a run stopped.
    fn fatal_entry(cause: &CleaningError, records: usize) -> StageResult {
        let entry = match cause {
            CleaningError::FatalStage { result, .. } => return (**result).clone(),
            CleaningError::SchemaMismatch { stage, column } => {
                StageResult::new(stage, format!("column_present:{column}"), records, records)
                    .with_field(column)
            }
            CleaningError::Cancelled => StageResult::new("Pipeline", "cancelled", records, records),
            other => StageResult::new("Pipeline", other.error_code(), records, records),
        };
        entry
            .with_severity(Severity::Fatal)
            .with_kind(IssueKind::FatalStageError)
            .with_message(cause.to_string())
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
///
/// # Example
///
/// ```rust,ignore
/// use clinical_cleaning::{CancellationToken, CleaningConfig, Pipeline};
///
/// let token = CancellationToken::new();
///
/// let pipeline = Pipeline::builder()
///     .config(CleaningConfig::default())
///     .cancellation_token(token)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<CleaningConfig>,
    run_id: Option<String>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

// Ensure PipelineBuilder is Send (can be moved to another thread during construction)
static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: CleaningConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a fixed run id instead of the current timestamp.
    ///
    /// The id names the audit and metrics files, so concurrent runs writing
    /// into the same directory need distinct ids.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline.
    ///
    /// Clone the token and call [`CancellationToken::cancel()`] from any
    /// thread. The run stops at the next stage boundary with
    /// [`CleaningError::Cancelled`] as the cause.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let cancellation_token = self.cancellation_token.unwrap_or_default();

        Ok(Pipeline {
            rules: RuleSet::from_config(&config),
            exporter: Exporter::from_config(&config),
            executor: StageExecutor::new(cancellation_token.clone()),
            run_id: self.run_id,
            progress_reporter: self.progress_reporter,
            cancellation_token,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn in_memory() -> CleaningConfig {
        CleaningConfig::builder().save_to_disk(false).build().unwrap()
    }

    fn patients() -> DataFrame {
        df!(
            "PatientID" => [Some("P001"), Some("P002"), Some("P002"), None, Some("P004")],
            "Age" => [Some(45i64), Some(62), Some(62), Some(50), Some(200)],
            "Sex" => ["M", "F", "F", "F", "M"]
        )
        .unwrap()
    }

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert_eq!(pipeline.config().key_field, "PatientID");
        assert!(pipeline.config().save_to_disk);
        assert_eq!(pipeline.rules().len(), 8);
    }

    #[test]
    fn test_pipeline_builder_rejects_invalid_config() {
        let config = CleaningConfig {
            key_field: " ".to_string(),
            ..CleaningConfig::default()
        };
        assert!(Pipeline::builder().config(config).build().is_err());
    }

    #[test]
    fn test_pipeline_builder_with_cancellation_token() {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        let pipeline = Pipeline::builder()
            .cancellation_token(token)
            .build()
            .unwrap();

        assert!(!pipeline.cancellation_token.is_cancelled());
        token_clone.cancel();
        assert!(pipeline.cancellation_token.is_cancelled());
        assert!(pipeline.check_cancelled().is_err());
    }

    #[test]
    fn test_cleaning_stage_order() {
        let config = CleaningConfig::builder()
            .range_rule("Age", 0.0, 120.0)
            .range_rule("Hemoglobin", 5.0, 20.0)
            .build()
            .unwrap();
        let stages = Pipeline::cleaning_stages(&config);
        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "Deduplicate",
                "RequireKey",
                "RangeFilter",
                "RangeFilter",
                "CategoricalStandardize"
            ]
        );
    }

    #[test]
    fn test_process_in_memory() {
        let result = Pipeline::builder()
            .config(in_memory())
            .run_id("unit")
            .build()
            .unwrap()
            .process(patients())
            .unwrap();

        assert_eq!(result.run_id, "unit");
        assert_eq!(result.final_state, PipelineState::QualityChecked);
        assert_eq!(result.records_imported, 5);
        assert_eq!(result.cleaned.height(), 2);
        assert_eq!(result.metrics.duplicate_count, 1);
        assert_eq!(result.metrics.missing_key_count, 1);
        assert_eq!(result.metrics.out_of_range_count_by_field["Age"], 1);
        assert_eq!(result.metrics.values_standardized, 2);
        assert!(result.audit_path.is_none());
        assert!(result.output_path.is_none());
    }

    #[test]
    fn test_progress_follows_state_order() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = states.clone();

        Pipeline::builder()
            .config(in_memory())
            .on_progress(move |update| states_clone.lock().unwrap().push(update.state))
            .build()
            .unwrap()
            .process(patients())
            .unwrap();

        assert_eq!(
            *states.lock().unwrap(),
            vec![
                PipelineState::Imported,
                PipelineState::Validated,
                PipelineState::Cleaned,
                PipelineState::QualityChecked,
            ]
        );
    }

    #[test]
    fn test_cancelled_run_fails_with_audit() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let err = Pipeline::builder()
            .config(in_memory())
            .cancellation_token(token)
            .on_progress(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap()
            .process(patients())
            .unwrap_err();

        assert!(err.is_cancelled());
        let audit = err.audit_log().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit.fatal_entry().map(|e| e.stage.as_str()), Some("Pipeline"));
        // Imported, then Failed
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_schema_mismatch_records_fatal_entry() {
        let df = df!("PatientID" => ["P1"], "Age" => [30i64]).unwrap();
        let err = Pipeline::builder()
            .config(in_memory())
            .build()
            .unwrap()
            .process(df)
            .unwrap_err();

        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        let fatal = err.audit_log().unwrap().fatal_entry().unwrap().clone();
        assert_eq!(fatal.stage, "SchemaCheck");
        assert_eq!(fatal.field.as_deref(), Some("Sex"));
        assert_eq!(fatal.phase, Some(PipelineState::Validated));
    }

    fn export_into(dir: &Path, run_id: &str) -> Pipeline {
        let config = CleaningConfig::builder()
            .output_dir(dir)
            .output_name("clean")
            .build()
            .unwrap();
        Pipeline::builder().config(config).run_id(run_id).build().unwrap()
    }

    #[test]
    fn test_metrics_write_failure_leaves_no_dataset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("quality_metrics_m1.json")).unwrap();

        let err = export_into(dir.path(), "m1").process(patients()).unwrap_err();

        assert!(matches!(err, CleaningError::RunFailed { .. }));
        assert!(!dir.path().join("clean.csv").exists());
        let fatal = err.audit_log().unwrap().fatal_entry().unwrap().clone();
        assert_eq!(fatal.phase, Some(PipelineState::Exported));

        // The partial log is still written
        let entries = AuditLog::read_entries(err.audit_path().unwrap()).unwrap();
        assert_eq!(entries.last().map(|e| e.kind), Some(IssueKind::FatalStageError));
    }

    #[test]
    fn test_audit_write_failure_fails_run_and_discards_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("audit_a1.jsonl")).unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = states.clone();

        let config = CleaningConfig::builder()
            .output_dir(dir.path())
            .output_name("clean")
            .build()
            .unwrap();
        let err = Pipeline::builder()
            .config(config)
            .run_id("a1")
            .on_progress(move |update| states_clone.lock().unwrap().push(update.state))
            .build()
            .unwrap()
            .process(patients())
            .unwrap_err();

        assert!(matches!(err, CleaningError::RunFailed { .. }));
        assert!(err.audit_path().is_none());
        let audit = err.audit_log().unwrap();
        assert_eq!(
            audit.fatal_entry().map(|e| e.phase),
            Some(Some(PipelineState::Exported))
        );
        assert_eq!(states.lock().unwrap().last(), Some(&PipelineState::Failed));
        assert!(!dir.path().join("clean.csv").exists());
        assert!(!dir.path().join("quality_metrics_a1.json").exists());
    }
}
