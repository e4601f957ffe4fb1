use crate::config::CleaningConfig;
use crate::error::Result;
use crate::pipeline::{AuditLog, PipelineState};
use crate::types::{PipelineResult, QualityMetrics, StageResult};
use chrono::Utc;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Report Types
// ============================================================================

/// Everything known about a finished run, in one serializable value.
///
/// Printed by the CLI under `--json` and usable as-is in library mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    pub run_id: String,
    /// Path to the input file
    pub input_file: String,
    /// Path to the cleaned dataset (if written)
    pub output_file: Option<String>,
    pub audit_file: Option<String>,
    pub metrics_file: Option<String>,
    pub final_state: PipelineState,
    pub duration_ms: u64,
    pub records_before: usize,
    pub records_after: usize,
    pub metrics: QualityMetrics,
    /// Issue counts per category
    pub issue_counts: Vec<IssueCount>,
    /// Audit narration, one line per entry
    pub narrative: Vec<String>,
    pub audit_entries: Vec<StageResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCount {
    pub category: String,
    pub count: usize,
}

// ============================================================================
// Exporter
// ============================================================================

/// Writes run outputs into one directory.
///
/// File names:
/// - `<output_name>.csv` for the cleaned dataset
/// - `quality_metrics_<run_id>.json` for the metrics snapshot
/// - `audit_<run_id>.jsonl` for the audit log (written by [`AuditLog::persist`])
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    output_name: String,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::from_config(&CleaningConfig::default())
    }
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>, output_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_name: output_name.into(),
        }
    }

    pub fn from_config(config: &CleaningConfig) -> Self {
        Self::new(config.output_dir.clone(), config.output_name.clone())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.output_name))
    }

    pub fn metrics_path(&self, run_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("quality_metrics_{}.json", run_id))
    }

    /// Write the cleaned dataset as CSV with a header row. Nulls are written
    /// as empty cells.
    pub fn write_dataset(&self, df: &DataFrame) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.dataset_path();
        let mut file = File::create(&output_path)?;

        // CsvWriter needs a mutable frame for chunk alignment
        let mut df = df.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(&mut df)?;

        info!("Dataset saved: {} ({} records)", output_path.display(), df.height());
        Ok(output_path)
    }

    /// Write the metrics snapshot as pretty-printed JSON.
    pub fn write_metrics(&self, metrics: &QualityMetrics, run_id: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let metrics_path = self.metrics_path(run_id);
        let mut file = File::create(&metrics_path)?;
        file.write_all(serde_json::to_string_pretty(metrics)?.as_bytes())?;

        info!("Quality metrics saved: {}", metrics_path.display());
        Ok(metrics_path)
    }

    /// Remove outputs written by a run that did not complete.
    pub fn discard(&self, paths: &[&Path]) {
        for path in paths {
            match fs::remove_file(path) {
                Ok(()) => info!("Removed partial output {}", path.display()),
                Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
            }
        }
    }

    /// Build a report from a finished run.
    pub fn build_report(input_file: &str, result: &PipelineResult) -> CleaningReport {
        let path_string = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());

        CleaningReport {
            generated_at: Utc::now().to_rfc3339(),
            run_id: result.run_id.clone(),
            input_file: input_file.to_string(),
            output_file: path_string(&result.output_path),
            audit_file: path_string(&result.audit_path),
            metrics_file: path_string(&result.metrics_path),
            final_state: result.final_state,
            duration_ms: result.duration_ms,
            records_before: result.records_imported,
            records_after: result.cleaned.height(),
            metrics: result.metrics.clone(),
            issue_counts: result
                .metrics
                .issue_counts()
                .into_iter()
                .map(|(category, count)| IssueCount {
                    category: category.to_string(),
                    count,
                })
                .collect(),
            narrative: result.audit.narrate(),
            audit_entries: result.audit.entries().to_vec(),
        }
    }

    /// Human-readable run summary: metrics followed by the audit narration.
    pub fn render_summary(metrics: &QualityMetrics, audit: &AuditLog) -> String {
        let mut out = String::new();
        out.push_str(&format!("Run {}\n", audit.run_id()));
        out.push_str(&format!(
            "Records: {}  Variables: {}  Completeness: {:.2}%\n",
            metrics.total_records, metrics.total_variables, metrics.completeness_pct
        ));
        out.push_str("Issues:\n");
        for (category, count) in metrics.issue_counts() {
            out.push_str(&format!("  {:<20} {}\n", category, count));
        }
        for (field, count) in &metrics.out_of_range_count_by_field {
            out.push_str(&format!("    out_of_range[{}] {}\n", field, count));
        }
        out.push_str("Audit trail:\n");
        for line in audit.narrate() {
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageResult;

    fn metrics() -> QualityMetrics {
        QualityMetrics {
            total_records: 2,
            total_variables: 3,
            missing_cells: 0,
            completeness_pct: 100.0,
            duplicate_count: 1,
            missing_key_count: 1,
            out_of_range_count_by_field: [("Age".to_string(), 1)].into(),
            unexpected_category_count: 0,
            values_standardized: 2,
            missing_by_column: Vec::new(),
        }
    }

    #[test]
    fn test_write_dataset_and_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path(), "cleaned");
        let df = df!(
            "PatientID" => [Some("P001"), Some("P002")],
            "Age" => [Some(45i64), None]
        )
        .unwrap();

        let csv_path = exporter.write_dataset(&df).unwrap();
        assert!(csv_path.ends_with("cleaned.csv"));
        let content = fs::read_to_string(&csv_path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("PatientID,Age"));
        assert_eq!(lines.next(), Some("P001,45"));
        assert_eq!(lines.next(), Some("P002,"));

        let metrics_path = exporter.write_metrics(&metrics(), "run-1").unwrap();
        assert!(metrics_path.ends_with("quality_metrics_run-1.json"));
        let parsed: QualityMetrics =
            serde_json::from_str(&fs::read_to_string(metrics_path).unwrap()).unwrap();
        assert_eq!(parsed, metrics());
    }

    #[test]
    fn test_discard_removes_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path(), "cleaned");
        let csv_path = exporter.write_dataset(&df!("n" => [1i64]).unwrap()).unwrap();
        let metrics_path = exporter.write_metrics(&metrics(), "run-2").unwrap();

        exporter.discard(&[csv_path.as_path(), metrics_path.as_path()]);
        assert!(!csv_path.exists());
        assert!(!metrics_path.exists());
    }

    #[test]
    fn test_render_summary_includes_narration() {
        let mut audit = AuditLog::new("summary-run");
        audit.record(
            PipelineState::Cleaned,
            StageResult::new("Deduplicate", "no_duplicates", 5, 4),
        );
        let summary = Exporter::render_summary(&metrics(), &audit);

        assert!(summary.starts_with("Run summary-run"));
        assert!(summary.contains("Completeness: 100.00%"));
        assert!(summary.contains("out_of_range[Age]"));
        assert!(summary.contains("[Cleaned] Deduplicate (no_duplicates): 5 -> 4 records, 1 affected"));
    }
}
