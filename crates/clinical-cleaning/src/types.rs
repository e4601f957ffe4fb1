use crate::pipeline::PipelineState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How serious a rule violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Halts the run.
    Fatal,
    /// Offending records are removed or rewritten and the run continues.
    Correctable,
    /// Recorded for the report only.
    Informational,
}

/// What an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The rule matched no records.
    Clean,
    /// The rule matched one or more records.
    RuleViolation,
    /// A categorical value outside the expected set passed through unmapped.
    UnexpectedCategory,
    /// Read-only measurement (missing value report, export).
    Diagnostic,
    /// The evaluation left the dataset unusable.
    FatalStageError,
}

/// Effect of one rule evaluated by one stage.
///
/// `records_after <= records_before` holds for filtering stages and
/// `records_after == records_before` for transforms and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub rule_id: String,
    /// Pipeline phase the entry was recorded in. Set by the audit log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<PipelineState>,
    pub severity: Severity,
    pub kind: IssueKind,
    /// Column the rule is about, when it targets one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub records_before: usize,
    pub records_after: usize,
    pub records_affected: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl StageResult {
    /// Create a result for a stage that went from `before` to `after` rows.
    ///
    /// `records_affected` defaults to the number of rows removed.
    pub fn new(
        stage: impl Into<String>,
        rule_id: impl Into<String>,
        records_before: usize,
        records_after: usize,
    ) -> Self {
        let affected = records_before.saturating_sub(records_after);
        Self {
            stage: stage.into(),
            rule_id: rule_id.into(),
            phase: None,
            severity: Severity::Correctable,
            kind: Self::kind_for(affected),
            field: None,
            records_before,
            records_after,
            records_affected: affected,
            timestamp: Utc::now(),
            message: None,
            details: BTreeMap::new(),
        }
    }

    fn kind_for(affected: usize) -> IssueKind {
        if affected > 0 {
            IssueKind::RuleViolation
        } else {
            IssueKind::Clean
        }
    }

    /// Override the affected count (for stages that rewrite instead of remove).
    pub fn with_affected(mut self, affected: usize) -> Self {
        self.records_affected = affected;
        if matches!(self.kind, IssueKind::Clean | IssueKind::RuleViolation) {
            self.kind = Self::kind_for(affected);
        }
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_kind(mut self, kind: IssueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Whether this entry records rows leaving the dataset.
    pub fn removed_records(&self) -> bool {
        self.records_after < self.records_before
    }
}

/// Missing-value count for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing_count: usize,
    pub missing_percentage: f64,
}

/// Summary metrics computed once from the final dataset and the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub total_records: usize,
    pub total_variables: usize,
    pub missing_cells: usize,
    /// `100 * (1 - missing_cells / (rows * cols))`, two decimals.
    pub completeness_pct: f64,
    pub duplicate_count: usize,
    pub missing_key_count: usize,
    pub out_of_range_count_by_field: BTreeMap<String, usize>,
    pub unexpected_category_count: usize,
    pub values_standardized: usize,
    pub missing_by_column: Vec<ColumnMissing>,
}

impl QualityMetrics {
    /// Total number of records removed by rule violations.
    pub fn records_removed(&self) -> usize {
        self.duplicate_count
            + self.missing_key_count
            + self.out_of_range_count_by_field.values().sum::<usize>()
    }

    /// Issue counts per category, in a stable order.
    pub fn issue_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("duplicates", self.duplicate_count),
            ("missing_key", self.missing_key_count),
            (
                "out_of_range",
                self.out_of_range_count_by_field.values().sum(),
            ),
            ("unexpected_category", self.unexpected_category_count),
            ("missing_cells", self.missing_cells),
        ]
    }
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: String,
    pub final_state: PipelineState,
    /// Rows in the dataset handed to the runner.
    pub records_imported: usize,
    pub cleaned: polars::frame::DataFrame,
    pub metrics: QualityMetrics,
    pub audit: crate::pipeline::AuditLog,
    /// Set when the run exported to disk.
    pub output_path: Option<std::path::PathBuf>,
    pub audit_path: Option<std::path::PathBuf>,
    pub metrics_path: Option<std::path::PathBuf>,
    pub duration_ms: u64,
}
