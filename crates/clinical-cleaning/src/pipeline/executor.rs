//! Stage executor.
//!
//! Threads a dataset through rule checks and stages, appending every
//! evaluation to the audit log. The order of execution is the caller's
//! choice; [`Pipeline`](super::Pipeline) fixes it for a full run.

use super::audit::AuditLog;
use super::progress::{CancellationToken, PipelineState};
use crate::error::{CleaningError, Result};
use crate::rules::{RuleCheck, ValidationRule};
use crate::stages::{Stage, names};
use crate::types::StageResult;
use polars::prelude::*;
use tracing::{debug, info};

/// Runs checks and stages, honouring cancellation between them.
#[derive(Debug, Clone, Default)]
pub struct StageExecutor {
    cancellation_token: CancellationToken,
}

impl StageExecutor {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self { cancellation_token }
    }

    /// Fail with `Cancelled` if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(CleaningError::Cancelled);
        }
        Ok(())
    }

    /// Audit name of the read-only check for a rule.
    pub fn check_name(rule: &ValidationRule) -> &'static str {
        match rule.check {
            RuleCheck::ColumnPresent { .. } => names::SCHEMA_CHECK,
            RuleCheck::Complete => names::MISSING_CHECK,
            RuleCheck::NoDuplicates => names::DUPLICATE_CHECK,
            RuleCheck::KeyPresent { .. } => names::KEY_CHECK,
            RuleCheck::InRange(_) => names::RANGE_CHECK,
            RuleCheck::KnownCategory(_) => names::CATEGORY_CHECK,
        }
    }

    /// Evaluate rules without changing the dataset.
    ///
    /// Records one entry per rule with the number of violating records.
    /// A missing column aborts with `SchemaMismatch`.
    pub fn check_rules(
        &self,
        df: &DataFrame,
        rules: &[ValidationRule],
        phase: PipelineState,
        audit: &mut AuditLog,
    ) -> Result<()> {
        let height = df.height();
        for rule in rules {
            self.check_cancelled()?;
            let name = Self::check_name(rule);
            let violations = rule.count_violations(df, name)?;

            let mut result = StageResult::new(name, &rule.id, height, height)
                .with_affected(violations)
                .with_severity(rule.severity);
            if let Some(field) = rule.field() {
                result = result.with_field(field);
            }
            if violations > 0 {
                result = result.with_message(format!(
                    "{} of {} records violate: {}",
                    violations, height, rule.description
                ));
            }
            audit.record(phase, result);
        }
        debug!("Checked {} rules against {} records", rules.len(), height);
        Ok(())
    }

    /// Apply stages in the given order, feeding each the previous output.
    pub fn apply_stages(
        &self,
        df: DataFrame,
        stages: &[Box<dyn Stage>],
        phase: PipelineState,
        audit: &mut AuditLog,
    ) -> Result<DataFrame> {
        let mut current = df;
        for stage in stages {
            self.check_cancelled()?;
            let output = stage.apply(&current)?;
            info!(
                "{}: {} -> {} records",
                stage.name(),
                output.primary().records_before,
                output.primary().records_after
            );
            for result in output.results {
                audit.record(phase, result);
            }
            current = output.data;
        }
        Ok(current)
    }
}
