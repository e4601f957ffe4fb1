//! Append-only audit trail of one pipeline run.

use super::progress::PipelineState;
use crate::error::Result;
use crate::types::{IssueKind, Severity, StageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ordered record of every rule evaluated during one run.
///
/// Entries can only be appended. [`AuditLog::persist`] consumes the log, so
/// a persisted log cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    run_id: String,
    started_at: DateTime<Utc>,
    entries: Vec<StageResult>,
}

/// A log that has been written to disk.
#[derive(Debug, Clone)]
pub struct PersistedAudit {
    pub log: AuditLog,
    pub path: PathBuf,
}

impl AuditLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Run id derived from the current time, unique per run.
    pub fn generate_run_id() -> String {
        Utc::now().format("%Y%m%dT%H%M%S%.9fZ").to_string()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Append one entry, stamping the phase it was recorded in.
    pub fn record(&mut self, phase: PipelineState, mut result: StageResult) {
        result.phase = Some(phase);
        debug!(
            "[{}] {} {}: before={} after={} affected={}",
            phase.display_name(),
            result.stage,
            result.rule_id,
            result.records_before,
            result.records_after,
            result.records_affected
        );
        self.entries.push(result);
    }

    pub fn entries(&self) -> &[StageResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded in one phase.
    pub fn in_phase(&self, phase: PipelineState) -> impl Iterator<Item = &StageResult> {
        self.entries
            .iter()
            .filter(move |entry| entry.phase == Some(phase))
    }

    /// Entries of one stage recorded in one phase.
    pub fn find<'a>(
        &'a self,
        phase: PipelineState,
        stage: &'a str,
    ) -> impl Iterator<Item = &'a StageResult> {
        self.in_phase(phase).filter(move |entry| entry.stage == stage)
    }

    /// Entries carrying a particular issue kind.
    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &StageResult> {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }

    /// The fatal entry that ended the run, if any.
    pub fn fatal_entry(&self) -> Option<&StageResult> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.severity == Severity::Fatal && entry.kind == IssueKind::FatalStageError)
    }

    /// File name used when persisting into a directory.
    pub fn file_name(&self) -> String {
        format!("audit_{}.jsonl", self.run_id)
    }

    /// Write the log as JSON Lines, one entry per line, and seal it.
    pub fn persist(self, dir: impl AsRef<Path>) -> Result<PersistedAudit> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());

        let mut writer = BufWriter::new(File::create(&path)?);
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        info!("Audit log saved: {} ({} entries)", path.display(), self.entries.len());
        Ok(PersistedAudit { log: self, path })
    }

    /// Read back the entries of a persisted log.
    pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<StageResult>> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// One line of narration per entry, in recording order.
    pub fn narrate(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| {
                let phase = entry
                    .phase
                    .map(|p| p.display_name())
                    .unwrap_or("Unphased");
                // Parameterised stages carry a fuller label than their name
                let stage = entry
                    .details
                    .get("label")
                    .and_then(|label| label.as_str())
                    .unwrap_or(entry.stage.as_str());
                let mut line = format!(
                    "[{}] {} ({}): {} -> {} records, {} affected",
                    phase,
                    stage,
                    entry.rule_id,
                    entry.records_before,
                    entry.records_after,
                    entry.records_affected
                );
                if let Some(message) = &entry.message {
                    line.push_str(" - ");
                    line.push_str(message);
                }
                line
            })
            .collect()
    }
}
