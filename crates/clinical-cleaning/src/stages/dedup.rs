use super::{Stage, StageOutput, names};
use crate::error::Result;
use crate::rules::ValidationRule;
use crate::types::StageResult;
use polars::prelude::*;
use tracing::debug;

/// Removes records that exactly repeat an earlier record.
///
/// This is a stable filter: the first occurrence is kept and the surviving
/// records stay in input order.
#[derive(Debug, Clone)]
pub struct Deduplicate {
    rule: ValidationRule,
}

impl Default for Deduplicate {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicate {
    pub fn new() -> Self {
        Self {
            rule: ValidationRule::no_duplicates(),
        }
    }
}

impl Stage for Deduplicate {
    fn name(&self) -> &str {
        names::DEDUPLICATE
    }

    fn rule(&self) -> &ValidationRule {
        &self.rule
    }

    fn apply(&self, df: &DataFrame) -> Result<StageOutput> {
        let before = df.height();
        let data = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
        let after = data.height();

        debug!("Removed {} duplicate records", before - after);

        let result = StageResult::new(self.name(), &self.rule.id, before, after)
            .with_severity(self.rule.severity)
            .with_message(format!("{} exact duplicate records removed", before - after));
        Ok(StageOutput::new(data, result))
    }
}
