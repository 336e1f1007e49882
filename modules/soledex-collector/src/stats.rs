//! Run statistics and the report artifact. Counters are owned and
//! mutated only by the coordinator's fold loop — workers report
//! outcomes, they never touch shared stats.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Bounded tail of recent error messages carried into the report.
const ERROR_TAIL: usize = 20;

/// Counters for one collection run. Reset at run start, flushed into a
/// [`RunReport`] at run end or on interrupt.
#[derive(Debug, Default, Serialize)]
pub struct RunStats {
    pub items_seen: u32,
    /// New catalog entities created.
    pub items_accepted: u32,
    /// Sightings that matched an existing entity (fields filled only).
    pub items_enriched: u32,
    pub images_considered: u32,
    pub images_accepted: u32,
    pub duplicates_rejected: u32,
    pub quality_rejected: u32,
    /// Work items skipped because a source was exhausted.
    pub budget_skipped: u32,
    pub storage_failures: u32,
    pub errors: u32,
    /// Items accepted per source id.
    pub by_source: HashMap<String, u32>,
    pub recent_errors: Vec<String>,
}

impl RunStats {
    /// Fold a worker's per-batch delta into the run totals. Only the
    /// coordinator's fold loop calls this.
    pub fn merge(&mut self, delta: RunStats) {
        self.items_seen += delta.items_seen;
        self.items_accepted += delta.items_accepted;
        self.items_enriched += delta.items_enriched;
        self.images_considered += delta.images_considered;
        self.images_accepted += delta.images_accepted;
        self.duplicates_rejected += delta.duplicates_rejected;
        self.quality_rejected += delta.quality_rejected;
        self.budget_skipped += delta.budget_skipped;
        self.storage_failures += delta.storage_failures;
        self.errors += delta.errors;
        for (source, count) in delta.by_source {
            *self.by_source.entry(source).or_insert(0) += count;
        }
        for message in delta.recent_errors {
            if self.recent_errors.len() == ERROR_TAIL {
                self.recent_errors.remove(0);
            }
            self.recent_errors.push(message);
        }
    }

    pub fn record_error(&mut self, message: String) {
        self.errors += 1;
        if self.recent_errors.len() == ERROR_TAIL {
            self.recent_errors.remove(0);
        }
        self.recent_errors.push(message);
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Collection Run Complete ===")?;
        writeln!(f, "Items seen:          {}", self.items_seen)?;
        writeln!(f, "Items accepted:      {}", self.items_accepted)?;
        writeln!(f, "Items enriched:      {}", self.items_enriched)?;
        writeln!(f, "Images considered:   {}", self.images_considered)?;
        writeln!(f, "Images accepted:     {}", self.images_accepted)?;
        writeln!(f, "Duplicates rejected: {}", self.duplicates_rejected)?;
        writeln!(f, "Quality rejected:    {}", self.quality_rejected)?;
        writeln!(f, "Budget skipped:      {}", self.budget_skipped)?;
        writeln!(f, "Storage failures:    {}", self.storage_failures)?;
        writeln!(f, "Errors:              {}", self.errors)?;
        if !self.by_source.is_empty() {
            writeln!(f, "\nAccepted by source:")?;
            let mut sources: Vec<_> = self.by_source.iter().collect();
            sources.sort_by(|a, b| b.1.cmp(a.1));
            for (source, count) in sources {
                writeln!(f, "  {source}: {count}")?;
            }
        }
        Ok(())
    }
}

/// Terminal state of the coordinator's run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Worklist exhausted or targets reached.
    Completed,
    /// Deadline elapsed or a stop signal arrived; committed progress kept.
    Cancelled,
    /// The run itself could not proceed (e.g. store unavailable).
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetLine {
    pub source: String,
    pub used: u32,
    pub limit: u32,
}

/// The structured record emitted at run end, consumed by operational
/// tooling.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub stats: RunStats,
    pub budget: Vec<BudgetLine>,
}

impl RunReport {
    pub fn new(
        outcome: RunOutcome,
        started_at: DateTime<Utc>,
        stats: RunStats,
        budget: Vec<BudgetLine>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            outcome,
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at).num_seconds(),
            stats,
            budget,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_tail_is_bounded() {
        let mut stats = RunStats::default();
        for i in 0..50 {
            stats.record_error(format!("error {i}"));
        }
        assert_eq!(stats.errors, 50);
        assert_eq!(stats.recent_errors.len(), ERROR_TAIL);
        assert_eq!(stats.recent_errors.last().unwrap(), "error 49");
        assert_eq!(stats.recent_errors.first().unwrap(), "error 30");
    }

    #[test]
    fn report_serializes_with_outcome_code() {
        let report = RunReport::new(
            RunOutcome::Cancelled,
            Utc::now(),
            RunStats::default(),
            vec![BudgetLine {
                source: "stockx".to_string(),
                used: 3,
                limit: 5,
            }],
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"cancelled\""));
        assert!(json.contains("\"stockx\""));
    }
}
