//! Per-source request budgets: a hard per-run ceiling and a minimum
//! interval between consecutive requests. Safe under concurrent use by
//! the worker pool — one lock per source, not a global one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use soledex_common::SourceLimits;

/// Outcome of asking for one request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// A slot was consumed; the caller may make the request now.
    Allow,
    /// Interval pacing: retry after the given duration. No slot consumed.
    Deny { retry_after: Duration },
    /// Hard ceiling reached or the source was marked fatal; done for the
    /// run.
    Exhausted,
}

struct SourceState {
    used: u32,
    limit: u32,
    min_interval: Duration,
    last_request: Option<Instant>,
    exhausted: bool,
}

pub struct BudgetTracker {
    default_limits: SourceLimits,
    sources: Mutex<HashMap<String, Arc<Mutex<SourceState>>>>,
}

impl BudgetTracker {
    pub fn new(default_limits: SourceLimits) -> Self {
        Self {
            default_limits,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-register a source with explicit limits. Sources seen first in
    /// `acquire` fall back to the default limits.
    pub fn register(&self, source: &str, limits: SourceLimits) {
        let mut sources = self.sources.lock().unwrap();
        sources.insert(
            source.to_string(),
            Arc::new(Mutex::new(SourceState {
                used: 0,
                limit: limits.max_requests,
                min_interval: limits.min_interval,
                last_request: None,
                exhausted: false,
            })),
        );
    }

    fn state_for(&self, source: &str) -> Arc<Mutex<SourceState>> {
        let mut sources = self.sources.lock().unwrap();
        sources
            .entry(source.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SourceState {
                    used: 0,
                    limit: self.default_limits.max_requests,
                    min_interval: self.default_limits.min_interval,
                    last_request: None,
                    exhausted: false,
                }))
            })
            .clone()
    }

    /// Try to consume one request slot for a source. Interval pacing is
    /// checked before the ceiling, so a `Deny` never burns budget.
    pub fn acquire(&self, source: &str) -> Acquire {
        let state = self.state_for(source);
        let mut state = state.lock().unwrap();

        if state.exhausted || state.used >= state.limit {
            if !state.exhausted {
                state.exhausted = true;
                warn!(source, limit = state.limit, "Source request ceiling reached");
            }
            return Acquire::Exhausted;
        }

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < state.min_interval {
                return Acquire::Deny {
                    retry_after: state.min_interval - elapsed,
                };
            }
        }

        state.used += 1;
        state.last_request = Some(Instant::now());
        Acquire::Allow
    }

    /// Remove a source from further scheduling this run (fatal errors).
    pub fn mark_exhausted(&self, source: &str) {
        let state = self.state_for(source);
        let mut state = state.lock().unwrap();
        if !state.exhausted {
            warn!(source, "Source marked exhausted for this run");
            state.exhausted = true;
        }
    }

    pub fn is_exhausted(&self, source: &str) -> bool {
        let state = self.state_for(source);
        let state = state.lock().unwrap();
        state.exhausted || state.used >= state.limit
    }

    pub fn used(&self, source: &str) -> u32 {
        let state = self.state_for(source);
        let state = state.lock().unwrap();
        state.used
    }

    /// (source, used, limit) per known source, for the run report.
    pub fn snapshot(&self) -> Vec<(String, u32, u32)> {
        let sources = self.sources.lock().unwrap();
        let mut out: Vec<(String, u32, u32)> = sources
            .iter()
            .map(|(id, state)| {
                let state = state.lock().unwrap();
                (id.clone(), state.used, state.limit)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
