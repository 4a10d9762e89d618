//! Aggregate counters kept in step with registry mutations.

use super::{Incident, Stats};

/// Owns the [`Stats`] record.
///
/// Every method takes the already-mutated incident (or its before/after
/// critical flags) from the caller; counters are never recomputed from
/// the registry. Decrements saturate at zero.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    stats: Stats,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Stats {
        self.stats
    }

    pub fn on_create(&mut self, incident: &Incident) {
        self.stats.total += 1;
        self.stats.active += 1;
        if incident.is_critical {
            self.stats.critical += 1;
        }
    }

    pub fn on_resolve(&mut self, incident: &Incident) {
        self.stats.active = self.stats.active.saturating_sub(1);
        self.stats.resolved += 1;
        if incident.is_critical {
            self.stats.critical = self.stats.critical.saturating_sub(1);
        }
    }

    pub fn on_severity_change(&mut self, was_critical: bool, is_critical: bool) {
        match (was_critical, is_critical) {
            (false, true) => self.stats.critical += 1,
            (true, false) => self.stats.critical = self.stats.critical.saturating_sub(1),
            _ => {}
        }
    }
}
