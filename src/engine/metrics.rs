//! Engine run metrics.
//!
//! Timings and counts collected while a document runs through the clause
//! pipeline. [`Engine::extract`](crate::Engine::extract) always fills them in;
//! they are cheap (a handful of `Instant::now` calls per clause) and are what the
//! CLI report prints.
//!
//! ## Design notes
//!
//! - Stage durations are per clause; [`RunMetrics`] sums them on demand.
//! - Skipped clauses have no entry.

use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunMetrics {
    /// Total elapsed time for the document.
    pub total: Duration,
    /// One entry per clause that reached the clause pipeline.
    pub clauses: Vec<ClauseMetrics>,
}

impl RunMetrics {
    pub fn results(&self) -> usize {
        self.clauses.iter().map(|c| c.results).sum()
    }

    /// Sum of one stage over every clause.
    pub fn stage_total(&self, stage: impl Fn(&ClauseMetrics) -> Duration) -> Duration {
        self.clauses.iter().map(stage).sum()
    }
}

/// Timing and candidate counts for a single clause.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClauseMetrics {
    /// Clause position in the document.
    pub index: usize,
    pub anchors: Duration,
    pub groups: Duration,
    pub matching: Duration,
    pub assembly: Duration,
    pub dedup: Duration,
    pub scoring: Duration,
    /// Raw pattern bindings.
    pub bindings: usize,
    /// Candidates after assembly.
    pub candidates: usize,
    /// Scored results.
    pub results: usize,
}

impl ClauseMetrics {
    pub fn total(&self) -> Duration {
        self.anchors + self.groups + self.matching + self.assembly + self.dedup + self.scoring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_totals_sum_clauses() {
        let clause = |ms: u64, results: usize| ClauseMetrics {
            matching: Duration::from_millis(ms),
            scoring: Duration::from_millis(1),
            results,
            ..ClauseMetrics::default()
        };
        let metrics = RunMetrics { total: Duration::from_millis(20), clauses: vec![clause(2, 1), clause(3, 2)] };
        assert_eq!(metrics.stage_total(|c| c.matching), Duration::from_millis(5));
        assert_eq!(metrics.clauses[0].total(), Duration::from_millis(3));
        assert_eq!(metrics.results(), 3);
    }
}
