//! Clause pipeline.
//!
//! Runs one validated clause through every stage and returns the scored
//! opinions with per-stage timings:
//!
//! ```text
//! anchors ─> groups ─> matcher ─> assembler ─> subsumption ─> filter ─> merge ─> scorer
//! ```
//!
//! A clause without anchors stops after the first stage.

use super::anchors::mark_anchors;
use super::compiled_rules::CompiledRules;
use super::dedup::{drop_subsumed, merge_similar};
use super::expand::Assembler;
use super::groups::Groups;
use super::matcher::Matcher;
use super::metrics::ClauseMetrics;
use super::resolve::{Opinion, OpinionFilter};
use super::score::{Scorer, Sentiment};
use crate::Clause;
use crate::config::EngineConfig;
use crate::lexicon::Lexicon;
use crate::services::Services;
use std::time::Instant;

/// Everything the clause pipeline reads. Shared, never mutated.
pub struct ClauseContext<'a> {
    pub rules: &'a CompiledRules,
    pub lexicon: &'a Lexicon,
    pub config: &'a EngineConfig,
    pub services: &'a Services,
}

impl ClauseContext<'_> {
    pub fn run_clause(&self, clause: &mut Clause, index: usize) -> (Vec<(Opinion, Sentiment)>, ClauseMetrics) {
        let mut metrics = ClauseMetrics { index, ..ClauseMetrics::default() };

        let started = Instant::now();
        let anchors = mark_anchors(clause, self.lexicon);
        metrics.anchors = started.elapsed();
        if clause.anchors().is_empty() {
            tracing::debug!(index, "no anchors, clause skipped");
            return (Vec::new(), metrics);
        }
        let clause = &*clause;

        let started = Instant::now();
        let mut groups = Groups::scan(clause, self.lexicon, &self.config.groups);
        metrics.groups = started.elapsed();

        let started = Instant::now();
        let matcher = Matcher::new(clause, self.rules);
        groups.default_matches = matcher.default_matches(self.config.groups.default_match_distance);
        let bindings = matcher.run();
        metrics.matching = started.elapsed();
        metrics.bindings = bindings.len();

        let started = Instant::now();
        let candidates = Assembler::new(clause, self.rules, &groups, &self.config.assembly).assemble(bindings);
        metrics.assembly = started.elapsed();
        metrics.candidates = candidates.len();

        let started = Instant::now();
        let candidates = drop_subsumed(candidates);
        let filter = OpinionFilter::new(clause, &groups, self.lexicon, &anchors, self.config.assembly.min_span_ratio);
        let opinions = merge_similar(filter.apply(candidates), &groups.coordination_tokens(), &self.config.dedup);
        metrics.dedup = started.elapsed();

        let started = Instant::now();
        let scorer = Scorer::new(clause, &groups, self.lexicon, &anchors, self.services, &self.config.scoring);
        let scored = scorer.score(opinions);
        metrics.scoring = started.elapsed();
        metrics.results = scored.len();

        tracing::debug!(
            index,
            bindings = metrics.bindings,
            candidates = metrics.candidates,
            results = metrics.results,
            "clause done"
        );
        (scored, metrics)
    }
}
