//! Opinion extraction engine.
//!
//! This module is the *internal entry point* for clause-level extraction. Each
//! stage lives in its own submodule under `src/engine/`; the document loop that
//! drives them lives in [`crate::api`].
//!
//! ## How the parts work together
//!
//! ```text
//! rule file ──┐
//!             │  CompiledRules::compile            (compiled_rules.rs)
//!             └──────────────┬────────────────
//!                            │
//! clause ── mark_anchors ────┼─ lexicon hits, hooks, joint phrases, badcases
//!           (anchors.rs)     │
//!                            v
//!                  Groups::scan (groups.rs)
//!                    - phrase / coordination / fixed pairs
//!                    - negation, degree chains, pronouns
//!                            │
//!                            v
//!                  Matcher::run (matcher.rs)
//!                    - seed anchors, walk edge traces
//!                    - built-in default-match patterns
//!                            │
//!                            v
//!                  Assembler::assemble (expand.rs)
//!                    - combine, subtree, coordination records
//!                    - group completion, negation
//!                            │
//!                            v
//!       drop_subsumed ─ OpinionFilter ─ merge_similar
//!        (dedup.rs)     (resolve.rs)     (dedup.rs)
//!                            │
//!                            v
//!                  Scorer::score (score.rs)
//!                            │
//!                            v
//!                 Vec<(Opinion, Sentiment)>
//! ```
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: parses the rule file into immutable `CompiledPattern`s
//!   and a per-anchor-lemma activation index.
//! - `anchors.rs`: flags sentiment-bearing tokens before matching.
//! - `groups.rs`: per-clause indices the assembler completes spans from.
//! - `matcher.rs`: binds pattern nodes to tokens.
//! - `expand.rs`: turns bindings into role-tagged candidates.
//! - `resolve.rs`: clause-level acceptance checks and element texts.
//! - `dedup.rs`: subsumption and similarity merging.
//! - `score.rs`: sentiment and intensity.
//! - `pipeline.rs`: runs one clause through all of the above.
//! - `metrics.rs`: per-stage timings.
//!
//! ## Debugging
//!
//! Every stage logs through `tracing`. Run with `SENTIRO_LOG=debug` (or
//! `RUST_LOG=sentiro=debug`) to see bindings, drops and scores.

#[path = "engine/anchors.rs"]
mod anchors;
#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/expand.rs"]
mod expand;
#[path = "engine/groups.rs"]
mod groups;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/pipeline.rs"]
mod pipeline;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/score.rs"]
mod score;

pub use compiled_rules::{
    AttrFilter, CompiledPattern, CompiledRules, ContextCondition, Direction, NodeConstraint, PatternEdge, PatternId,
    PatternNode, SpecialDirective,
};
pub use metrics::{ClauseMetrics, RunMetrics};

pub(crate) use dedup::element_compactness;
pub(crate) use pipeline::ClauseContext;
pub(crate) use resolve::{Opinion, PRONOUN_TAG};
pub(crate) use score::Sentiment;
