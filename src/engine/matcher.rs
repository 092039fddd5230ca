//! Dependency pattern matcher.
//!
//! Binds every active [`CompiledPattern`] against a clause's dependency tree.
//!
//! ## Key concepts
//!
//! - **Seed**: each token accepted by the pattern's node 0 starts one partial
//!   binding.
//! - **Edge walk**: edges are consumed in trace order. A `ParentOf` edge looks for
//!   the new node among the known token's children, a `ChildOf` edge looks at the
//!   known token's head.
//! - **Fork**: every legal candidate for an edge yields its own partial binding;
//!   a binding with no candidate is dropped.
//!
//! ```text
//! seed(anchor=3) ──edge 0──> {3, 1} ──edge 1──> {3, 1, 5}   complete
//!                      └───> {3, 7} ──edge 1──> (no candidate, dropped)
//! ```
//!
//! Expansion uses an explicit stack instead of recursion. Output order is
//! deterministic: patterns in rule order, seeds in token order, forks in
//! candidate order.

use super::compiled_rules::{CompiledPattern, CompiledRules, Direction, PatternId};
use crate::Clause;
use std::collections::{BTreeMap, BTreeSet};

/// One complete binding: `tokens[node]` is the token bound to pattern node `node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchBinding {
    /// Index into `CompiledRules::patterns`.
    pub slot: usize,
    pub pattern: PatternId,
    pub tokens: Vec<usize>,
}

impl MatchBinding {
    pub fn anchor(&self) -> usize {
        self.tokens[0]
    }
}

/// A pattern bound up to (not including) `next_edge`.
///
/// ```text
/// trace:  [(0 > 1), (0 > 2)]
///                   ^ next_edge = 1
/// tokens: [3, 1]    (node 0 -> token 3, node 1 -> token 1)
/// ```
struct PartialBinding<'a> {
    pattern: &'a CompiledPattern,
    next_edge: usize,
    tokens: Vec<usize>,
}

pub struct Matcher<'a> {
    clause: &'a Clause,
    rules: &'a CompiledRules,
}

impl<'a> Matcher<'a> {
    pub fn new(clause: &'a Clause, rules: &'a CompiledRules) -> Self {
        Matcher { clause, rules }
    }

    /// Bind every active rule pattern.
    pub fn run(&self) -> Vec<MatchBinding> {
        let mut bindings = Vec::new();
        for slot in self.rules.active_for(self.clause) {
            let pattern = &self.rules.patterns[slot];
            for tokens in self.match_all(self.seed(pattern)) {
                bindings.push(MatchBinding { slot, pattern: pattern.id, tokens });
            }
        }
        tracing::debug!(count = bindings.len(), "pattern bindings");
        bindings
    }

    /// Run the built-in prepositional patterns and keep, per pattern and unit root,
    /// the companions of the last binding whose nearest companion lies within `max_distance`.
    pub fn default_matches(&self, max_distance: usize) -> BTreeMap<&'static str, BTreeMap<usize, BTreeSet<usize>>> {
        let mut out: BTreeMap<&'static str, BTreeMap<usize, BTreeSet<usize>>> = BTreeMap::new();
        for generic in &self.rules.generic {
            for tokens in self.match_all(self.seed(&generic.pattern)) {
                let root = tokens[generic.unit_root];
                let companions: BTreeSet<usize> =
                    tokens.iter().enumerate().filter(|&(node, _)| node != generic.unit_root).map(|(_, &t)| t).collect();
                let Some(&nearest) = companions.first() else {
                    continue;
                };
                if nearest.abs_diff(root) <= max_distance {
                    out.entry(generic.name).or_default().insert(root, companions);
                }
            }
        }
        out
    }

    fn seed(&self, pattern: &'a CompiledPattern) -> Vec<PartialBinding<'a>> {
        let constraint = &pattern.nodes[0].constraint;
        self.clause
            .tokens()
            .iter()
            .filter(|t| constraint.accepts(t))
            .map(|t| PartialBinding { pattern, next_edge: 0, tokens: vec![t.index] })
            .collect()
    }

    /// Tokens that may bind the `new` node of the next edge of `m`.
    fn candidates(&self, m: &PartialBinding<'a>) -> Vec<usize> {
        let edge = m.pattern.trace[m.next_edge];
        let known = m.tokens[edge.known];
        let constraint = &m.pattern.nodes[edge.new].constraint;
        let pool: Vec<usize> = match edge.direction {
            Direction::ParentOf => self.clause.children(known).to_vec(),
            Direction::ChildOf => self.clause.head(known).into_iter().collect(),
        };
        pool.into_iter().filter(|t| !m.tokens.contains(t) && constraint.accepts(self.clause.token(*t))).collect()
    }

    /// Depth-first expansion of partial bindings until every edge is bound.
    fn match_all(&self, starts: Vec<PartialBinding<'a>>) -> Vec<Vec<usize>> {
        let mut results = Vec::new();
        let mut stack = starts;
        stack.reverse();

        while let Some(m) = stack.pop() {
            if m.next_edge >= m.pattern.trace.len() {
                results.push(m.tokens);
                continue;
            }

            // Push in reverse order so candidates are explored in forward order (stack is LIFO)
            for candidate in self.candidates(&m).into_iter().rev() {
                let mut tokens = m.tokens.clone();
                tokens.push(candidate);
                stack.push(PartialBinding { pattern: m.pattern, next_edge: m.next_edge + 1, tokens });
            }
        }

        results
    }
}
