//! Coordination expansion and span assembly.
//!
//! Turns raw [`MatchBinding`]s into role-tagged [`Candidate`]s:
//!
//! ```text
//! bindings ─ context check ─ internal distance ─┬─ conj traces (long coordinations)
//!                                               ├─ #TREEROOT# targets
//!                                               └─ combine same-pattern bindings
//!                                                         │
//!            per instance: roles ─ subtree ─ coordination records
//!                                                         │
//!            per record:  completion ─ negation ─ anchor remap ─> Candidate
//! ```
//!
//! ## Design notes
//!
//! - Coordination expansion is additive: the unexpanded record always survives and
//!   each conjunct adds one record. There is no cross product.
//! - Completion shares one `existed` set per record, so a companion token joins at
//!   most one role.
//! - Conjunct path replay walks a per-pattern trace graph with an explicit stack
//!   and a visited set; input graphs are never trusted to be acyclic.

use super::compiled_rules::{CompiledRules, PatternId};
use super::groups::Groups;
use super::matcher::MatchBinding;
use crate::config::AssemblyConfig;
use crate::{Clause, Role};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Trace graph of one match, oriented from known to newly bound token.
type TraceGraph = BTreeMap<usize, BTreeSet<usize>>;

/// The four output roles of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSets {
    pub holder: BTreeSet<usize>,
    pub emotion: BTreeSet<usize>,
    pub object: BTreeSet<usize>,
    pub reason: BTreeSet<usize>,
}

impl RoleSets {
    fn get_mut(&mut self, role: Role) -> Option<&mut BTreeSet<usize>> {
        match role {
            Role::Holder => Some(&mut self.holder),
            Role::Emotion => Some(&mut self.emotion),
            Role::Object => Some(&mut self.object),
            Role::Reason => Some(&mut self.reason),
            Role::Placeholder => None,
        }
    }

    /// Role owning `token`. Later roles win when a token sits in several.
    fn role_of(&self, token: usize) -> Option<Role> {
        [
            (Role::Reason, &self.reason),
            (Role::Object, &self.object),
            (Role::Emotion, &self.emotion),
            (Role::Holder, &self.holder),
        ]
        .into_iter()
        .find(|(_, set)| set.contains(&token))
        .map(|(role, _)| role)
    }

    fn union(&self) -> BTreeSet<usize> {
        self.holder.iter().chain(&self.emotion).chain(&self.object).chain(&self.reason).copied().collect()
    }
}

/// One assembled opinion candidate, in clause-local token ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pattern: PatternId,
    pub anchor: usize,
    pub roles: RoleSets,
    pub placeholders: BTreeSet<usize>,
    pub emotion_negated: bool,
    /// Emotion tokens that carry a negator.
    pub emotion_negated_heads: BTreeSet<usize>,
    pub reason_negated: bool,
    pub reason_negated_heads: BTreeSet<usize>,
}

impl Candidate {
    /// Union of every role and the placeholders.
    pub fn combined(&self) -> BTreeSet<usize> {
        let mut all = self.roles.union();
        all.extend(&self.placeholders);
        all
    }
}

/// Bindings of one pattern merged into a single instance.
#[derive(Debug, Clone)]
struct Instance {
    slot: usize,
    anchor: usize,
    tokens: Vec<usize>,
}

pub struct Assembler<'a> {
    clause: &'a Clause,
    rules: &'a CompiledRules,
    groups: &'a Groups,
    config: &'a AssemblyConfig,
}

impl<'a> Assembler<'a> {
    pub fn new(
        clause: &'a Clause,
        rules: &'a CompiledRules,
        groups: &'a Groups,
        config: &'a AssemblyConfig,
    ) -> Self {
        Assembler { clause, rules, groups, config }
    }

    pub fn assemble(&self, bindings: Vec<MatchBinding>) -> Vec<Candidate> {
        let bindings: Vec<MatchBinding> =
            bindings.into_iter().filter(|b| self.context_ok(b) && self.internal_distance_ok(b)).collect();

        let traces = self.conj_traces(&bindings);
        let special = self.subtree_targets(&bindings);

        let mut candidates = Vec::new();
        for instance in combine(self.rules, &bindings, self.config.combine_distance) {
            let no_traces = Vec::new();
            let traces = traces.get(&instance.slot).unwrap_or(&no_traces);
            candidates.extend(self.extract(&instance, special.get(&instance.slot).copied(), traces));
        }
        tracing::debug!(bindings = bindings.len(), candidates = candidates.len(), "assembled");
        candidates
    }

    fn context_ok(&self, binding: &MatchBinding) -> bool {
        let pattern = &self.rules.patterns[binding.slot];
        let ok = pattern.conditions.iter().all(|(&node, cond)| cond.accepts(self.clause, binding.tokens[node]));
        if !ok {
            tracing::debug!(pattern = binding.pattern, tokens = ?binding.tokens, "dropped by context condition");
        }
        ok
    }

    /// Same-role neighbours in the pattern must stay close in the clause.
    fn internal_distance_ok(&self, binding: &MatchBinding) -> bool {
        let pattern = &self.rules.patterns[binding.slot];
        let ok = pattern.trace.iter().all(|edge| {
            let (known, new) = (binding.tokens[edge.known], binding.tokens[edge.new]);
            known.abs_diff(new) <= self.config.internal_distance || pattern.role(edge.known) != pattern.role(edge.new)
        });
        if !ok {
            tracing::debug!(pattern = binding.pattern, tokens = ?binding.tokens, "dropped by internal distance");
        }
        ok
    }

    /// For every long-distance coordination root bound by a match, record the
    /// part of the match trace that starts at the root. Keyed by pattern slot.
    fn conj_traces(&self, bindings: &[MatchBinding]) -> HashMap<usize, Vec<TraceGraph>> {
        let far_roots: BTreeSet<usize> = self
            .groups
            .conj_roots
            .iter()
            .filter(|(_, units)| units.iter().any(|u| u.distance > self.config.direct_substitution_distance))
            .map(|(&root, _)| root)
            .collect();

        let mut traces: HashMap<usize, Vec<TraceGraph>> = HashMap::new();
        for binding in bindings {
            let pattern = &self.rules.patterns[binding.slot];
            for (start, &root) in binding.tokens.iter().enumerate() {
                if !far_roots.contains(&root) {
                    continue;
                }
                let mut graph = TraceGraph::new();
                for edge in pattern.trace.iter().skip(start) {
                    graph.entry(binding.tokens[edge.known]).or_default().insert(binding.tokens[edge.new]);
                }
                traces.entry(binding.slot).or_default().push(graph);
            }
        }
        traces
    }

    /// `#TREEROOT#` token per pattern slot (last binding wins).
    ///
    /// A token that is the governing end of a role edge in some directive-free
    /// match is an inner node of that match and is not expanded.
    fn subtree_targets(&self, bindings: &[MatchBinding]) -> HashMap<usize, usize> {
        let mut inner = BTreeSet::new();
        for binding in bindings {
            let pattern = &self.rules.patterns[binding.slot];
            if !pattern.directives.is_empty() {
                continue;
            }
            for edge in &pattern.trace {
                if pattern.role(edge.new) != Role::Placeholder {
                    inner.insert(binding.tokens[edge.known]);
                }
            }
        }

        let mut targets = HashMap::new();
        for binding in bindings {
            let pattern = &self.rules.patterns[binding.slot];
            for node in pattern.tree_roots() {
                let token = binding.tokens[node];
                if inner.contains(&token) {
                    tracing::debug!(pattern = binding.pattern, token, "subtree expansion suppressed");
                    continue;
                }
                targets.insert(binding.slot, token);
            }
        }
        targets
    }

    fn extract(&self, instance: &Instance, subtree_root: Option<usize>, traces: &[TraceGraph]) -> Vec<Candidate> {
        let pattern = &self.rules.patterns[instance.slot];
        let mut roles = RoleSets::default();
        let mut placeholders = BTreeSet::new();
        for (i, &token) in instance.tokens.iter().enumerate() {
            match roles.get_mut(pattern.role(i % pattern.len())) {
                Some(set) => {
                    set.insert(token);
                }
                None => {
                    placeholders.insert(token);
                }
            }
        }

        if let Some(root) = subtree_root {
            let subtree: BTreeSet<usize> = self
                .clause
                .subtree_nodes(root, self.config.subtree_max_depth, self.config.subtree_max_fanout)
                .into_iter()
                .filter(|t| !placeholders.contains(t))
                .collect();
            if roles.reason.contains(&root) {
                roles.reason = subtree;
            } else if roles.object.contains(&root) {
                roles.object = subtree;
            }
        }

        let (records, replaced) = self.expand_coordination(&roles, traces);
        records
            .into_iter()
            .map(|record| {
                let mut candidate = self.complete(pattern.id, instance.anchor, record, placeholders.clone());
                let valid: BTreeSet<usize> = candidate.roles.emotion.union(&candidate.roles.reason).copied().collect();
                if let Some(&substitute) = replaced.get(&candidate.anchor) {
                    if !valid.contains(&candidate.anchor) && valid.contains(&substitute) {
                        candidate.anchor = substitute;
                    }
                }
                candidate
            })
            .collect()
    }

    /// One record per conjunct of every coordination root in the roles, plus the
    /// original record. Returns the records and the token substitutions made.
    fn expand_coordination(&self, roles: &RoleSets, traces: &[TraceGraph]) -> (Vec<RoleSets>, BTreeMap<usize, usize>) {
        let mut records = vec![roles.clone()];
        let mut replaced = BTreeMap::new();

        for id in roles.union() {
            let Some(units) = self.groups.conj_roots.get(&id) else {
                continue;
            };
            let root_dep = self.clause.token(id).dep.to_lowercase();
            for unit in units {
                let mut record = roles.clone();
                let direct = unit.distance <= self.config.direct_substitution_distance
                    || self.config.direct_substitution_labels.iter().any(|l| *l == root_dep);
                if direct {
                    if let Some(set) = roles.role_of(id).and_then(|role| record.get_mut(role)) {
                        set.remove(&id);
                        set.insert(unit.token);
                    }
                    replaced.insert(id, unit.token);
                } else {
                    if traces.is_empty() {
                        continue;
                    }
                    for (raw, rep) in self.replace_pairs(traces, id, unit.token) {
                        for (&from, &to) in raw.iter().zip(&rep) {
                            let Some(set) = roles.role_of(from).and_then(|role| record.get_mut(role)) else {
                                continue;
                            };
                            set.remove(&from);
                            set.insert(to);
                            replaced.insert(from, to);
                        }
                    }
                }
                tracing::debug!(root = id, conjunct = unit.token, direct, "coordination record");
                records.push(record);
            }
        }
        (records, replaced)
    }

    /// Replay every root-to-leaf path of the trace graphs from `conj`, following
    /// the same dependency labels. Yields `(original path prefix, replacement)`.
    fn replace_pairs(&self, traces: &[TraceGraph], root: usize, conj: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
        let mut pairs = Vec::new();
        for graph in traces.iter().filter(|g| g.contains_key(&root)) {
            for path in root_to_leaf_paths(graph, root) {
                let mut walked = Vec::new();
                let mut current = conj;
                for &step in &path[1..] {
                    let dep = &self.clause.token(step).dep;
                    let children = self.clause.children(current);
                    let next = children.iter().copied().find(|&c| &self.clause.token(c).dep == dep);
                    match next {
                        Some(next) => {
                            walked.push(next);
                            current = next;
                        }
                        None => break,
                    }
                }
                if !walked.is_empty() {
                    let raw = path[..=walked.len()].to_vec();
                    let mut rep = vec![conj];
                    rep.extend(walked);
                    pairs.push((raw, rep));
                }
            }
        }
        pairs
    }

    /// Group completion in fixed order, then negation folding.
    fn complete(
        &self,
        pattern: PatternId,
        anchor: usize,
        record: RoleSets,
        placeholders: BTreeSet<usize>,
    ) -> Candidate {
        let g = self.groups;
        let mut existed = record.union();
        let RoleSets { mut holder, mut emotion, mut object, mut reason } = record;

        for set in [&mut reason, &mut object] {
            for by_root in g.default_matches.values() {
                for (&root, companions) in by_root {
                    complete_group(set, root, companions, &mut existed);
                }
            }
        }

        let phrase_keys = sorted_keys(&g.phrases);
        for set in [&mut holder, &mut emotion, &mut object, &mut reason] {
            for &id in &phrase_keys {
                complete_group(set, id, &g.phrases[&id], &mut existed);
            }
        }

        let lexicon_keys = sorted_keys(&g.lexicon_phrases);
        for set in [&mut holder, &mut object, &mut reason] {
            for &id in &lexicon_keys {
                complete_group(set, id, &g.lexicon_phrases[&id], &mut existed);
            }
        }

        for pairs in [&g.xcomp, &g.aux, &g.prt] {
            complete_fixed(&mut reason, pairs, &mut existed);
        }
        for pairs in [&g.poss, &g.det] {
            for set in [&mut holder, &mut object, &mut reason] {
                complete_fixed(set, pairs, &mut existed);
            }
        }

        let emotion_negated_heads = fold_negation(&mut emotion, &g.negation);
        let reason_negated_heads = fold_negation(&mut reason, &g.negation);

        Candidate {
            pattern,
            anchor,
            roles: RoleSets { holder, emotion, object, reason },
            placeholders,
            emotion_negated: !emotion_negated_heads.is_empty(),
            emotion_negated_heads,
            reason_negated: !reason_negated_heads.is_empty(),
            reason_negated_heads,
        }
    }
}

/// Merge bindings of the same pattern that share tokens and whose differing
/// tokens lie within `max_distance` of each other.
fn combine(rules: &CompiledRules, bindings: &[MatchBinding], max_distance: usize) -> Vec<Instance> {
    let mut instances: Vec<Instance> = Vec::new();
    for binding in bindings {
        let mine: BTreeSet<usize> = binding.tokens.iter().copied().collect();
        let mut merged = false;
        for instance in instances.iter_mut().filter(|i| i.slot == binding.slot) {
            let theirs: BTreeSet<usize> = instance.tokens.iter().copied().collect();
            if mine.is_disjoint(&theirs) {
                continue;
            }
            let diff: BTreeSet<usize> = mine.symmetric_difference(&theirs).copied().collect();
            match (diff.first(), diff.last()) {
                // identical token sets: the same instance found twice
                (None, _) | (_, None) => merged = true,
                (Some(&lo), Some(&hi)) => {
                    if hi - lo <= max_distance {
                        instance.tokens.extend(&binding.tokens);
                        merged = true;
                    }
                }
            }
            if merged {
                break;
            }
        }
        if !merged {
            instances.push(Instance { slot: binding.slot, anchor: binding.anchor(), tokens: binding.tokens.clone() });
        }
    }
    debug_assert!(instances.iter().all(|i| i.tokens.len() % rules.patterns[i.slot].len() == 0));
    instances
}

fn sorted_keys(map: &HashMap<usize, BTreeSet<usize>>) -> Vec<usize> {
    let mut keys: Vec<usize> = map.keys().copied().collect();
    keys.sort_unstable();
    keys
}

/// Pull in the rest of `root`'s group unless one of its members is already claimed.
fn complete_group(set: &mut BTreeSet<usize>, root: usize, group: &BTreeSet<usize>, existed: &mut BTreeSet<usize>) {
    if !set.contains(&root) {
        return;
    }
    let companions: BTreeSet<usize> = group.iter().copied().filter(|&t| t != root).collect();
    if companions.is_disjoint(existed) {
        set.extend(&companions);
        existed.extend(companions);
    }
}

/// Add the tail of every `head → tail` pair whose head is in `set`.
fn complete_fixed(set: &mut BTreeSet<usize>, pairs: &BTreeMap<usize, usize>, existed: &mut BTreeSet<usize>) {
    for (head, &tail) in pairs {
        if set.contains(head) && existed.insert(tail) {
            set.insert(tail);
        }
    }
}

/// Fold the negators of negated heads into `set`; returns those heads.
fn fold_negation(set: &mut BTreeSet<usize>, negation: &BTreeMap<usize, usize>) -> BTreeSet<usize> {
    let heads: BTreeSet<usize> = set.iter().copied().filter(|t| negation.contains_key(t)).collect();
    for head in &heads {
        set.insert(negation[head]);
    }
    heads
}

/// Every root-to-leaf path of `graph`. A node is entered at most once, so cycles
/// and shared descendants cannot loop.
fn root_to_leaf_paths(graph: &TraceGraph, root: usize) -> Vec<Vec<usize>> {
    let mut paths = Vec::new();
    let mut visited = BTreeSet::new();
    let mut path: Vec<usize> = Vec::new();
    let mut stack = vec![(root, 0usize)];

    while let Some((node, depth)) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        path.truncate(depth);
        path.push(node);
        match graph.get(&node) {
            None => paths.push(path.clone()),
            Some(children) => {
                for &child in children.iter().rev() {
                    if !visited.contains(&child) {
                        stack.push((child, depth + 1));
                    }
                }
            }
        }
    }
    paths
}
