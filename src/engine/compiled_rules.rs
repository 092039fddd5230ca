//! Rule compilation and indexing.
//!
//! This module holds the *static* side of the engine: everything derived from
//! the rule file once at startup and shared, immutable, by every extraction.
//!
//! Extraction is split into two phases:
//!
//! 1. **Compile/index rules** (this module): parse each rule line into a
//!    [`CompiledPattern`] (typed node constraints plus an ordered edge trace) and
//!    index the set by anchor lemma.
//! 2. **Run** (see `matcher.rs` and `expand.rs`): bind patterns against a clause,
//!    then assemble, filter and score the bindings.
//!
//! ## Rule syntax
//!
//! ```text
//! 12<TAB><(0,,VERB,,E),(1,nsubj,,,H)><(0),(2,dobj,,,O)>
//!         └─ edge spec ─────────────┘└─ edge spec ────┘
//! ```
//!
//! Each edge spec holds exactly two units. One unit is already known (unit 0, the
//! anchor, is known from the start) and the other is declared by it:
//!
//! - `(id)`: a reference to a known unit.
//! - `(id,dep,pos,lemma,role)`: a declaration.
//! - `(id,dep,pos,lemma,role,special)`: plus a directive (`#TREEROOT#`, `#ANCHOR#`).
//! - `(id,dep,pos,lemma,role,special,left,right)`: plus lemma conditions on the
//!   neighbouring tokens.
//!
//! A declared unit on the right is a dependent of the known unit; on the left it is
//! its head. Filters are `|`-separated, with a `!` prefix for exclusions.
//!
//! ## Invariants
//!
//! - `PatternNode::id` is the index into `CompiledPattern::nodes`. Rule-file unit
//!   ids must increase from edge to edge but may skip numbers; nodes are numbered
//!   densely in declaration order.
//! - `CompiledPattern::trace` lists edges in declaration order, and each edge's
//!   `new` node is bound by no earlier edge.
//! - Compilation is deterministic: identical input yields identical `Debug` output.

use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::{Clause, Role, Token};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

// --- Attribute filters -------------------------------------------------------

/// Pattern identifier as written in the rule file.
pub type PatternId = u32;

/// Allow/deny filter over one token attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AttrFilter {
    #[default]
    Any,
    Allow(BTreeSet<String>),
    Deny(BTreeSet<String>),
    Both { allow: BTreeSet<String>, deny: BTreeSet<String> },
}

impl AttrFilter {
    /// Parse a `|`-separated field such as `nsubj|!expl`. An empty field matches anything.
    pub fn parse(field: &str) -> Self {
        let mut allow = BTreeSet::new();
        let mut deny = BTreeSet::new();
        for item in field.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            match item.strip_prefix('!') {
                Some(rest) if !rest.is_empty() => {
                    deny.insert(rest.to_string());
                }
                Some(_) => {}
                None => {
                    allow.insert(item.to_string());
                }
            }
        }
        Self::from_sets(allow, deny)
    }

    pub fn allow<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_sets(values.into_iter().map(Into::into).collect(), BTreeSet::new())
    }

    fn from_sets(allow: BTreeSet<String>, deny: BTreeSet<String>) -> Self {
        match (allow.is_empty(), deny.is_empty()) {
            (true, true) => AttrFilter::Any,
            (false, true) => AttrFilter::Allow(allow),
            (true, false) => AttrFilter::Deny(deny),
            (false, false) => AttrFilter::Both { allow, deny },
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            AttrFilter::Any => true,
            AttrFilter::Allow(allow) => allow.contains(value),
            AttrFilter::Deny(deny) => !deny.contains(value),
            AttrFilter::Both { allow, deny } => allow.contains(value) && !deny.contains(value),
        }
    }

    /// Outcome when the attribute has no value at all (a missing neighbour):
    /// an allow list cannot be satisfied, a deny list cannot be violated.
    pub fn accepts_missing(&self) -> bool {
        matches!(self, AttrFilter::Any | AttrFilter::Deny(_))
    }

    /// True when no value can pass, i.e. every allowed value is also denied.
    pub fn is_unsatisfiable(&self) -> bool {
        match self {
            AttrFilter::Both { allow, deny } => allow.is_subset(deny),
            _ => false,
        }
    }

    pub fn allowed(&self) -> Option<&BTreeSet<String>> {
        match self {
            AttrFilter::Allow(allow) | AttrFilter::Both { allow, .. } => Some(allow),
            _ => None,
        }
    }
}

// --- Pattern structure -------------------------------------------------------

/// Per-node token constraint. `text` is only used by built-in patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConstraint {
    pub dep: AttrFilter,
    pub pos: AttrFilter,
    pub lemma: AttrFilter,
    pub text: AttrFilter,
    pub requires_anchor: bool,
}

impl NodeConstraint {
    pub fn accepts(&self, token: &Token) -> bool {
        (!self.requires_anchor || token.anchor)
            && self.dep.accepts(&token.dep)
            && self.pos.accepts(&token.pos)
            && self.lemma.accepts(&token.lemma)
            && self.text.accepts(&token.text)
    }

    fn is_unsatisfiable(&self) -> bool {
        [&self.dep, &self.pos, &self.lemma, &self.text].iter().any(|f| f.is_unsatisfiable())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternNode {
    pub id: usize,
    pub role: Role,
    pub constraint: NodeConstraint,
}

/// How the `new` node of an edge relates to the already bound `known` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `known` is the head of `new`.
    ParentOf,
    /// `known` is a dependent of `new`.
    ChildOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEdge {
    pub known: usize,
    pub new: usize,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialDirective {
    /// Replace the bound token's role span with its pruned subtree.
    TreeRoot,
    /// On the anchor unit: do not require the anchor flag.
    Anchor,
}

impl SpecialDirective {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "#TREEROOT#" => Some(SpecialDirective::TreeRoot),
            "#ANCHOR#" => Some(SpecialDirective::Anchor),
            _ => None,
        }
    }
}

/// Lemma conditions on the tokens right before and after a bound token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextCondition {
    pub left: AttrFilter,
    pub right: AttrFilter,
}

impl ContextCondition {
    pub fn accepts(&self, clause: &Clause, token: usize) -> bool {
        let left = token.checked_sub(1).map(|i| clause.token(i).lemma.as_str());
        let right = (token + 1 < clause.len()).then(|| clause.token(token + 1).lemma.as_str());
        let check = |filter: &AttrFilter, lemma: Option<&str>| match lemma {
            Some(lemma) => filter.accepts(lemma),
            None => filter.accepts_missing(),
        };
        check(&self.left, left) && check(&self.right, right)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    pub id: PatternId,
    /// 1-based line in the rule source.
    pub line: usize,
    pub nodes: Vec<PatternNode>,
    pub trace: Vec<PatternEdge>,
    pub directives: BTreeMap<usize, SpecialDirective>,
    pub conditions: BTreeMap<usize, ContextCondition>,
}

impl CompiledPattern {
    pub fn role(&self, node: usize) -> Role {
        self.nodes[node].role
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn tree_roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.directives.iter().filter(|(_, d)| **d == SpecialDirective::TreeRoot).map(|(n, _)| *n)
    }

    pub fn has_tree_root(&self) -> bool {
        self.tree_roots().next().is_some()
    }
}

/// Built-in structural pattern feeding the default-match group.
///
/// The node at `unit_root` is the governing token; the others are its companions.
#[derive(Debug, Clone)]
pub struct GenericPattern {
    pub name: &'static str,
    pub pattern: CompiledPattern,
    pub unit_root: usize,
}

// --- Rule compilation and indexing -------------------------------------------

#[derive(Default, Debug)]
pub struct RuleIndex {
    /// Patterns whose anchor accepts any lemma.
    pub always_on: Vec<usize>,
    /// Patterns whose anchor is restricted to a lemma list, by lemma.
    pub by_lemma: HashMap<String, Vec<usize>>,
}

/// Pre-compiled rule set with its activation index.
#[derive(Debug, Default)]
pub struct CompiledRules {
    pub patterns: Vec<CompiledPattern>,
    pub index: RuleIndex,
    pub generic: Vec<GenericPattern>,
}

impl CompiledRules {
    /// Compile a whole rule source. Any syntax error aborts the load.
    pub fn compile(source: &str, lexicon: &Lexicon) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut seen = BTreeSet::new();

        for (line_no, raw) in source.lines().enumerate().map(|(i, l)| (i + 1, l.trim())) {
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let pattern = compile_line(raw, line_no, lexicon)?;
            if !seen.insert(pattern.id) {
                return Err(Error::pattern(line_no, format!("duplicate pattern id {}", pattern.id)));
            }
            patterns.push(pattern);
        }

        let mut index = RuleIndex::default();
        for (slot, pattern) in patterns.iter().enumerate() {
            match pattern.nodes[0].constraint.lemma.allowed() {
                Some(lemmas) => {
                    for lemma in lemmas {
                        index.by_lemma.entry(lemma.clone()).or_default().push(slot);
                    }
                }
                None => index.always_on.push(slot),
            }
        }

        tracing::info!(patterns = patterns.len(), always_on = index.always_on.len(), "rules compiled");
        Ok(CompiledRules { patterns, index, generic: generic_patterns() })
    }

    pub fn from_file(path: impl AsRef<Path>, lexicon: &Lexicon) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::compile(&source, lexicon)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn get(&self, id: PatternId) -> Option<&CompiledPattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// Slots of the patterns worth trying on `clause`, in rule-file order.
    pub(crate) fn active_for(&self, clause: &Clause) -> Vec<usize> {
        let mut active: BTreeSet<usize> = self.index.always_on.iter().copied().collect();
        for token in clause.tokens() {
            if let Some(slots) = self.index.by_lemma.get(&token.lemma) {
                active.extend(slots);
            }
        }
        active.into_iter().filter(|&slot| self.patterns[slot].len() <= clause.len()).collect()
    }
}

// --- Line compiler -------------------------------------------------------------

/// Parsed contents of a declaring unit.
struct UnitSpec {
    constraint: NodeConstraint,
    role: Option<Role>,
    directive: Option<SpecialDirective>,
    condition: Option<ContextCondition>,
}

fn compile_line(raw: &str, line: usize, lexicon: &Lexicon) -> Result<CompiledPattern> {
    let (id_field, body) = match raw.split_once('\t') {
        Some((id, body)) if !body.contains('\t') => (id, body),
        Some(_) => return Err(Error::pattern(line, "expected `id<TAB>body`, found extra tabs")),
        None => return Err(Error::pattern(line, "expected `id<TAB>body`")),
    };
    let id: PatternId =
        id_field.trim().parse().map_err(|_| Error::pattern(line, format!("invalid pattern id `{}`", id_field.trim())))?;

    let anchor = PatternNode {
        id: 0,
        role: Role::Placeholder,
        constraint: NodeConstraint { requires_anchor: true, ..NodeConstraint::default() },
    };
    let mut pattern = CompiledPattern {
        id,
        line,
        nodes: vec![anchor],
        trace: Vec::new(),
        directives: BTreeMap::new(),
        conditions: BTreeMap::new(),
    };

    // Rule-file unit id to node index. Unit ids only grow but may skip numbers.
    let mut declared: BTreeMap<usize, usize> = BTreeMap::from([(0, 0)]);
    let edges: Vec<&str> =
        regex!(r"(?s)<(.+?)>").captures_iter(body).filter_map(|c| c.get(1)).map(|m| m.as_str()).collect();
    if edges.is_empty() {
        return Err(Error::pattern(line, "no edge specs"));
    }

    for edge in edges {
        let units: Vec<Vec<&str>> = regex!(r"(?s)\((.+?)\)")
            .captures_iter(edge)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().split(',').map(str::trim).collect())
            .collect();
        let [left, right] = units.as_slice() else {
            let message = format!("edge spec `<{edge}>` must hold exactly 2 units, found {}", units.len());
            return Err(Error::pattern(line, message));
        };
        let left_id = parse_unit_id(left[0], line)?;
        let right_id = parse_unit_id(right[0], line)?;

        // The anchor may be refined from any edge that mentions it.
        for fields in [left, right] {
            if fields[0] == "0" && fields.len() > 1 {
                let spec = parse_unit(fields, line, lexicon)?;
                refine_anchor(&mut pattern, spec);
            }
        }

        let (known_unit, new_unit, new_fields, direction) = match (declared.get(&left_id), declared.get(&right_id)) {
            (Some(_), None) => (left_id, right_id, right, Direction::ParentOf),
            (None, Some(_)) => (right_id, left_id, left, Direction::ChildOf),
            (Some(_), Some(_)) => {
                return Err(Error::pattern(line, format!("units {left_id} and {right_id} are both already declared")));
            }
            (None, None) => {
                return Err(Error::pattern(line, format!("neither unit {left_id} nor {right_id} is declared yet")));
            }
        };
        let last = declared.keys().next_back().copied().unwrap_or(0);
        if new_unit <= last {
            return Err(Error::pattern(line, format!("unit {new_unit} declared out of order, must follow unit {last}")));
        }
        let known_fields = if direction == Direction::ParentOf { left } else { right };
        if known_unit != 0 && known_fields.len() > 1 {
            return Err(Error::pattern(line, format!("unit {known_unit} is already declared and cannot be redefined")));
        }
        let known = declared[&known_unit];
        let new = pattern.nodes.len();
        declared.insert(new_unit, new);

        let spec = parse_unit(new_fields, line, lexicon)?;
        if spec.directive == Some(SpecialDirective::Anchor) {
            return Err(Error::pattern(line, "#ANCHOR# is only valid on unit 0"));
        }
        if let Some(directive) = spec.directive {
            pattern.directives.insert(new, directive);
        }
        if let Some(condition) = spec.condition {
            pattern.conditions.insert(new, condition);
        }
        if spec.constraint.is_unsatisfiable() {
            tracing::debug!(pattern = id, unit = new_unit, "attribute filter can never match");
        }
        pattern.nodes.push(PatternNode {
            id: new,
            role: spec.role.unwrap_or(Role::Placeholder),
            constraint: spec.constraint,
        });
        pattern.trace.push(PatternEdge { known, new, direction });
    }

    Ok(pattern)
}

fn parse_unit_id(raw: &str, line: usize) -> Result<usize> {
    raw.parse().map_err(|_| Error::pattern(line, format!("invalid unit id `{raw}`")))
}

fn parse_unit(fields: &[&str], line: usize, lexicon: &Lexicon) -> Result<UnitSpec> {
    if !matches!(fields.len(), 5 | 6 | 8) {
        return Err(Error::pattern(
            line,
            format!("unit `{}` has {} fields, expected 5, 6 or 8", fields.join(","), fields.len()),
        ));
    }

    let role = match fields[4] {
        "" => None,
        code => Some(Role::from_code(code).ok_or_else(|| Error::pattern(line, format!("unknown role `{code}`")))?),
    };
    let directive = match fields.get(5).copied() {
        None | Some("") => None,
        Some(raw) => {
            let unknown = || Error::pattern(line, format!("unknown directive `{raw}`"));
            Some(SpecialDirective::parse(raw).ok_or_else(unknown)?)
        }
    };
    let condition = (fields.len() == 8)
        .then(|| ContextCondition { left: AttrFilter::parse(fields[6]), right: AttrFilter::parse(fields[7]) });

    // An emotion unit without a lemma list is restricted to the emotion lexicon.
    let lemma = if fields[3].is_empty() && role == Some(Role::Emotion) {
        AttrFilter::allow(lexicon.emotion_words().iter().cloned())
    } else {
        AttrFilter::parse(fields[3])
    };

    let constraint = NodeConstraint {
        dep: AttrFilter::parse(fields[1]),
        pos: AttrFilter::parse(fields[2]),
        lemma,
        ..NodeConstraint::default()
    };
    Ok(UnitSpec { constraint, role, directive, condition })
}

fn refine_anchor(pattern: &mut CompiledPattern, spec: UnitSpec) {
    let anchor = &mut pattern.nodes[0];
    if spec.constraint.dep != AttrFilter::Any {
        anchor.constraint.dep = spec.constraint.dep;
    }
    if spec.constraint.pos != AttrFilter::Any {
        anchor.constraint.pos = spec.constraint.pos;
    }
    if spec.constraint.lemma != AttrFilter::Any {
        anchor.constraint.lemma = spec.constraint.lemma;
    }
    if let Some(role) = spec.role {
        anchor.role = role;
    }
    match spec.directive {
        Some(SpecialDirective::Anchor) => anchor.constraint.requires_anchor = false,
        Some(directive) => {
            pattern.directives.insert(0, directive);
        }
        None => {}
    }
    if let Some(condition) = spec.condition {
        pattern.conditions.insert(0, condition);
    }
}

// --- Built-in structural patterns ---------------------------------------------

fn generic_node(id: usize, dep: &[&str], pos: &[&str]) -> PatternNode {
    PatternNode {
        id,
        role: Role::Placeholder,
        constraint: NodeConstraint {
            dep: if dep.is_empty() { AttrFilter::Any } else { AttrFilter::allow(dep.iter().copied()) },
            pos: if pos.is_empty() { AttrFilter::Any } else { AttrFilter::allow(pos.iter().copied()) },
            ..NodeConstraint::default()
        },
    }
}

fn generic_pattern(nodes: Vec<PatternNode>, trace: Vec<PatternEdge>) -> CompiledPattern {
    CompiledPattern { id: 0, line: 0, nodes, trace, directives: BTreeMap::new(), conditions: BTreeMap::new() }
}

fn edge(known: usize, new: usize, direction: Direction) -> PatternEdge {
    PatternEdge { known, new, direction }
}

/// Prepositional attachments used to complete reason and object spans.
fn generic_patterns() -> Vec<GenericPattern> {
    const GOVERNORS: &[&str] = &["VERB", "NOUN", "AUX", "ADJ"];
    const NOMINALS: &[&str] = &["NOUN", "PROPN"];

    let prep_pobj = generic_pattern(
        vec![
            generic_node(0, &["prep"], &["ADP"]),
            generic_node(1, &["pobj"], NOMINALS),
            generic_node(2, &[], GOVERNORS),
        ],
        vec![edge(0, 1, Direction::ParentOf), edge(0, 2, Direction::ChildOf)],
    );

    let prep_prep_pobj = generic_pattern(
        vec![
            generic_node(0, &["prep"], &["ADP"]),
            generic_node(1, &["prep"], &["ADP"]),
            generic_node(2, &["pobj"], NOMINALS),
            generic_node(3, &[], GOVERNORS),
        ],
        vec![edge(0, 1, Direction::ParentOf), edge(1, 2, Direction::ParentOf), edge(0, 3, Direction::ChildOf)],
    );

    let mut comparative = generic_node(0, &[], &[]);
    comparative.constraint.text = AttrFilter::allow(["better", "worst", "worse", "good", "well", "bad"]);
    let mut than = generic_node(1, &["prep"], &[]);
    than.constraint.lemma = AttrFilter::allow(["than"]);
    let better_than_obj = generic_pattern(
        vec![comparative, than, generic_node(2, &["pobj"], &[])],
        vec![edge(0, 1, Direction::ParentOf), edge(1, 2, Direction::ParentOf)],
    );

    vec![
        GenericPattern { name: "prep_pobj", pattern: prep_pobj, unit_root: 2 },
        GenericPattern { name: "prep_prep_pobj", pattern: prep_prep_pobj, unit_root: 3 },
        GenericPattern { name: "better_than_obj", pattern: better_than_obj, unit_root: 0 },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = "\
# holder loves object
1\t<(0,,VERB,,E),(1,nsubj,,,H)><(0),(2,dobj,,,O)>

## comparative
2\t<(1,,AUX,be,P),(0,acomp,ADJ,,E)><(1),(2,nsubj,NOUN|PROPN,,O)><(0),(3,prep,,!like,R,#TREEROOT#)>
3\t<(0,,,,E,#ANCHOR#,!not,),(1,nsubj,,,H)>
";

    fn lexicon() -> Lexicon {
        Lexicon::builder().emotion("love").emotion("hate").build()
    }

    fn compile_err(source: &str) -> String {
        CompiledRules::compile(source, &lexicon()).unwrap_err().to_string()
    }

    #[test]
    fn compiles_edges_and_roles() {
        let rules = CompiledRules::compile(RULES, &lexicon()).unwrap();
        assert_eq!(rules.len(), 3);

        let p1 = rules.get(1).unwrap();
        assert_eq!(p1.line, 2);
        assert_eq!(p1.role(0), Role::Emotion);
        assert_eq!(p1.role(1), Role::Holder);
        assert_eq!(p1.role(2), Role::Object);
        assert_eq!(p1.trace, vec![edge(0, 1, Direction::ParentOf), edge(0, 2, Direction::ParentOf)]);
        // emotion unit without lemma list falls back to the emotion lexicon
        assert_eq!(p1.nodes[0].constraint.lemma, AttrFilter::allow(["hate", "love"]));
        assert!(p1.nodes[0].constraint.requires_anchor);

        let p2 = rules.get(2).unwrap();
        assert_eq!(p2.trace[0], edge(0, 1, Direction::ChildOf));
        assert_eq!(p2.trace[1], edge(1, 2, Direction::ParentOf));
        assert_eq!(p2.nodes[0].constraint.dep, AttrFilter::parse("acomp"));
        assert!(p2.nodes[1].constraint.lemma.accepts("be"));
        assert!(p2.nodes[2].constraint.pos.accepts("PROPN"));
        assert_eq!(p2.directives.get(&3), Some(&SpecialDirective::TreeRoot));
        assert!(!p2.nodes[3].constraint.lemma.accepts("like"));
        assert!(p2.has_tree_root());
    }

    #[test]
    fn anchor_directive_and_context() {
        let rules = CompiledRules::compile(RULES, &lexicon()).unwrap();
        let p3 = rules.get(3).unwrap();
        assert!(!p3.nodes[0].constraint.requires_anchor);
        let cond = p3.conditions.get(&0).unwrap();
        assert_eq!(cond.left, AttrFilter::parse("!not"));
        assert_eq!(cond.right, AttrFilter::Any);
    }

    #[test]
    fn compilation_is_idempotent() {
        let a = CompiledRules::compile(RULES, &lexicon()).unwrap();
        let b = CompiledRules::compile(RULES, &lexicon()).unwrap();
        assert_eq!(format!("{:?}", a.patterns), format!("{:?}", b.patterns));
    }

    #[test]
    fn indexes_by_anchor_lemma() {
        let rules = CompiledRules::compile("7\t<(0,,,like|enjoy,E),(1,nsubj,,,H)>\n8\t<(0),(1,nsubj,,,H)>", &lexicon())
            .unwrap();
        assert_eq!(rules.index.by_lemma.get("enjoy"), Some(&vec![0]));
        assert_eq!(rules.index.always_on, vec![1]);
    }

    #[test]
    fn syntax_errors_name_the_line() {
        assert!(compile_err("1 <(0),(1,nsubj,,,H)>").contains("line 1"));
        assert!(compile_err("x\t<(0),(1,nsubj,,,H)>").contains("invalid pattern id"));
        assert!(compile_err("1\t<(0),(1,nsubj,,,H)>\n1\t<(0),(1,dobj,,,O)>").contains("duplicate"));
        assert!(compile_err("1\tnothing here").contains("no edge specs"));
        assert!(compile_err("1\t<(0),(1,nsubj,,,H),(2,dobj,,,O)>").contains("exactly 2 units"));
        assert!(compile_err("1\t<(0),(1,nsubj,,H)>").contains("4 fields"));
        assert!(compile_err("1\t<(0),(1,nsubj,,,H)><(0),(1)>").contains("both already declared"));
        assert!(compile_err("1\t<(3),(4,nsubj,,,H)>").contains("neither unit"));
        assert!(compile_err("1\t<(0),(2,nsubj,,,H)><(0),(1,dobj,,,O)>").contains("out of order"));
        assert!(compile_err("1\t<(0),(1,nsubj,,,X)>").contains("unknown role"));
        assert!(compile_err("1\t<(0),(1,nsubj,,,H,#ROOT#)>").contains("unknown directive"));
        assert!(compile_err("1\t<(0),(1,nsubj,,,H,#ANCHOR#)>").contains("only valid on unit 0"));

        let err = CompiledRules::compile("# ok\n\n1\t<(0),(1,nsubj,,,H)>\n2\t<(0),(1,,,,Q)>", &lexicon()).unwrap_err();
        assert!(matches!(err, Error::PatternSyntax { line: 4, .. }));
    }

    #[test]
    fn gapped_unit_ids_compile() {
        let source = "1\t<(0,,VERB,,E),(1,nsubj,,,H)><(0),(3,dobj,,,O)><(3),(5,det,,,O)>";
        let rules = CompiledRules::compile(source, &lexicon()).unwrap();
        let p = rules.get(1).unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(p.role(2), Role::Object);
        assert!(p.nodes[2].constraint.dep.accepts("dobj"));
        assert_eq!(
            p.trace,
            vec![edge(0, 1, Direction::ParentOf), edge(0, 2, Direction::ParentOf), edge(2, 3, Direction::ParentOf)]
        );
    }

    #[test]
    fn unsatisfiable_filter_compiles() {
        let rules = CompiledRules::compile("1\t<(0),(1,nsubj|!nsubj,,,H)>", &lexicon()).unwrap();
        let filter = &rules.patterns[0].nodes[1].constraint.dep;
        assert!(filter.is_unsatisfiable());
        assert!(!filter.accepts("nsubj"));
    }

    #[test]
    fn missing_neighbour_semantics() {
        assert!(!AttrFilter::parse("very").accepts_missing());
        assert!(AttrFilter::parse("!not").accepts_missing());
        assert!(AttrFilter::Any.accepts_missing());
    }
}
