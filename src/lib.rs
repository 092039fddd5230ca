extern crate self as sentiro;

#[macro_use]
mod macros;
mod api;
pub mod config;
mod engine;
pub mod error;
pub mod lexicon;
pub mod services;

pub use api::{AnnotatedClause, Element, Engine, EngineHandle, ExtractOutput, ExtractResult, SkippedClause};
pub use config::EngineConfig;
pub use engine::{
    AttrFilter, ClauseMetrics, CompiledPattern, CompiledRules, ContextCondition, Direction, NodeConstraint,
    PatternEdge, PatternId, PatternNode, RunMetrics, SpecialDirective,
};
pub use error::{Error, Result};
pub use lexicon::{Lexicon, LexiconBuilder};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// --- Clause model -----------------------------------------------------------

/// One annotated token of a clause.
///
/// `head` points back into the same clause; the root token points at itself.
/// `start`/`end` are character offsets relative to the clause text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub index: usize,
    pub text: String,
    pub lemma: String,
    pub pos: String,
    pub dep: String,
    pub head: usize,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub anchor: bool,
}

impl Token {
    pub fn is_punct(&self) -> bool {
        self.pos == "PUNCT"
    }

    pub(crate) fn is_root(&self) -> bool {
        self.head == self.index || self.dep.eq_ignore_ascii_case("ROOT")
    }
}

/// A validated dependency tree over the tokens of one clause.
///
/// Token ids double as arena indices: `children[i]` lists the dependents of
/// token `i` in ascending order, so no traversal ever chases references.
#[derive(Debug, Clone)]
pub struct Clause {
    text: String,
    tokens: Vec<Token>,
    children: Vec<Vec<usize>>,
    root: usize,
}

impl Clause {
    /// Validate `tokens` and build the children index.
    ///
    /// Fails with [`Error::MalformedClause`] unless the ids are contiguous from 0,
    /// every head is in range, exactly one token is the root, and every token
    /// reaches that root.
    pub fn new(text: impl Into<String>, tokens: Vec<Token>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::malformed("clause has no tokens"));
        }

        let n = tokens.len();
        let mut roots = Vec::new();
        for (i, tok) in tokens.iter().enumerate() {
            if tok.index != i {
                let message = format!("token ids must be contiguous: found {} at position {i}", tok.index);
                return Err(Error::malformed(message));
            }
            if tok.head >= n {
                return Err(Error::malformed(format!("token {i} has head {} outside the clause", tok.head)));
            }
            if tok.is_root() {
                roots.push(i);
            }
        }

        let root = match roots.as_slice() {
            [root] => *root,
            [] => return Err(Error::malformed("no root token")),
            many => return Err(Error::malformed(format!("multiple root tokens: {many:?}"))),
        };

        let mut children = vec![Vec::new(); n];
        for tok in &tokens {
            if tok.index != root {
                children[tok.head].push(tok.index);
            }
        }

        // Every token must be reachable from the root, otherwise the head graph has a cycle.
        let mut seen = vec![false; n];
        let mut stack = vec![root];
        let mut reached = 0;
        while let Some(id) = stack.pop() {
            if seen[id] {
                continue;
            }
            seen[id] = true;
            reached += 1;
            stack.extend(children[id].iter().copied());
        }
        if reached != n {
            let stray: Vec<usize> = (0..n).filter(|&i| !seen[i]).collect();
            return Err(Error::malformed(format!("dependency cycle through tokens {stray:?}")));
        }

        Ok(Clause { text: text.into(), tokens, children, root })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, id: usize) -> &Token {
        &self.tokens[id]
    }

    pub fn children(&self, id: usize) -> &[usize] {
        &self.children[id]
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// Head of `id`, or `None` for the root.
    pub fn head(&self, id: usize) -> Option<usize> {
        if id == self.root { None } else { Some(self.tokens[id].head) }
    }

    pub(crate) fn set_anchor(&mut self, id: usize, anchor: bool) {
        self.tokens[id].anchor = anchor;
    }

    pub(crate) fn anchors(&self) -> BTreeSet<usize> {
        self.tokens.iter().filter(|t| t.anchor).map(|t| t.index).collect()
    }

    /// Token ids of the syntactic subtree under `top`, pruned for breadth and depth.
    ///
    /// - Nodes deeper than `max_depth` below `top` are dropped with their descendants.
    /// - A node with more than `max_fanout` children is dropped together with
    ///   everything under it. `top` itself is exempt from the fan-out limit.
    ///
    /// The result is sorted.
    pub fn subtree_nodes(&self, top: usize, max_depth: usize, max_fanout: usize) -> Vec<usize> {
        let mut level = vec![usize::MAX; self.len()];
        let mut order = Vec::new();
        let mut stack = vec![(top, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            if level[id] != usize::MAX {
                continue;
            }
            level[id] = depth;
            order.push(id);
            for &child in self.children[id].iter().rev() {
                stack.push((child, depth + 1));
            }
        }

        let mut pruned = vec![false; self.len()];
        let prune_from = |start: usize, pruned: &mut Vec<bool>| {
            let mut work = vec![start];
            while let Some(id) = work.pop() {
                if pruned[id] {
                    continue;
                }
                pruned[id] = true;
                work.extend(self.children[id].iter().copied());
            }
        };

        for &id in &order {
            if level[id] == 0 {
                continue;
            }
            if self.children[id].len() > max_fanout || level[id] > max_depth {
                prune_from(id, &mut pruned);
            }
        }

        let mut nodes: Vec<usize> = order.into_iter().filter(|&id| !pruned[id]).collect();
        nodes.sort_unstable();
        nodes
    }
}

// --- Roles ------------------------------------------------------------------

/// Semantic slot a pattern node (and the token bound to it) fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Holder,
    Emotion,
    Object,
    Reason,
    Placeholder,
}

impl Role {
    /// Parse the single-letter role code used in rule files. An empty code is a placeholder.
    pub fn from_code(code: &str) -> Option<Role> {
        match code {
            "H" => Some(Role::Holder),
            "E" => Some(Role::Emotion),
            "O" => Some(Role::Object),
            "R" => Some(Role::Reason),
            "P" | "" => Some(Role::Placeholder),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Role::Holder => "H",
            Role::Emotion => "E",
            Role::Object => "O",
            Role::Reason => "R",
            Role::Placeholder => "P",
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::{Clause, Token};

    /// Build a clause from `(text, lemma, pos, dep, head)` rows, laying the words out
    /// left to right with single spaces.
    pub(crate) fn clause(rows: &[(&str, &str, &str, &str, usize)]) -> Clause {
        let mut tokens = Vec::new();
        let mut offset = 0;
        let mut text = String::new();
        for (i, (word, lemma, pos, dep, head)) in rows.iter().enumerate() {
            if i > 0 {
                text.push(' ');
                offset += 1;
            }
            text.push_str(word);
            tokens.push(Token {
                index: i,
                text: word.to_string(),
                lemma: lemma.to_string(),
                pos: pos.to_string(),
                dep: dep.to_string(),
                head: *head,
                start: offset,
                end: offset + word.len(),
                anchor: false,
            });
            offset += word.len();
        }
        Clause::new(text, tokens).expect("test clause must be well formed")
    }

    pub(crate) fn i_love_the_color() -> Clause {
        clause(&[
            ("I", "I", "PRON", "nsubj", 1),
            ("love", "love", "VERB", "ROOT", 1),
            ("the", "the", "DET", "det", 3),
            ("color", "color", "NOUN", "dobj", 1),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::clause;
    use super::*;

    fn tok(index: usize, head: usize, dep: &str) -> Token {
        Token {
            index,
            text: format!("w{index}"),
            lemma: format!("w{index}"),
            pos: "NOUN".into(),
            dep: dep.into(),
            head,
            start: index * 3,
            end: index * 3 + 2,
            anchor: false,
        }
    }

    #[test]
    fn builds_children_index() {
        let c = testutil::i_love_the_color();
        assert_eq!(c.root(), 1);
        assert_eq!(c.children(1), &[0, 3]);
        assert_eq!(c.children(3), &[2]);
        assert_eq!(c.head(2), Some(3));
        assert_eq!(c.head(1), None);
    }

    #[test]
    fn rejects_two_roots() {
        let tokens = vec![tok(0, 0, "ROOT"), tok(1, 1, "ROOT")];
        assert!(matches!(Clause::new("a b", tokens), Err(Error::MalformedClause(_))));
    }

    #[test]
    fn rejects_cycles() {
        let tokens = vec![tok(0, 0, "ROOT"), tok(1, 2, "dep"), tok(2, 1, "dep")];
        let err = Clause::new("a b c", tokens).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn rejects_gaps_and_out_of_range_heads() {
        assert!(Clause::new("a", vec![tok(1, 1, "ROOT")]).is_err());
        assert!(Clause::new("a b", vec![tok(0, 0, "ROOT"), tok(1, 9, "dep")]).is_err());
        assert!(Clause::new("", Vec::new()).is_err());
    }

    #[test]
    fn subtree_prunes_overloaded_node() {
        // 10 governs 9, 11 and 13; 12 hangs off 11; 13 has four children (14..=17).
        let mut rows: Vec<(&str, &str, &str, &str, usize)> = Vec::new();
        for i in 0..18usize {
            let head = match i {
                0 => 0,
                9 | 11 | 13 => 10,
                12 => 11,
                14..=17 => 13,
                _ => 0,
            };
            let dep = if i == 0 { "ROOT" } else { "dep" };
            rows.push(("x", "x", "NOUN", dep, head));
        }
        let c = clause(&rows);
        assert_eq!(c.subtree_nodes(10, 3, 3), vec![9, 10, 11, 12]);
    }

    #[test]
    fn subtree_prunes_deep_branches() {
        // chain 0 <- 1 <- 2 <- 3 <- 4 <- 5
        let rows: Vec<(&str, &str, &str, &str, usize)> = (0..6usize)
            .map(|i| ("x", "x", "NOUN", if i == 0 { "ROOT" } else { "dep" }, i.saturating_sub(1)))
            .collect();
        let c = clause(&rows);
        assert_eq!(c.subtree_nodes(0, 3, 3), vec![0, 1, 2, 3]);
    }

    #[test]
    fn subtree_keeps_wide_top() {
        let rows: Vec<(&str, &str, &str, &str, usize)> =
            (0..6usize).map(|i| ("x", "x", "NOUN", if i == 0 { "ROOT" } else { "dep" }, 0)).collect();
        let c = clause(&rows);
        assert_eq!(c.subtree_nodes(0, 3, 3), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn role_codes_round_trip() {
        for role in [Role::Holder, Role::Emotion, Role::Object, Role::Reason, Role::Placeholder] {
            assert_eq!(Role::from_code(role.code()), Some(role));
        }
        assert_eq!(Role::from_code(""), Some(Role::Placeholder));
        assert_eq!(Role::from_code("X"), None);
    }
}
