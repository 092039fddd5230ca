//! Anchor pre-processing.
//!
//! Patterns are rooted at *anchors*: tokens that can carry sentiment. This pass
//! sets `Token::anchor` on a clause before matching, in four steps:
//!
//! ```text
//! lexicon flag ── hooks (no_adv, not_verb) ── joint phrases ── badcases
//!   lemma/text       negated ADV / VERB        one internal      un-flag
//!   has polarity     heads become anchors      root per phrase   listed words
//! ```
//!
//! The clause-level anchor type (last hook that fired) and the joint phrase
//! scores travel on to filtering and scoring through [`AnchorInfo`].

use crate::Clause;
use crate::lexicon::Lexicon;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorInfo {
    /// `no_adv` or `not_verb` when the corresponding hook flagged a token.
    pub anchor_type: Option<&'static str>,
    /// Joint phrase root → phrase score.
    pub joint_scores: BTreeMap<usize, f64>,
    /// Every joint phrase found in the clause.
    pub joint_spans: Vec<BTreeSet<usize>>,
}

impl AnchorInfo {
    /// The joint-phrase consistency filter only applies once a phrase produced an anchor.
    pub fn has_joint_anchor(&self) -> bool {
        !self.joint_scores.is_empty()
    }
}

pub fn mark_anchors(clause: &mut Clause, lexicon: &Lexicon) -> AnchorInfo {
    let mut info = AnchorInfo::default();

    for id in 0..clause.len() {
        let token = clause.token(id);
        let flagged = (token.pos == "ADP" && token.dep.eq_ignore_ascii_case("ROOT"))
            || lexicon.has_polarity(&token.lemma)
            || lexicon.has_polarity(&token.text);
        clause.set_anchor(id, flagged);
    }

    if flag_negated_heads(clause, "no", "ADV") {
        info.anchor_type = Some("no_adv");
    }
    if flag_negated_heads(clause, "not", "VERB") {
        info.anchor_type = Some("not_verb");
    }

    let lemmas: Vec<String> = clause.tokens().iter().map(|t| t.lemma.clone()).collect();

    for found in lexicon.joint_phrases().segment(&lemmas) {
        let span: BTreeSet<usize> = (found.start..found.end).collect();
        if let Some(root) = single_internal_root(clause, &span) {
            clause.set_anchor(root, true);
            info.joint_scores.insert(root, *found.value);
        }
        info.joint_spans.push(span);
    }

    for found in lexicon.badcases().segment(&lemmas) {
        let case = found.value;
        for id in found.start..found.end {
            let token = clause.token(id);
            let illegal = (case.illegal_pos.is_empty() && case.illegal_dep.is_empty())
                || case.illegal_pos.contains(&token.pos)
                || case.illegal_dep.contains(&token.dep);
            if illegal {
                clause.set_anchor(id, false);
            }
        }
    }

    tracing::debug!(anchors = ?clause.anchors(), anchor_type = ?info.anchor_type, "anchors marked");
    info
}

/// Flag heads of `pos` modified by a negator (`dep == neg` or the given lemma).
fn flag_negated_heads(clause: &mut Clause, negator: &str, pos: &str) -> bool {
    let heads: Vec<usize> = clause
        .tokens()
        .iter()
        .filter(|t| t.dep == "neg" || t.lemma == negator)
        .filter_map(|t| clause.head(t.index))
        .filter(|&h| clause.token(h).pos == pos)
        .collect();
    for &h in &heads {
        clause.set_anchor(h, true);
    }
    !heads.is_empty()
}

/// The only token of `span` that governs other span tokens without being governed inside it.
fn single_internal_root(clause: &Clause, span: &BTreeSet<usize>) -> Option<usize> {
    let mut governors = BTreeSet::new();
    let mut governed = BTreeSet::new();
    for &id in span {
        if let Some(head) = clause.head(id).filter(|h| span.contains(h)) {
            governors.insert(head);
            governed.insert(id);
        }
    }
    let mut roots = governors.difference(&governed);
    match (roots.next(), roots.next()) {
        (Some(&root), None) => Some(root),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::clause;

    #[test]
    fn lexicon_words_become_anchors() {
        let mut c = crate::testutil::i_love_the_color();
        let info = mark_anchors(&mut c, &Lexicon::builder().positive("love").build());
        assert_eq!(c.anchors(), BTreeSet::from([1]));
        assert_eq!(info.anchor_type, None);
    }

    #[test]
    fn negated_verb_hook() {
        // it does not work
        let mut c = clause(&[
            ("it", "it", "PRON", "nsubj", 3),
            ("does", "do", "AUX", "aux", 3),
            ("not", "not", "PART", "neg", 3),
            ("work", "work", "VERB", "ROOT", 3),
        ]);
        let info = mark_anchors(&mut c, &Lexicon::default());
        assert_eq!(c.anchors(), BTreeSet::from([3]));
        assert_eq!(info.anchor_type, Some("not_verb"));
    }

    #[test]
    fn joint_phrase_flags_its_root() {
        // it fell apart
        let mut c = clause(&[
            ("it", "it", "PRON", "nsubj", 1),
            ("fell", "fall", "VERB", "ROOT", 1),
            ("apart", "apart", "ADV", "advmod", 1),
        ]);
        let info = mark_anchors(&mut c, &Lexicon::builder().joint("fall apart", -0.8).build());
        assert_eq!(c.anchors(), BTreeSet::from([1]));
        assert_eq!(info.joint_scores.get(&1), Some(&-0.8));
        assert_eq!(info.joint_spans, vec![BTreeSet::from([1, 2])]);
        assert!(info.has_joint_anchor());
    }

    #[test]
    fn badcases_unflag() {
        // works as well
        let rows = [
            ("works", "work", "VERB", "ROOT", 0),
            ("as", "as", "ADV", "advmod", 2),
            ("well", "well", "ADV", "advmod", 0),
        ];
        let lexicon = Lexicon::builder()
            .positive("well")
            .badcase("as well", BTreeSet::new(), BTreeSet::from(["advmod".to_string()]))
            .build();
        let mut c = clause(&rows);
        mark_anchors(&mut c, &lexicon);
        assert!(c.anchors().is_empty());

        let lexicon = Lexicon::builder()
            .positive("well")
            .badcase("as well", BTreeSet::from(["NOUN".to_string()]), BTreeSet::new())
            .build();
        let mut c = clause(&rows);
        mark_anchors(&mut c, &lexicon);
        assert_eq!(c.anchors(), BTreeSet::from([2]));
    }
}
