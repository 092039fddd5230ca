//! Post-match filtering.
//!
//! A [`Candidate`] becomes an [`Opinion`] once it passes every clause-level check:
//!
//! ```text
//! Candidate ──┬─ joint phrase kept whole inside emotion or reason
//!             ├─ object / reason span ratio >= min_span_ratio
//!             ├─ emotion text is an emotion word
//!             └─ single-token holder / object is a meaningful pronoun
//!                          │
//!                          v
//!                 Opinion (texts, all matched tokens, pronoun tags)
//! ```
//!
//! Element texts are lemma sequences. Tokens are joined with a space unless they
//! touch in the source text and one of them is punctuation.

use super::anchors::AnchorInfo;
use super::expand::Candidate;
use super::groups::{Groups, PronounClass};
use crate::Clause;
use crate::lexicon::Lexicon;
use std::collections::BTreeSet;

/// Object pronouns that can stand in for a real target.
const OBJECT_PRONOUNS: &[&str] = &["it", "this", "these", "that", "something", "all", "everything", "they"];

/// Tag set on a single-token holder or object that is a usable pronoun.
pub const PRONOUN_TAG: &str = "PRON";

#[derive(Debug, Clone, PartialEq)]
pub struct Opinion {
    pub candidate: Candidate,
    /// Every role, the placeholders and the negated heads, ascending.
    pub all_matched: Vec<usize>,
    pub holder_text: String,
    pub emotion_text: String,
    pub object_text: String,
    pub reason_text: String,
    pub holder_tag: Option<&'static str>,
    pub object_tag: Option<&'static str>,
}

pub struct OpinionFilter<'a> {
    clause: &'a Clause,
    groups: &'a Groups,
    lexicon: &'a Lexicon,
    anchors: &'a AnchorInfo,
    min_span_ratio: f64,
}

impl<'a> OpinionFilter<'a> {
    pub fn new(
        clause: &'a Clause,
        groups: &'a Groups,
        lexicon: &'a Lexicon,
        anchors: &'a AnchorInfo,
        min_span_ratio: f64,
    ) -> Self {
        OpinionFilter { clause, groups, lexicon, anchors, min_span_ratio }
    }

    pub fn apply(&self, candidates: Vec<Candidate>) -> Vec<Opinion> {
        candidates.into_iter().filter_map(|c| self.accept(c)).collect()
    }

    fn accept(&self, mut candidate: Candidate) -> Option<Opinion> {
        let pattern = candidate.pattern;
        if !self.joint_phrases_intact(&candidate) {
            tracing::debug!(pattern, "dropped: joint phrase split across roles");
            return None;
        }
        let roles = &candidate.roles;
        if span_ratio(&roles.object) < self.min_span_ratio || span_ratio(&roles.reason) < self.min_span_ratio {
            tracing::debug!(pattern, object = ?roles.object, reason = ?roles.reason, "dropped: sparse span");
            return None;
        }

        let mut all_matched = candidate.combined();
        all_matched.extend(&candidate.emotion_negated_heads);
        all_matched.extend(&candidate.reason_negated_heads);

        let leading: Vec<usize> = candidate
            .roles
            .reason
            .iter()
            .copied()
            .take_while(|&t| matches!(self.clause.token(t).pos.as_str(), "PUNCT" | "SPACE"))
            .collect();
        for t in leading {
            candidate.roles.reason.remove(&t);
        }

        let negators: BTreeSet<usize> =
            candidate.emotion_negated_heads.iter().filter_map(|h| self.groups.negation.get(h).copied()).collect();
        let bare_emotion: BTreeSet<usize> = candidate.roles.emotion.difference(&negators).copied().collect();
        let emotion_word = join_lemmas(self.clause, &bare_emotion);
        if !emotion_word.is_empty() && !self.lexicon.is_emotion(&emotion_word) {
            tracing::debug!(pattern, emotion = %emotion_word, "dropped: not an emotion word");
            return None;
        }

        let object_tag = self.single_token_tag(&candidate.roles.object, |lemma, _| OBJECT_PRONOUNS.contains(&lemma));
        let holder_tag =
            self.single_token_tag(&candidate.roles.holder, |_, class| class.contains(PronounClass::PERSONAL));
        let (object_tag, holder_tag) = match (object_tag, holder_tag) {
            (Ok(object_tag), Ok(holder_tag)) => (object_tag, holder_tag),
            (Err(reason), _) | (_, Err(reason)) => {
                tracing::debug!(pattern, reason, "dropped: meaningless holder or object");
                return None;
            }
        };

        let roles = &candidate.roles;
        Some(Opinion {
            all_matched: all_matched.into_iter().collect(),
            holder_text: join_lemmas(self.clause, &roles.holder),
            emotion_text: join_lemmas(self.clause, &roles.emotion),
            object_text: join_lemmas(self.clause, &roles.object),
            reason_text: join_lemmas(self.clause, &roles.reason),
            holder_tag,
            object_tag,
            candidate,
        })
    }

    /// A joint phrase touching the candidate must lie whole inside its emotion or reason.
    fn joint_phrases_intact(&self, candidate: &Candidate) -> bool {
        if !self.anchors.has_joint_anchor() {
            return true;
        }
        let combined = candidate.combined();
        let mut touching = self.anchors.joint_spans.iter().filter(|span| !span.is_disjoint(&combined)).peekable();
        if touching.peek().is_none() {
            return true;
        }
        let roles = &candidate.roles;
        touching.any(|span| span.is_subset(&roles.emotion) || span.is_subset(&roles.reason))
    }

    /// Classify a single-token span. `Ok(Some(PRON))` for a usable pronoun, `Ok(None)`
    /// for anything that is not a pronoun, `Err` for spans that carry no content.
    fn single_token_tag(
        &self,
        span: &BTreeSet<usize>,
        usable: impl Fn(&str, PronounClass) -> bool,
    ) -> Result<Option<&'static str>, &'static str> {
        let (Some(&token), 1) = (span.first(), span.len()) else {
            return Ok(None);
        };
        if let Some(&class) = self.groups.pronouns.get(&token) {
            return if usable(&self.clause.token(token).lemma, class) {
                Ok(Some(PRONOUN_TAG))
            } else {
                Err("pronoun without a referent")
            };
        }
        if self.groups.indicator_nouns.contains(&token) {
            return Err("indicator noun");
        }
        Ok(None)
    }
}

/// Matched tokens per position of the span they cover. Empty spans pass.
pub fn span_ratio(span: &BTreeSet<usize>) -> f64 {
    match (span.first(), span.last()) {
        (Some(&lo), Some(&hi)) => span.len() as f64 / (hi - lo + 1) as f64,
        _ => 1.0,
    }
}

pub fn join_lemmas<'c>(clause: &Clause, tokens: impl IntoIterator<Item = &'c usize>) -> String {
    let mut out = String::new();
    for (n, &id) in tokens.into_iter().enumerate() {
        let token = clause.token(id);
        if n > 0 {
            let glued = id > 0 && {
                let prev = clause.token(id - 1);
                token.start == prev.end && (token.is_punct() || prev.is_punct())
            };
            if !glued {
                out.push(' ');
            }
        }
        out.push_str(&token.lemma);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use crate::engine::expand::RoleSets;
    use crate::testutil::{clause, i_love_the_color};
    use crate::{Token, engine::anchors::mark_anchors};

    fn candidate(holder: &[usize], emotion: &[usize], object: &[usize], reason: &[usize]) -> Candidate {
        Candidate {
            pattern: 1,
            anchor: emotion.first().copied().unwrap_or(0),
            roles: RoleSets {
                holder: holder.iter().copied().collect(),
                emotion: emotion.iter().copied().collect(),
                object: object.iter().copied().collect(),
                reason: reason.iter().copied().collect(),
            },
            placeholders: BTreeSet::new(),
            emotion_negated: false,
            emotion_negated_heads: BTreeSet::new(),
            reason_negated: false,
            reason_negated_heads: BTreeSet::new(),
        }
    }

    fn filter_one(c: &mut Clause, lexicon: &Lexicon, cand: Candidate) -> Option<Opinion> {
        let info = mark_anchors(c, lexicon);
        let groups = Groups::scan(c, lexicon, &GroupConfig::default());
        OpinionFilter::new(c, &groups, lexicon, &info, 0.25).apply(vec![cand]).pop()
    }

    #[test]
    fn builds_texts_from_lemmas() {
        let lexicon = Lexicon::builder().positive("love").emotion("love").build();
        let mut c = i_love_the_color();
        let opinion = filter_one(&mut c, &lexicon, candidate(&[0], &[1], &[2, 3], &[])).unwrap();
        assert_eq!(opinion.holder_text, "I");
        assert_eq!(opinion.emotion_text, "love");
        assert_eq!(opinion.object_text, "the color");
        assert_eq!(opinion.holder_tag, Some(PRONOUN_TAG));
        assert_eq!(opinion.all_matched, vec![0, 1, 2, 3]);
    }

    #[test]
    fn non_emotion_words_are_dropped() {
        let lexicon = Lexicon::builder().positive("love").emotion("adore").build();
        let mut c = i_love_the_color();
        assert!(filter_one(&mut c, &lexicon, candidate(&[0], &[1], &[2, 3], &[])).is_none());
    }

    #[test]
    fn sparse_object_spans_are_dropped() {
        let rows: Vec<(&str, &str, &str, &str, usize)> =
            (0..10).map(|i| ("x", "x", "NOUN", if i == 0 { "ROOT" } else { "dep" }, 0)).collect();
        let mut c = clause(&rows);
        let lexicon = Lexicon::default();
        assert!(filter_one(&mut c, &lexicon, candidate(&[], &[], &[0, 9], &[])).is_none());
        assert!(filter_one(&mut c, &lexicon, candidate(&[], &[], &[0, 3], &[])).is_some());
    }

    #[test]
    fn object_pronouns_need_a_referent_class() {
        // it / who as a lone object
        let lexicon = Lexicon::default();
        let rows = |lemma| {
            vec![("love", "love", "VERB", "ROOT", 0usize), (lemma, lemma, "PRON", "dobj", 0)]
        };
        let mut c = clause(&rows("it"));
        assert_eq!(filter_one(&mut c, &lexicon, candidate(&[], &[], &[1], &[])).unwrap().object_tag, Some("PRON"));
        let mut c = clause(&rows("who"));
        assert!(filter_one(&mut c, &lexicon, candidate(&[], &[], &[1], &[])).is_none());
    }

    #[test]
    fn punctuation_glues_without_space() {
        let tokens = vec![
            Token {
                index: 0,
                text: "great".into(),
                lemma: "great".into(),
                pos: "ADJ".into(),
                dep: "ROOT".into(),
                head: 0,
                start: 0,
                end: 5,
                anchor: false,
            },
            Token {
                index: 1,
                text: "!".into(),
                lemma: "!".into(),
                pos: "PUNCT".into(),
                dep: "punct".into(),
                head: 0,
                start: 5,
                end: 6,
                anchor: false,
            },
        ];
        let c = Clause::new("great!", tokens).unwrap();
        assert_eq!(join_lemmas(&c, &[0, 1]), "great!");
        assert_eq!(span_ratio(&BTreeSet::from([1, 4])), 0.5);
    }
}
