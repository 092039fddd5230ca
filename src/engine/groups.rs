//! Per-clause group indices.
//!
//! Before any pattern runs, the clause is scanned once and the structural facts
//! the assembler keeps asking about are indexed here: which tokens form fixed
//! phrases, which are coordinated, which auxiliaries or particles hang off a verb,
//! which negators and degree adverbs modify which heads.
//!
//! ## Design notes
//!
//! - This is a single linear pass plus a union-find over phrase pairs. Nothing
//!   here depends on the rule set, so it is built once per clause.
//! - Group maps are keyed by *head* token. Completion in `expand.rs` looks up a
//!   role's tokens as heads and pulls in the tails.
//! - `default_matches` stays empty here; the matcher fills it from the built-in
//!   prepositional patterns.

use crate::config::GroupConfig;
use crate::lexicon::Lexicon;
use crate::{Clause, Token};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const COORDINATION_POS: &[&str] = &["VERB", "NOUN", "ADJ", "AUX", "PROPN"];

bitflags::bitflags! {
    /// Pronoun classes a lemma belongs to. A lemma may sit in several.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PronounClass: u8 {
        const PERSONAL      = 1 << 0;
        const INTERROGATIVE = 1 << 1;
        const RELATIVE      = 1 << 2;
        const INDEFINITE    = 1 << 3;
        const OTHER         = 1 << 4;
    }
}

impl PronounClass {
    pub fn of(lemma: &str) -> Self {
        let mut class = PronounClass::empty();
        if matches!(
            lemma,
            "I" | "i" | "you" | "she" | "he" | "we" | "it" | "they" | "me" | "her" | "him" | "us" | "them"
                | "these"
                | "this"
        ) {
            class |= PronounClass::PERSONAL;
        }
        if matches!(lemma, "who" | "whom" | "which" | "what") {
            class |= PronounClass::INTERROGATIVE;
        }
        if matches!(lemma, "who" | "whom" | "that" | "which" | "whoever" | "whomever" | "whichever") {
            class |= PronounClass::RELATIVE;
        }
        if matches!(
            lemma,
            "something"
                | "anything"
                | "everything"
                | "somebody"
                | "someone"
                | "anybody"
                | "anyone"
                | "nothing"
                | "nobody"
                | "everybody"
                | "everyone"
        ) {
            class |= PronounClass::INDEFINITE;
        }
        if class.is_empty() { PronounClass::OTHER } else { class }
    }
}

/// One conjunct of a coordination root and its distance to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConjUnit {
    pub token: usize,
    pub distance: usize,
}

/// A degree adverb attached to `head` (e.g. `very` → `good`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeLink {
    pub modifier: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Groups {
    /// Token → its compound/particle/modifier phrase (including itself).
    pub phrases: HashMap<usize, BTreeSet<usize>>,
    /// Token → the lexicon phrase covering it.
    pub lexicon_phrases: HashMap<usize, BTreeSet<usize>>,
    /// Coordinated token pairs.
    pub coordination: Vec<(usize, usize)>,
    /// Coordination root → its conjuncts.
    pub conj_roots: BTreeMap<usize, Vec<ConjUnit>>,
    /// Head → negator.
    pub negation: BTreeMap<usize, usize>,
    pub aux: BTreeMap<usize, usize>,
    pub prt: BTreeMap<usize, usize>,
    pub xcomp: BTreeMap<usize, usize>,
    pub poss: BTreeMap<usize, usize>,
    pub det: BTreeMap<usize, usize>,
    pub pronouns: HashMap<usize, PronounClass>,
    /// Nouns introducing a clausal modifier ("the fact that ..."); never valid spans on their own.
    pub indicator_nouns: BTreeSet<usize>,
    /// Head → degree adverb.
    pub degree: HashMap<usize, DegreeLink>,
    /// Built-in pattern name → unit root → companions.
    pub default_matches: BTreeMap<&'static str, BTreeMap<usize, BTreeSet<usize>>>,
}

impl Groups {
    pub fn scan(clause: &Clause, lexicon: &Lexicon, config: &GroupConfig) -> Self {
        let mut groups = Groups::default();
        let mut phrase_pairs: Vec<(usize, usize)> = Vec::new();

        for token in clause.tokens() {
            let i = token.index;
            let head = clause.token(token.head);
            let distance = i.abs_diff(head.index);
            let dep = token.dep.as_str();

            if dep == "neg" {
                groups.negation.insert(head.index, i);
            }
            let near = distance < config.companion_distance;
            if dep == "aux" && matches!(token.pos.as_str(), "PART" | "AUX") && head.pos == "VERB" && near {
                groups.aux.insert(head.index, i);
            }
            if dep == "prt" && token.pos == "ADP" && head.pos == "VERB" && near {
                groups.prt.insert(head.index, i);
            }
            if dep == "xcomp" && token.pos == "VERB" && matches!(head.pos.as_str(), "ADJ" | "ADV") && near {
                groups.xcomp.insert(head.index, i);
            }
            if dep == "poss" && token.pos == "PRON" {
                groups.poss.insert(head.index, i);
            }
            if dep == "det" && token.pos == "DET" && matches!(head.pos.as_str(), "NOUN" | "PROPN") {
                groups.det.insert(head.index, i);
            }

            if i != head.index {
                if matches!(dep, "compound" | "prt") {
                    phrase_pairs.push((i, head.index));
                } else if matches!(token.pos.as_str(), "VERB" | "ADJ")
                    && head.pos == "NOUN"
                    && dep == "amod"
                    && !token.anchor
                    && i < head.index
                    && head.index - i < config.amod_distance
                {
                    phrase_pairs.push((i, head.index));
                } else if token.pos == "DET" && head.pos == "NOUN" && dep == "det" && token.lemma == "no" {
                    phrase_pairs.push((i, head.index));
                } else if is_percent_sign(token) && i > 0 && looks_numeric(clause.token(i - 1)) {
                    phrase_pairs.push((i, i - 1));
                } else if dep == "acl" && head.pos == "NOUN" && head.dep == "dobj" {
                    groups.indicator_nouns.insert(head.index);
                }
            }

            if token.pos == "PRON" {
                groups.pronouns.insert(i, PronounClass::of(&token.lemma));
            }

            let weight = lexicon.degree(&token.lemma).or_else(|| lexicon.degree(&token.text));
            if let Some(weight) = weight {
                groups.degree.insert(head.index, DegreeLink { modifier: i, weight });
            }
        }

        groups.phrases = merge_pairs(clause.len(), &phrase_pairs);
        groups.scan_coordination(clause, config);

        let lemmas: Vec<&str> = clause.tokens().iter().map(|t| t.lemma.as_str()).collect();
        for found in lexicon.phrases().segment(&lemmas) {
            let members: BTreeSet<usize> = (found.start..found.end).collect();
            for &i in &members {
                groups.lexicon_phrases.insert(i, members.clone());
            }
        }

        groups
    }

    fn scan_coordination(&mut self, clause: &Clause, config: &GroupConfig) {
        let child_deps: Vec<BTreeSet<&str>> = (0..clause.len())
            .map(|i| clause.children(i).iter().map(|&c| clause.token(c).dep.as_str()).collect())
            .collect();

        for token in clause.tokens() {
            let i = token.index;
            if token.dep != "conj" || i == clause.root() {
                continue;
            }
            let head = clause.token(token.head);
            if !COORDINATION_POS.contains(&token.pos.as_str()) || token.pos != head.pos {
                continue;
            }
            // Two full clauses joined by a conjunction are not a coordinated span.
            if matches!(token.pos.as_str(), "VERB" | "AUX")
                && child_deps[i].contains("nsubj")
                && child_deps[head.index].contains("nsubj")
            {
                continue;
            }
            if child_deps[i].contains("dobj") != child_deps[head.index].contains("dobj") {
                continue;
            }

            let (root, chain) = conj_root(clause, head.index);
            let direct = i.abs_diff(head.index);
            let distance = chain.max(direct);
            if distance <= config.conj_near_distance {
                self.coordination.push((i, head.index));
                self.conj_roots.entry(root).or_default().push(ConjUnit { token: i, distance: direct });
            } else if distance >= config.conj_far_distance {
                continue;
            } else if !child_deps[i].is_disjoint(&child_deps[head.index]) {
                self.coordination.push((i, head.index));
                self.conj_roots.entry(root).or_default().push(ConjUnit { token: i, distance: i.abs_diff(root) });
            }
        }
    }

    /// Every token that takes part in some coordination.
    pub fn coordination_tokens(&self) -> BTreeSet<usize> {
        self.coordination.iter().flat_map(|&(a, b)| [a, b]).collect()
    }
}

/// Climb a `conj` chain from `head` to the first non-conjunct, tracking the widest hop.
fn conj_root(clause: &Clause, head: usize) -> (usize, usize) {
    let mut root = head;
    let mut widest = 0;
    while clause.token(root).dep == "conj" {
        match clause.head(root) {
            Some(next) => root = next,
            None => break,
        }
        let hop = clause.head(root).map(|h| h.abs_diff(root)).unwrap_or(0);
        widest = widest.max(hop);
    }
    (root, widest)
}

/// A `%` the tagger treated as a noun.
fn is_percent_sign(token: &Token) -> bool {
    token.lemma == "%" && token.pos == "NOUN" && token.text.chars().all(|c| c.is_ascii_punctuation())
}

fn looks_numeric(token: &Token) -> bool {
    token.pos == "NUM" || {
        let digits: String = token.text.chars().filter(|c| !matches!(c, ',' | '.')).collect();
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }
}

/// Union-find over token pairs; each token maps to its whole connected group.
fn merge_pairs(n: usize, pairs: &[(usize, usize)]) -> HashMap<usize, BTreeSet<usize>> {
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut parent: Vec<usize> = (0..n).collect();
    for &(a, b) in pairs {
        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let mut by_root: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for &(a, b) in pairs {
        let root = find(&mut parent, a);
        by_root.entry(root).or_default().extend([a, b]);
    }

    let mut out = HashMap::new();
    for members in by_root.into_values() {
        for &m in &members {
            out.insert(m, members.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::clause;

    fn scan(c: &Clause) -> Groups {
        Groups::scan(c, &Lexicon::builder().degree("very", 2.0).phrase("battery life").build(), &GroupConfig::default())
    }

    #[test]
    fn fixed_pairs_and_negation() {
        // I do not like the battery life
        let c = clause(&[
            ("I", "I", "PRON", "nsubj", 3),
            ("do", "do", "AUX", "aux", 3),
            ("not", "not", "PART", "neg", 3),
            ("like", "like", "VERB", "ROOT", 3),
            ("the", "the", "DET", "det", 6),
            ("battery", "battery", "NOUN", "compound", 6),
            ("life", "life", "NOUN", "dobj", 3),
        ]);
        let g = scan(&c);
        assert_eq!(g.aux.get(&3), Some(&1));
        assert_eq!(g.negation.get(&3), Some(&2));
        assert_eq!(g.det.get(&6), Some(&4));
        assert_eq!(g.phrases.get(&5), Some(&BTreeSet::from([5, 6])));
        assert_eq!(g.lexicon_phrases.get(&6), Some(&BTreeSet::from([5, 6])));
        assert_eq!(g.pronouns.get(&0), Some(&PronounClass::PERSONAL));
    }

    #[test]
    fn percent_joins_its_number_only_as_a_noun() {
        // rated 99 %
        fn rated(pos: &'static str) -> Clause {
            let rows =
                [("rated", "rate", "VERB", "ROOT", 0), ("99", "99", "NUM", "nummod", 2), ("%", "%", pos, "dobj", 0)];
            clause(&rows)
        }
        assert_eq!(scan(&rated("NOUN")).phrases.get(&2), Some(&BTreeSet::from([1, 2])));
        assert_eq!(scan(&rated("SYM")).phrases.get(&2), None);
    }

    #[test]
    fn degree_links_and_pronoun_classes() {
        let c = clause(&[("very", "very", "ADV", "advmod", 1), ("good", "good", "ADJ", "ROOT", 1)]);
        let g = scan(&c);
        assert_eq!(g.degree.get(&1), Some(&DegreeLink { modifier: 0, weight: 2.0 }));

        assert!(PronounClass::of("who").contains(PronounClass::INTERROGATIVE | PronounClass::RELATIVE));
        assert_eq!(PronounClass::of("everyone"), PronounClass::INDEFINITE);
        assert_eq!(PronounClass::of("yourself"), PronounClass::OTHER);
    }

    #[test]
    fn near_coordination_is_grouped() {
        // I love the color and design
        let c = clause(&[
            ("I", "I", "PRON", "nsubj", 1),
            ("love", "love", "VERB", "ROOT", 1),
            ("the", "the", "DET", "det", 3),
            ("color", "color", "NOUN", "dobj", 1),
            ("and", "and", "CCONJ", "cc", 3),
            ("design", "design", "NOUN", "conj", 3),
        ]);
        let g = scan(&c);
        assert_eq!(g.coordination, vec![(5, 3)]);
        assert_eq!(g.conj_roots.get(&3), Some(&vec![ConjUnit { token: 5, distance: 2 }]));
        assert_eq!(g.coordination_tokens(), BTreeSet::from([3, 5]));
    }

    #[test]
    fn coordinated_clauses_are_not_grouped() {
        // it works and I like it
        let c = clause(&[
            ("it", "it", "PRON", "nsubj", 1),
            ("works", "work", "VERB", "ROOT", 1),
            ("and", "and", "CCONJ", "cc", 1),
            ("I", "I", "PRON", "nsubj", 4),
            ("like", "like", "VERB", "conj", 1),
            ("it", "it", "PRON", "dobj", 4),
        ]);
        let g = scan(&c);
        assert!(g.coordination.is_empty());
    }

    #[test]
    fn union_find_merges_chains() {
        let merged = merge_pairs(6, &[(1, 2), (2, 4), (0, 5)]);
        assert_eq!(merged.get(&1), Some(&BTreeSet::from([1, 2, 4])));
        assert_eq!(merged.get(&4), Some(&BTreeSet::from([1, 2, 4])));
        assert_eq!(merged.get(&5), Some(&BTreeSet::from([0, 5])));
        assert!(!merged.contains_key(&3));
    }
}
