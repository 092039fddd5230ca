//! Read-only word lists consulted by every stage of the pipeline.
//!
//! A [`Lexicon`] is built once (from a directory of text files or with
//! [`LexiconBuilder`]) and shared behind an `Arc`. Nothing mutates it after
//! construction; swapping vocabularies means building a new value and a new engine.
//!
//! ## File layout
//!
//! All files are optional. Blank lines and lines starting with `#` are ignored.
//!
//! | file                        | line format                          |
//! |-----------------------------|--------------------------------------|
//! | `positive.txt`              | `word`                               |
//! | `negative.txt`              | `word`                               |
//! | `emotion.txt`               | `word`                               |
//! | `sent_intensity.txt`        | `word<TAB>weight`                    |
//! | `degree_adverbs.txt`        | `word<TAB>weight`                    |
//! | `oov_vocab.txt`             | `word`                               |
//! | `phrase_vocab.txt`          | `lemma lemma ...`                    |
//! | `joint_sentiment_words.txt` | `lemma lemma ...<TAB>score`          |
//! | `anchor_badcase.txt`        | `lemma ...<TAB>POS|POS<TAB>dep|dep`  |
//! | `filter.txt`                | `holder<TAB>emotion<TAB>object<TAB>reason` |
//! | `modify.txt`                | `object<TAB>reason<TAB>score`        |

use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

// --- Phrase trie ------------------------------------------------------------

#[derive(Debug, Clone)]
struct TrieNode<T> {
    children: HashMap<String, usize>,
    value: Option<T>,
}

/// Trie over whitespace-separated word sequences, used for greedy
/// longest-match segmentation of a clause's lemmas.
#[derive(Debug, Clone)]
pub struct PhraseTrie<T> {
    nodes: Vec<TrieNode<T>>,
}

/// One phrase found by [`PhraseTrie::segment`]: token range `start..end` plus the stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseMatch<'a, T> {
    pub start: usize,
    pub end: usize,
    pub value: &'a T,
}

impl<T> Default for PhraseTrie<T> {
    fn default() -> Self {
        PhraseTrie { nodes: vec![TrieNode { children: HashMap::new(), value: None }] }
    }
}

impl<T> PhraseTrie<T> {
    pub fn insert(&mut self, phrase: &str, value: T) {
        let mut node = 0;
        for word in phrase.split_whitespace() {
            node = match self.nodes[node].children.get(word) {
                Some(&next) => next,
                None => {
                    self.nodes.push(TrieNode { children: HashMap::new(), value: None });
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children.insert(word.to_string(), next);
                    next
                }
            };
        }
        if node != 0 {
            self.nodes[node].value = Some(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Scan `words` left to right, taking the longest phrase starting at each
    /// position and skipping past it. Positions without a phrase advance by one.
    pub fn segment<S: AsRef<str>>(&self, words: &[S]) -> Vec<PhraseMatch<'_, T>> {
        let mut found = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let mut node = 0;
            let mut best: Option<(usize, &T)> = None;
            for (j, word) in words.iter().enumerate().skip(i) {
                match self.nodes[node].children.get(word.as_ref()) {
                    Some(&next) => node = next,
                    None => break,
                }
                if let Some(value) = &self.nodes[node].value {
                    best = Some((j + 1, value));
                }
            }
            match best {
                Some((end, value)) => {
                    found.push(PhraseMatch { start: i, end, value });
                    i = end;
                }
                None => i += 1,
            }
        }
        found
    }
}

// --- Lexicon ----------------------------------------------------------------

/// Tokens that must not be anchors inside a badcase phrase.
///
/// With both sets empty every token of the phrase is un-anchored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorBadcase {
    pub illegal_pos: BTreeSet<String>,
    pub illegal_dep: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    polarity: HashMap<String, f64>,
    emotion: BTreeSet<String>,
    intensity: HashMap<String, f64>,
    degree: HashMap<String, f64>,
    oov: Vec<String>,
    filter: HashSet<String>,
    modify: HashMap<String, f64>,
    phrases: PhraseTrie<()>,
    joint: PhraseTrie<f64>,
    badcases: PhraseTrie<AnchorBadcase>,
}

impl Lexicon {
    pub fn builder() -> LexiconBuilder {
        LexiconBuilder::default()
    }

    /// Load every known file from `dir`. Missing files leave that list empty.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut b = LexiconBuilder::default();

        for word in read_lines(dir, "positive.txt")? {
            b = b.positive(&word);
        }
        for word in read_lines(dir, "negative.txt")? {
            b = b.negative(&word);
        }
        for word in read_lines(dir, "emotion.txt")? {
            b = b.emotion(&word);
        }
        for (word, weight) in read_weighted(dir, "sent_intensity.txt")? {
            b = b.intensity(&word, weight);
        }
        for (word, weight) in read_weighted(dir, "degree_adverbs.txt")? {
            b = b.degree(&word, weight);
        }
        for word in read_lines(dir, "oov_vocab.txt")? {
            b = b.oov(&word);
        }
        for phrase in read_lines(dir, "phrase_vocab.txt")? {
            b = b.phrase(&phrase);
        }
        for (phrase, score) in read_weighted(dir, "joint_sentiment_words.txt")? {
            b = b.joint(&phrase, score);
        }
        for line in read_lines(dir, "anchor_badcase.txt")? {
            let mut fields = line.split('\t');
            let words = fields.next().unwrap_or_default();
            let pos = split_pipe(fields.next().unwrap_or_default());
            let dep = split_pipe(fields.next().unwrap_or_default());
            b = b.badcase(words, pos, dep);
        }
        for line in read_lines(dir, "filter.txt")? {
            b.filter.insert(line.to_lowercase());
        }
        for line in read_lines(dir, "modify.txt")? {
            let Some((key, score)) = line.rsplit_once('\t') else {
                let path = dir.join("modify.txt").display().to_string();
                return Err(Error::lexicon(path, format!("missing score: `{line}`")));
            };
            let score = parse_weight(dir, "modify.txt", score)?;
            b.modify.insert(key.to_lowercase(), score);
        }

        let lexicon = b.build();
        tracing::info!(
            dir = %dir.display(),
            polarity = lexicon.polarity.len(),
            emotion = lexicon.emotion.len(),
            "lexicon loaded"
        );
        Ok(lexicon)
    }

    /// Lexicon polarity of `word`, `0.0` when unlisted.
    pub fn polarity(&self, word: &str) -> f64 {
        self.polarity.get(word).copied().unwrap_or(0.0)
    }

    pub fn has_polarity(&self, word: &str) -> bool {
        self.polarity.contains_key(word)
    }

    pub fn is_emotion(&self, text: &str) -> bool {
        self.emotion.contains(text)
    }

    pub fn emotion_words(&self) -> &BTreeSet<String> {
        &self.emotion
    }

    /// Base intensity of an anchor word, if listed.
    pub fn intensity(&self, word: &str) -> Option<f64> {
        self.intensity.get(word).copied()
    }

    pub fn degree(&self, word: &str) -> Option<f64> {
        self.degree.get(word).copied()
    }

    /// Words the annotator must keep as single tokens.
    pub fn oov_vocab(&self) -> &[String] {
        &self.oov
    }

    pub fn phrases(&self) -> &PhraseTrie<()> {
        &self.phrases
    }

    pub fn joint_phrases(&self) -> &PhraseTrie<f64> {
        &self.joint
    }

    pub fn badcases(&self) -> &PhraseTrie<AnchorBadcase> {
        &self.badcases
    }

    /// Whether a finished tuple is listed in the filter file.
    pub fn is_filtered(&self, holder: &str, emotion: &str, object: &str, reason: &str) -> bool {
        !self.filter.is_empty() && self.filter.contains(&[holder, emotion, object, reason].join("\t").to_lowercase())
    }

    /// Score override for an object/reason pair from the modify file.
    pub fn modified_score(&self, object: &str, reason: &str) -> Option<f64> {
        if self.modify.is_empty() {
            return None;
        }
        self.modify.get(&format!("{object}\t{reason}").to_lowercase()).copied()
    }
}

/// Incremental construction of a [`Lexicon`].
///
/// ```
/// use sentiro::Lexicon;
///
/// let lexicon = Lexicon::builder().positive("love").emotion("love").degree("very", 2.0).build();
/// assert_eq!(lexicon.polarity("love"), 1.0);
/// ```
#[derive(Debug, Default)]
pub struct LexiconBuilder {
    polarity: HashMap<String, f64>,
    emotion: BTreeSet<String>,
    intensity: HashMap<String, f64>,
    degree: HashMap<String, f64>,
    oov: Vec<String>,
    filter: HashSet<String>,
    modify: HashMap<String, f64>,
    phrases: Vec<String>,
    joint: Vec<(String, f64)>,
    badcases: Vec<(String, AnchorBadcase)>,
}

impl LexiconBuilder {
    pub fn positive(mut self, word: &str) -> Self {
        self.polarity.insert(word.to_string(), 1.0);
        self
    }

    pub fn negative(mut self, word: &str) -> Self {
        self.polarity.insert(word.to_string(), -1.0);
        self
    }

    pub fn emotion(mut self, word: &str) -> Self {
        self.emotion.insert(word.to_string());
        self
    }

    pub fn intensity(mut self, word: &str, weight: f64) -> Self {
        self.intensity.insert(word.to_string(), weight);
        self
    }

    pub fn degree(mut self, word: &str, weight: f64) -> Self {
        self.degree.insert(word.to_string(), weight);
        self
    }

    pub fn oov(mut self, word: &str) -> Self {
        self.oov.push(word.to_string());
        self
    }

    pub fn phrase(mut self, phrase: &str) -> Self {
        self.phrases.push(phrase.to_string());
        self
    }

    pub fn joint(mut self, phrase: &str, score: f64) -> Self {
        self.joint.push((phrase.to_string(), score));
        self
    }

    pub fn badcase(mut self, words: &str, illegal_pos: BTreeSet<String>, illegal_dep: BTreeSet<String>) -> Self {
        self.badcases.push((words.to_string(), AnchorBadcase { illegal_pos, illegal_dep }));
        self
    }

    pub fn filter(mut self, holder: &str, emotion: &str, object: &str, reason: &str) -> Self {
        self.filter.insert([holder, emotion, object, reason].join("\t").to_lowercase());
        self
    }

    pub fn modify(mut self, object: &str, reason: &str, score: f64) -> Self {
        self.modify.insert(format!("{object}\t{reason}").to_lowercase(), score);
        self
    }

    pub fn build(self) -> Lexicon {
        // Lexicon phrase groups cover both the phrase vocabulary and joint sentiment words.
        let mut phrases = PhraseTrie::default();
        for phrase in &self.phrases {
            phrases.insert(phrase, ());
        }
        let mut joint = PhraseTrie::default();
        for (phrase, score) in &self.joint {
            phrases.insert(phrase, ());
            joint.insert(phrase, *score);
        }
        let mut badcases = PhraseTrie::default();
        for (words, case) in self.badcases {
            badcases.insert(&words, case);
        }

        Lexicon {
            polarity: self.polarity,
            emotion: self.emotion,
            intensity: self.intensity,
            degree: self.degree,
            oov: self.oov,
            filter: self.filter,
            modify: self.modify,
            phrases,
            joint,
            badcases,
        }
    }
}

fn read_lines(dir: &Path, name: &str) -> Result<Vec<String>> {
    let path = dir.join(name);
    if !path.exists() {
        tracing::debug!(file = %path.display(), "lexicon file absent, using empty list");
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
        // Only spaces are trimmed: a leading tab marks an empty first column.
        .map(|l| l.trim_matches([' ', '\r']).to_string())
        .collect())
}

fn read_weighted(dir: &Path, name: &str) -> Result<Vec<(String, f64)>> {
    read_lines(dir, name)?
        .into_iter()
        .map(|line| {
            let Some((word, weight)) = line.split_once('\t') else {
                return Err(Error::lexicon(dir.join(name).display().to_string(), format!("missing weight: `{line}`")));
            };
            Ok((word.trim().to_string(), parse_weight(dir, name, weight)?))
        })
        .collect()
}

fn parse_weight(dir: &Path, name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::lexicon(dir.join(name).display().to_string(), format!("invalid weight `{}`", raw.trim())))
}

fn split_pipe(field: &str) -> BTreeSet<String> {
    field.split('|').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trie_prefers_longest_phrase() {
        let mut trie = PhraseTrie::default();
        trie.insert("look forward", 1);
        trie.insert("look forward to", 2);
        let words = ["I", "look", "forward", "to", "it"];
        let found = trie.segment(&words);
        assert_eq!(found, vec![PhraseMatch { start: 1, end: 4, value: &2 }]);
    }

    #[test]
    fn trie_backs_off_to_last_complete_phrase() {
        let mut trie = PhraseTrie::default();
        trie.insert("battery life", ());
        trie.insert("battery life span", ());
        let words = ["battery", "life", "is", "great"];
        let found = trie.segment(&words);
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].start, found[0].end), (0, 2));
    }

    #[test]
    fn trie_finds_several_phrases() {
        let mut trie = PhraseTrie::default();
        trie.insert("customer service", ());
        trie.insert("sound quality", ());
        let words = ["customer", "service", "and", "sound", "quality"];
        let spans: Vec<(usize, usize)> = trie.segment(&words).iter().map(|m| (m.start, m.end)).collect();
        assert_eq!(spans, vec![(0, 2), (3, 5)]);
    }

    #[test]
    fn builder_lookups() {
        let lexicon = Lexicon::builder()
            .positive("love")
            .negative("hate")
            .emotion("love")
            .intensity("adore", 3.0)
            .joint("fall apart", -1.0)
            .filter("I", "love", "", "")
            .modify("price", "", 0.5)
            .build();

        assert_eq!(lexicon.polarity("love"), 1.0);
        assert_eq!(lexicon.polarity("hate"), -1.0);
        assert_eq!(lexicon.polarity("table"), 0.0);
        assert!(lexicon.is_emotion("love"));
        assert_eq!(lexicon.intensity("adore"), Some(3.0));
        assert!(lexicon.is_filtered("i", "LOVE", "", ""));
        assert_eq!(lexicon.modified_score("Price", ""), Some(0.5));
        // joint words also feed the phrase trie
        assert_eq!(lexicon.phrases().segment(&["fall", "apart"]).len(), 1);
    }

    #[test]
    fn loads_directory_and_rejects_bad_weights() {
        let dir = std::env::temp_dir().join(format!("sentiro-lexicon-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("positive.txt"), "# comment\ngood\n\ngreat\n").unwrap();
        std::fs::write(dir.join("degree_adverbs.txt"), "very\t2.0\n").unwrap();
        std::fs::write(dir.join("anchor_badcase.txt"), "as well\t\tadvmod\n").unwrap();
        std::fs::write(dir.join("filter.txt"), "\tlove\tit\t\n").unwrap();

        let lexicon = Lexicon::from_dir(&dir).unwrap();
        assert_eq!(lexicon.polarity("great"), 1.0);
        assert_eq!(lexicon.degree("very"), Some(2.0));
        let cases = lexicon.badcases().segment(&["as", "well"]);
        assert_eq!(cases[0].value.illegal_dep.iter().collect::<Vec<_>>(), vec!["advmod"]);
        assert!(lexicon.is_filtered("", "Love", "it", ""));

        std::fs::write(dir.join("sent_intensity.txt"), "adore\tlots\n").unwrap();
        assert!(matches!(Lexicon::from_dir(&dir), Err(Error::Lexicon { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }
}
