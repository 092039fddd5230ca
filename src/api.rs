use crate::config::EngineConfig;
use crate::engine::{self, ClauseContext, ClauseMetrics, CompiledRules, Opinion, PatternId, RunMetrics, Sentiment};
use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::services::Services;
use crate::{Clause, Token};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// One clause as delivered by the annotator.
///
/// Token `start`/`end` offsets are relative to `text`, leading whitespace
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedClause {
    pub text: String,
    pub tokens: Vec<Token>,
}

/// One role of a result.
///
/// `token_ids` are document-level; `char_range` is `None` for an empty element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub text: String,
    pub token_ids: Vec<usize>,
    pub char_range: Option<(usize, usize)>,
    /// Lowercased text with collapsed whitespace.
    pub tag: String,
}

impl Element {
    /// Token count over spanned positions (ε-smoothed).
    pub fn compactness(&self) -> f64 {
        engine::element_compactness(&self.token_ids.iter().copied().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// A finished opinion tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResult {
    pub clause: String,
    /// Position of the clause in the document.
    pub clause_index: usize,
    /// Character range from the clause start to the last matched token.
    pub clause_range: (usize, usize),
    pub holder: Element,
    pub emotion: Element,
    pub object: Element,
    pub reason: Element,
    /// `PRON` for a single pronoun holder, empty otherwise.
    pub holder_type: String,
    pub object_type: String,
    pub anchor_id: usize,
    pub anchor_text: String,
    pub anchor_lemma: String,
    pub pattern: PatternId,
    pub emotion_negated: bool,
    pub emotion_negated_tokens: Vec<usize>,
    pub reason_negated: bool,
    pub reason_negated_tokens: Vec<usize>,
    pub model_sent: f64,
    pub anchor_sent: f64,
    pub anchor_type_sent: f64,
    pub sent_score: f64,
    pub sent_intensity: f64,
    pub all_matched: Vec<usize>,
}

/// A clause that produced no results because it was filtered or malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedClause {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOutput {
    pub results: Vec<ExtractResult>,
    pub skipped: Vec<SkippedClause>,
    pub metrics: RunMetrics,
}

/// Running character and token position inside a document.
#[derive(Debug, Clone, Copy, Default)]
struct Offsets {
    tokens: usize,
    chars: usize,
}

impl Offsets {
    fn advance(&mut self, clause: &AnnotatedClause) {
        self.tokens += clause.tokens.len();
        self.chars += clause.tokens.last().map(|t| t.end).unwrap_or(0);
    }
}

/// Immutable extraction engine: compiled rules, lexicon, configuration and the
/// external collaborators. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct Engine {
    rules: Arc<CompiledRules>,
    lexicon: Arc<Lexicon>,
    config: Arc<EngineConfig>,
    services: Services,
}

impl Engine {
    pub fn new(rules: CompiledRules, lexicon: Lexicon, config: EngineConfig) -> Self {
        Engine {
            rules: Arc::new(rules),
            lexicon: Arc::new(lexicon),
            config: Arc::new(config),
            services: Services::default(),
        }
    }

    /// Compile `rules` against `lexicon`.
    pub fn from_sources(rules: &str, lexicon: Lexicon, config: EngineConfig) -> Result<Self> {
        let rules = CompiledRules::compile(rules, &lexicon)?;
        Ok(Engine::new(rules, lexicon, config))
    }

    /// Load a rule file and a lexicon directory.
    pub fn from_paths(rules: impl AsRef<Path>, lexicon_dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let lexicon = Lexicon::from_dir(lexicon_dir)?;
        let rules = CompiledRules::from_file(rules, &lexicon)?;
        tracing::info!(patterns = rules.len(), "engine ready");
        Ok(Engine::new(rules, lexicon, config))
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// A new engine with recompiled rules. `self` is left untouched, so callers
    /// holding it finish their document on the old rule set.
    pub fn reload(&self, rules: &str) -> Result<Engine> {
        let rules = CompiledRules::compile(rules, &self.lexicon)?;
        Ok(Engine { rules: Arc::new(rules), ..self.clone() })
    }

    /// Like [`Engine::reload`], replacing the lexicon as well.
    pub fn reload_with(&self, rules: &str, lexicon: Lexicon) -> Result<Engine> {
        let rules = CompiledRules::compile(rules, &lexicon)?;
        Ok(Engine { rules: Arc::new(rules), lexicon: Arc::new(lexicon), ..self.clone() })
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Extract from a single clause at document offset 0, without clause
    /// detectors or coreference. A malformed clause is an error here.
    pub fn extract_clause(&self, clause: &AnnotatedClause) -> Result<Vec<ExtractResult>> {
        let mut parsed = Clause::new(clause.text.clone(), clause.tokens.clone())?;
        let (scored, _) = self.context().run_clause(&mut parsed, 0);
        Ok(self.post_process(self.results(&parsed, 0, Offsets::default(), scored)))
    }

    /// Annotate `text` with the configured annotator, then [`Engine::extract`].
    pub fn extract_text(&self, text: &str) -> Result<ExtractOutput> {
        let Some(annotator) = &self.services.annotator else {
            return Err(Error::service("annotator", "no annotator configured"));
        };
        let clauses = annotator.annotate(text, self.lexicon.oov_vocab())?;
        Ok(self.extract(&clauses))
    }

    /// Run every clause of a document.
    ///
    /// Hypothetical and interrogative clauses are skipped when the detectors
    /// flag them, malformed clauses are skipped and reported, and the token and
    /// character offsets keep advancing over every clause either way.
    pub fn extract(&self, clauses: &[AnnotatedClause]) -> ExtractOutput {
        let started = Instant::now();
        let pipeline = &self.config.pipeline;
        let texts: Vec<&str> = clauses.iter().map(|c| c.text.as_str()).collect();
        let hypothetical =
            if pipeline.skip_hypothetical { self.services.hypothetical(&texts) } else { vec![false; texts.len()] };
        let interrogative =
            if pipeline.skip_interrogative { self.services.interrogative(&texts) } else { vec![false; texts.len()] };

        let ctx = self.context();
        let mut output = ExtractOutput::default();
        let mut offsets = Offsets::default();
        for (index, annotated) in clauses.iter().enumerate() {
            let at = offsets;
            offsets.advance(annotated);

            let skip = if hypothetical[index] {
                Some("hypothetical".to_string())
            } else if interrogative[index] {
                Some("interrogative".to_string())
            } else {
                None
            };
            if let Some(reason) = skip {
                tracing::info!(index, reason = %reason, "clause skipped");
                output.skipped.push(SkippedClause { index, reason });
                continue;
            }

            let mut clause = match Clause::new(annotated.text.clone(), annotated.tokens.clone()) {
                Ok(clause) => clause,
                Err(err) => {
                    tracing::warn!(index, error = %err, "malformed clause skipped");
                    output.skipped.push(SkippedClause { index, reason: err.to_string() });
                    continue;
                }
            };

            let (scored, metrics): (Vec<(Opinion, Sentiment)>, ClauseMetrics) = ctx.run_clause(&mut clause, index);
            output.results.extend(self.results(&clause, index, at, scored));
            output.metrics.clauses.push(metrics);
        }

        output.results = self.post_process(output.results);
        if pipeline.resolve_coref && !output.results.is_empty() {
            self.resolve_coref(clauses, &mut output.results);
        }
        output.metrics.total = started.elapsed();
        tracing::info!(
            clauses = clauses.len(),
            skipped = output.skipped.len(),
            results = output.results.len(),
            elapsed = ?output.metrics.total,
            "document extracted"
        );
        output
    }

    fn context(&self) -> ClauseContext<'_> {
        ClauseContext { rules: &self.rules, lexicon: &self.lexicon, config: &self.config, services: &self.services }
    }

    fn results(
        &self,
        clause: &Clause,
        clause_index: usize,
        at: Offsets,
        scored: Vec<(Opinion, Sentiment)>,
    ) -> Vec<ExtractResult> {
        let leading = clause.text().len() - clause.text().trim_start_matches(' ').len();
        let shift = |ids: &BTreeSet<usize>| -> Vec<usize> { ids.iter().map(|id| id + at.tokens).collect() };
        let element = |ids: &BTreeSet<usize>, text: String| -> Element {
            let char_range = match (ids.first(), ids.last()) {
                (Some(&first), Some(&last)) => {
                    Some((at.chars + clause.token(first).start, at.chars + clause.token(last).end))
                }
                _ => None,
            };
            let tag = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            Element { text, token_ids: shift(ids), char_range, tag }
        };

        scored
            .into_iter()
            .map(|(opinion, sentiment)| {
                let Opinion {
                    candidate,
                    all_matched,
                    holder_text,
                    emotion_text,
                    object_text,
                    reason_text,
                    holder_tag,
                    object_tag,
                } = opinion;
                let last = all_matched.last().copied().unwrap_or(0);
                let anchor = clause.token(candidate.anchor);
                ExtractResult {
                    clause: clause.text().to_string(),
                    clause_index,
                    clause_range: (at.chars + leading, at.chars + clause.token(last).end),
                    holder: element(&candidate.roles.holder, holder_text),
                    emotion: element(&candidate.roles.emotion, emotion_text),
                    object: element(&candidate.roles.object, object_text),
                    reason: element(&candidate.roles.reason, reason_text),
                    holder_type: holder_tag.unwrap_or_default().to_string(),
                    object_type: object_tag.unwrap_or_default().to_string(),
                    anchor_id: candidate.anchor + at.tokens,
                    anchor_text: anchor.text.clone(),
                    anchor_lemma: anchor.lemma.clone(),
                    pattern: candidate.pattern,
                    emotion_negated: candidate.emotion_negated,
                    emotion_negated_tokens: shift(&candidate.emotion_negated_heads),
                    reason_negated: candidate.reason_negated,
                    reason_negated_tokens: shift(&candidate.reason_negated_heads),
                    model_sent: sentiment.model,
                    anchor_sent: sentiment.anchor,
                    anchor_type_sent: sentiment.anchor_type,
                    sent_score: sentiment.score,
                    sent_intensity: sentiment.intensity,
                    all_matched: all_matched.iter().map(|id| id + at.tokens).collect(),
                }
            })
            .collect()
    }

    /// Drop tuples listed in the filter file and apply score overrides.
    fn post_process(&self, results: Vec<ExtractResult>) -> Vec<ExtractResult> {
        results
            .into_iter()
            .filter_map(|mut result| {
                let (holder, emotion) = (&result.holder.text, &result.emotion.text);
                let (object, reason) = (&result.object.text, &result.reason.text);
                if self.lexicon.is_filtered(holder, emotion, object, reason) {
                    tracing::info!(%holder, %emotion, %object, %reason, "filtered by lexicon");
                    return None;
                }
                if let Some(score) = self.lexicon.modified_score(object, reason) {
                    result.sent_score = score;
                }
                Some(result)
            })
            .collect()
    }

    /// Replace single pronoun holders and objects by their main mention.
    fn resolve_coref(&self, clauses: &[AnnotatedClause], results: &mut [ExtractResult]) {
        let mentions: HashMap<usize, String> = self.services.coref(clauses);
        if mentions.is_empty() {
            return;
        }
        for result in results.iter_mut() {
            let roles = [(&result.holder_type, &mut result.holder), (&result.object_type, &mut result.object)];
            for (kind, element) in roles {
                if kind.as_str() != engine::PRONOUN_TAG {
                    continue;
                }
                if let [id] = element.token_ids[..] {
                    if let Some(main) = mentions.get(&id) {
                        tracing::debug!(token = id, pronoun = %element.text, main = %main, "coreference resolved");
                        element.text = main.clone();
                    }
                }
            }
        }
    }
}

/// Hot-swappable engine slot.
///
/// Readers take a [`snapshot`](EngineHandle::snapshot) per document; a
/// [`swap`](EngineHandle::swap) only affects snapshots taken afterwards.
#[derive(Debug)]
pub struct EngineHandle {
    current: RwLock<Arc<Engine>>,
}

impl EngineHandle {
    pub fn new(engine: Engine) -> Self {
        EngineHandle { current: RwLock::new(Arc::new(engine)) }
    }

    pub fn snapshot(&self) -> Arc<Engine> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Install `engine` and return the one it replaced.
    pub fn swap(&self, engine: Engine) -> Arc<Engine> {
        let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *current, Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ClauseDetector, CorefResolver};

    const RULES: &str = "1\t<(0,,VERB,,E),(1,nsubj,,,H)><(0),(2,dobj,,,O)>";

    fn lexicon() -> Lexicon {
        Lexicon::builder().positive("love").negative("hate").emotion("love").emotion("hate").build()
    }

    fn token(index: usize, text: &str, pos: &str, dep: &str, head: usize, start: usize) -> Token {
        Token {
            index,
            text: text.into(),
            lemma: text.to_lowercase(),
            pos: pos.into(),
            dep: dep.into(),
            head,
            start,
            end: start + text.len(),
            anchor: false,
        }
    }

    /// `I love it.` then ` They hate the color`.
    fn document() -> Vec<AnnotatedClause> {
        vec![
            AnnotatedClause {
                text: "I love it.".into(),
                tokens: vec![
                    token(0, "I", "PRON", "nsubj", 1, 0),
                    token(1, "love", "VERB", "ROOT", 1, 2),
                    token(2, "it", "PRON", "dobj", 1, 7),
                    token(3, ".", "PUNCT", "punct", 1, 9),
                ],
            },
            AnnotatedClause {
                text: " They hate the color".into(),
                tokens: vec![
                    token(0, "They", "PRON", "nsubj", 1, 1),
                    token(1, "hate", "VERB", "ROOT", 1, 6),
                    token(2, "the", "DET", "det", 3, 11),
                    token(3, "color", "NOUN", "dobj", 1, 15),
                ],
            },
        ]
    }

    fn engine() -> Engine {
        Engine::from_sources(RULES, lexicon(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn offsets_accumulate_across_clauses() {
        let out = engine().extract(&document());
        assert!(out.skipped.is_empty());
        assert_eq!(out.results.len(), 2);

        let first = &out.results[0];
        assert_eq!(first.clause_range, (0, 9));
        assert_eq!(first.object.token_ids, vec![2]);
        assert_eq!(first.object_type, "PRON");
        assert_eq!(first.sent_score, 0.7);

        let second = &out.results[1];
        assert_eq!(second.clause_index, 1);
        assert_eq!(second.anchor_id, 5);
        assert_eq!(second.object.token_ids, vec![6, 7]);
        assert_eq!(second.object.char_range, Some((21, 30)));
        assert_eq!(second.clause_range, (11, 30));
        assert_eq!(second.object.tag, "the color");
        assert_eq!(second.sent_score, -0.7);
        assert_eq!(out.metrics.clauses.len(), 2);
    }

    #[test]
    fn malformed_clauses_are_skipped_not_fatal() {
        let mut doc = document();
        doc[0].tokens[1].head = 0;
        doc[0].tokens[1].dep = "dep".into();
        let out = engine().extract(&doc);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].index, 0);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].anchor_id, 5);
    }

    struct FlagFirst;

    impl ClauseDetector for FlagFirst {
        fn detect(&self, texts: &[&str]) -> Result<Vec<bool>> {
            Ok((0..texts.len()).map(|i| i == 0).collect())
        }
    }

    #[test]
    fn hypothetical_clauses_are_skipped() {
        let services = Services { hypothetical: Some(Arc::new(FlagFirst)), ..Services::default() };
        let out = engine().with_services(services).extract(&document());
        assert_eq!(out.skipped, vec![SkippedClause { index: 0, reason: "hypothetical".into() }]);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].clause_index, 1);
    }

    struct ItIsTheCake;

    impl CorefResolver for ItIsTheCake {
        fn resolve(&self, _clauses: &[AnnotatedClause]) -> Result<HashMap<usize, String>> {
            Ok(HashMap::from([(2, "the cake".to_string())]))
        }
    }

    #[test]
    fn pronoun_objects_take_their_main_mention() {
        let services = Services { coref: Some(Arc::new(ItIsTheCake)), ..Services::default() };
        let out = engine().with_services(services).extract(&document());
        assert_eq!(out.results[0].object.text, "the cake");
        assert_eq!(out.results[1].object.text, "the color");
    }

    #[test]
    fn filter_and_modify_lexicon_entries_apply() {
        let lexicon = Lexicon::builder()
            .positive("love")
            .negative("hate")
            .emotion("love")
            .emotion("hate")
            .filter("I", "love", "it", "")
            .modify("the color", "", -0.2)
            .build();
        let engine = Engine::from_sources(RULES, lexicon, EngineConfig::default()).unwrap();
        let out = engine.extract(&document());
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].sent_score, -0.2);
    }

    #[test]
    fn reload_leaves_snapshots_untouched() {
        let handle = EngineHandle::new(engine());
        let before = handle.snapshot();
        let next = before.reload("1\t<(0,,VERB,,E),(1,nsubj,,,H)>").unwrap();
        handle.swap(next);

        assert_eq!(before.rules().get(1).map(|p| p.len()), Some(3));
        assert_eq!(handle.snapshot().rules().get(1).map(|p| p.len()), Some(2));
        assert!(before.reload("1\tbroken").is_err());
    }

    #[test]
    fn extract_clause_rejects_malformed_input() {
        let mut clause = document().remove(1);
        assert_eq!(engine().extract_clause(&clause).unwrap().len(), 1);
        clause.tokens[0].head = 9;
        assert!(matches!(engine().extract_clause(&clause), Err(Error::MalformedClause(_))));
    }
}
