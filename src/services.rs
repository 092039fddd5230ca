//! Seams to external collaborators.
//!
//! The engine never runs a statistical model itself. Sentence annotation,
//! clause classification, lexical polarity and coreference are reached through
//! the traits below; an [`Engine`](crate::Engine) works with any subset of them.
//!
//! ## Degradation
//!
//! Every call goes through a [`Services`] helper that turns a missing service,
//! an `Err`, or a response of the wrong length into the neutral default and logs
//! a `warn`. A flaky classifier therefore lowers score quality but never fails a
//! document.

use crate::AnnotatedClause;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Three-way label of the clause sentiment classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

impl SentimentLabel {
    /// `-1`, `0` or `1`.
    pub fn sign(self) -> f64 {
        match self {
            SentimentLabel::Negative => -1.0,
            SentimentLabel::Neutral => 0.0,
            SentimentLabel::Positive => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub label: SentimentLabel,
    pub confidence: f64,
}

impl ClassifierOutput {
    pub fn neutral() -> Self {
        ClassifierOutput { label: SentimentLabel::Neutral, confidence: 0.0 }
    }

    /// Label sign times confidence.
    pub fn signed(&self) -> f64 {
        self.label.sign() * self.confidence
    }
}

/// Lexicon-based polarity of a text plus the polarity of every assessed phrase in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexicalAssessment {
    pub polarity: f64,
    pub assessments: Vec<f64>,
}

/// Clause-level sentiment classifier over lowercased token batches.
pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, batches: &[Vec<String>]) -> Result<Vec<ClassifierOutput>>;
}

pub trait LexicalAssessor: Send + Sync {
    fn assess(&self, texts: &[String]) -> Result<Vec<LexicalAssessment>>;
}

/// Binary clause detector (hypothetical mood, interrogative form).
pub trait ClauseDetector: Send + Sync {
    fn detect(&self, texts: &[&str]) -> Result<Vec<bool>>;
}

/// Maps document-level token ids of pronouns to the text of their main mention.
pub trait CorefResolver: Send + Sync {
    fn resolve(&self, clauses: &[AnnotatedClause]) -> Result<HashMap<usize, String>>;
}

/// Splits raw text into annotated clauses. `special_cases` must stay single tokens.
pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &str, special_cases: &[String]) -> Result<Vec<AnnotatedClause>>;
}

/// The set of collaborators an engine may call. Every slot is optional.
#[derive(Clone, Default)]
pub struct Services {
    pub classifier: Option<Arc<dyn SentimentClassifier>>,
    pub assessor: Option<Arc<dyn LexicalAssessor>>,
    pub hypothetical: Option<Arc<dyn ClauseDetector>>,
    pub interrogative: Option<Arc<dyn ClauseDetector>>,
    pub coref: Option<Arc<dyn CorefResolver>>,
    pub annotator: Option<Arc<dyn Annotator>>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("classifier", &self.classifier.is_some())
            .field("assessor", &self.assessor.is_some())
            .field("hypothetical", &self.hypothetical.is_some())
            .field("interrogative", &self.interrogative.is_some())
            .field("coref", &self.coref.is_some())
            .field("annotator", &self.annotator.is_some())
            .finish()
    }
}

impl Services {
    pub(crate) fn classify(&self, batches: &[Vec<String>]) -> Vec<ClassifierOutput> {
        let fallback = || vec![ClassifierOutput::neutral(); batches.len()];
        let Some(classifier) = &self.classifier else {
            return fallback();
        };
        if batches.is_empty() {
            return Vec::new();
        }
        checked("classifier", batches.len(), classifier.classify(batches)).unwrap_or_else(fallback)
    }

    pub(crate) fn assess(&self, texts: &[String]) -> Vec<LexicalAssessment> {
        let fallback = || vec![LexicalAssessment::default(); texts.len()];
        let Some(assessor) = &self.assessor else {
            return fallback();
        };
        if texts.is_empty() {
            return Vec::new();
        }
        checked("lexical assessor", texts.len(), assessor.assess(texts)).unwrap_or_else(fallback)
    }

    pub(crate) fn hypothetical(&self, texts: &[&str]) -> Vec<bool> {
        detect("hypothetical detector", self.hypothetical.as_deref(), texts)
    }

    pub(crate) fn interrogative(&self, texts: &[&str]) -> Vec<bool> {
        detect("interrogative detector", self.interrogative.as_deref(), texts)
    }

    pub(crate) fn coref(&self, clauses: &[AnnotatedClause]) -> HashMap<usize, String> {
        let Some(coref) = &self.coref else {
            return HashMap::new();
        };
        coref.resolve(clauses).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "coreference unavailable, keeping pronouns");
            HashMap::new()
        })
    }
}

fn detect(service: &'static str, detector: Option<&dyn ClauseDetector>, texts: &[&str]) -> Vec<bool> {
    match detector {
        Some(detector) if !texts.is_empty() => {
            checked(service, texts.len(), detector.detect(texts)).unwrap_or_else(|| vec![false; texts.len()])
        }
        _ => vec![false; texts.len()],
    }
}

fn checked<T>(service: &'static str, expected: usize, outcome: Result<Vec<T>>) -> Option<Vec<T>> {
    match outcome {
        Ok(values) if values.len() == expected => Some(values),
        Ok(values) => {
            tracing::warn!(service, expected, got = values.len(), "mismatched batch from service, using defaults");
            None
        }
        Err(err) => {
            tracing::warn!(service, error = %err, "service failed, using defaults");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Broken;

    impl SentimentClassifier for Broken {
        fn classify(&self, _batches: &[Vec<String>]) -> Result<Vec<ClassifierOutput>> {
            Err(Error::service("classifier", "connection refused"))
        }
    }

    struct Short;

    impl ClauseDetector for Short {
        fn detect(&self, _texts: &[&str]) -> Result<Vec<bool>> {
            Ok(vec![true])
        }
    }

    #[test]
    fn signed_confidence() {
        let out = ClassifierOutput { label: SentimentLabel::Negative, confidence: 0.8 };
        assert_eq!(out.signed(), -0.8);
        assert_eq!(ClassifierOutput::neutral().signed(), 0.0);
    }

    #[test]
    fn failures_degrade_to_neutral() {
        let services = Services { classifier: Some(Arc::new(Broken)), ..Services::default() };
        let out = services.classify(&[vec!["good".into()], vec!["bad".into()]]);
        assert_eq!(out, vec![ClassifierOutput::neutral(); 2]);
    }

    #[test]
    fn mismatched_batches_degrade() {
        let services = Services { hypothetical: Some(Arc::new(Short)), ..Services::default() };
        assert_eq!(services.hypothetical(&["a", "b"]), vec![false, false]);
        assert_eq!(services.interrogative(&["a"]), vec![false]);
    }
}
