//! Sentiment and intensity scoring.
//!
//! Each opinion of a clause gets a signed score in `[-1, 1]` and an intensity
//! bucket:
//!
//! ```text
//!            ┌ classifier(token batch) ─┐
//! opinion ───┤                          ├─ model = stronger of the two
//!            └ assessor(clause text) ───┘        │
//!                                                ├─ |model| >= cutoff ──> model
//! anchor polarity ─ flip per negated head ───────┴─ 0.7 anchor + 0.1 assessments + 0.2 model
//!
//! anchor intensity × degree chains ─> |x| ─> 0.2 | 0.4 | 0.6 | 0.8 | 1.0
//! ```
//!
//! Both collaborators are called once per clause: the classifier with one batch
//! per opinion, the assessor with the clause text. A missing or failing service
//! scores as neutral.

use super::anchors::AnchorInfo;
use super::groups::Groups;
use super::resolve::Opinion;
use crate::Clause;
use crate::config::ScoringConfig;
use crate::lexicon::Lexicon;
use crate::services::{LexicalAssessment, SentimentLabel, Services};
use std::collections::BTreeSet;

/// Scores attached to one opinion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sentiment {
    pub score: f64,
    /// Bucketed, one of `0.2, 0.4, 0.6, 0.8, 1.0`.
    pub intensity: f64,
    pub model: f64,
    pub anchor: f64,
    /// Fallback score from the clause anchor type, set only when used.
    pub anchor_type: f64,
}

pub struct Scorer<'a> {
    clause: &'a Clause,
    groups: &'a Groups,
    lexicon: &'a Lexicon,
    anchors: &'a AnchorInfo,
    services: &'a Services,
    config: &'a ScoringConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(
        clause: &'a Clause,
        groups: &'a Groups,
        lexicon: &'a Lexicon,
        anchors: &'a AnchorInfo,
        services: &'a Services,
        config: &'a ScoringConfig,
    ) -> Self {
        Scorer { clause, groups, lexicon, anchors, services, config }
    }

    /// Score every opinion, dropping those that read as neutral noise.
    pub fn score(&self, opinions: Vec<Opinion>) -> Vec<(Opinion, Sentiment)> {
        if opinions.is_empty() {
            return Vec::new();
        }
        let batches: Vec<Vec<String>> = opinions.iter().map(|o| self.token_batch(o)).collect();
        let classified = self.services.classify(&batches);
        let assessment =
            self.services.assess(&[self.clause.text().replace('.', " ")]).pop().unwrap_or_default();

        let mut out = Vec::with_capacity(opinions.len());
        for (opinion, classifier) in opinions.into_iter().zip(classified) {
            let neutral = assessment.polarity.abs() < self.config.neutral_polarity
                && classifier.label == SentimentLabel::Neutral
                && classifier.confidence >= self.config.neutral_confidence
                && opinion.candidate.roles.emotion.is_empty();
            if neutral {
                tracing::debug!(pattern = opinion.candidate.pattern, "dropped: neutral clause");
                continue;
            }

            let classifier_score = classifier.signed();
            let model = if assessment.polarity.abs() > classifier_score.abs() {
                assessment.polarity
            } else {
                classifier_score
            };
            let anchor = self.anchor_polarity(&opinion);
            let (score, anchor_type) = self.blend(&opinion, &assessment, model, anchor);
            let sentiment = Sentiment {
                score,
                intensity: self.intensity(&opinion),
                model: round3(model),
                anchor,
                anchor_type,
            };
            tracing::debug!(
                pattern = opinion.candidate.pattern,
                anchor = sentiment.anchor,
                model = sentiment.model,
                score = sentiment.score,
                intensity = sentiment.intensity,
                "scored"
            );
            out.push((opinion, sentiment));
        }
        out
    }

    /// Lowercased non-punctuation words from the first to the last matched token.
    /// Long spans fall back to the reason, then to emotion followed by reason.
    fn token_batch(&self, opinion: &Opinion) -> Vec<String> {
        let limit = self.config.max_batch_tokens;
        let words = |ids: &mut dyn Iterator<Item = usize>| -> Vec<String> {
            ids.map(|id| self.clause.token(id).text.to_lowercase()).collect()
        };

        let (Some(&first), Some(&last)) = (opinion.all_matched.first(), opinion.all_matched.last()) else {
            return Vec::new();
        };
        let span: Vec<usize> = (first..=last).filter(|&id| !self.clause.token(id).is_punct()).collect();
        if span.len() <= limit {
            return words(&mut span.into_iter());
        }

        let roles = &opinion.candidate.roles;
        if roles.reason.len() >= limit {
            return words(&mut roles.reason.iter().copied().take(limit));
        }
        words(&mut roles.emotion.iter().chain(&roles.reason).copied().take(limit))
    }

    fn anchor_polarity(&self, opinion: &Opinion) -> f64 {
        let anchor = opinion.candidate.anchor;
        if let Some(&score) = self.anchors.joint_scores.get(&anchor) {
            return score;
        }
        let token = self.clause.token(anchor);
        let polarity = self.lexicon.polarity(&token.lemma);
        if polarity != 0.0 { polarity } else { self.lexicon.polarity(&token.text) }
    }

    /// Final score and the anchor-type fallback it used (0 when unused).
    fn blend(&self, opinion: &Opinion, assessment: &LexicalAssessment, model: f64, anchor: f64) -> (f64, f64) {
        if model.abs() >= self.config.model_cutoff {
            return (round3(model), 0.0);
        }

        let candidate = &opinion.candidate;
        let mut anchor_type = 0.0;
        let anchor = if anchor != 0.0 {
            let negated = if candidate.emotion_negated {
                &candidate.emotion_negated_heads
            } else {
                &candidate.reason_negated_heads
            };
            if negated.len() % 2 == 1 { -anchor } else { anchor }
        } else if let Some(&fallback) =
            self.anchors.anchor_type.and_then(|kind| self.config.anchor_type_scores.get(kind))
        {
            anchor_type = fallback;
            fallback
        } else {
            0.0
        };

        let assessed = assessment.assessments.iter().sum::<f64>() / (assessment.assessments.len() as f64 + 1e-3);
        let score = self.config.anchor_weight * anchor
            + self.config.assessment_weight * assessed
            + self.config.model_weight * model;
        (round3(score), anchor_type)
    }

    fn intensity(&self, opinion: &Opinion) -> f64 {
        let token = self.clause.token(opinion.candidate.anchor);
        let base = self.lexicon.intensity(&token.lemma).or_else(|| self.lexicon.intensity(&token.text)).unwrap_or(1.0);

        // Chains may share links ("really very good"); each link counts once.
        let mut degree = 1.0;
        let mut done = BTreeSet::new();
        for &start in opinion.all_matched.iter().filter(|id| self.groups.degree.contains_key(id)) {
            let mut head = start;
            while let Some(link) = self.groups.degree.get(&head) {
                if !done.insert(head) {
                    break;
                }
                degree *= link.weight;
                head = link.modifier;
            }
        }

        bucket(round3((base * degree).abs()))
    }
}

fn bucket(intensity: f64) -> f64 {
    match intensity {
        x if x <= 1.0 => 0.2,
        x if x <= 2.0 => 0.4,
        x if x <= 3.0 => 0.6,
        x if x <= 4.0 => 0.8,
        _ => 1.0,
    }
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
