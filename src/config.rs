//! Engine configuration.
//!
//! Every tuned constant of the pipeline lives here so it can be overridden from a
//! TOML file without recompiling. Defaults reproduce the reference behaviour.
//!
//! ```toml
//! [dedup]
//! similarity_threshold = 0.7
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Limits used while building per-clause group indices
    pub groups: GroupConfig,

    /// Span assembly and post-match filtering
    pub assembly: AssemblyConfig,

    /// Deduplication thresholds
    pub dedup: DedupConfig,

    /// Sentiment and intensity scoring
    pub scoring: ScoringConfig,

    /// Document-level switches
    pub pipeline: PipelineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::Config(message) => Error::Config(format!("{}: {message}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("SENTIRO_LOG") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("SENTIRO_LOG_JSON") {
            self.logging.json_format = json.parse().map_err(|_| {
                Error::Config(format!("SENTIRO_LOG_JSON must be `true` or `false`, got `{json}`"))
            })?;
        }
        Ok(self)
    }
}

/// Distances used by the group builder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroupConfig {
    /// Auxiliary, particle and complement tokens must sit closer than this to their head
    pub companion_distance: usize,

    /// Adjectival modifiers join a noun phrase only within this distance
    pub amod_distance: usize,

    /// Coordinations at or below this distance always form a group
    pub conj_near_distance: usize,

    /// Coordinations at or above this distance never form a group
    pub conj_far_distance: usize,

    /// Generic prepositional attachments must start within this distance of their root
    pub default_match_distance: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            companion_distance: 5,
            amod_distance: 3,
            conj_near_distance: 3,
            conj_far_distance: 7,
            default_match_distance: 3,
        }
    }
}

/// Span assembly limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Same-role pattern neighbours bound further apart than this reject the match
    pub internal_distance: usize,

    /// Matches of one pattern merge when their differing tokens span at most this
    pub combine_distance: usize,

    /// Conjuncts at or below this distance are substituted directly
    pub direct_substitution_distance: usize,

    /// Dependency labels of coordination roots that always allow direct substitution
    pub direct_substitution_labels: Vec<String>,

    /// Subtree expansion depth limit
    pub subtree_max_depth: usize,

    /// Subtree expansion fan-out limit
    pub subtree_max_fanout: usize,

    /// Object and reason spans below this matched/width ratio are dropped
    pub min_span_ratio: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            internal_distance: 5,
            combine_distance: 3,
            direct_substitution_distance: 3,
            direct_substitution_labels: ["dobj", "advcl", "poss", "advmod", "root", "nsubj", "acomp", "amod"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            subtree_max_depth: 3,
            subtree_max_fanout: 3,
            min_span_ratio: 0.25,
        }
    }
}

/// Deduplication thresholds.
///
/// `similarity_threshold` and `equivalence_threshold` are tuned independently and
/// must stay separate settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    /// Near-duplicate merge: Jaccard overlap at or above this keeps the more compact result
    pub similarity_threshold: f64,

    /// Equivalence: Jaccard overlap at or above this (with close compactness) keeps the earlier result
    pub equivalence_threshold: f64,

    /// Maximum compactness difference for two results to count as equivalent
    pub equivalence_compactness_delta: f64,

    /// Symmetric differences touching this many coordination tokens are never merged
    pub coordination_min_diff: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            equivalence_threshold: 0.75,
            equivalence_compactness_delta: 0.15,
            coordination_min_diff: 2,
        }
    }
}

/// Score blending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Model scores at or above this magnitude are used as-is
    pub model_cutoff: f64,

    /// Lexical polarity below this magnitude counts as neutral
    pub neutral_polarity: f64,

    /// Classifier confidence at or above this makes a neutral label decisive
    pub neutral_confidence: f64,

    pub anchor_weight: f64,
    pub assessment_weight: f64,
    pub model_weight: f64,

    /// Token budget of a classifier input
    pub max_batch_tokens: usize,

    /// Fallback polarity per clause anchor type (`no_adv`, `not_verb`)
    pub anchor_type_scores: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model_cutoff: 0.9,
            neutral_polarity: 0.1,
            neutral_confidence: 0.85,
            anchor_weight: 0.7,
            assessment_weight: 0.1,
            model_weight: 0.2,
            max_batch_tokens: 10,
            anchor_type_scores: [("no_adv".to_string(), -1.0), ("not_verb".to_string(), -1.0)].into_iter().collect(),
        }
    }
}

/// Document-level switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Skip clauses the hypothetical detector flags
    pub skip_hypothetical: bool,

    /// Skip clauses the interrogative detector flags
    pub skip_interrogative: bool,

    /// Replace single pronoun holders/objects with their coreference main mention
    pub resolve_coref: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { skip_hypothetical: true, skip_interrogative: true, resolve_coref: true }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.assembly.internal_distance, 5);
        assert_eq!(config.assembly.min_span_ratio, 0.25);
        assert_eq!(config.dedup.similarity_threshold, 0.7);
        assert_eq!(config.dedup.equivalence_threshold, 0.75);
        assert_eq!(config.scoring.anchor_type_scores.get("not_verb"), Some(&-1.0));
        assert!(config.assembly.direct_substitution_labels.iter().any(|l| l == "acomp"));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [dedup]
            similarity_threshold = 0.8

            [scoring]
            model_cutoff = 0.95
            "#,
        )
        .unwrap();
        assert_eq!(config.dedup.similarity_threshold, 0.8);
        assert_eq!(config.dedup.equivalence_threshold, 0.75);
        assert_eq!(config.scoring.model_cutoff, 0.95);
        assert_eq!(config.groups, GroupConfig::default());
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml("[dedup\nsimilarity_threshold = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
