//! Candidate deduplication and ranking.
//!
//! Two passes keep the output free of redundant tuples:
//!
//! - **Subsumption** (before filtering): a candidate whose combined token set is a
//!   subset of a larger kept candidate is dropped. Larger sets are visited first;
//!   survivors keep their original order.
//! - **Similarity merge** (after filtering): near-identical opinions collapse to
//!   the most compact one, measured by Jaccard overlap of their matched tokens.
//!
//! ## What is never merged
//!
//! Two opinions whose symmetric difference contains at least
//! `coordination_min_diff` coordination tokens come from different conjuncts
//! ("the screen and the battery"); the pair is skipped and the scan moves on to
//! the next kept opinion. Exact duplicates merge regardless.

use super::expand::Candidate;
use super::resolve::Opinion;
use crate::config::DedupConfig;
use std::collections::BTreeSet;

const EPSILON: f64 = 1e-4;

/// Drop every candidate whose combined set is covered by an equal or larger one.
pub fn drop_subsumed(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let sets: Vec<BTreeSet<usize>> = candidates.iter().map(Candidate::combined).collect();
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| sets[b].len().cmp(&sets[a].len()));

    let mut keep = vec![false; candidates.len()];
    let mut kept: Vec<usize> = Vec::new();
    for i in order {
        if kept.iter().any(|&k| sets[i].is_subset(&sets[k])) {
            continue;
        }
        keep[i] = true;
        kept.push(i);
    }

    candidates.into_iter().zip(keep).filter(|(_, keep)| *keep).map(|(c, _)| c).collect()
}

/// Matched tokens per spanned position, `ε`-smoothed. An empty set scores 0.
pub fn element_compactness(tokens: &BTreeSet<usize>) -> f64 {
    match (tokens.first(), tokens.last()) {
        (Some(&lo), Some(&hi)) => tokens.len() as f64 / ((hi - lo + 1) as f64 + EPSILON),
        _ => 0.0,
    }
}

/// Mean element compactness over the populated roles.
pub fn compactness(opinion: &Opinion) -> f64 {
    let roles = &opinion.candidate.roles;
    let scores: Vec<f64> = [&roles.holder, &roles.emotion, &roles.object, &roles.reason]
        .into_iter()
        .filter(|set| !set.is_empty())
        .map(element_compactness)
        .collect();
    if scores.is_empty() { 0.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 }
}

pub fn jaccard(a: &BTreeSet<usize>, b: &BTreeSet<usize>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Collapse near-duplicate opinions, keeping the more compact of each pair.
pub fn merge_similar(opinions: Vec<Opinion>, coordination: &BTreeSet<usize>, config: &DedupConfig) -> Vec<Opinion> {
    let mut kept: Vec<(Opinion, BTreeSet<usize>, f64)> = Vec::with_capacity(opinions.len());

    'next: for opinion in opinions {
        let matched: BTreeSet<usize> = opinion.all_matched.iter().copied().collect();
        let score = compactness(&opinion);

        for slot in kept.iter_mut() {
            let (_, other, other_score) = slot;
            if matched == *other {
                tracing::debug!(pattern = opinion.candidate.pattern, "dropped: duplicate opinion");
                continue 'next;
            }
            let coordinated = matched.symmetric_difference(other).filter(|t| coordination.contains(t)).count();
            if coordinated >= config.coordination_min_diff {
                continue;
            }

            let overlap = jaccard(&matched, other);
            let delta = (score - *other_score).abs();
            let equivalent = delta <= config.equivalence_compactness_delta && overlap >= config.equivalence_threshold;
            if equivalent {
                tracing::debug!(pattern = opinion.candidate.pattern, "dropped: equivalent opinion");
                continue 'next;
            }
            if overlap >= config.similarity_threshold {
                if score > *other_score {
                    tracing::debug!(pattern = opinion.candidate.pattern, "replaces a less compact opinion");
                    *slot = (opinion, matched, score);
                }
                continue 'next;
            }
        }

        kept.push((opinion, matched, score));
    }

    kept.into_iter().map(|(opinion, _, _)| opinion).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::expand::RoleSets;

    fn set(ids: &[usize]) -> BTreeSet<usize> {
        ids.iter().copied().collect()
    }

    fn candidate(emotion: &[usize], object: &[usize]) -> Candidate {
        Candidate {
            pattern: 1,
            anchor: emotion[0],
            roles: RoleSets { emotion: set(emotion), object: set(object), ..RoleSets::default() },
            placeholders: BTreeSet::new(),
            emotion_negated: false,
            emotion_negated_heads: BTreeSet::new(),
            reason_negated: false,
            reason_negated_heads: BTreeSet::new(),
        }
    }

    fn opinion(emotion: &[usize], object: &[usize]) -> Opinion {
        let candidate = candidate(emotion, object);
        Opinion {
            all_matched: candidate.combined().into_iter().collect(),
            holder_text: String::new(),
            emotion_text: String::new(),
            object_text: String::new(),
            reason_text: String::new(),
            holder_tag: None,
            object_tag: None,
            candidate,
        }
    }

    #[test]
    fn subsets_of_larger_candidates_are_dropped() {
        let out = drop_subsumed(vec![candidate(&[1], &[2]), candidate(&[1], &[2, 3]), candidate(&[5], &[6])]);
        let combined: Vec<BTreeSet<usize>> = out.iter().map(Candidate::combined).collect();
        assert_eq!(combined, vec![set(&[1, 2, 3]), set(&[5, 6])]);
    }

    #[test]
    fn identical_candidates_keep_the_first() {
        let mut second = candidate(&[1], &[2]);
        second.pattern = 2;
        let out = drop_subsumed(vec![candidate(&[1], &[2]), second]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pattern, 1);
    }

    #[test]
    fn compactness_averages_populated_roles() {
        let op = opinion(&[1], &[3, 5]);
        let expected = (1.0 / (1.0 + EPSILON) + 2.0 / (3.0 + EPSILON)) / 2.0;
        assert!((compactness(&op) - expected).abs() < 1e-9);
        assert_eq!(element_compactness(&BTreeSet::new()), 0.0);
    }

    #[test]
    fn coordinated_conjuncts_both_survive() {
        // {1,2,3,4,5,7} vs {1,2,3,4,6,7}: overlap 5/7 but 5 and 6 are conjuncts
        let a = opinion(&[1], &[2, 3, 4, 5, 7]);
        let b = opinion(&[1], &[2, 3, 4, 6, 7]);
        let config = DedupConfig::default();

        let merged = merge_similar(vec![a.clone(), b.clone()], &set(&[5, 6]), &config);
        assert_eq!(merged.len(), 2);

        let merged = merge_similar(vec![a, b], &BTreeSet::new(), &config);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn conjunct_objects_are_not_merged() {
        let a = opinion(&[1], &[2, 3, 5]);
        let b = opinion(&[1], &[2, 3, 6]);
        let merged = merge_similar(vec![a, b], &set(&[5, 6]), &DedupConfig::default());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn duplicates_merge_past_a_coordinated_opinion() {
        // {1,2,3,5} vs {1,7,8} touches conjuncts 5 and 7, the third repeats the second
        let first = opinion(&[1], &[2, 3, 5]);
        let second = opinion(&[1], &[7, 8]);
        let mut repeat = opinion(&[1], &[7, 8]);
        repeat.candidate.pattern = 2;

        let opinions = vec![first.clone(), second.clone(), repeat];
        let merged = merge_similar(opinions, &set(&[5, 7]), &DedupConfig::default());
        assert_eq!(merged, vec![first, second]);
    }

    #[test]
    fn exact_duplicates_merge_despite_conjunct_differences() {
        let a = opinion(&[1], &[5, 6]);
        let mut b = opinion(&[1], &[5, 6]);
        b.candidate.pattern = 2;
        // every pair counts as coordinated when the minimum is 0
        let config = DedupConfig { coordination_min_diff: 0, ..DedupConfig::default() };
        let merged = merge_similar(vec![a.clone(), b], &set(&[5, 6]), &config);
        assert_eq!(merged, vec![a]);
    }

    #[test]
    fn similar_opinions_keep_the_more_compact() {
        // overlap 7/9, compactness 0.75 vs 1.0
        let loose = opinion(&[1], &[2, 3, 4, 5, 6, 7, 15]);
        let tight = opinion(&[1], &[2, 3, 4, 5, 6, 7, 8]);
        assert!(compactness(&tight) - compactness(&loose) > 0.15);

        let merged = merge_similar(vec![loose.clone(), tight.clone()], &BTreeSet::new(), &DedupConfig::default());
        assert_eq!(merged, vec![tight.clone()]);

        let merged = merge_similar(vec![tight.clone(), loose], &BTreeSet::new(), &DedupConfig::default());
        assert_eq!(merged, vec![tight]);
    }

    #[test]
    fn distinct_opinions_are_kept_in_order() {
        let a = opinion(&[1], &[2]);
        let b = opinion(&[5], &[6, 7]);
        let merged = merge_similar(vec![a.clone(), b.clone()], &BTreeSet::new(), &DedupConfig::default());
        assert_eq!(merged, vec![a, b]);
    }
}
