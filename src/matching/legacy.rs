//! Earlier substring-only matcher, kept for comparing review-queue sizes
//! against the multi-signal [`super::find_matches`] the engine uses.

use crate::models::{CanonicalTerm, MatchCandidate, MatchReason};
use crate::normalize::normalize;
use std::cmp::Ordering;

const CONTAINS_WEIGHT: f64 = 0.7;
const INCLUDE_THRESHOLD: f64 = 0.3;
const MAX_RESULTS: usize = 5;

/// Substring-only ranking: exact standard, exact variation, then a single
/// contains signal scored `input_len / standard_len * 0.7`. Misses typo-level
/// and word-order matches the canonical matcher finds.
#[deprecated(note = "substring-only variant; use matching::find_matches")]
pub fn find_matches_basic(original: &str, terms: &[CanonicalTerm]) -> Vec<MatchCandidate> {
    let input = normalize(original);
    if input.chars().count() < 2 {
        return Vec::new();
    }

    let mut results: Vec<MatchCandidate> = Vec::new();
    for term in terms {
        let standard = normalize(&term.standard);
        if standard == input {
            results.push(MatchCandidate {
                term_id: term.id.clone(),
                standard: term.standard.clone(),
                score: 1.0,
                reason: MatchReason::Exact,
            });
            continue;
        }
        if term.variations.iter().any(|v| normalize(v) == input) {
            results.push(MatchCandidate {
                term_id: term.id.clone(),
                standard: term.standard.clone(),
                score: 1.0,
                reason: MatchReason::ExactVariation,
            });
            continue;
        }
        if standard.contains(&input) {
            let score =
                input.chars().count() as f64 / standard.chars().count() as f64 * CONTAINS_WEIGHT;
            if score > INCLUDE_THRESHOLD {
                results.push(MatchCandidate {
                    term_id: term.id.clone(),
                    standard: term.standard.clone(),
                    score,
                    reason: MatchReason::Contains,
                });
            }
        }
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(MAX_RESULTS);
    results
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use super::*;

    #[test]
    fn misses_typos_the_canonical_matcher_finds() {
        let terms = vec![CanonicalTerm {
            id: "t1".into(),
            standard: "Ventilator".into(),
            variations: vec![],
        }];
        assert!(find_matches_basic("Ventlator", &terms).is_empty());
        assert_eq!(crate::matching::find_matches("Ventlator", &terms).len(), 1);
    }

    #[test]
    fn input_floor_counts_chars_not_bytes() {
        // One char, two bytes: still below the minimum input length.
        let terms = vec![CanonicalTerm {
            id: "t1".into(),
            standard: "ß".into(),
            variations: vec![],
        }];
        assert!(find_matches_basic("ß", &terms).is_empty());
    }

    #[test]
    fn caps_at_five() {
        let terms: Vec<CanonicalTerm> = (0..10)
            .map(|i| CanonicalTerm {
                id: format!("t{i}"),
                standard: format!("Ventilator {i}"),
                variations: vec![],
            })
            .collect();
        assert_eq!(find_matches_basic("Ventilator", &terms).len(), 5);
    }
}
