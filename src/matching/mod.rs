//! Similarity scoring and multi-signal term matching.
//!
//! The scorer is an ordered character-overlap heuristic, not Levenshtein, and
//! makes no metric guarantees (no triangle inequality). The weights and
//! thresholds below are load-bearing: review-queue size and auto-match
//! propagation depend on them.

pub mod legacy;

use crate::models::{CanonicalTerm, MatchCandidate, MatchReason};
use crate::normalize::normalize;
use std::cmp::Ordering;

pub const MAX_RESULTS: usize = 8;
/// Inputs shorter than this (normalized chars) are too ambiguous to match.
pub const MIN_INPUT_CHARS: usize = 2;
/// Non-exact candidates below this never reach the operator.
pub const INCLUDE_THRESHOLD: f64 = 0.3;
/// Accepts of suggestions at or below this score require a deliberate,
/// explicit operator action.
pub const LOW_CONFIDENCE_MAX: f64 = 0.4;

const CONTAINS_WEIGHT: f64 = 0.8;
const CONTAINS_KEEP_THRESHOLD: f64 = 0.4;
const TERM_WEIGHT: f64 = 0.7;
const VARIATION_WEIGHT: f64 = 0.65;
const SIMILARITY_ACTIVATION: f64 = 0.6;
const WORD_WEIGHT: f64 = 0.6;
const WORD_PAIR_THRESHOLD: f64 = 0.7;

/// Similarity in [0, 1] between two already-normalized strings.
///
/// Equal strings score 1 (including empty vs empty); empty vs non-empty scores
/// 0. Otherwise the shorter string is scanned against the longer: for each
/// char of the shorter, the next occurrence at or after the cursor in the
/// longer counts as a hit and advances the cursor past it. The final score
/// blends overlap ratio with a length-closeness term.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let (shorter, longer) = if a_len <= b_len { (a, b) } else { (b, a) };
    let longer_chars: Vec<char> = longer.chars().collect();

    let mut cursor = 0usize;
    let mut common = 0usize;
    for ch in shorter.chars() {
        if let Some(pos) = longer_chars[cursor..].iter().position(|&c| c == ch) {
            common += 1;
            cursor += pos + 1;
        }
    }

    let longer_len = longer_chars.len() as f64;
    let len_diff = (a_len.abs_diff(b_len)) as f64;
    0.7 * common as f64 / longer_len + 0.3 * (1.0 - len_diff / longer_len)
}

/// Rank catalog terms against an input value.
///
/// Exact standard and exact variation matches score 1.0 and short-circuit the
/// remaining signals for that candidate only; every other candidate is still
/// checked for its own exact match. Non-exact candidates keep the best signal
/// that clears its activation threshold and are included when it exceeds
/// [`INCLUDE_THRESHOLD`]. Results are sorted descending and capped at
/// [`MAX_RESULTS`].
pub fn find_matches(original: &str, terms: &[CanonicalTerm]) -> Vec<MatchCandidate> {
    let input = normalize(original);
    if input.chars().count() < MIN_INPUT_CHARS {
        return Vec::new();
    }
    let input_len = input.chars().count();

    let mut results: Vec<MatchCandidate> = Vec::new();
    for term in terms {
        let standard = normalize(&term.standard);
        if standard == input {
            results.push(candidate(term, 1.0, MatchReason::Exact));
            continue;
        }
        if term.variations.iter().any(|v| normalize(v) == input) {
            results.push(candidate(term, 1.0, MatchReason::ExactVariation));
            continue;
        }

        let mut best: Option<(f64, MatchReason)> = None;

        if standard.contains(&input) || input.contains(&standard) {
            let std_len = standard.chars().count();
            let min_len = input_len.min(std_len) as f64;
            let max_len = input_len.max(std_len) as f64;
            let score = min_len / max_len * CONTAINS_WEIGHT;
            if score > CONTAINS_KEEP_THRESHOLD {
                keep_best(&mut best, score, MatchReason::Contains);
            }
        }

        let term_sim = similarity(&input, &standard);
        if term_sim > SIMILARITY_ACTIVATION {
            keep_best(&mut best, term_sim * TERM_WEIGHT, MatchReason::SimilarTerm);
        }

        let best_variation_sim = term
            .variations
            .iter()
            .map(|v| similarity(&input, &normalize(v)))
            .fold(0.0_f64, f64::max);
        if best_variation_sim > SIMILARITY_ACTIVATION {
            keep_best(
                &mut best,
                best_variation_sim * VARIATION_WEIGHT,
                MatchReason::SimilarVariation,
            );
        }

        let input_words: Vec<&str> = input.split_whitespace().collect();
        let std_words: Vec<&str> = standard.split_whitespace().collect();
        if !input_words.is_empty() && !std_words.is_empty() {
            let matched = input_words
                .iter()
                .filter(|iw| {
                    std_words
                        .iter()
                        .any(|sw| similarity(iw, sw) > WORD_PAIR_THRESHOLD)
                })
                .count();
            let score = matched as f64 / input_words.len().max(std_words.len()) as f64 * WORD_WEIGHT;
            keep_best(&mut best, score, MatchReason::WordSimilarity);
        }

        if let Some((score, reason)) = best {
            if score > INCLUDE_THRESHOLD {
                results.push(candidate(term, score, reason));
            }
        }
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(MAX_RESULTS);
    results
}

fn candidate(term: &CanonicalTerm, score: f64, reason: MatchReason) -> MatchCandidate {
    MatchCandidate {
        term_id: term.id.clone(),
        standard: term.standard.clone(),
        score,
        reason,
    }
}

fn keep_best(best: &mut Option<(f64, MatchReason)>, score: f64, reason: MatchReason) {
    match best {
        Some((s, _)) if *s >= score => {}
        _ => *best = Some((score, reason)),
    }
}
