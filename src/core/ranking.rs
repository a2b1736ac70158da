//! Field-relative ranking and rank-to-score conversion
//!
//! Shared by the PIT builders and every sub-model scorer.

use std::cmp::Ordering;

/// Neutral score used whenever a player has no usable rank
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Convert a rank (1 = best) to a 0-100 score. Rank 1 -> 100, last -> 0.
///
/// Returns the neutral 50 when the rank is unknown or the field has one entry.
pub fn rank_to_score(rank: Option<usize>, field_size: usize) -> f64 {
    match rank {
        Some(rank) if field_size > 1 => {
            let rank = rank.clamp(1, field_size) as f64;
            100.0 * (1.0 - (rank - 1.0) / (field_size as f64 - 1.0))
        }
        _ => NEUTRAL_SCORE,
    }
}

/// Shrink a score toward neutral by a confidence factor in [0, 1]
pub fn shrink_toward_neutral(score: f64, confidence: f64) -> f64 {
    NEUTRAL_SCORE + confidence.clamp(0.0, 1.0) * (score - NEUTRAL_SCORE)
}

/// Sample-size confidence: full at `threshold` rounds, proportional below
pub fn sample_size_confidence(rounds_used: usize, threshold: usize) -> f64 {
    if rounds_used == 0 || threshold == 0 {
        return 0.0;
    }
    (rounds_used as f64 / threshold as f64).min(1.0)
}

/// Confidence in course history: 0.3 with no rounds, 1.0 at `full_at` rounds
pub fn rounds_confidence(rounds_played: usize, full_at: f64) -> f64 {
    if rounds_played == 0 {
        return 0.3;
    }
    (0.3 + 0.7 * (rounds_played as f64 / full_at)).min(1.0)
}

/// Rank the non-null values of a field (1 = best).
///
/// `higher_is_better` selects the sort direction. Ties are broken by the key
/// so the ranking is deterministic. Entries with `None` receive no rank.
pub fn rank_field<K: Ord + Clone>(
    values: &[(K, Option<f64>)],
    higher_is_better: bool,
) -> Vec<(K, usize)> {
    let mut present: Vec<(&K, f64)> = values
        .iter()
        .filter_map(|(k, v)| v.filter(|x| x.is_finite()).map(|x| (k, x)))
        .collect();

    present.sort_by(|a, b| {
        let by_value = if higher_is_better {
            b.1.partial_cmp(&a.1)
        } else {
            a.1.partial_cmp(&b.1)
        };
        by_value.unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0))
    });

    present
        .into_iter()
        .enumerate()
        .map(|(i, (k, _))| (k.clone(), i + 1))
        .collect()
}
