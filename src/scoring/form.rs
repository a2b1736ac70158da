//! Form sub-model
//!
//! - Recent windows (<= 20 rounds) are blended with linear recency decay.
//! - Baseline windows (> 20 rounds) are averaged.
//! - A multi-category component ranks five SG categories in the player's
//!   smallest available window.
//!
//! Every windowed rank-score is shrunk toward neutral for small samples.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::ranking::{
    rank_field, rank_to_score, sample_size_confidence, shrink_toward_neutral, NEUTRAL_SCORE,
};
use crate::models::{PlayerKey, SgCategory};
use crate::pit::rolling::PitRollingStat;

/// Form model weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormWeights {
    pub recent: f64,
    pub baseline: f64,
    pub multi_sg: f64,
    /// Multi-category weights, normalized before use
    pub sg_total: f64,
    pub sg_app: f64,
    pub sg_ott: f64,
    pub sg_putt: f64,
    pub sg_arg: f64,
    /// Rounds needed for full confidence in a windowed score
    pub sample_threshold: usize,
    /// Largest window still treated as "recent"
    pub recent_max_window: usize,
}

impl Default for FormWeights {
    fn default() -> Self {
        Self {
            recent: 0.55,
            baseline: 0.35,
            multi_sg: 0.10,
            sg_total: 40.0,
            sg_app: 25.0,
            sg_ott: 15.0,
            sg_putt: 10.0,
            sg_arg: 10.0,
            sample_threshold: 8,
            recent_max_window: 20,
        }
    }
}

impl FormWeights {
    fn component_weights(&self) -> (f64, f64, f64) {
        let sum = self.recent + self.baseline + self.multi_sg;
        if sum > 0.0 {
            (self.recent / sum, self.baseline / sum, self.multi_sg / sum)
        } else {
            (0.55, 0.35, 0.10)
        }
    }

    fn category_weights(&self) -> [(SgCategory, f64); 5] {
        let raw = [
            (SgCategory::Total, self.sg_total),
            (SgCategory::Approach, self.sg_app),
            (SgCategory::OffTee, self.sg_ott),
            (SgCategory::Putting, self.sg_putt),
            (SgCategory::AroundGreen, self.sg_arg),
        ];
        let sum: f64 = raw.iter().map(|(_, w)| w).sum();
        if sum > 0.0 {
            raw.map(|(c, w)| (c, w / sum))
        } else {
            raw.map(|(c, _)| (c, 0.2))
        }
    }
}

/// Form score with its components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormScore {
    pub score: f64,
    pub recent: f64,
    pub baseline: f64,
    pub multi_sg: f64,
}

/// Score every player present in `stats`.
///
/// Rows without a total SG figure are ignored.
pub fn compute_form(stats: &[PitRollingStat], weights: &FormWeights) -> BTreeMap<PlayerKey, FormScore> {
    let mut by_window: BTreeMap<usize, HashMap<&str, &PitRollingStat>> = BTreeMap::new();
    let mut players: BTreeSet<&str> = BTreeSet::new();
    for row in stats.iter().filter(|r| r.sg.total.is_some()) {
        by_window
            .entry(row.window)
            .or_default()
            .insert(row.player_key.as_str(), row);
        players.insert(row.player_key.as_str());
    }

    let recent_windows: Vec<usize> = by_window
        .keys()
        .copied()
        .filter(|w| *w <= weights.recent_max_window)
        .collect();
    let baseline_windows: Vec<usize> = by_window
        .keys()
        .copied()
        .filter(|w| *w > weights.recent_max_window)
        .collect();

    let category_ranks = multi_sg_ranks(&by_window);
    let (w_recent, w_baseline, w_multi) = weights.component_weights();
    let category_weights = weights.category_weights();

    let windowed_score = |window: usize, player: &str| -> Option<f64> {
        let bucket = by_window.get(&window)?;
        let row = bucket.get(player)?;
        let raw = rank_to_score(row.sg_total_rank, bucket.len());
        let confidence = sample_size_confidence(row.rounds_used, weights.sample_threshold);
        Some(shrink_toward_neutral(raw, confidence))
    };

    let mut results = BTreeMap::new();
    for player in players {
        // Smallest window first, weighted n, n-1, ..., 1
        let recent_scores: Vec<f64> = recent_windows
            .iter()
            .filter_map(|&w| windowed_score(w, player))
            .collect();
        let recent = if recent_scores.is_empty() {
            NEUTRAL_SCORE
        } else {
            let n = recent_scores.len();
            let total_weight = (n * (n + 1) / 2) as f64;
            recent_scores
                .iter()
                .enumerate()
                .map(|(i, s)| s * (n - i) as f64 / total_weight)
                .sum()
        };

        let baseline_scores: Vec<f64> = baseline_windows
            .iter()
            .filter_map(|&w| windowed_score(w, player))
            .collect();
        let baseline = if baseline_scores.is_empty() {
            NEUTRAL_SCORE
        } else {
            baseline_scores.iter().sum::<f64>() / baseline_scores.len() as f64
        };

        let smallest = by_window
            .iter()
            .find(|(_, bucket)| bucket.contains_key(player))
            .map(|(w, _)| *w);
        let multi_sg = match smallest.and_then(|w| category_ranks.get(&w)) {
            Some(ranks) => category_weights
                .iter()
                .map(|(category, weight)| {
                    let score = ranks
                        .get(category)
                        .and_then(|(ranked, size)| {
                            ranked.get(player).map(|r| rank_to_score(Some(*r), *size))
                        })
                        .unwrap_or(NEUTRAL_SCORE);
                    weight * score
                })
                .sum(),
            None => NEUTRAL_SCORE,
        };

        let score = (w_recent * recent + w_baseline * baseline + w_multi * multi_sg).clamp(0.0, 100.0);
        results.insert(
            player.to_string(),
            FormScore {
                score,
                recent,
                baseline,
                multi_sg,
            },
        );
    }

    results
}

type CategoryRanks<'a> = HashMap<SgCategory, (HashMap<&'a str, usize>, usize)>;

/// Per-window, per-category ranks over non-null values
fn multi_sg_ranks<'a>(
    by_window: &BTreeMap<usize, HashMap<&'a str, &'a PitRollingStat>>,
) -> HashMap<usize, CategoryRanks<'a>> {
    let mut out = HashMap::new();
    for (&window, bucket) in by_window {
        let mut per_category: CategoryRanks<'a> = HashMap::new();
        for category in SgCategory::SCORED {
            let values: Vec<(&'a str, Option<f64>)> = bucket
                .iter()
                .map(|(player, row)| (*player, row.sg.get(category)))
                .collect();
            let ranked = rank_field(&values, true);
            let size = ranked.len();
            per_category.insert(category, (ranked.into_iter().collect(), size));
        }
        out.insert(window, per_category);
    }
    out
}
