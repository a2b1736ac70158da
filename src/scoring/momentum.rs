//! Momentum sub-model
//!
//! Compares a player's total-SG rank in the oldest (largest) window with the
//! newest (smallest), blends that trend with the player's current position,
//! and normalizes the raw trend across the field.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::core::ranking::NEUTRAL_SCORE;
use crate::models::PlayerKey;
use crate::pit::rolling::PitRollingStat;

/// Ranks at or below this count as elite
pub const ELITE_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Hot,
    Warming,
    Cooling,
    Cold,
    Unknown,
}

impl Direction {
    /// Bucket a field-relative trend in [-1, 1]
    pub fn from_relative(relative: f64) -> Self {
        if relative > 0.25 {
            Direction::Hot
        } else if relative > 0.05 {
            Direction::Warming
        } else if relative > -0.25 {
            Direction::Cooling
        } else {
            Direction::Cold
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Hot => "hot",
            Direction::Warming => "warming",
            Direction::Cooling => "cooling",
            Direction::Cold => "cold",
            Direction::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumScore {
    pub score: f64,
    pub direction: Direction,
    /// Raw trend before field normalization
    pub trend: f64,
}

/// Raw trend from ranks ordered oldest (largest window) to newest.
///
/// `field_size` is the size of the newest window's field.
pub fn raw_trend(ranks: &[usize], field_size: usize) -> f64 {
    let (Some(&oldest), Some(&newest)) = (ranks.first(), ranks.last()) else {
        return 0.0;
    };

    let mut pct = if oldest > 0 {
        ((oldest as f64 - newest as f64) / oldest as f64).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    let elite = newest <= ELITE_THRESHOLD;
    if elite && oldest <= ELITE_THRESHOLD {
        let stability = 0.3 * (1.0 - (newest as f64 - 1.0) / ELITE_THRESHOLD as f64);
        pct = pct.max(stability);
    }

    let position = if field_size > 1 {
        (field_size as f64 - newest as f64) / (field_size as f64 - 1.0)
    } else {
        0.5
    };

    let position_weight = if elite { 0.5 } else { 0.4 };
    let trend_weight = 1.0 - position_weight;
    let mut raw = trend_weight * pct * 100.0 + position_weight * (position - 0.5) * 100.0;

    if ranks.len() >= 3 {
        let (mut improving, mut declining) = (0i32, 0i32);
        for pair in ranks.windows(2) {
            if pair[0] > pair[1] {
                improving += 1;
            } else if pair[0] < pair[1] {
                declining += 1;
            }
        }
        let pairs = improving + declining;
        if pairs > 0 {
            raw += 10.0 * (improving - declining) as f64 / pairs as f64;
        }
    }

    raw
}

pub fn compute_momentum(stats: &[PitRollingStat]) -> BTreeMap<PlayerKey, MomentumScore> {
    // player -> window -> rank
    let mut player_windows: BTreeMap<&str, BTreeMap<usize, usize>> = BTreeMap::new();
    let mut field_sizes: HashMap<usize, usize> = HashMap::new();
    for row in stats {
        if let Some(rank) = row.sg_total_rank {
            player_windows
                .entry(row.player_key.as_str())
                .or_default()
                .insert(row.window, rank);
            *field_sizes.entry(row.window).or_default() += 1;
        }
    }

    let mut raw_trends: BTreeMap<&str, Option<f64>> = BTreeMap::new();
    for (player, windows) in &player_windows {
        if windows.len() < 2 {
            raw_trends.insert(player, None);
            continue;
        }
        // Largest window first
        let ranks: Vec<usize> = windows.values().rev().copied().collect();
        let newest_window = windows.keys().next().copied().unwrap_or_default();
        let field_size = field_sizes.get(&newest_window).copied().unwrap_or(0);
        raw_trends.insert(player, Some(raw_trend(&ranks, field_size)));
    }

    let max_abs = raw_trends
        .values()
        .flatten()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let max_abs = if max_abs > 0.0 { max_abs } else { 1.0 };

    raw_trends
        .into_iter()
        .map(|(player, raw)| {
            let score = match raw {
                Some(raw) => {
                    let relative = raw / max_abs;
                    MomentumScore {
                        score: (50.0 + 50.0 * relative).clamp(0.0, 100.0),
                        direction: Direction::from_relative(relative),
                        trend: raw,
                    }
                }
                None => MomentumScore {
                    score: NEUTRAL_SCORE,
                    direction: Direction::Unknown,
                    trend: 0.0,
                },
            };
            (player.to_string(), score)
        })
        .collect()
}
