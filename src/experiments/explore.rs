//! Neighbor strategy generation for local search around a base strategy

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::backtesting::strategy::StrategyConfig;

/// Windows a neighbor may switch to
pub const EXPLORE_WINDOWS: [usize; 3] = [12, 24, 50];

const MAX_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreConfig {
    pub neighbors: usize,
    /// Maximum absolute change applied to a weight
    pub perturbation: f64,
    pub seed: u64,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            neighbors: 5,
            perturbation: 0.03,
            seed: 42,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn weight_mut(config: &mut StrategyConfig, index: usize) -> &mut f64 {
    match index {
        0 => &mut config.w_sg_total,
        1 => &mut config.w_sg_app,
        2 => &mut config.w_sg_ott,
        3 => &mut config.w_sg_arg,
        4 => &mut config.w_sg_putt,
        5 => &mut config.w_form,
        _ => &mut config.w_course_fit,
    }
}

/// Neighbors of `base`, each with one or two weights nudged by up to
/// ±`perturbation` and clamped to [0, 0.5].
///
/// Some neighbors also move `min_ev`, the temperature multiplier or the
/// window. The same seed always yields the same neighbors.
pub fn generate_neighbors(base: &StrategyConfig, config: &ExploreConfig) -> Vec<StrategyConfig> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let indices: Vec<usize> = (0..7).collect();
    let spread = config.perturbation.abs();

    (0..config.neighbors)
        .map(|i| {
            let mut neighbor = base.clone();
            let count = rng.gen_range(1..=2);
            for &index in indices.choose_multiple(&mut rng, count) {
                let delta = if spread > 0.0 {
                    rng.gen_range(-spread..=spread)
                } else {
                    0.0
                };
                let weight = weight_mut(&mut neighbor, index);
                *weight = round_to((*weight + delta).clamp(0.0, MAX_WEIGHT), 4);
            }

            if rng.gen_bool(0.3) {
                let shifted = neighbor.min_ev + rng.gen_range(-0.02..=0.02);
                neighbor.min_ev = round_to(shifted.clamp(0.01, 0.15), 3);
            }
            if rng.gen_bool(0.3) {
                let shifted = neighbor.softmax_temp + rng.gen_range(-0.3..=0.3);
                neighbor.softmax_temp = round_to(shifted.clamp(0.5, 3.0), 2);
            }
            if rng.gen_bool(0.2) {
                if let Some(&window) = EXPLORE_WINDOWS.choose(&mut rng) {
                    neighbor.stat_window = window;
                }
            }

            neighbor.name = format!("{}_neighbor_{}", base.name, i);
            neighbor
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(c: &StrategyConfig) -> [f64; 7] {
        [
            c.w_sg_total,
            c.w_sg_app,
            c.w_sg_ott,
            c.w_sg_arg,
            c.w_sg_putt,
            c.w_form,
            c.w_course_fit,
        ]
    }

    #[test]
    fn test_same_seed_same_neighbors() {
        let base = StrategyConfig::default();
        let a = generate_neighbors(&base, &ExploreConfig::default());
        let b = generate_neighbors(&base, &ExploreConfig::default());
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn test_neighbors_stay_in_bounds() {
        let base = StrategyConfig::default();
        let config = ExploreConfig {
            neighbors: 50,
            perturbation: 0.4,
            seed: 7,
        };
        for neighbor in generate_neighbors(&base, &config) {
            assert!(weights(&neighbor).iter().all(|w| (0.0..=0.5).contains(w)));
            assert!((0.01..=0.15).contains(&neighbor.min_ev) || neighbor.min_ev == base.min_ev);
            assert!((0.5..=3.0).contains(&neighbor.softmax_temp));
            assert!(neighbor.stat_window == 24 || EXPLORE_WINDOWS.contains(&neighbor.stat_window));
        }
    }

    #[test]
    fn test_at_most_two_weights_change() {
        let base = StrategyConfig::default();
        let config = ExploreConfig {
            neighbors: 20,
            ..Default::default()
        };
        for neighbor in generate_neighbors(&base, &config) {
            let changed = weights(&neighbor)
                .iter()
                .zip(weights(&base).iter())
                .filter(|(a, b)| (*a - *b).abs() > 1e-12)
                .count();
            assert!(changed <= 2);
            assert!(neighbor.name.starts_with("default_neighbor_"));
        }
    }
}
