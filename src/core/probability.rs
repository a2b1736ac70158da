//! Market-scaled softmax
//!
//! Converts relative scores into a distribution whose total mass equals the
//! number of paying places in the market (1 for win, 5 for top-5, ...).

use crate::models::Market;

/// Per-player probability floor applied before renormalization
pub const PROB_FLOOR: f64 = 0.001;
/// Per-player probability ceiling applied before renormalization
pub const PROB_CEILING: f64 = 0.95;

/// Share of the field expected to make the cut
const MAKE_CUT_SHARE: f64 = 0.65;

/// Base softmax temperature per market (higher = flatter distribution)
pub fn market_temperature(market: Market) -> f64 {
    match market {
        Market::Win => 8.0,
        Market::Top5 => 10.0,
        Market::Top10 => 12.0,
        Market::Top20 => 15.0,
        Market::MakeCut => 20.0,
        Market::Matchup => 10.0,
    }
}

/// Total probability mass a market distributes across the field
pub fn market_target_mass(market: Market, field_size: usize) -> f64 {
    match market {
        Market::Win => 1.0,
        Market::Top5 => 5.0,
        Market::Top10 => 10.0,
        Market::Top20 => 20.0,
        Market::MakeCut => field_size as f64 * MAKE_CUT_SHARE,
        Market::Matchup => 1.0,
    }
}

/// Temperature-scaled softmax normalized to `target_mass`.
///
/// Each probability is clamped to [`PROB_FLOOR`, `PROB_CEILING`] and the
/// clamped set is rescaled back to `target_mass` when clamping moved it.
pub fn softmax_probs(scores: &[f64], temperature: f64, target_mass: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let n = scores.len();
    let temperature = temperature.max(0.01);
    let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores
        .iter()
        .map(|s| ((s - max_score) / temperature).exp())
        .collect();
    let total: f64 = exps.iter().sum();

    if !(total > 0.0) || !total.is_finite() {
        return vec![target_mass / n as f64; n];
    }

    let mut probs: Vec<f64> = exps
        .iter()
        .map(|e| (target_mass * e / total).clamp(PROB_FLOOR, PROB_CEILING))
        .collect();

    let clamped_sum: f64 = probs.iter().sum();
    if clamped_sum > 0.0 && (clamped_sum - target_mass).abs() > 0.001 {
        let scale = target_mass / clamped_sum;
        for p in &mut probs {
            *p *= scale;
        }
    }

    probs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_softmax_preserves_order_and_mass() {
        let probs = softmax_probs(&[90.0, 70.0, 50.0, 30.0], 8.0, 1.0);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() <= 0.001);
        assert!(probs[0] > probs[1]);
        assert!(probs[1] > probs[2]);
        assert!(probs[2] >= probs[3]);
    }

    #[test]
    fn test_softmax_mass_for_various_targets() {
        let scores: Vec<f64> = (0..40).map(|i| (i as f64 * 0.37).sin() * 3.0).collect();
        for &target in &[1.0, 5.0, 10.0, 20.0, 26.0] {
            let probs = softmax_probs(&scores, 10.0, target);
            let sum: f64 = probs.iter().sum();
            assert!((sum - target).abs() < 1e-3, "target {} got {}", target, sum);
        }
    }

    #[test]
    fn test_softmax_single_and_empty() {
        assert!(softmax_probs(&[], 8.0, 1.0).is_empty());
        let single = softmax_probs(&[1.2], 8.0, 1.0);
        assert!((single[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_softmax_extreme_scores_are_clamped_then_rescaled() {
        let probs = softmax_probs(&[500.0, 0.0, 0.0, 0.0], 1.0, 1.0);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
        assert!(probs[1] > 0.0);
    }

    #[test]
    fn test_make_cut_target_scales_with_field() {
        assert!((market_target_mass(Market::MakeCut, 100) - 65.0).abs() < 1e-9);
        assert_eq!(market_target_mass(Market::Top5, 100), 5.0);
    }
}
