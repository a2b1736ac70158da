//! ROI significance test
//!
//! A one-sample z-test of simulated ROI against a baseline, with the
//! standard error of per-bet ROI approximated as 100/sqrt(n). The z-test
//! decides significance; a seeded bootstrap over per-bet returns reports a
//! confidence interval alongside it.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceConfig {
    /// Below this many bets the verdict is always "not significant"
    pub min_bets: usize,
    pub alpha: f64,
    /// Baseline ROI in percent
    pub baseline_roi: f64,
    /// Bootstrap resamples; 0 disables the interval
    pub bootstrap_resamples: usize,
    pub bootstrap_seed: u64,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            min_bets: 50,
            alpha: 0.05,
            baseline_roi: 0.0,
            bootstrap_resamples: 2000,
            bootstrap_seed: 42,
        }
    }
}

/// Percentile interval of resampled ROI, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapInterval {
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Share of resampled ROIs at or below the baseline
    pub p_at_or_below_baseline: f64,
    pub resamples: usize,
}

impl BootstrapInterval {
    /// Whether the whole interval clears the baseline
    pub fn excludes_baseline(&self, baseline_roi: f64) -> bool {
        self.ci_lower > baseline_roi
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceVerdict {
    pub significant: bool,
    pub p_value: Option<f64>,
    pub z_score: Option<f64>,
    /// ROI minus baseline, in percentage points
    pub delta: f64,
    pub total_bets: usize,
    /// Set when the test was not run
    pub reason: Option<String>,
    #[serde(default)]
    pub bootstrap: Option<BootstrapInterval>,
}

/// Two-sided p-value of a standard normal z score
pub fn two_sided_p_value(z: f64) -> Option<f64> {
    let normal = Normal::new(0.0, 1.0).ok()?;
    let p = 2.0 * (1.0 - normal.cdf(z.abs()));
    p.is_finite().then_some(p.clamp(0.0, 1.0))
}

pub fn evaluate_roi(roi_pct: f64, total_bets: usize, config: &SignificanceConfig) -> SignificanceVerdict {
    let delta = roi_pct - config.baseline_roi;

    if total_bets < config.min_bets || total_bets == 0 {
        return SignificanceVerdict {
            significant: false,
            p_value: None,
            z_score: None,
            delta,
            total_bets,
            reason: Some(format!(
                "insufficient bets ({} < {})",
                total_bets, config.min_bets
            )),
            bootstrap: None,
        };
    }

    let se = 100.0 / (total_bets as f64).sqrt();
    let z = delta / se;
    let p_value = two_sided_p_value(z);
    let significant = matches!(p_value, Some(p) if p < config.alpha) && delta > 0.0;

    SignificanceVerdict {
        significant,
        p_value,
        z_score: Some(z),
        delta,
        total_bets,
        reason: None,
        bootstrap: None,
    }
}

/// Resample per-bet returns (profit over stake) with replacement.
///
/// Each resample's ROI is the mean return in percent; the interval takes the
/// `alpha / 2` and `1 - alpha / 2` order statistics. `None` when there are no
/// returns or resampling is disabled.
pub fn bootstrap_roi(returns: &[f64], config: &SignificanceConfig) -> Option<BootstrapInterval> {
    let resamples = config.bootstrap_resamples;
    if returns.is_empty() || resamples == 0 {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.bootstrap_seed);
    let n = returns.len();
    let mut rois: Vec<f64> = (0..resamples)
        .map(|_| {
            let sum: f64 = (0..n).map(|_| returns[rng.gen_range(0..n)]).sum();
            sum / n as f64 * 100.0
        })
        .collect();
    rois.sort_by(|a, b| a.total_cmp(b));

    let alpha = config.alpha.clamp(0.0, 1.0);
    let lower_idx = ((resamples as f64 * alpha / 2.0) as usize).min(resamples - 1);
    let upper_idx = ((resamples as f64 * (1.0 - alpha / 2.0)) as usize).min(resamples - 1);
    let at_or_below = rois.iter().filter(|&&r| r <= config.baseline_roi).count();

    Some(BootstrapInterval {
        ci_lower: rois[lower_idx],
        ci_upper: rois[upper_idx],
        p_at_or_below_baseline: at_or_below as f64 / resamples as f64,
        resamples,
    })
}

/// z-test verdict plus the bootstrap interval when the bet minimum is met
pub fn evaluate_returns(
    roi_pct: f64,
    total_bets: usize,
    returns: &[f64],
    config: &SignificanceConfig,
) -> SignificanceVerdict {
    let mut verdict = evaluate_roi(roi_pct, total_bets, config);
    if verdict.reason.is_none() {
        verdict.bootstrap = bootstrap_roi(returns, config);
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_minimum_is_never_significant() {
        let verdict = evaluate_roi(500.0, 49, &SignificanceConfig::default());
        assert!(!verdict.significant);
        assert!(verdict.p_value.is_none());
        assert!(verdict.reason.is_some());
    }

    #[test]
    fn test_large_positive_roi_is_significant() {
        // n = 100: se = 10, z = 3 -> p ~ 0.0027
        let verdict = evaluate_roi(30.0, 100, &SignificanceConfig::default());
        assert!(verdict.significant);
        assert!((verdict.z_score.unwrap() - 3.0).abs() < 1e-12);
        assert!((verdict.p_value.unwrap() - 0.0027).abs() < 1e-4);
    }

    #[test]
    fn test_negative_delta_is_not_significant() {
        let verdict = evaluate_roi(-30.0, 100, &SignificanceConfig::default());
        assert!(verdict.p_value.unwrap() < 0.05);
        assert!(!verdict.significant);
    }

    #[test]
    fn test_small_edge_is_not_significant() {
        // z = 1 -> p ~ 0.317
        let verdict = evaluate_roi(10.0, 100, &SignificanceConfig::default());
        assert!(!verdict.significant);
        assert!((verdict.p_value.unwrap() - 0.3173).abs() < 1e-3);
    }

    #[test]
    fn test_baseline_shifts_delta() {
        let config = SignificanceConfig {
            baseline_roi: 25.0,
            ..Default::default()
        };
        let verdict = evaluate_roi(30.0, 100, &config);
        assert!((verdict.delta - 5.0).abs() < 1e-12);
        assert!(!verdict.significant);
    }

    /// 60 bets: 20 winners at +400, 40 losers, ROI 66.7%
    fn mixed_returns() -> Vec<f64> {
        (0..60).map(|i| if i % 3 == 0 { 4.0 } else { -1.0 }).collect()
    }

    #[test]
    fn test_bootstrap_is_seeded() {
        let config = SignificanceConfig::default();
        let a = bootstrap_roi(&mixed_returns(), &config).unwrap();
        let b = bootstrap_roi(&mixed_returns(), &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.resamples, 2000);
    }

    #[test]
    fn test_bootstrap_interval_brackets_observed_roi() {
        let interval = bootstrap_roi(&mixed_returns(), &SignificanceConfig::default()).unwrap();
        let observed = 100.0 * 20.0 / 60.0 * 5.0 - 100.0;
        assert!(interval.ci_lower < observed && observed < interval.ci_upper);
        assert!(interval.ci_lower >= -100.0 && interval.ci_upper <= 400.0);
        assert!((0.0..=1.0).contains(&interval.p_at_or_below_baseline));
    }

    #[test]
    fn test_bootstrap_constant_returns_collapse() {
        let interval = bootstrap_roi(&[4.0; 60], &SignificanceConfig::default()).unwrap();
        assert!((interval.ci_lower - 400.0).abs() < 1e-9);
        assert!((interval.ci_upper - 400.0).abs() < 1e-9);
        assert_eq!(interval.p_at_or_below_baseline, 0.0);
        assert!(interval.excludes_baseline(0.0));
    }

    #[test]
    fn test_bootstrap_skipped_without_data() {
        assert!(bootstrap_roi(&[], &SignificanceConfig::default()).is_none());
        let disabled = SignificanceConfig {
            bootstrap_resamples: 0,
            ..Default::default()
        };
        assert!(bootstrap_roi(&[1.0], &disabled).is_none());
    }

    #[test]
    fn test_evaluate_returns_attaches_interval_only_above_minimum() {
        let config = SignificanceConfig::default();
        let returns = mixed_returns();
        let verdict = evaluate_returns(66.7, returns.len(), &returns, &config);
        assert!(verdict.bootstrap.is_some());

        let few = &returns[..10];
        let verdict = evaluate_returns(66.7, few.len(), few, &config);
        assert!(verdict.bootstrap.is_none());
    }
}
