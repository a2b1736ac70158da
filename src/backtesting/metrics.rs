//! Backtest Metrics
//!
//! Calculate metrics such as ROI, CLV, Sharpe, calibration and drawdown.

use super::replay::BetRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum samples for a probability bucket to count toward calibration
const MIN_BUCKET_SAMPLES: usize = 3;

/// Backtest evaluation metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // Basic metrics
    pub total_bets: usize,
    pub wins: usize,
    pub hit_rate: f64,
    pub total_wagered: f64,
    pub total_returned: f64,
    /// ROI in percent, rounded to 2 decimals
    pub roi_pct: f64,

    // Edge quality
    pub clv_avg: f64,
    pub avg_ev: f64,
    pub sharpe: f64,
    pub calibration_error: f64,

    // Risk metrics
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// ROI percent of payout against wager; 0 when nothing was wagered
pub fn roi_pct(wagered: f64, returned: f64) -> f64 {
    if wagered > 0.0 {
        round_to((returned - wagered) / wagered * 100.0, 2)
    } else {
        0.0
    }
}

/// Sharpe ratio of per-bet returns using the sample standard deviation.
///
/// Fewer than two bets or zero variance give 0.
pub fn calculate_sharpe_ratio(bets: &[BetRecord]) -> f64 {
    if bets.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = bets.iter().map(|b| b.return_on_stake()).collect();
    let mean_return: f64 = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance: f64 = returns
        .iter()
        .map(|r| (r - mean_return).powi(2))
        .sum::<f64>()
        / (returns.len() - 1) as f64;

    let std_return = variance.sqrt();
    if std_return == 0.0 || !std_return.is_finite() {
        return 0.0;
    }

    round_to(mean_return / std_return, 3)
}

/// One 5%-wide probability bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    /// Bucket centre (`round(p * 20) / 20`)
    pub bucket: f64,
    pub samples: usize,
    pub predicted: f64,
    pub actual: f64,
}

pub fn calibration_buckets(bets: &[BetRecord]) -> Vec<CalibrationBucket> {
    let mut grouped: BTreeMap<i64, Vec<&BetRecord>> = BTreeMap::new();
    for bet in bets {
        grouped
            .entry((bet.model_prob * 20.0).round() as i64)
            .or_default()
            .push(bet);
    }

    grouped
        .into_iter()
        .map(|(key, group)| {
            let n = group.len() as f64;
            CalibrationBucket {
                bucket: key as f64 / 20.0,
                samples: group.len(),
                predicted: group.iter().map(|b| b.model_prob).sum::<f64>() / n,
                actual: group.iter().filter(|b| b.won).count() as f64 / n,
            }
        })
        .collect()
}

/// Mean |predicted - realized| over buckets with enough samples
pub fn calibration_error(bets: &[BetRecord]) -> f64 {
    let gaps: Vec<f64> = calibration_buckets(bets)
        .into_iter()
        .filter(|b| b.samples >= MIN_BUCKET_SAMPLES)
        .map(|b| (b.predicted - b.actual).abs())
        .collect();
    if gaps.is_empty() {
        0.0
    } else {
        round_to(gaps.iter().sum::<f64>() / gaps.len() as f64, 4)
    }
}

/// Largest peak-to-trough fall of cumulative profit
pub fn max_drawdown(bets: &[BetRecord]) -> f64 {
    let mut cumulative = 0.0;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;
    for bet in bets {
        cumulative += bet.payout - bet.wager;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.max(peak - cumulative);
    }
    max_drawdown
}

/// Calculate metrics from bet records
pub fn calculate_metrics(bets: &[BetRecord]) -> BacktestMetrics {
    if bets.is_empty() {
        return BacktestMetrics::default();
    }

    let total_bets = bets.len();
    let wins = bets.iter().filter(|b| b.won).count();
    let total_wagered: f64 = bets.iter().map(|b| b.wager).sum();
    let total_returned: f64 = bets.iter().map(|b| b.payout).sum();
    let clv_avg = round_to(bets.iter().map(|b| b.clv).sum::<f64>() / total_bets as f64, 4);
    let avg_ev = bets.iter().map(|b| b.ev).sum::<f64>() / total_bets as f64;

    let max_drawdown = max_drawdown(bets);
    let max_drawdown_pct = if total_wagered > 0.0 {
        max_drawdown / total_wagered
    } else {
        0.0
    };

    BacktestMetrics {
        total_bets,
        wins,
        hit_rate: wins as f64 / total_bets as f64,
        total_wagered,
        total_returned,
        roi_pct: roi_pct(total_wagered, total_returned),
        clv_avg,
        avg_ev,
        sharpe: calculate_sharpe_ratio(bets),
        calibration_error: calibration_error(bets),
        max_drawdown,
        max_drawdown_pct,
    }
}

/// Analysis results by dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionAnalysis {
    pub key: String,
    pub bets: usize,
    pub wins: usize,
    pub hit_rate: f64,
    pub wagered: f64,
    pub profit: f64,
    pub roi_pct: f64,
}

fn analyze_grouped(grouped: BTreeMap<String, Vec<&BetRecord>>) -> Vec<DimensionAnalysis> {
    grouped
        .into_iter()
        .map(|(key, group)| {
            let total = group.len();
            let wins = group.iter().filter(|b| b.won).count();
            let wagered: f64 = group.iter().map(|b| b.wager).sum();
            let returned: f64 = group.iter().map(|b| b.payout).sum();

            DimensionAnalysis {
                key,
                bets: total,
                wins,
                hit_rate: if total > 0 {
                    wins as f64 / total as f64
                } else {
                    0.0
                },
                wagered,
                profit: returned - wagered,
                roi_pct: roi_pct(wagered, returned),
            }
        })
        .collect()
}

/// Analyze bet results by market
pub fn analyze_by_market(bets: &[BetRecord]) -> Vec<DimensionAnalysis> {
    let mut grouped: BTreeMap<String, Vec<&BetRecord>> = BTreeMap::new();
    for bet in bets {
        grouped.entry(bet.market.to_string()).or_default().push(bet);
    }
    analyze_grouped(grouped)
}

/// Analyze bet results by decimal odds range
pub fn analyze_by_odds_range(bets: &[BetRecord]) -> Vec<DimensionAnalysis> {
    let mut grouped: BTreeMap<String, Vec<&BetRecord>> = BTreeMap::new();
    for bet in bets {
        let key = if bet.decimal_odds < 5.0 {
            "low (<5)"
        } else if bet.decimal_odds < 20.0 {
            "mid (5-20)"
        } else {
            "high (>20)"
        };
        grouped.entry(key.to_string()).or_default().push(bet);
    }
    analyze_grouped(grouped)
}
