//! Market suppression state machine
//!
//! Each evaluation reads a market's most recent settled bets and grades it
//! normal, caution or cold by rolling ROI. A long losing streak freezes the
//! market; the freeze is persisted and only a manual unfreeze lifts it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::backtesting::metrics::roi_pct;
use crate::error::Result;
use crate::models::Market;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionConfig {
    /// Settled bets considered per evaluation
    pub window: usize,
    /// Below this many bets a market is always normal
    pub min_bets: usize,
    pub consecutive_losses_frozen: usize,
    pub ev_threshold_normal: f64,
    pub ev_threshold_caution: f64,
    pub ev_threshold_cold: f64,
    /// ROI% at or below which a market is in caution
    pub roi_caution: f64,
    /// ROI% at or below which a market is cold
    pub roi_cold: f64,
    pub cold_stake_multiplier: f64,
    pub recovery_window: usize,
    pub recovery_wins: usize,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            window: 50,
            min_bets: 10,
            consecutive_losses_frozen: 10,
            ev_threshold_normal: 0.05,
            ev_threshold_caution: 0.08,
            ev_threshold_cold: 0.12,
            roi_caution: -20.0,
            roi_cold: -40.0,
            cold_stake_multiplier: 0.5,
            recovery_window: 5,
            recovery_wins: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketState {
    Normal,
    Caution,
    Cold,
    Frozen,
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketState::Normal => "normal",
            MarketState::Caution => "caution",
            MarketState::Cold => "cold",
            MarketState::Frozen => "frozen",
        };
        f.write_str(s)
    }
}

/// One settled bet in a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketResult {
    pub market: Market,
    pub settled_on: NaiveDate,
    pub wagered: f64,
    pub returned: f64,
    pub won: bool,
    /// Stake returned on a tie; neither a win nor a loss
    #[serde(default)]
    pub push: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPerformance {
    pub market: Market,
    pub total_bets: usize,
    pub wins: usize,
    pub wagered: f64,
    pub returned: f64,
    /// `None` when nothing was wagered
    pub roi_pct: Option<f64>,
    pub consecutive_losses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySignal {
    pub wins_in_window: usize,
    pub window: usize,
    /// Advisory only; the freeze stays until unfrozen by hand
    pub should_unfreeze: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAssessment {
    pub market: Market,
    pub state: MarketState,
    /// `None` while suppressed
    pub ev_threshold: Option<f64>,
    pub stake_multiplier: f64,
    pub suppress: bool,
    pub performance: MarketPerformance,
    pub recovery: Option<RecoverySignal>,
}

pub trait MarketStore {
    fn record_market_result(&self, result: &MarketResult) -> Result<()>;
    /// Most recent settled bets, newest first
    fn recent_market_results(&self, market: Market, limit: usize) -> Result<Vec<MarketResult>>;
    fn is_frozen(&self, market: Market) -> Result<bool>;
    fn set_frozen(&self, market: Market, frozen: bool, reason: &str) -> Result<()>;
}

/// Rolling aggregates over results ordered newest first
pub fn rolling_performance(market: Market, results: &[MarketResult]) -> MarketPerformance {
    let wagered: f64 = results.iter().map(|r| r.wagered).sum();
    let returned: f64 = results.iter().map(|r| r.returned).sum();
    MarketPerformance {
        market,
        total_bets: results.len(),
        wins: results.iter().filter(|r| r.won).count(),
        wagered,
        returned,
        roi_pct: (wagered > 0.0).then(|| roi_pct(wagered, returned)),
        consecutive_losses: results
            .iter()
            .filter(|r| !r.push)
            .take_while(|r| !r.won)
            .count(),
    }
}

/// Grade by rolling ROI, ignoring the freeze
pub fn classify(performance: &MarketPerformance, config: &SuppressionConfig) -> MarketState {
    if performance.total_bets < config.min_bets {
        return MarketState::Normal;
    }
    match performance.roi_pct {
        Some(roi) if roi <= config.roi_cold => MarketState::Cold,
        Some(roi) if roi <= config.roi_caution => MarketState::Caution,
        _ => MarketState::Normal,
    }
}

/// Wins among the most recent results, newest first
pub fn check_recovery(results: &[MarketResult], config: &SuppressionConfig) -> RecoverySignal {
    let wins_in_window = results
        .iter()
        .take(config.recovery_window)
        .filter(|r| r.won)
        .count();
    RecoverySignal {
        wins_in_window,
        window: config.recovery_window,
        should_unfreeze: wins_in_window >= config.recovery_wins,
    }
}

fn assessment(
    state: MarketState,
    performance: MarketPerformance,
    recovery: Option<RecoverySignal>,
    config: &SuppressionConfig,
) -> MarketAssessment {
    let (ev_threshold, stake_multiplier) = match state {
        MarketState::Normal => (Some(config.ev_threshold_normal), 1.0),
        MarketState::Caution => (Some(config.ev_threshold_caution), 1.0),
        MarketState::Cold => (Some(config.ev_threshold_cold), config.cold_stake_multiplier),
        MarketState::Frozen => (None, 0.0),
    };
    MarketAssessment {
        market: performance.market,
        state,
        ev_threshold,
        stake_multiplier,
        suppress: state == MarketState::Frozen,
        performance,
        recovery,
    }
}

/// Evaluate a market from its recent results, freezing it on a losing streak
pub fn assess<S: MarketStore>(store: &S, market: Market, config: &SuppressionConfig) -> Result<MarketAssessment> {
    let results = store.recent_market_results(market, config.window)?;
    let performance = rolling_performance(market, &results);

    let mut frozen = store.is_frozen(market)?;
    if !frozen && performance.consecutive_losses >= config.consecutive_losses_frozen {
        let reason = format!("{} consecutive losses", performance.consecutive_losses);
        store.set_frozen(market, true, &reason)?;
        warn!("Market {} frozen: {}", market, reason);
        frozen = true;
    }

    if frozen {
        let recovery = check_recovery(&results, config);
        if recovery.should_unfreeze {
            info!(
                "Market {} shows recovery ({} wins in last {}); unfreeze manually",
                market, recovery.wins_in_window, recovery.window
            );
        }
        return Ok(assessment(MarketState::Frozen, performance, Some(recovery), config));
    }

    let state = classify(&performance, config);
    Ok(assessment(state, performance, None, config))
}

/// Lift a freeze; the only way out of the frozen state
pub fn unfreeze<S: MarketStore>(store: &S, market: Market) -> Result<()> {
    store.set_frozen(market, false, "manual unfreeze")?;
    info!("Market {} unfrozen", market);
    Ok(())
}
