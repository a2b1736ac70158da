//! Kelly staking for tournament markets
//!
//! Stakes are shares of the current bankroll. Live sizing applies a
//! fractional multiplier that drops while the bankroll sits below its peak,
//! then caps the result. Replay sizing works in flat units from the implied
//! probability of the price taken.

use serde::{Deserialize, Serialize};

/// Quarter-Kelly
pub const DEFAULT_KELLY_FRACTION: f64 = 0.25;
/// Eighth-Kelly, used while the bankroll is in drawdown
pub const DRAWDOWN_KELLY_FRACTION: f64 = 0.125;
/// Balance below this share of peak counts as drawdown
pub const DRAWDOWN_THRESHOLD: f64 = 0.85;
/// Hard per-bet ceiling as a share of bankroll
pub const MAX_STAKE_FRACTION: f64 = 0.25;

/// Replay stakes are expressed in units and bounded to this band
pub const REPLAY_MIN_STAKE: f64 = 0.01;
pub const REPLAY_MAX_STAKE: f64 = 0.05;

/// Stake recommendation for one priced selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetSizing {
    pub probability: f64,
    pub odds: f64,
    pub expected_value: f64,
    /// Expected return per unit staked, minus one
    pub edge: f64,
    pub kelly_fraction: f64,
    /// Share of bankroll after the multiplier and the ceiling
    pub recommended_fraction: f64,
    pub stake: f64,
}

/// Full-Kelly share of bankroll for a bet at decimal price `decimal_odds`.
///
/// With net odds `b = decimal_odds - 1` this is `(b * p - (1 - p)) / b`.
/// Negative values mean the price offers no edge; callers clamp at zero.
/// Decimal prices at or below 1.0 return 0.
///
/// ```
/// use golf_backtest::core::kelly::calculate_kelly_fraction;
/// // 20% to win at +400 (decimal 5.0): edge 0.0, no stake
/// assert!(calculate_kelly_fraction(0.20, 5.0).abs() < 1e-12);
/// // 25% at +400: a sixteenth of the bankroll
/// assert!((calculate_kelly_fraction(0.25, 5.0) - 0.0625).abs() < 1e-12);
/// ```
pub fn calculate_kelly_fraction(win_prob: f64, decimal_odds: f64) -> f64 {
    let net_odds = decimal_odds - 1.0;
    if net_odds <= 0.0 {
        return 0.0;
    }
    (net_odds * win_prob - (1.0 - win_prob)) / net_odds
}

/// Replay stake in units from an implied probability.
///
/// `b = 1/implied - 1`, full Kelly `max(0, (b*p - (1-p)) / b)`, then scaled
/// by `kelly_fraction` and clamped to [`REPLAY_MIN_STAKE`, `REPLAY_MAX_STAKE`].
pub fn replay_stake(probability: f64, implied: f64, kelly_fraction: f64) -> f64 {
    if implied <= 0.0 || implied >= 1.0 {
        return REPLAY_MIN_STAKE;
    }
    let b = 1.0 / implied - 1.0;
    let full_kelly = ((b * probability - (1.0 - probability)) / b).max(0.0);
    (full_kelly * kelly_fraction).clamp(REPLAY_MIN_STAKE, REPLAY_MAX_STAKE)
}

/// Kelly calculator with a drawdown throttle
///
/// Supports:
/// - Fractional Kelly (default 1/4)
/// - Automatic switch to 1/8 Kelly below 85% of peak balance
/// - Hard per-bet ceiling
#[derive(Debug, Clone)]
pub struct KellyCalculator {
    pub bankroll: f64,
    pub peak_balance: f64,
    pub kelly_multiplier: f64,
    pub drawdown_multiplier: f64,
    pub drawdown_threshold: f64,
    pub max_stake_pct: f64,
}

impl KellyCalculator {
    pub fn new(bankroll: f64, peak_balance: f64, kelly_multiplier: f64, max_stake_pct: f64) -> Self {
        Self {
            bankroll,
            peak_balance: peak_balance.max(bankroll),
            kelly_multiplier,
            drawdown_multiplier: DRAWDOWN_KELLY_FRACTION,
            drawdown_threshold: DRAWDOWN_THRESHOLD,
            max_stake_pct,
        }
    }

    /// Create with default settings (quarter Kelly, 25% ceiling)
    pub fn with_defaults(bankroll: f64) -> Self {
        Self::new(bankroll, bankroll, DEFAULT_KELLY_FRACTION, MAX_STAKE_FRACTION)
    }

    pub fn in_drawdown(&self) -> bool {
        self.peak_balance > 0.0 && self.bankroll < self.peak_balance * self.drawdown_threshold
    }

    /// Multiplier currently in force
    pub fn effective_multiplier(&self) -> f64 {
        if self.in_drawdown() {
            self.drawdown_multiplier
        } else {
            self.kelly_multiplier
        }
    }

    /// Share of bankroll to stake; zero when there is no edge
    pub fn stake_fraction(&self, win_prob: f64, decimal_odds: f64) -> f64 {
        if win_prob <= 0.0 || decimal_odds <= 1.0 || win_prob * decimal_odds <= 1.0 {
            return 0.0;
        }
        let full = calculate_kelly_fraction(win_prob, decimal_odds);
        (full * self.effective_multiplier()).clamp(0.0, self.max_stake_pct)
    }

    /// Size one selection against the current bankroll
    pub fn calculate_single(&self, win_prob: f64, decimal_odds: f64) -> BetSizing {
        let expected_value = win_prob * decimal_odds;
        let fraction = self.stake_fraction(win_prob, decimal_odds);

        BetSizing {
            probability: win_prob,
            odds: decimal_odds,
            expected_value,
            edge: expected_value - 1.0,
            kelly_fraction: calculate_kelly_fraction(win_prob, decimal_odds),
            recommended_fraction: fraction,
            stake: self.bankroll.max(0.0) * fraction,
        }
    }
}

impl Default for KellyCalculator {
    fn default() -> Self {
        Self::with_defaults(100.0)
    }
}
