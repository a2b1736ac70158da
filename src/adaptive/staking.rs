//! Bankroll ledger and Kelly staking
//!
//! The ledger is append-only: one row per settled tournament. Stakes are
//! sized from the latest row with [`KellyCalculator`], which drops to
//! eighth-Kelly while the balance sits below 85% of its peak.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::kelly::{KellyCalculator, DEFAULT_KELLY_FRACTION, MAX_STAKE_FRACTION};
use crate::error::Result;

/// One ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollState {
    pub date: NaiveDate,
    pub balance: f64,
    pub peak_balance: f64,
    /// Base Kelly fraction carried forward; the drawdown switch is applied on read
    pub kelly_fraction: f64,
    pub notes: String,
}

impl BankrollState {
    pub fn calculator(&self) -> KellyCalculator {
        KellyCalculator::new(
            self.balance,
            self.peak_balance,
            self.kelly_fraction,
            MAX_STAKE_FRACTION,
        )
    }

    /// Row that follows this one after a tournament's profit
    pub fn next(&self, date: NaiveDate, profit: f64, notes: impl Into<String>) -> BankrollState {
        let balance = self.balance + profit;
        BankrollState {
            date,
            balance,
            peak_balance: self.peak_balance.max(balance),
            kelly_fraction: self.kelly_fraction,
            notes: notes.into(),
        }
    }
}

pub trait BankrollLedger {
    fn latest_bankroll(&self) -> Result<Option<BankrollState>>;
    fn append_bankroll(&self, state: &BankrollState) -> Result<()>;
    /// Ledger rows, oldest first
    fn bankroll_history(&self) -> Result<Vec<BankrollState>>;
}

/// Append a row after a settled tournament.
///
/// The first row starts from a zero balance, so its balance is the profit.
pub fn record_tournament<L: BankrollLedger>(
    ledger: &L,
    date: NaiveDate,
    profit: f64,
    notes: &str,
) -> Result<BankrollState> {
    let state = match ledger.latest_bankroll()? {
        Some(previous) => previous.next(date, profit, notes),
        None => BankrollState {
            date,
            balance: profit,
            peak_balance: profit.max(0.0),
            kelly_fraction: DEFAULT_KELLY_FRACTION,
            notes: notes.to_string(),
        },
    };
    ledger.append_bankroll(&state)?;
    info!(
        "Bankroll {}: balance {:.2} (peak {:.2})",
        state.date, state.balance, state.peak_balance
    );
    Ok(state)
}

/// Share of bankroll to stake on one bet at decimal odds.
///
/// Without a ledger row the default quarter-Kelly applies.
pub fn kelly_stake<L: BankrollLedger>(ledger: &L, probability: f64, decimal_odds: f64) -> Result<f64> {
    let calculator = match ledger.latest_bankroll()? {
        Some(state) => state.calculator(),
        None => KellyCalculator::default(),
    };
    Ok(calculator.stake_fraction(probability, decimal_odds))
}
