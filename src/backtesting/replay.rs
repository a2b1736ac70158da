//! Single-event strategy replay
//!
//! Replays one historical event under one strategy: PIT stats at the
//! strategy's window are folded into a linear composite, priced per market
//! with a scaled softmax, filtered against archived prices and settled
//! against the recorded finishes.
//!
//! The composite here is deliberately simpler than [`crate::scoring`]: a
//! weighted sum of category averages, without rank transforms.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::backtesting::strategy::{NormalizedWeights, StrategyConfig};
use crate::core::kelly::replay_stake;
use crate::core::odds::{american_to_decimal, american_to_implied};
use crate::core::probability::{market_target_mass, market_temperature, softmax_probs};
use crate::core::settlement::{compute_profit, settle_from_text};
use crate::models::{EventKey, Market, PlayerKey, SgCategory, SgLine};
use crate::pit::rolling::PitRollingStat;

/// Everything the replay needs for one event, gathered up front
#[derive(Debug, Clone, Default)]
pub struct EventSnapshot {
    pub event: EventKey,
    /// PIT rows at the strategy's window
    pub rolling: Vec<PitRollingStat>,
    /// Best vigged American price per (player, market)
    pub prices: HashMap<(PlayerKey, Market), i32>,
    /// Recorded finish text per player
    pub finishes: BTreeMap<PlayerKey, String>,
}

/// One simulated bet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub event_id: String,
    pub year: i32,
    pub player_key: PlayerKey,
    pub market: Market,
    pub model_prob: f64,
    pub implied_prob: f64,
    pub ev: f64,
    /// Model probability minus implied probability
    pub prob_edge: f64,
    /// American price taken
    pub odds: i32,
    pub decimal_odds: f64,
    /// Stake in bankroll units
    pub wager: f64,
    pub won: bool,
    pub fraction: f64,
    pub is_push: bool,
    pub profit: f64,
    pub payout: f64,
    pub clv: f64,
    pub finish_text: Option<String>,
}

impl BetRecord {
    /// Per-bet return on stake
    pub fn return_on_stake(&self) -> f64 {
        if self.wager > 0.0 {
            (self.payout - self.wager) / self.wager
        } else {
            0.0
        }
    }
}

/// Linear composite: weighted sum over the scored categories, nulls skipped
pub fn linear_composite(sg: &SgLine, weights: &NormalizedWeights) -> f64 {
    SgCategory::SCORED
        .iter()
        .filter_map(|&category| sg.get(category).map(|v| weights.category(category) * v))
        .sum()
}

/// Replay one event and return every bet the strategy would have placed
pub fn replay_event(snapshot: &EventSnapshot, strategy: &StrategyConfig) -> Vec<BetRecord> {
    let mut rows: Vec<&PitRollingStat> = snapshot
        .rolling
        .iter()
        .filter(|r| r.window == strategy.stat_window)
        .collect();
    if rows.is_empty() {
        debug!("{}: no PIT rows at window {}", snapshot.event, strategy.stat_window);
        return Vec::new();
    }
    rows.sort_by(|a, b| a.player_key.cmp(&b.player_key));

    let weights = strategy.normalized_weights();
    let scores: Vec<f64> = rows.iter().map(|r| linear_composite(&r.sg, &weights)).collect();
    let field_texts: Vec<&str> = snapshot.finishes.values().map(String::as_str).collect();

    let mut bets = Vec::new();
    for &market in &strategy.markets {
        if market == Market::Matchup {
            debug!("{}: matchups are not priced from the field", snapshot.event);
            continue;
        }

        let temperature = market_temperature(market) * strategy.softmax_temp;
        let target = market_target_mass(market, rows.len());
        let probs = softmax_probs(&scores, temperature, target);

        for (row, &model_prob) in rows.iter().zip(probs.iter()) {
            if model_prob < strategy.min_model_prob {
                continue;
            }
            let Some(&price) = snapshot.prices.get(&(row.player_key.clone(), market)) else {
                continue;
            };
            let Some(decimal_odds) = american_to_decimal(price) else {
                continue;
            };
            let implied_prob = american_to_implied(price);
            if implied_prob > strategy.max_implied_prob || implied_prob <= 0.0 {
                continue;
            }
            let ev = model_prob / implied_prob - 1.0;
            if ev < strategy.min_ev {
                continue;
            }

            let wager = replay_stake(model_prob, implied_prob, strategy.kelly_fraction);
            let finish_text = snapshot.finishes.get(&row.player_key).cloned();
            let outcome = settle_from_text(finish_text.as_deref(), market, &field_texts);
            let profit = compute_profit(&outcome, decimal_odds, wager);

            bets.push(BetRecord {
                event_id: snapshot.event.event_id.clone(),
                year: snapshot.event.year,
                player_key: row.player_key.clone(),
                market,
                model_prob,
                implied_prob,
                ev,
                prob_edge: model_prob - implied_prob,
                odds: price,
                decimal_odds,
                wager,
                won: outcome.hit,
                fraction: outcome.fraction,
                is_push: outcome.is_push,
                profit,
                payout: (wager + profit).max(0.0),
                clv: model_prob - implied_prob,
                finish_text,
            });
        }
    }

    debug!("{}: {} bets", snapshot.event, bets.len());
    bets
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scoring::form::tests::row;

    /// Two-player event where "a" is a heavy favourite at the given price
    pub(crate) fn snapshot(price: i32, finish_a: &str) -> EventSnapshot {
        EventSnapshot {
            event: EventKey::new("e", 2024),
            rolling: vec![row("a", 24, 3.0, 1, 24), row("b", 24, -3.0, 2, 24)],
            prices: HashMap::from([(("a".to_string(), Market::Win), price)]),
            finishes: BTreeMap::from([
                ("a".to_string(), finish_a.to_string()),
                ("b".to_string(), "2".to_string()),
            ]),
        }
    }

    fn win_only() -> StrategyConfig {
        StrategyConfig {
            markets: vec![Market::Win],
            ..Default::default()
        }
    }

    #[test]
    fn test_linear_composite_skips_nulls() {
        let weights = StrategyConfig::default().normalized_weights();
        let sg = SgLine {
            total: Some(1.0),
            approach: None,
            ..Default::default()
        };
        assert!((linear_composite(&sg, &weights) - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_value_bet_is_placed_and_settled() {
        // +400 implies 0.20; the favourite's model probability is far higher
        let bets = replay_event(&snapshot(400, "1"), &win_only());
        assert_eq!(bets.len(), 1);
        let bet = &bets[0];
        assert_eq!(bet.player_key, "a");
        assert!((bet.implied_prob - 0.2).abs() < 1e-9);
        assert!(bet.ev > 0.05);
        assert!(bet.won);
        assert!((bet.profit - bet.wager * 4.0).abs() < 1e-9);
        assert!((bet.payout - bet.wager * 5.0).abs() < 1e-9);
        assert!((bet.clv - (bet.model_prob - 0.2)).abs() < 1e-12);
        assert!((0.01..=0.05).contains(&bet.wager));
    }

    #[test]
    fn test_ev_matches_reference_scenario() {
        // p 0.30 against +400 is EV 0.50
        let p: f64 = 0.30;
        let implied = american_to_implied(400);
        assert!((p / implied - 1.0 - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_losing_bet_pays_nothing() {
        let bets = replay_event(&snapshot(400, "T7"), &win_only());
        assert_eq!(bets.len(), 1);
        assert!(!bets[0].won);
        assert_eq!(bets[0].payout, 0.0);
        assert!((bets[0].profit + bets[0].wager).abs() < 1e-12);
    }

    #[test]
    fn test_short_price_is_filtered() {
        // -200 implies 0.667, above the 0.50 ceiling
        assert!(replay_event(&snapshot(-200, "1"), &win_only()).is_empty());
    }

    #[test]
    fn test_min_ev_filter() {
        let strict = StrategyConfig {
            min_ev: 100.0,
            ..win_only()
        };
        assert!(replay_event(&snapshot(400, "1"), &strict).is_empty());
    }

    #[test]
    fn test_players_without_prices_are_skipped() {
        let mut snap = snapshot(400, "1");
        snap.prices.clear();
        assert!(replay_event(&snap, &win_only()).is_empty());
    }

    #[test]
    fn test_other_windows_are_ignored() {
        let strategy = StrategyConfig {
            stat_window: 8,
            ..win_only()
        };
        assert!(replay_event(&snapshot(400, "1"), &strategy).is_empty());
    }
}
