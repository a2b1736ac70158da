//! Unified bet settlement
//!
//! Every hit/fraction/push decision in the crate goes through this module.
//!
//! Dead-heat rule: when k players tie on the boundary position of a
//! placement market with threshold T, each tied ticket is paid on
//! `(T - (position - 1)) / k` of the stake and the rest is lost.

use serde::{Deserialize, Serialize};

use crate::models::Market;

/// Parsed finishing position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishPosition {
    /// Numeric position; `None` for CUT/WD/DQ or unparseable text
    pub position: Option<u32>,
    /// Text carried a "T" prefix
    pub tied: bool,
    pub made_cut: bool,
    /// Normalized (trimmed, uppercase) source text
    pub text: String,
}

impl FinishPosition {
    pub fn parse(text: &str) -> Self {
        let text = text.trim().to_uppercase();
        if matches!(
            text.as_str(),
            "CUT" | "MC" | "WD" | "W/D" | "WTD" | "DQ" | "DSQ" | ""
        ) {
            return Self::missing(text);
        }

        let tied = text.starts_with('T');
        let digits = text.trim_start_matches('T').trim();
        match digits.parse::<u32>() {
            Ok(position) if position > 0 => Self {
                position: Some(position),
                tied,
                made_cut: true,
                text,
            },
            _ => Self::missing(text),
        }
    }

    fn missing(text: String) -> Self {
        Self {
            position: None,
            tied: false,
            made_cut: false,
            text,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.position.is_none()
    }
}

/// Result of settling one ticket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub hit: bool,
    /// 1.0 for a clean win, (0, 1) for a dead heat, 0.0 for a loss
    pub fraction: f64,
    /// Stake returned; distinct from a loss
    pub is_push: bool,
}

impl Outcome {
    pub const LOSS: Outcome = Outcome {
        hit: false,
        fraction: 0.0,
        is_push: false,
    };

    pub const WIN: Outcome = Outcome {
        hit: true,
        fraction: 1.0,
        is_push: false,
    };

    pub const PUSH: Outcome = Outcome {
        hit: false,
        fraction: 0.0,
        is_push: true,
    };

    pub fn dead_heat(fraction: f64) -> Self {
        if fraction <= 0.0 {
            Self::LOSS
        } else {
            Outcome {
                hit: true,
                fraction: fraction.min(1.0),
                is_push: false,
            }
        }
    }
}

/// Count field entries tied at `position` (text starts with "T").
///
/// Returns 1 when no tied entry exists.
pub fn count_tied_at(position: u32, field: &[FinishPosition]) -> usize {
    let count = field
        .iter()
        .filter(|f| f.position == Some(position) && f.tied)
        .count();
    count.max(1)
}

/// Fraction of the stake paid on a boundary tie
pub fn dead_heat_fraction(position: u32, threshold: u32, num_tied: usize) -> f64 {
    if num_tied == 0 {
        return 1.0;
    }
    let remaining = threshold as f64 - (position as f64 - 1.0);
    (remaining / num_tied as f64).clamp(0.0, 1.0)
}

/// Settle a placement market (win, top-N)
pub fn settle_placement(finish: &FinishPosition, threshold: u32, field: &[FinishPosition]) -> Outcome {
    let position = match finish.position {
        Some(p) => p,
        None => return Outcome::LOSS,
    };

    if position > threshold {
        return Outcome::LOSS;
    }
    if position < threshold || !finish.tied {
        return Outcome::WIN;
    }

    let num_tied = count_tied_at(position, field);
    Outcome::dead_heat(dead_heat_fraction(position, threshold, num_tied))
}

pub fn settle_make_cut(finish: &FinishPosition) -> Outcome {
    if finish.made_cut {
        Outcome::WIN
    } else {
        Outcome::LOSS
    }
}

/// Settle a head-to-head: lower position wins, a missing finish loses to a
/// present one, two missing finishes or equal positions push.
pub fn settle_matchup(player: &FinishPosition, opponent: &FinishPosition) -> Outcome {
    match (player.position, opponent.position) {
        (None, None) => Outcome::PUSH,
        (None, Some(_)) => Outcome::LOSS,
        (Some(_), None) => Outcome::WIN,
        (Some(mine), Some(theirs)) if mine < theirs => Outcome::WIN,
        (Some(mine), Some(theirs)) if mine == theirs => Outcome::PUSH,
        _ => Outcome::LOSS,
    }
}

/// Settle any market. `opponent` is only read for matchups; a matchup with no
/// opponent settles as if the opponent were missing.
pub fn settle(
    market: Market,
    finish: &FinishPosition,
    field: &[FinishPosition],
    opponent: Option<&FinishPosition>,
) -> Outcome {
    match market {
        Market::MakeCut => settle_make_cut(finish),
        Market::Matchup => {
            let missing = FinishPosition::missing(String::new());
            settle_matchup(finish, opponent.unwrap_or(&missing))
        }
        _ => match market.placement_threshold() {
            Some(threshold) => settle_placement(finish, threshold, field),
            None => Outcome::LOSS,
        },
    }
}

/// Settle from raw finish text and the field's finish texts.
///
/// With no field texts the tie count cannot be known and a boundary tie is
/// paid in full.
pub fn settle_from_text<S: AsRef<str>>(
    finish_text: Option<&str>,
    market: Market,
    field_texts: &[S],
) -> Outcome {
    let finish = match finish_text {
        Some(text) => FinishPosition::parse(text),
        None => return Outcome::LOSS,
    };
    if finish.is_missing() {
        return Outcome::LOSS;
    }

    let field: Vec<FinishPosition> = if field_texts.is_empty() {
        vec![FinishPosition {
            tied: false,
            ..finish.clone()
        }]
    } else {
        field_texts
            .iter()
            .map(|t| FinishPosition::parse(t.as_ref()))
            .filter(|f| !f.is_missing())
            .collect()
    };

    settle(market, &finish, &field, None)
}

/// Profit of a settled ticket at decimal odds
pub fn compute_profit(outcome: &Outcome, decimal_odds: f64, stake: f64) -> f64 {
    if outcome.is_push {
        return 0.0;
    }
    if outcome.hit && outcome.fraction >= 1.0 {
        stake * (decimal_odds - 1.0)
    } else if outcome.hit && outcome.fraction > 0.0 {
        stake * (outcome.fraction * (decimal_odds - 1.0) - (1.0 - outcome.fraction))
    } else {
        -stake
    }
}
