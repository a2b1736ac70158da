//! Core primitives shared by the PIT, scoring and replay layers

pub mod kelly;
pub mod odds;
pub mod probability;
pub mod ranking;
pub mod settlement;

// Re-export commonly used types
pub use kelly::{calculate_kelly_fraction, replay_stake, BetSizing, KellyCalculator};
pub use odds::{american_to_decimal, american_to_implied, apply_vig, implied_to_american};
pub use probability::{market_target_mass, market_temperature, softmax_probs};
pub use ranking::{rank_field, rank_to_score, shrink_toward_neutral, NEUTRAL_SCORE};
pub use settlement::{compute_profit, settle, settle_from_text, FinishPosition, Outcome};
