//! Adaptive controls fed by settled results: staking, blending, suppression

pub mod blend;
pub mod staking;
pub mod suppression;

pub use blend::{blend_ratio, brier_score, BlendConfig, BlendHistory, BlendRecord, BlendWeights};
pub use staking::{kelly_stake, record_tournament, BankrollLedger, BankrollState};
pub use suppression::{
    assess, unfreeze, MarketAssessment, MarketPerformance, MarketResult, MarketState, MarketStore,
    SuppressionConfig,
};
