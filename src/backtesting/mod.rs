//! Backtesting engine for validating betting strategies

pub mod archive;
pub mod metrics;
pub mod replay;
pub mod simulator;
pub mod strategy;

pub use archive::ArchiveSource;
pub use metrics::{calculate_metrics, BacktestMetrics, DimensionAnalysis};
pub use replay::{replay_event, BetRecord, EventSnapshot};
pub use simulator::{
    ReplaySource, SimulationConfig, SimulationResult, StrategySimulator, WalkForwardConfig, WalkForwardReport,
};
pub use strategy::StrategyConfig;
