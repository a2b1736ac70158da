//! Golf Backtest - point-in-time strategy replay for golf betting markets
//!
//! This library provides:
//! - Leak-free rolling and course strokes-gained snapshots (PIT tables)
//! - Form, course-fit and momentum sub-models blended into a composite score
//! - Historical strategy replay with dead-heat settlement and Kelly staking
//! - Walk-forward validation, experiment tracking and significance-gated promotion
//! - Adaptive bankroll, blend and market-suppression controls
//!
//! # Example
//!
//! ```no_run
//! use golf_backtest::backtesting::{ArchiveSource, SimulationConfig, StrategyConfig, StrategySimulator};
//! use golf_backtest::data::{EventCalendar, OddsArchive, RoundHistory};
//! use golf_backtest::store::Store;
//!
//! let history = RoundHistory::load("data/archive/rounds.csv").unwrap();
//! let calendar = EventCalendar::build(Vec::new(), &history);
//! let odds = OddsArchive::load("data/archive/odds.csv").unwrap();
//! let store = Store::open("data/golf_backtest.db").unwrap();
//!
//! let source = ArchiveSource::new(&history, &calendar, &odds, &store);
//! let simulator = StrategySimulator::new(&source, SimulationConfig::default());
//! let result = simulator.run(&StrategyConfig::default());
//! println!("ROI: {:.2}%", result.roi_pct());
//! ```

pub mod adaptive;
pub mod backtesting;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod experiments;
pub mod models;
pub mod pit;
pub mod scoring;
pub mod store;

// Re-export commonly used types
pub use backtesting::{SimulationResult, StrategyConfig, StrategySimulator};
pub use error::{BacktestError, Result};
pub use models::{EventInfo, EventKey, HistoricalRound, Market, OddsQuote, PlayerKey, SgCategory, SgLine};
pub use store::Store;
