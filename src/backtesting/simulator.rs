//! Strategy Simulator
//!
//! Replays every event of the requested years in cutoff order and
//! aggregates the bets. Walk-forward validation runs two independent
//! simulations and compares them.

use super::metrics::{calculate_metrics, BacktestMetrics};
use super::replay::{replay_event, BetRecord, EventSnapshot};
use super::strategy::StrategyConfig;
use crate::error::Result;
use crate::models::EventKey;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Where replayable events come from
pub trait ReplaySource {
    /// Events of a year in chronological (cutoff) order
    fn events_in_year(&self, year: i32) -> Result<Vec<EventKey>>;

    /// Gather what the replay needs for one event under one strategy
    fn event_snapshot(&self, event: &EventKey, strategy: &StrategyConfig) -> Result<EventSnapshot>;
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub years: Vec<i32>,
    /// Replay only the first N events of each year
    pub max_events_per_year: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            years: vec![2024, 2025],
            max_events_per_year: None,
        }
    }
}

/// Per-event bet counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub event_id: String,
    pub year: i32,
    pub bets: usize,
    pub wins: usize,
}

/// Simulation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy_name: String,
    pub years: Vec<i32>,
    pub events_simulated: usize,
    #[serde(flatten)]
    pub metrics: BacktestMetrics,
    pub event_results: Vec<EventResult>,
    pub bets: Vec<BetRecord>,
    pub errors: Vec<String>,
}

impl SimulationResult {
    pub fn new(strategy_name: impl Into<String>, years: Vec<i32>) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            years,
            events_simulated: 0,
            metrics: BacktestMetrics::default(),
            event_results: Vec::new(),
            bets: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn roi_pct(&self) -> f64 {
        self.metrics.roi_pct
    }

    pub fn total_bets(&self) -> usize {
        self.metrics.total_bets
    }

    /// Recompute the aggregates from the bet list
    pub fn compute_metrics(&mut self) {
        self.metrics = calculate_metrics(&self.bets);
    }

    /// Print summary of simulation result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SIMULATION RESULTS: {}", self.strategy_name);
        println!("{}", "=".repeat(60));
        println!("Years: {:?}", self.years);
        println!("Events simulated: {}", self.events_simulated);
        println!("Errors: {}", self.errors.len());
        println!("{}", "-".repeat(60));
        println!("Total bets: {}", self.metrics.total_bets);
        println!("Winning bets: {}", self.metrics.wins);
        println!("Hit rate: {:.1}%", self.metrics.hit_rate * 100.0);
        println!("Wagered: {:.3}u", self.metrics.total_wagered);
        println!("Returned: {:.3}u", self.metrics.total_returned);
        println!("ROI: {:.2}%", self.metrics.roi_pct);
        println!("{}", "-".repeat(60));
        println!("CLV avg: {:.4}", self.metrics.clv_avg);
        println!("Sharpe: {:.3}", self.metrics.sharpe);
        println!("Calibration error: {:.4}", self.metrics.calibration_error);
        println!("Max drawdown: {:.3}u", self.metrics.max_drawdown);
        println!("{}", "=".repeat(60));
    }
}

/// Summary of one side of a walk-forward split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub years: Vec<i32>,
    pub roi_pct: f64,
    pub total_bets: usize,
    pub sharpe: f64,
    pub events: usize,
    pub wins: usize,
    pub calibration_error: f64,
}

impl From<&SimulationResult> for PeriodSummary {
    fn from(result: &SimulationResult) -> Self {
        Self {
            years: result.years.clone(),
            roi_pct: result.metrics.roi_pct,
            total_bets: result.metrics.total_bets,
            sharpe: result.metrics.sharpe,
            events: result.events_simulated,
            wins: result.metrics.wins,
            calibration_error: result.metrics.calibration_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub train_years: Vec<i32>,
    pub test_years: Vec<i32>,
    /// Largest train-minus-test ROI gap (percentage points) still called robust
    pub degradation_threshold: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_years: vec![2022, 2023],
            test_years: vec![2024, 2025],
            degradation_threshold: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub strategy_name: String,
    pub train: PeriodSummary,
    pub test: PeriodSummary,
    /// Train ROI minus test ROI; `None` when either side placed no bets
    pub degradation: Option<f64>,
    pub robust: bool,
}

impl WalkForwardReport {
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("WALK-FORWARD: {}", self.strategy_name);
        println!("{}", "=".repeat(60));
        for (label, side) in [("Train", &self.train), ("Test", &self.test)] {
            println!(
                "{:<6} {:?}: ROI {:.2}% over {} bets ({} events), Sharpe {:.3}",
                label, side.years, side.roi_pct, side.total_bets, side.events, side.sharpe
            );
        }
        println!("{}", "-".repeat(60));
        match self.degradation {
            Some(d) => println!("Degradation: {:.2} pts", d),
            None => println!("Degradation: n/a"),
        }
        println!("Robust: {}", if self.robust { "yes" } else { "no" });
        println!("{}", "=".repeat(60));
    }
}

/// Strategy simulator over a replay source
pub struct StrategySimulator<'a, S: ReplaySource> {
    source: &'a S,
    pub config: SimulationConfig,
}

impl<'a, S: ReplaySource> StrategySimulator<'a, S> {
    pub fn new(source: &'a S, config: SimulationConfig) -> Self {
        Self { source, config }
    }

    /// Replay every configured year.
    ///
    /// A failing event is recorded in `errors` and the run continues.
    pub fn run(&self, strategy: &StrategyConfig) -> SimulationResult {
        let mut result = SimulationResult::new(strategy.name.clone(), self.config.years.clone());

        for &year in &self.config.years {
            let mut events = match self.source.events_in_year(year) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Could not list events for {}: {}", year, e);
                    result.errors.push(format!("{}: {}", year, e));
                    continue;
                }
            };
            if let Some(max) = self.config.max_events_per_year {
                events.truncate(max);
            }

            for event in events {
                match self.source.event_snapshot(&event, strategy) {
                    Ok(snapshot) => {
                        let bets = replay_event(&snapshot, strategy);
                        result.event_results.push(EventResult {
                            event_id: event.event_id.clone(),
                            year: event.year,
                            bets: bets.len(),
                            wins: bets.iter().filter(|b| b.won).count(),
                        });
                        result.bets.extend(bets);
                        result.events_simulated += 1;
                    }
                    Err(e) => {
                        warn!("Replay failed for {}: {}", event, e);
                        result.errors.push(format!("{}: {}", event, e));
                    }
                }
            }
        }

        result.compute_metrics();
        info!(
            "Simulated '{}': {} events, {} bets, ROI {:.2}%",
            strategy.name, result.events_simulated, result.metrics.total_bets, result.metrics.roi_pct
        );
        result
    }

    /// Train on earlier years and test on later ones, independently
    pub fn walk_forward(&self, strategy: &StrategyConfig, config: &WalkForwardConfig) -> WalkForwardReport {
        let train = StrategySimulator::new(
            self.source,
            SimulationConfig {
                years: config.train_years.clone(),
                ..self.config.clone()
            },
        )
        .run(strategy);
        let test = StrategySimulator::new(
            self.source,
            SimulationConfig {
                years: config.test_years.clone(),
                ..self.config.clone()
            },
        )
        .run(strategy);

        let degradation = if train.total_bets() > 0 && test.total_bets() > 0 {
            Some(train.roi_pct() - test.roi_pct())
        } else {
            None
        };
        let robust = matches!(degradation, Some(d) if d < config.degradation_threshold)
            && test.roi_pct() > 0.0;

        WalkForwardReport {
            strategy_name: strategy.name.clone(),
            train: PeriodSummary::from(&train),
            test: PeriodSummary::from(&test),
            degradation,
            robust,
        }
    }
}
