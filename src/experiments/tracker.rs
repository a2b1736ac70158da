//! Experiment lifecycle and strategy promotion
//!
//! An experiment moves `pending -> running -> completed | error`. Running a
//! completed experiment returns its cached summary; an errored experiment may
//! be retried. Promotion replaces a scope's active strategy only when the
//! experiment is significant and beats the current active ROI.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

use crate::backtesting::simulator::{ReplaySource, SimulationConfig, SimulationResult, StrategySimulator};
use crate::backtesting::strategy::StrategyConfig;
use crate::error::{BacktestError, Result};
use crate::experiments::significance::{evaluate_returns, SignificanceConfig, SignificanceVerdict};

/// Scope that applies everywhere
pub const GLOBAL_SCOPE: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Pending => "pending",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Error => "error",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(ExperimentStatus::Pending),
            "running" => Some(ExperimentStatus::Running),
            "completed" => Some(ExperimentStatus::Completed),
            "error" => Some(ExperimentStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregates kept on the experiment row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub events_simulated: usize,
    pub total_bets: usize,
    pub wins: usize,
    pub roi_pct: f64,
    pub clv_avg: f64,
    pub sharpe: f64,
    pub calibration_error: f64,
}

impl From<&SimulationResult> for ExperimentSummary {
    fn from(result: &SimulationResult) -> Self {
        Self {
            events_simulated: result.events_simulated,
            total_bets: result.metrics.total_bets,
            wins: result.metrics.wins,
            roi_pct: result.metrics.roi_pct,
            clv_avg: result.metrics.clv_avg,
            sharpe: result.metrics.sharpe,
            calibration_error: result.metrics.calibration_error,
        }
    }
}

/// Request to register an experiment
#[derive(Debug, Clone)]
pub struct NewExperiment {
    pub hypothesis: String,
    /// Who proposed it: "manual", "explore", ...
    pub source: String,
    pub scope: String,
    pub strategy: StrategyConfig,
}

impl NewExperiment {
    pub fn manual(hypothesis: impl Into<String>, strategy: StrategyConfig) -> Self {
        Self {
            hypothesis: hypothesis.into(),
            source: "manual".to_string(),
            scope: GLOBAL_SCOPE.to_string(),
            strategy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub hypothesis: String,
    pub source: String,
    pub scope: String,
    pub strategy: StrategyConfig,
    pub fingerprint: String,
    pub status: ExperimentStatus,
    pub summary: Option<ExperimentSummary>,
    /// Full result JSON when completed, error payload when failed
    pub result_json: Option<String>,
    pub significance: Option<SignificanceVerdict>,
    pub promoted: bool,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

/// Strategy currently promoted for a scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveStrategy {
    pub scope: String,
    pub strategy: StrategyConfig,
    pub experiment_id: Option<i64>,
    pub roi_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub hypothesis: String,
    pub source: String,
    pub scope: String,
    pub roi_pct: f64,
    pub total_bets: usize,
    pub sharpe: f64,
    pub clv_avg: f64,
    pub significant: bool,
    pub promoted: bool,
}

/// Per-bet returns from a stored simulation result; empty if it does not parse
fn bet_returns(result_json: &str) -> Vec<f64> {
    match serde_json::from_str::<SimulationResult>(result_json) {
        Ok(result) => result.bets.iter().map(|b| b.return_on_stake()).collect(),
        Err(e) => {
            warn!("Stored result does not parse, skipping bootstrap: {}", e);
            Vec::new()
        }
    }
}

/// Persistence used by the tracker
pub trait ExperimentStore {
    /// Insert a pending experiment and return its id
    fn insert_experiment(&self, new: &NewExperiment, fingerprint: &str) -> Result<i64>;
    fn find_experiment(&self, fingerprint: &str, scope: &str) -> Result<Option<i64>>;
    fn experiment(&self, id: i64) -> Result<Option<Experiment>>;
    fn experiments(&self, status: Option<ExperimentStatus>) -> Result<Vec<Experiment>>;
    fn mark_running(&self, id: i64) -> Result<()>;
    fn complete_experiment(&self, id: i64, summary: &ExperimentSummary, result_json: &str) -> Result<()>;
    fn fail_experiment(&self, id: i64, payload: &str) -> Result<()>;
    fn save_significance(&self, id: i64, verdict: &SignificanceVerdict) -> Result<()>;
    fn active_strategy(&self, scope: &str) -> Result<Option<ActiveStrategy>>;
    /// Replace the scope's active strategy and flag the experiment, atomically
    fn promote(&self, experiment_id: i64, active: &ActiveStrategy) -> Result<()>;
}

pub struct ExperimentTracker<'a, S: ExperimentStore> {
    store: &'a S,
    pub significance: SignificanceConfig,
}

impl<'a, S: ExperimentStore> ExperimentTracker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            significance: SignificanceConfig::default(),
        }
    }

    pub fn with_significance(mut self, config: SignificanceConfig) -> Self {
        self.significance = config;
        self
    }

    fn load(&self, id: i64) -> Result<Experiment> {
        self.store
            .experiment(id)?
            .ok_or(BacktestError::ExperimentNotFound(id))
    }

    /// Register an experiment; an identical config in the same scope returns
    /// the existing id
    pub fn create(&self, new: &NewExperiment) -> Result<i64> {
        new.strategy.validate()?;
        let fingerprint = new.strategy.fingerprint()?;
        if let Some(id) = self.store.find_experiment(&fingerprint, &new.scope)? {
            info!("Experiment {} already exists for this config", id);
            return Ok(id);
        }
        let id = self.store.insert_experiment(new, &fingerprint)?;
        info!("Created experiment {}: {}", id, new.hypothesis);
        Ok(id)
    }

    /// Run an experiment's simulation and persist the outcome
    pub fn run<R: ReplaySource>(&self, id: i64, source: &R, config: &SimulationConfig) -> Result<ExperimentSummary> {
        let experiment = self.load(id)?;
        match experiment.status {
            ExperimentStatus::Completed => {
                info!("Experiment {} already completed, returning cached summary", id);
                return experiment.summary.ok_or_else(|| BacktestError::ExperimentFailed {
                    id,
                    message: "completed without a stored summary".to_string(),
                });
            }
            ExperimentStatus::Running => {
                return Err(BacktestError::InvalidTransition {
                    id,
                    from: ExperimentStatus::Running.to_string(),
                    to: ExperimentStatus::Running.to_string(),
                });
            }
            ExperimentStatus::Pending | ExperimentStatus::Error => {}
        }

        self.store.mark_running(id)?;

        // A failed completion write must still leave the row in `error`
        let outcome = self
            .execute(id, &experiment.strategy, source, config)
            .and_then(|(summary, result_json)| {
                self.store.complete_experiment(id, &summary, &result_json)?;
                Ok(summary)
            });

        match outcome {
            Ok(summary) => {
                info!(
                    "Experiment {} complete: ROI={:.1}%, bets={}, Sharpe={:.2}",
                    id, summary.roi_pct, summary.total_bets, summary.sharpe
                );
                Ok(summary)
            }
            Err(e) => {
                let payload = serde_json::json!({ "error": e.to_string() }).to_string();
                self.store.fail_experiment(id, &payload)?;
                error!("Experiment {} failed: {}", id, e);
                Err(e)
            }
        }
    }

    fn execute<R: ReplaySource>(
        &self,
        id: i64,
        strategy: &StrategyConfig,
        source: &R,
        config: &SimulationConfig,
    ) -> Result<(ExperimentSummary, String)> {
        strategy.validate()?;
        let result = StrategySimulator::new(source, config.clone()).run(strategy);
        if result.events_simulated == 0 && !result.errors.is_empty() {
            return Err(BacktestError::ExperimentFailed {
                id,
                message: result.errors.join("; "),
            });
        }
        let json = serde_json::to_string(&result)?;
        Ok((ExperimentSummary::from(&result), json))
    }

    /// Run every pending experiment; failures are logged and skipped
    pub fn run_pending<R: ReplaySource>(&self, source: &R, config: &SimulationConfig) -> Result<Vec<(i64, bool)>> {
        let pending = self.store.experiments(Some(ExperimentStatus::Pending))?;
        let mut outcomes = Vec::with_capacity(pending.len());
        for experiment in pending {
            match self.run(experiment.id, source, config) {
                Ok(_) => outcomes.push((experiment.id, true)),
                Err(e) => {
                    warn!("Skipping experiment {}: {}", experiment.id, e);
                    outcomes.push((experiment.id, false));
                }
            }
        }
        Ok(outcomes)
    }

    /// Test a completed experiment's ROI against the baseline and persist the verdict
    pub fn evaluate(&self, id: i64) -> Result<SignificanceVerdict> {
        let experiment = self.load(id)?;
        let summary = experiment.summary.ok_or_else(|| {
            BacktestError::Validation(format!(
                "experiment {} has no results (status {})",
                id, experiment.status
            ))
        })?;

        let returns = experiment
            .result_json
            .as_deref()
            .map(bet_returns)
            .unwrap_or_default();
        let verdict = evaluate_returns(summary.roi_pct, summary.total_bets, &returns, &self.significance);
        self.store.save_significance(id, &verdict)?;
        info!(
            "Experiment {}: significant={} p={:?} delta={:.2}",
            id, verdict.significant, verdict.p_value, verdict.delta
        );
        Ok(verdict)
    }

    /// Promote an experiment to its scope's active strategy.
    ///
    /// Returns `true` when promoted now or already promoted earlier.
    pub fn promote(&self, id: i64) -> Result<bool> {
        let experiment = self.load(id)?;
        if experiment.promoted {
            return Ok(true);
        }

        let significant = experiment.significance.as_ref().is_some_and(|v| v.significant);
        if !significant {
            info!("Experiment {} not significant, skipping promotion", id);
            return Ok(false);
        }

        let roi = experiment.summary.as_ref().map_or(0.0, |s| s.roi_pct);
        let current_roi = self
            .store
            .active_strategy(&experiment.scope)?
            .map_or(0.0, |a| a.roi_pct);
        if roi <= current_roi {
            info!(
                "Experiment {} ROI {:.1}% not better than current {:.1}%",
                id, roi, current_roi
            );
            return Ok(false);
        }

        let active = ActiveStrategy {
            scope: experiment.scope.clone(),
            strategy: experiment.strategy.clone(),
            experiment_id: Some(id),
            roi_pct: roi,
        };
        self.store.promote(id, &active)?;
        info!(
            "PROMOTED experiment {} to active ({}): ROI {:.1}% -> {:.1}%",
            id, experiment.scope, current_roi, roi
        );
        Ok(true)
    }

    /// The scope's promoted strategy, or the default strategy
    pub fn active_strategy(&self, scope: &str) -> Result<StrategyConfig> {
        Ok(self
            .store
            .active_strategy(scope)?
            .map(|a| a.strategy)
            .unwrap_or_default())
    }

    /// Completed experiments in `scope` or the global scope, best ROI first
    pub fn leaderboard(&self, scope: &str, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut entries: Vec<LeaderboardEntry> = self
            .store
            .experiments(Some(ExperimentStatus::Completed))?
            .into_iter()
            .filter(|e| e.scope == scope || e.scope == GLOBAL_SCOPE)
            .map(|e| {
                let summary = e.summary.clone();
                LeaderboardEntry {
                    id: e.id,
                    hypothesis: e.hypothesis,
                    source: e.source,
                    scope: e.scope,
                    roi_pct: summary.as_ref().map_or(0.0, |s| s.roi_pct),
                    total_bets: summary.as_ref().map_or(0, |s| s.total_bets),
                    sharpe: summary.as_ref().map_or(0.0, |s| s.sharpe),
                    clv_avg: summary.as_ref().map_or(0.0, |s| s.clv_avg),
                    significant: e.significance.is_some_and(|v| v.significant),
                    promoted: e.promoted,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.roi_pct
                .partial_cmp(&a.roi_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::simulator::tests::{win_only, MemorySource};
    use crate::store::Store;

    fn sim_config() -> SimulationConfig {
        SimulationConfig {
            years: vec![2024],
            max_events_per_year: None,
        }
    }

    /// 60 events in 2024 where the favourite always wins at +400
    fn winning_source() -> MemorySource {
        let ids: Vec<String> = (0..60).map(|i| format!("w{:02}", i)).collect();
        MemorySource::new(ids.iter().map(|id| (id.as_str(), 2024, 400, "1")).collect())
    }

    #[test]
    fn test_create_deduplicates_by_fingerprint_and_scope() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);

        let first = tracker.create(&NewExperiment::manual("baseline", win_only())).unwrap();
        let again = tracker.create(&NewExperiment::manual("same config", win_only())).unwrap();
        assert_eq!(first, again);

        let mut links = NewExperiment::manual("links only", win_only());
        links.scope = "links".to_string();
        assert_ne!(tracker.create(&links).unwrap(), first);
    }

    #[test]
    fn test_run_completes_and_caches() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        let id = tracker.create(&NewExperiment::manual("baseline", win_only())).unwrap();

        let source = winning_source();
        let summary = tracker.run(id, &source, &sim_config()).unwrap();
        assert_eq!(summary.total_bets, 60);
        assert!((summary.roi_pct - 400.0).abs() < 1e-9);

        let experiment = store.experiment(id).unwrap().unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Completed);
        assert!(experiment.result_json.unwrap().contains("\"roi_pct\""));

        // Cached: an empty source would give zero bets if re-run
        let empty = MemorySource::new(vec![]);
        let cached = tracker.run(id, &empty, &sim_config()).unwrap();
        assert_eq!(cached, summary);
    }

    #[test]
    fn test_custom_significance_gate() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store).with_significance(SignificanceConfig {
            min_bets: 100,
            ..SignificanceConfig::default()
        });
        let id = tracker.create(&NewExperiment::manual("baseline", win_only())).unwrap();
        tracker.run(id, &winning_source(), &sim_config()).unwrap();

        // 60 bets is below the raised minimum
        let verdict = tracker.evaluate(id).unwrap();
        assert!(!verdict.significant);
        assert!(!tracker.promote(id).unwrap());
    }

    #[test]
    fn test_failed_run_moves_to_error_and_can_retry() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        let id = tracker.create(&NewExperiment::manual("baseline", win_only())).unwrap();

        let broken = MemorySource::new(vec![("bad", 2024, 400, "1")]);
        assert!(tracker.run(id, &broken, &sim_config()).is_err());
        let experiment = store.experiment(id).unwrap().unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Error);
        assert!(experiment.result_json.unwrap().contains("error"));

        let summary = tracker.run(id, &winning_source(), &sim_config()).unwrap();
        assert_eq!(summary.total_bets, 60);
    }

    /// Delegates to SQLite but refuses to record completions
    struct RejectingCompletion(Store);

    impl ExperimentStore for RejectingCompletion {
        fn insert_experiment(&self, new: &NewExperiment, fingerprint: &str) -> Result<i64> {
            self.0.insert_experiment(new, fingerprint)
        }
        fn find_experiment(&self, fingerprint: &str, scope: &str) -> Result<Option<i64>> {
            self.0.find_experiment(fingerprint, scope)
        }
        fn experiment(&self, id: i64) -> Result<Option<Experiment>> {
            self.0.experiment(id)
        }
        fn experiments(&self, status: Option<ExperimentStatus>) -> Result<Vec<Experiment>> {
            self.0.experiments(status)
        }
        fn mark_running(&self, id: i64) -> Result<()> {
            self.0.mark_running(id)
        }
        fn complete_experiment(&self, _id: i64, _summary: &ExperimentSummary, _result_json: &str) -> Result<()> {
            Err(BacktestError::Validation("disk full".to_string()))
        }
        fn fail_experiment(&self, id: i64, payload: &str) -> Result<()> {
            self.0.fail_experiment(id, payload)
        }
        fn save_significance(&self, id: i64, verdict: &SignificanceVerdict) -> Result<()> {
            self.0.save_significance(id, verdict)
        }
        fn active_strategy(&self, scope: &str) -> Result<Option<ActiveStrategy>> {
            self.0.active_strategy(scope)
        }
        fn promote(&self, experiment_id: i64, active: &ActiveStrategy) -> Result<()> {
            self.0.promote(experiment_id, active)
        }
    }

    #[test]
    fn test_failed_completion_write_moves_to_error() {
        let store = RejectingCompletion(Store::open_in_memory().unwrap());
        let tracker = ExperimentTracker::new(&store);
        let id = tracker.create(&NewExperiment::manual("baseline", win_only())).unwrap();
        let source = MemorySource::new(vec![("w00", 2024, 400, "1")]);

        assert!(tracker.run(id, &source, &sim_config()).is_err());
        let experiment = store.experiment(id).unwrap().unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Error);
        assert!(experiment.result_json.unwrap().contains("disk full"));

        // Retrying is allowed again, not rejected as running -> running
        let err = tracker.run(id, &source, &sim_config()).unwrap_err();
        assert!(!matches!(err, BacktestError::InvalidTransition { .. }));
    }

    #[test]
    fn test_running_experiment_cannot_run_again() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        let id = tracker.create(&NewExperiment::manual("baseline", win_only())).unwrap();
        store.mark_running(id).unwrap();

        let err = tracker.run(id, &winning_source(), &sim_config()).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidTransition { .. }));
    }

    #[test]
    fn test_unknown_experiment() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        assert!(matches!(tracker.promote(99), Err(BacktestError::ExperimentNotFound(99))));
    }

    #[test]
    fn test_evaluate_and_promote() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        let id = tracker.create(&NewExperiment::manual("baseline", win_only())).unwrap();

        // Not significant before evaluation
        tracker.run(id, &winning_source(), &sim_config()).unwrap();
        assert!(!tracker.promote(id).unwrap());

        let verdict = tracker.evaluate(id).unwrap();
        assert!(verdict.significant);
        // Every bet returned +400%, so the interval collapses there
        let interval = verdict.bootstrap.clone().unwrap();
        assert!((interval.ci_lower - 400.0).abs() < 1e-6);
        assert!(interval.excludes_baseline(0.0));
        let stored = store.experiment(id).unwrap().unwrap().significance.unwrap();
        assert_eq!(stored.bootstrap, Some(interval));
        assert!(tracker.promote(id).unwrap());
        // Idempotent
        assert!(tracker.promote(id).unwrap());

        let active = store.active_strategy(GLOBAL_SCOPE).unwrap().unwrap();
        assert_eq!(active.experiment_id, Some(id));
        assert_eq!(tracker.active_strategy(GLOBAL_SCOPE).unwrap(), win_only());
    }

    #[test]
    fn test_promotion_requires_beating_current_roi() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);

        let first = tracker.create(&NewExperiment::manual("first", win_only())).unwrap();
        tracker.run(first, &winning_source(), &sim_config()).unwrap();
        tracker.evaluate(first).unwrap();
        assert!(tracker.promote(first).unwrap());

        // Same ROI with a different config is not strictly better
        let second_config = StrategyConfig {
            name: "second".to_string(),
            ..win_only()
        };
        let second = tracker.create(&NewExperiment::manual("second", second_config)).unwrap();
        tracker.run(second, &winning_source(), &sim_config()).unwrap();
        tracker.evaluate(second).unwrap();
        assert!(!tracker.promote(second).unwrap());
    }

    #[test]
    fn test_few_bets_never_promote() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        let id = tracker.create(&NewExperiment::manual("tiny", win_only())).unwrap();
        let source = MemorySource::new(vec![("a", 2024, 400, "1")]);
        tracker.run(id, &source, &sim_config()).unwrap();

        assert!(!tracker.evaluate(id).unwrap().significant);
        assert!(!tracker.promote(id).unwrap());
    }

    #[test]
    fn test_active_strategy_defaults() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        assert_eq!(tracker.active_strategy("links").unwrap(), StrategyConfig::default());
    }

    #[test]
    fn test_run_pending_and_leaderboard() {
        let store = Store::open_in_memory().unwrap();
        let tracker = ExperimentTracker::new(&store);
        let a = tracker.create(&NewExperiment::manual("a", win_only())).unwrap();
        let strict = StrategyConfig {
            min_ev: 100.0,
            ..win_only()
        };
        let mut links = NewExperiment::manual("b", strict);
        links.scope = "links".to_string();
        let b = tracker.create(&links).unwrap();

        let outcomes = tracker.run_pending(&winning_source(), &sim_config()).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, ok)| *ok));

        let global = tracker.leaderboard(GLOBAL_SCOPE, 10).unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].id, a);

        let board = tracker.leaderboard("links", 10).unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].id, a);
        assert_eq!(board[1].id, b);
    }
}
