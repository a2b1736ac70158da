use rusqlite::{params, OptionalExtension, Row};

use super::{json_from_sql, now, Store};
use crate::error::{BacktestError, Result};
use crate::experiments::significance::SignificanceVerdict;
use crate::experiments::tracker::{
    ActiveStrategy, Experiment, ExperimentStatus, ExperimentStore, ExperimentSummary, NewExperiment,
};

const EXPERIMENT_COLUMNS: &str = "id, hypothesis, source, scope, strategy_json, fingerprint, status, \
     summary_json, result_json, significance_json, promoted, created_at, started_at, completed_at";

fn row_to_experiment(row: &Row) -> rusqlite::Result<Experiment> {
    let strategy_json: String = row.get(4)?;
    let status: String = row.get(6)?;
    let summary_json: Option<String> = row.get(7)?;
    let significance_json: Option<String> = row.get(9)?;
    let promoted: i64 = row.get(10)?;

    Ok(Experiment {
        id: row.get(0)?,
        hypothesis: row.get(1)?,
        source: row.get(2)?,
        scope: row.get(3)?,
        strategy: json_from_sql(4, &strategy_json)?,
        fingerprint: row.get(5)?,
        status: ExperimentStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown experiment status {}", status).into(),
            )
        })?,
        summary: summary_json
            .as_deref()
            .map(|json| json_from_sql::<ExperimentSummary>(7, json))
            .transpose()?,
        result_json: row.get(8)?,
        significance: significance_json
            .as_deref()
            .map(|json| json_from_sql::<SignificanceVerdict>(9, json))
            .transpose()?,
        promoted: promoted != 0,
        created_at: row.get(11)?,
        started_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

impl Store {
    fn experiment_status(&self, id: i64) -> Result<ExperimentStatus> {
        let conn = self.conn.lock();
        let status: Option<String> = conn
            .query_row("SELECT status FROM experiments WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        status
            .as_deref()
            .and_then(ExperimentStatus::parse)
            .ok_or(BacktestError::ExperimentNotFound(id))
    }

    /// Apply a status update that only succeeds from the allowed states
    fn transition(&self, id: i64, to: ExperimentStatus, changed: usize) -> Result<()> {
        if changed == 1 {
            return Ok(());
        }
        let from = self.experiment_status(id)?;
        Err(BacktestError::InvalidTransition {
            id,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

impl ExperimentStore for Store {
    fn insert_experiment(&self, new: &NewExperiment, fingerprint: &str) -> Result<i64> {
        let strategy_json = new.strategy.to_json()?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO experiments (hypothesis, source, scope, strategy_json, fingerprint, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
            params![new.hypothesis, new.source, new.scope, strategy_json, fingerprint, now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn find_experiment(&self, fingerprint: &str, scope: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                "SELECT id FROM experiments WHERE fingerprint = ?1 AND scope = ?2",
                params![fingerprint, scope],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn experiment(&self, id: i64) -> Result<Option<Experiment>> {
        let conn = self.conn.lock();
        let experiment = conn
            .query_row(
                &format!("SELECT {} FROM experiments WHERE id = ?1", EXPERIMENT_COLUMNS),
                params![id],
                row_to_experiment,
            )
            .optional()?;
        Ok(experiment)
    }

    fn experiments(&self, status: Option<ExperimentStatus>) -> Result<Vec<Experiment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM experiments WHERE (?1 IS NULL OR status = ?1) ORDER BY id",
            EXPERIMENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![status.map(|s| s.as_str())], row_to_experiment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn mark_running(&self, id: i64) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE experiments SET status = 'running', started_at = ?2, completed_at = NULL
             WHERE id = ?1 AND status IN ('pending', 'error')",
            params![id, now()],
        )?;
        self.transition(id, ExperimentStatus::Running, changed)
    }

    fn complete_experiment(&self, id: i64, summary: &ExperimentSummary, result_json: &str) -> Result<()> {
        let summary_json = serde_json::to_string(summary)?;
        let changed = self.conn.lock().execute(
            "UPDATE experiments SET status = 'completed', summary_json = ?2, result_json = ?3, completed_at = ?4
             WHERE id = ?1 AND status = 'running'",
            params![id, summary_json, result_json, now()],
        )?;
        self.transition(id, ExperimentStatus::Completed, changed)
    }

    fn fail_experiment(&self, id: i64, payload: &str) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE experiments SET status = 'error', result_json = ?2, completed_at = ?3
             WHERE id = ?1 AND status = 'running'",
            params![id, payload, now()],
        )?;
        self.transition(id, ExperimentStatus::Error, changed)
    }

    fn save_significance(&self, id: i64, verdict: &SignificanceVerdict) -> Result<()> {
        let json = serde_json::to_string(verdict)?;
        let changed = self.conn.lock().execute(
            "UPDATE experiments SET significance_json = ?2 WHERE id = ?1",
            params![id, json],
        )?;
        if changed == 0 {
            return Err(BacktestError::ExperimentNotFound(id));
        }
        Ok(())
    }

    fn active_strategy(&self, scope: &str) -> Result<Option<ActiveStrategy>> {
        let conn = self.conn.lock();
        let active = conn
            .query_row(
                "SELECT scope, strategy_json, experiment_id, roi_pct FROM active_strategy WHERE scope = ?1",
                params![scope],
                |row| {
                    let strategy_json: String = row.get(1)?;
                    Ok(ActiveStrategy {
                        scope: row.get(0)?,
                        strategy: json_from_sql(1, &strategy_json)?,
                        experiment_id: row.get(2)?,
                        roi_pct: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(active)
    }

    fn promote(&self, experiment_id: i64, active: &ActiveStrategy) -> Result<()> {
        let strategy_json = active.strategy.to_json()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO active_strategy (scope, strategy_json, experiment_id, roi_pct, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope) DO UPDATE SET
                 strategy_json = excluded.strategy_json,
                 experiment_id = excluded.experiment_id,
                 roi_pct = excluded.roi_pct,
                 updated_at = excluded.updated_at",
            params![active.scope, strategy_json, active.experiment_id, active.roi_pct, now()],
        )?;
        let changed = tx.execute(
            "UPDATE experiments SET promoted = 1 WHERE id = ?1",
            params![experiment_id],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls back the upsert
            return Err(BacktestError::ExperimentNotFound(experiment_id));
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::strategy::StrategyConfig;
    use crate::experiments::tracker::GLOBAL_SCOPE;

    fn summary() -> ExperimentSummary {
        ExperimentSummary {
            events_simulated: 3,
            total_bets: 12,
            wins: 2,
            roi_pct: 4.5,
            clv_avg: 0.012,
            sharpe: 0.3,
            calibration_error: 0.02,
        }
    }

    fn insert(store: &Store) -> i64 {
        let new = NewExperiment::manual("baseline", StrategyConfig::default());
        let fingerprint = new.strategy.fingerprint().unwrap();
        store.insert_experiment(&new, &fingerprint).unwrap()
    }

    #[test]
    fn test_experiment_lifecycle_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let id = insert(&store);

        let pending = store.experiment(id).unwrap().unwrap();
        assert_eq!(pending.status, ExperimentStatus::Pending);
        assert_eq!(pending.strategy, StrategyConfig::default());
        assert!(pending.started_at.is_none());

        store.mark_running(id).unwrap();
        store.complete_experiment(id, &summary(), "{\"ok\":true}").unwrap();

        let done = store.experiment(id).unwrap().unwrap();
        assert_eq!(done.status, ExperimentStatus::Completed);
        assert_eq!(done.summary, Some(summary()));
        assert!(done.completed_at.is_some());
        assert_eq!(store.experiments(Some(ExperimentStatus::Pending)).unwrap().len(), 0);
        assert_eq!(store.experiments(None).unwrap().len(), 1);
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let store = Store::open_in_memory().unwrap();
        let id = insert(&store);

        // Cannot complete before running
        let err = store.complete_experiment(id, &summary(), "{}").unwrap_err();
        assert!(matches!(err, BacktestError::InvalidTransition { .. }));

        store.mark_running(id).unwrap();
        assert!(store.mark_running(id).is_err());

        store.fail_experiment(id, "{\"error\":\"boom\"}").unwrap();
        // Errored experiments may be retried
        store.mark_running(id).unwrap();

        assert!(matches!(store.mark_running(404), Err(BacktestError::ExperimentNotFound(404))));
    }

    #[test]
    fn test_fingerprint_unique_per_scope() {
        let store = Store::open_in_memory().unwrap();
        let id = insert(&store);
        let fingerprint = StrategyConfig::default().fingerprint().unwrap();

        assert_eq!(store.find_experiment(&fingerprint, GLOBAL_SCOPE).unwrap(), Some(id));
        assert_eq!(store.find_experiment(&fingerprint, "links").unwrap(), None);

        let duplicate = NewExperiment::manual("again", StrategyConfig::default());
        assert!(store.insert_experiment(&duplicate, &fingerprint).is_err());
    }

    #[test]
    fn test_promote_upserts_scope() {
        let store = Store::open_in_memory().unwrap();
        let id = insert(&store);
        let active = ActiveStrategy {
            scope: GLOBAL_SCOPE.to_string(),
            strategy: StrategyConfig::default(),
            experiment_id: Some(id),
            roi_pct: 4.5,
        };
        store.promote(id, &active).unwrap();
        store
            .promote(
                id,
                &ActiveStrategy {
                    roi_pct: 6.0,
                    ..active.clone()
                },
            )
            .unwrap();

        let stored = store.active_strategy(GLOBAL_SCOPE).unwrap().unwrap();
        assert_eq!(stored.roi_pct, 6.0);
        assert!(store.experiment(id).unwrap().unwrap().promoted);
        assert!(store.active_strategy("links").unwrap().is_none());
    }

    #[test]
    fn test_promote_unknown_experiment_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let active = ActiveStrategy {
            scope: "links".to_string(),
            strategy: StrategyConfig::default(),
            experiment_id: None,
            roi_pct: 1.0,
        };
        assert!(store.promote(7, &active).is_err());
        assert!(store.active_strategy("links").unwrap().is_none());
    }
}
