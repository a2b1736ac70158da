use rusqlite::{params, OptionalExtension, Row};

use super::{count_from_sql, market_from_sql, now, Store};
use crate::adaptive::blend::{BlendHistory, BlendRecord};
use crate::adaptive::staking::{BankrollLedger, BankrollState};
use crate::adaptive::suppression::{MarketResult, MarketStore};
use crate::error::Result;
use crate::models::Market;

fn row_to_bankroll(row: &Row) -> rusqlite::Result<BankrollState> {
    Ok(BankrollState {
        date: row.get(0)?,
        balance: row.get(1)?,
        peak_balance: row.get(2)?,
        kelly_fraction: row.get(3)?,
        notes: row.get(4)?,
    })
}

fn row_to_blend(row: &Row) -> rusqlite::Result<BlendRecord> {
    let market: String = row.get(1)?;
    let n_predictions: i64 = row.get(5)?;
    Ok(BlendRecord {
        tournament_id: row.get(0)?,
        market: market_from_sql(1, &market)?,
        brier_external: row.get(2)?,
        brier_model: row.get(3)?,
        brier_blended: row.get(4)?,
        n_predictions: count_from_sql(n_predictions),
        external_weight: row.get(6)?,
        model_weight: row.get(7)?,
    })
}

fn row_to_market_result(row: &Row) -> rusqlite::Result<MarketResult> {
    let market: String = row.get(0)?;
    let won: i64 = row.get(4)?;
    let push: i64 = row.get(5)?;
    Ok(MarketResult {
        market: market_from_sql(0, &market)?,
        settled_on: row.get(1)?,
        wagered: row.get(2)?,
        returned: row.get(3)?,
        won: won != 0,
        push: push != 0,
    })
}

impl BankrollLedger for Store {
    fn latest_bankroll(&self) -> Result<Option<BankrollState>> {
        let conn = self.conn.lock();
        let state = conn
            .query_row(
                "SELECT date, balance, peak_balance, kelly_fraction, notes FROM bankroll ORDER BY id DESC LIMIT 1",
                [],
                row_to_bankroll,
            )
            .optional()?;
        Ok(state)
    }

    fn append_bankroll(&self, state: &BankrollState) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO bankroll (date, balance, peak_balance, kelly_fraction, notes) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![state.date, state.balance, state.peak_balance, state.kelly_fraction, state.notes],
        )?;
        Ok(())
    }

    fn bankroll_history(&self) -> Result<Vec<BankrollState>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT date, balance, peak_balance, kelly_fraction, notes FROM bankroll ORDER BY id")?;
        let rows = stmt
            .query_map([], row_to_bankroll)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl BlendHistory for Store {
    fn latest_blend(&self, market: Market) -> Result<Option<BlendRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT tournament_id, market, brier_external, brier_model, brier_blended,
                        n_predictions, external_weight, model_weight
                 FROM blend_history WHERE market = ?1 ORDER BY id DESC LIMIT 1",
                params![market.as_str()],
                row_to_blend,
            )
            .optional()?;
        Ok(record)
    }

    fn blend_tournament_count(&self, market: Market) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT tournament_id) FROM blend_history WHERE market = ?1",
            params![market.as_str()],
            |row| row.get(0),
        )?;
        Ok(count_from_sql(count))
    }

    fn append_blend(&self, record: &BlendRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO blend_history (tournament_id, market, brier_external, brier_model, brier_blended,
                                        n_predictions, external_weight, model_weight, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.tournament_id,
                record.market.as_str(),
                record.brier_external,
                record.brier_model,
                record.brier_blended,
                record.n_predictions as i64,
                record.external_weight,
                record.model_weight,
                now(),
            ],
        )?;
        Ok(())
    }
}

impl MarketStore for Store {
    fn record_market_result(&self, result: &MarketResult) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO market_results (market, settled_on, wagered, returned, won, push)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.market.as_str(),
                result.settled_on,
                result.wagered,
                result.returned,
                result.won as i64,
                result.push as i64,
            ],
        )?;
        Ok(())
    }

    fn recent_market_results(&self, market: Market, limit: usize) -> Result<Vec<MarketResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT market, settled_on, wagered, returned, won, push FROM market_results
             WHERE market = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![market.as_str(), limit as i64], row_to_market_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn is_frozen(&self, market: Market) -> Result<bool> {
        let conn = self.conn.lock();
        let frozen: Option<i64> = conn
            .query_row(
                "SELECT frozen FROM market_state WHERE market = ?1",
                params![market.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(frozen.unwrap_or(0) != 0)
    }

    fn set_frozen(&self, market: Market, frozen: bool, reason: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO market_state (market, frozen, reason, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(market) DO UPDATE SET
                 frozen = excluded.frozen,
                 reason = excluded.reason,
                 updated_at = excluded.updated_at",
            params![market.as_str(), frozen as i64, reason, now()],
        )?;
        Ok(())
    }
}
