//! SQLite persistence
//!
//! One connection behind a mutex serves every table: PIT snapshots,
//! experiments, the active strategy per scope, the bankroll ledger, blend
//! history and per-market results. Each trait the library defines over
//! storage is implemented here.

mod adaptive;
mod experiments;
mod pit;

use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::models::Market;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS pit_rolling_stats (
    event_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    player_key TEXT NOT NULL,
    window_size INTEGER NOT NULL,
    sg_total REAL,
    sg_ott REAL,
    sg_app REAL,
    sg_arg REAL,
    sg_putt REAL,
    sg_t2g REAL,
    rounds_used INTEGER NOT NULL,
    sg_total_rank INTEGER,
    cutoff_date TEXT NOT NULL,
    latest_round_date TEXT NOT NULL,
    PRIMARY KEY (event_id, year, player_key, window_size)
);

CREATE TABLE IF NOT EXISTS pit_course_stats (
    event_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    player_key TEXT NOT NULL,
    course_id TEXT NOT NULL,
    sg_total REAL,
    sg_ott REAL,
    sg_app REAL,
    sg_arg REAL,
    sg_putt REAL,
    sg_t2g REAL,
    rounds_played INTEGER NOT NULL,
    events_played INTEGER NOT NULL,
    avg_finish REAL,
    best_finish INTEGER,
    cutoff_date TEXT NOT NULL,
    latest_round_date TEXT NOT NULL,
    PRIMARY KEY (event_id, year, player_key)
);

CREATE TABLE IF NOT EXISTS experiments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hypothesis TEXT NOT NULL,
    source TEXT NOT NULL,
    scope TEXT NOT NULL,
    strategy_json TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    summary_json TEXT,
    result_json TEXT,
    significance_json TEXT,
    promoted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    UNIQUE (fingerprint, scope)
);

CREATE INDEX IF NOT EXISTS idx_experiments_status ON experiments(status);

CREATE TABLE IF NOT EXISTS active_strategy (
    scope TEXT PRIMARY KEY,
    strategy_json TEXT NOT NULL,
    experiment_id INTEGER REFERENCES experiments(id),
    roi_pct REAL NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bankroll (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    balance REAL NOT NULL,
    peak_balance REAL NOT NULL,
    kelly_fraction REAL NOT NULL,
    notes TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS blend_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tournament_id TEXT NOT NULL,
    market TEXT NOT NULL,
    brier_external REAL,
    brier_model REAL,
    brier_blended REAL,
    n_predictions INTEGER NOT NULL,
    external_weight REAL NOT NULL,
    model_weight REAL NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blend_market ON blend_history(market, id);

CREATE TABLE IF NOT EXISTS market_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market TEXT NOT NULL,
    settled_on TEXT NOT NULL,
    wagered REAL NOT NULL,
    returned REAL NOT NULL,
    won INTEGER NOT NULL,
    push INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_market_results_market ON market_results(market, id);

CREATE TABLE IF NOT EXISTS market_state (
    market TEXT PRIMARY KEY,
    frozen INTEGER NOT NULL DEFAULT 0,
    reason TEXT,
    updated_at TEXT NOT NULL
);
"#;

/// SQLite-backed store
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a database file and apply the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!("Opened store at {}", path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn market_from_sql(idx: usize, label: &str) -> rusqlite::Result<Market> {
    Market::parse(label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown market {}", label).into())
    })
}

fn json_from_sql<T: serde::de::DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn count_from_sql(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}
