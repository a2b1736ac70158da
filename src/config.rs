//! Process-level configuration from the environment

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "data/golf_backtest.db";
pub const DEFAULT_DATA_DIR: &str = "data/archive";

/// Locations of the store and the CSV archives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Directory holding `rounds.csv`, `events.csv` and `odds.csv`
    pub data_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl AppConfig {
    /// Read `GOLF_BACKTEST_DB` and `GOLF_BACKTEST_DATA_DIR`
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        Self {
            db_path: lookup("GOLF_BACKTEST_DB")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            data_dir: lookup("GOLF_BACKTEST_DATA_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        }
    }

    pub fn rounds_csv(&self) -> PathBuf {
        self.data_dir.join("rounds.csv")
    }

    pub fn events_csv(&self) -> PathBuf {
        self.data_dir.join("events.csv")
    }

    pub fn odds_csv(&self) -> PathBuf {
        self.data_dir.join("odds.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(AppConfig::from_vars(|_| None), AppConfig::default());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = AppConfig::from_vars(|key| match key {
            "GOLF_BACKTEST_DB" => Some("/tmp/bt.db".to_string()),
            "GOLF_BACKTEST_DATA_DIR" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.db_path, PathBuf::from("/tmp/bt.db"));
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(config.odds_csv().ends_with("odds.csv"));
    }
}
