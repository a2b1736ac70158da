//! Strategy configuration
//!
//! A strategy is an immutable bundle of replay parameters. Two configs with
//! the same parameters share a fingerprint, which is how experiments are
//! deduplicated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::kelly::DEFAULT_KELLY_FRACTION;
use crate::core::odds::DEFAULT_VIG_FACTOR;
use crate::error::{validate_probability, validate_weight, BacktestError, Result};
use crate::models::{Market, SgCategory};

/// Replay parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    pub description: String,

    // Composite weights
    pub w_sg_total: f64,
    pub w_sg_app: f64,
    pub w_sg_ott: f64,
    pub w_sg_arg: f64,
    pub w_sg_putt: f64,
    pub w_form: f64,
    pub w_course_fit: f64,

    /// Rolling window the replay reads PIT stats at
    pub stat_window: usize,

    // Bet filters
    pub min_ev: f64,
    pub max_implied_prob: f64,
    pub min_model_prob: f64,

    pub kelly_fraction: f64,
    pub markets: Vec<Market>,
    /// Multiplier on each market's base softmax temperature
    pub softmax_temp: f64,
    /// Implied probabilities are divided by this to simulate the book's margin
    pub vig_factor: f64,
    /// Largest absolute score adjustment accepted from an external source
    pub ai_adj_cap: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: String::new(),
            w_sg_total: 0.30,
            w_sg_app: 0.15,
            w_sg_ott: 0.10,
            w_sg_arg: 0.05,
            w_sg_putt: 0.10,
            w_form: 0.15,
            w_course_fit: 0.15,
            stat_window: 24,
            min_ev: 0.05,
            max_implied_prob: 0.50,
            min_model_prob: 0.005,
            kelly_fraction: DEFAULT_KELLY_FRACTION,
            markets: vec![Market::Win, Market::Top5, Market::Top10, Market::Top20],
            softmax_temp: 1.0,
            vig_factor: DEFAULT_VIG_FACTOR,
            ai_adj_cap: 5.0,
        }
    }
}

/// Weights after normalization to sum 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWeights {
    pub sg_total: f64,
    pub sg_app: f64,
    pub sg_ott: f64,
    pub sg_arg: f64,
    pub sg_putt: f64,
    pub form: f64,
    pub course_fit: f64,
}

impl NormalizedWeights {
    /// Weight applied to an SG category in the replay composite
    pub fn category(&self, category: SgCategory) -> f64 {
        match category {
            SgCategory::Total => self.sg_total,
            SgCategory::Approach => self.sg_app,
            SgCategory::OffTee => self.sg_ott,
            SgCategory::AroundGreen => self.sg_arg,
            SgCategory::Putting => self.sg_putt,
            SgCategory::TeeToGreen => 0.0,
        }
    }
}

impl StrategyConfig {
    /// Canonical JSON with object keys in sorted order
    pub fn to_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: StrategyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// SHA-256 hex digest of the canonical JSON
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json()?.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// All seven weights scaled to sum to 1, or equal weights when they sum to 0
    pub fn normalized_weights(&self) -> NormalizedWeights {
        let raw = [
            self.w_sg_total,
            self.w_sg_app,
            self.w_sg_ott,
            self.w_sg_arg,
            self.w_sg_putt,
            self.w_form,
            self.w_course_fit,
        ];
        let total: f64 = raw.iter().sum();
        let scaled = if total > 0.0 {
            raw.map(|w| w / total)
        } else {
            [1.0 / raw.len() as f64; 7]
        };

        NormalizedWeights {
            sg_total: scaled[0],
            sg_app: scaled[1],
            sg_ott: scaled[2],
            sg_arg: scaled[3],
            sg_putt: scaled[4],
            form: scaled[5],
            course_fit: scaled[6],
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_weight("w_sg_total", self.w_sg_total)?;
        validate_weight("w_sg_app", self.w_sg_app)?;
        validate_weight("w_sg_ott", self.w_sg_ott)?;
        validate_weight("w_sg_arg", self.w_sg_arg)?;
        validate_weight("w_sg_putt", self.w_sg_putt)?;
        validate_weight("w_form", self.w_form)?;
        validate_weight("w_course_fit", self.w_course_fit)?;
        validate_probability(self.max_implied_prob)?;
        validate_probability(self.min_model_prob)?;
        validate_probability(self.kelly_fraction)?;

        if self.stat_window == 0 {
            return Err(BacktestError::Validation(
                "stat_window must be positive".to_string(),
            ));
        }
        if !(self.softmax_temp > 0.0) {
            return Err(BacktestError::Validation(format!(
                "softmax_temp must be positive, got {}",
                self.softmax_temp
            )));
        }
        if !(self.vig_factor > 0.0 && self.vig_factor <= 1.0) {
            return Err(BacktestError::Validation(format!(
                "vig_factor must be in (0, 1], got {}",
                self.vig_factor
            )));
        }
        if self.markets.is_empty() {
            return Err(BacktestError::Validation(
                "at least one market is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_normalize() {
        let w = StrategyConfig::default().normalized_weights();
        let sum = w.sg_total + w.sg_app + w.sg_ott + w.sg_arg + w.sg_putt + w.form + w.course_fit;
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((w.sg_total - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weights_fall_back_to_equal() {
        let config = StrategyConfig {
            w_sg_total: 0.0,
            w_sg_app: 0.0,
            w_sg_ott: 0.0,
            w_sg_arg: 0.0,
            w_sg_putt: 0.0,
            w_form: 0.0,
            w_course_fit: 0.0,
            ..Default::default()
        };
        let w = config.normalized_weights();
        assert!((w.form - 1.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let config = StrategyConfig {
            w_sg_app: 0.1 + 0.2,
            min_ev: 0.07,
            markets: vec![Market::Win, Market::MakeCut],
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        let back = StrategyConfig::from_json(&json).unwrap();
        assert_eq!(config, back);
        assert_eq!(config.fingerprint().unwrap(), back.fingerprint().unwrap());

        let pretty = config.to_json_pretty().unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(StrategyConfig::from_json(&pretty).unwrap(), config);
    }

    #[test]
    fn test_fingerprint_changes_with_parameters() {
        let a = StrategyConfig::default();
        let b = StrategyConfig {
            min_ev: 0.06,
            ..Default::default()
        };
        let fp = a.fingerprint().unwrap();
        assert_eq!(fp.len(), 64);
        assert_ne!(fp, b.fingerprint().unwrap());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StrategyConfig::from_json(r#"{"name": "tight", "min_ev": 0.1}"#).unwrap();
        assert_eq!(config.name, "tight");
        assert_eq!(config.stat_window, 24);
        assert!((config.vig_factor - 0.88).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let negative = StrategyConfig {
            w_form: -0.1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let no_markets = StrategyConfig {
            markets: Vec::new(),
            ..Default::default()
        };
        assert!(no_markets.validate().is_err());
    }
}
