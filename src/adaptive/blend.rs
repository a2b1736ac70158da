//! External/model probability blend per market
//!
//! Starts from a static 70/30 external/model split. Once a market has
//! enough settled tournaments, the model weight decays exponentially with
//! the blended Brier loss, bounded to [0.10, 0.50]. A blend that scores
//! clearly worse than the external source alone is flagged as drift.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::models::Market;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendConfig {
    pub default_external: f64,
    pub default_model: f64,
    pub learning_rate: f64,
    pub model_floor: f64,
    pub model_ceiling: f64,
    /// Distinct settled tournaments needed before adapting
    pub min_tournaments: usize,
    /// Drift when blended Brier >= external Brier * this
    pub drift_ratio: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            default_external: 0.70,
            default_model: 0.30,
            learning_rate: 0.03,
            model_floor: 0.10,
            model_ceiling: 0.50,
            min_tournaments: 5,
            drift_ratio: 1.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub external: f64,
    pub model: f64,
}

impl BlendWeights {
    pub fn blend(&self, external_prob: f64, model_prob: f64) -> f64 {
        self.external * external_prob + self.model * model_prob
    }
}

/// Brier scores for one (tournament, market) with the weights in force
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendRecord {
    pub tournament_id: String,
    pub market: Market,
    pub brier_external: Option<f64>,
    pub brier_model: Option<f64>,
    pub brier_blended: Option<f64>,
    pub n_predictions: usize,
    pub external_weight: f64,
    pub model_weight: f64,
}

impl BlendRecord {
    pub fn weights(&self) -> BlendWeights {
        BlendWeights {
            external: self.external_weight,
            model: self.model_weight,
        }
    }
}

pub trait BlendHistory {
    fn latest_blend(&self, market: Market) -> Result<Option<BlendRecord>>;
    fn blend_tournament_count(&self, market: Market) -> Result<usize>;
    fn append_blend(&self, record: &BlendRecord) -> Result<()>;
}

/// One settled prediction
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub external_prob: Option<f64>,
    pub model_prob: Option<f64>,
    pub blended_prob: f64,
    pub hit: bool,
}

/// Mean squared error of probabilities against outcomes; lower is better
pub fn brier_score(probs: &[f64], outcomes: &[bool]) -> Option<f64> {
    if probs.is_empty() || probs.len() != outcomes.len() {
        return None;
    }
    let total: f64 = probs
        .iter()
        .zip(outcomes)
        .map(|(p, &hit)| (p - if hit { 1.0 } else { 0.0 }).powi(2))
        .sum();
    Some(total / probs.len() as f64)
}

/// Per-source Brier scores for a tournament's settled predictions
pub fn tournament_brier(
    tournament_id: &str,
    market: Market,
    predictions: &[Prediction],
    weights: BlendWeights,
) -> Option<BlendRecord> {
    if predictions.is_empty() {
        return None;
    }
    let outcomes: Vec<bool> = predictions.iter().map(|p| p.hit).collect();
    let external: Vec<f64> = predictions.iter().map(|p| p.external_prob.unwrap_or(0.0)).collect();
    let model: Vec<f64> = predictions.iter().map(|p| p.model_prob.unwrap_or(0.0)).collect();
    let blended: Vec<f64> = predictions.iter().map(|p| p.blended_prob).collect();

    let has_external = predictions.iter().any(|p| p.external_prob.is_some());
    let has_model = predictions.iter().any(|p| p.model_prob.is_some());

    Some(BlendRecord {
        tournament_id: tournament_id.to_string(),
        market,
        brier_external: if has_external { brier_score(&external, &outcomes) } else { None },
        brier_model: if has_model { brier_score(&model, &outcomes) } else { None },
        brier_blended: brier_score(&blended, &outcomes),
        n_predictions: predictions.len(),
        external_weight: weights.external,
        model_weight: weights.model,
    })
}

/// Weights to use next, given the latest record and the tournament count
pub fn next_weights(latest: Option<&BlendRecord>, tournaments: usize, config: &BlendConfig) -> BlendWeights {
    let Some(record) = latest else {
        return BlendWeights {
            external: config.default_external,
            model: config.default_model,
        };
    };

    match record.brier_blended {
        Some(brier) if tournaments >= config.min_tournaments => {
            let model = (record.model_weight * (-config.learning_rate * brier).exp())
                .clamp(config.model_floor, config.model_ceiling);
            BlendWeights {
                external: 1.0 - model,
                model,
            }
        }
        _ => record.weights(),
    }
}

pub fn blend_ratio<H: BlendHistory>(history: &H, market: Market, config: &BlendConfig) -> Result<BlendWeights> {
    let latest = history.latest_blend(market)?;
    let count = history.blend_tournament_count(market)?;
    Ok(next_weights(latest.as_ref(), count, config))
}

/// Blend worse than the external source by at least the drift ratio
pub fn is_drift(record: &BlendRecord, config: &BlendConfig) -> bool {
    match (record.brier_external, record.brier_blended) {
        (Some(external), Some(blended)) if external > 0.0 => blended >= external * config.drift_ratio,
        _ => false,
    }
}

/// Persist a tournament's Brier record; returns whether it shows drift.
///
/// Drift is reported, never corrected.
pub fn record_tournament<H: BlendHistory>(history: &H, record: &BlendRecord, config: &BlendConfig) -> Result<bool> {
    history.append_blend(record)?;
    let drift = is_drift(record, config);
    if drift {
        warn!(
            "Blend drift: {} blended Brier {:.4} is {:.0}%+ worse than external-only {:.4}",
            record.market,
            record.brier_blended.unwrap_or_default(),
            (config.drift_ratio - 1.0) * 100.0,
            record.brier_external.unwrap_or_default()
        );
    }
    Ok(drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn record(tournament: &str, brier_external: f64, brier_blended: f64, model_weight: f64) -> BlendRecord {
        BlendRecord {
            tournament_id: tournament.to_string(),
            market: Market::Top10,
            brier_external: Some(brier_external),
            brier_model: None,
            brier_blended: Some(brier_blended),
            n_predictions: 10,
            external_weight: 1.0 - model_weight,
            model_weight,
        }
    }

    #[test]
    fn test_brier_score() {
        assert!((brier_score(&[1.0, 0.0], &[true, false]).unwrap()).abs() < 1e-12);
        assert!((brier_score(&[0.5, 0.5], &[true, false]).unwrap() - 0.25).abs() < 1e-12);
        assert!(brier_score(&[], &[]).is_none());
        assert!(brier_score(&[0.5], &[true, false]).is_none());
    }

    #[test]
    fn test_static_until_enough_tournaments() {
        let config = BlendConfig::default();
        let w = next_weights(None, 0, &config);
        assert_eq!(w.external, 0.70);
        assert_eq!(w.model, 0.30);

        let latest = record("t4", 0.2, 0.2, 0.30);
        let w = next_weights(Some(&latest), 4, &config);
        assert_eq!(w.model, 0.30);
    }

    #[test]
    fn test_ewa_update_and_bounds() {
        let config = BlendConfig::default();
        let latest = record("t5", 0.2, 0.5, 0.30);
        let w = next_weights(Some(&latest), 5, &config);
        assert!((w.model - 0.30 * (-0.015f64).exp()).abs() < 1e-12);
        assert!((w.external + w.model - 1.0).abs() < 1e-12);

        let floor = record("t6", 0.2, 100.0, 0.30);
        assert_eq!(next_weights(Some(&floor), 6, &config).model, 0.10);
        let ceiling = record("t7", 0.2, 0.0, 0.80);
        assert_eq!(next_weights(Some(&ceiling), 7, &config).model, 0.50);
    }

    #[test]
    fn test_drift_flag() {
        let config = BlendConfig::default();
        assert!(is_drift(&record("t", 0.20, 0.24, 0.3), &config));
        assert!(!is_drift(&record("t", 0.20, 0.22, 0.3), &config));
    }

    #[test]
    fn test_tournament_brier_and_history() {
        let predictions = vec![
            Prediction {
                external_prob: Some(0.6),
                model_prob: Some(0.8),
                blended_prob: 0.66,
                hit: true,
            },
            Prediction {
                external_prob: Some(0.2),
                model_prob: None,
                blended_prob: 0.14,
                hit: false,
            },
        ];
        let weights = BlendWeights {
            external: 0.7,
            model: 0.3,
        };
        let rec = tournament_brier("t1", Market::Top10, &predictions, weights).unwrap();
        assert!((rec.brier_external.unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(rec.n_predictions, 2);

        let store = Store::open_in_memory().unwrap();
        let config = BlendConfig::default();
        for i in 0..5 {
            let mut r = rec.clone();
            r.tournament_id = format!("t{}", i);
            record_tournament(&store, &r, &config).unwrap();
        }
        let w = blend_ratio(&store, Market::Top10, &config).unwrap();
        assert!(w.model < 0.30);
        assert_eq!(blend_ratio(&store, Market::Win, &config).unwrap().model, 0.30);
    }
}
