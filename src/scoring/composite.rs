//! Composite scorer

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::core::ranking::NEUTRAL_SCORE;
use crate::models::PlayerKey;
use crate::scoring::course_fit::CourseFitScore;
use crate::scoring::form::FormScore;
use crate::scoring::momentum::{Direction, MomentumScore};

/// Share of the course weight moved to form when an event has no course data
const NO_COURSE_TO_FORM: f64 = 0.7;
/// Share of the course weight moved to momentum when an event has no course data
const NO_COURSE_TO_MOMENTUM: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub course_fit: f64,
    pub form: f64,
    pub momentum: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            course_fit: 0.40,
            form: 0.40,
            momentum: 0.20,
        }
    }
}

impl CompositeWeights {
    /// Weights in force for an event; course weight is redistributed when the
    /// event has no course data at all
    pub fn effective(&self, has_course_data: bool) -> CompositeWeights {
        if has_course_data {
            self.clone()
        } else {
            CompositeWeights {
                course_fit: 0.0,
                form: self.form + self.course_fit * NO_COURSE_TO_FORM,
                momentum: self.momentum + self.course_fit * NO_COURSE_TO_MOMENTUM,
            }
        }
    }
}

/// Optional externally supplied adjustment to a composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub delta: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub composite: f64,
    pub course_fit: f64,
    pub form: f64,
    pub momentum: f64,
    pub momentum_direction: Direction,
    pub course_confidence: f64,
    pub course_rounds: usize,
    /// Adjustment actually applied, after capping
    pub adjustment: Option<ScoreAdjustment>,
}

impl CompositeScore {
    /// Apply an adjustment clamped to `[-cap, cap]`; the result stays in [0, 100]
    pub fn apply_adjustment(&mut self, adjustment: &ScoreAdjustment, cap: f64) {
        let cap = cap.abs();
        let delta = adjustment.delta.clamp(-cap, cap);
        self.composite = (self.composite + delta).clamp(0.0, 100.0);
        self.adjustment = Some(ScoreAdjustment {
            delta,
            reason: adjustment.reason.clone(),
        });
    }
}

/// Blend sub-model scores for every player seen by any sub-model.
///
/// Missing sub-scores default to neutral.
pub fn compute_composite(
    form: &BTreeMap<PlayerKey, FormScore>,
    course_fit: &BTreeMap<PlayerKey, CourseFitScore>,
    momentum: &BTreeMap<PlayerKey, MomentumScore>,
    weights: &CompositeWeights,
) -> BTreeMap<PlayerKey, CompositeScore> {
    let players: BTreeSet<&PlayerKey> = form
        .keys()
        .chain(course_fit.keys())
        .chain(momentum.keys())
        .collect();

    let has_course_data = !course_fit.is_empty();
    let w = weights.effective(has_course_data);
    if !has_course_data {
        debug!(
            "No course data; using form {:.2} momentum {:.2}",
            w.form, w.momentum
        );
    }

    players
        .into_iter()
        .map(|player| {
            let course = course_fit.get(player);
            let form_score = form.get(player).map_or(NEUTRAL_SCORE, |f| f.score);
            let course_score = course.map_or(NEUTRAL_SCORE, |c| c.score);
            let mom = momentum.get(player);
            let momentum_score = mom.map_or(NEUTRAL_SCORE, |m| m.score);

            let composite = (w.course_fit * course_score
                + w.form * form_score
                + w.momentum * momentum_score)
                .clamp(0.0, 100.0);

            (
                player.clone(),
                CompositeScore {
                    composite,
                    course_fit: course_score,
                    form: form_score,
                    momentum: momentum_score,
                    momentum_direction: mom.map_or(Direction::Unknown, |m| m.direction),
                    course_confidence: course.map_or(0.0, |c| c.confidence),
                    course_rounds: course.map_or(0, |c| c.rounds),
                    adjustment: None,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(score: f64) -> FormScore {
        FormScore {
            score,
            recent: score,
            baseline: score,
            multi_sg: score,
        }
    }

    fn momentum(score: f64) -> MomentumScore {
        MomentumScore {
            score,
            direction: Direction::Warming,
            trend: 0.0,
        }
    }

    #[test]
    fn test_default_blend() {
        let forms = BTreeMap::from([("a".to_string(), form(80.0))]);
        let courses = BTreeMap::from([(
            "a".to_string(),
            CourseFitScore {
                score: 60.0,
                confidence: 1.0,
                rounds: 30,
            },
        )]);
        let moms = BTreeMap::from([("a".to_string(), momentum(40.0))]);
        let scores = compute_composite(&forms, &courses, &moms, &CompositeWeights::default());
        // 0.4 * 60 + 0.4 * 80 + 0.2 * 40
        assert!((scores["a"].composite - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_course_data_redistributes() {
        let forms = BTreeMap::from([("a".to_string(), form(80.0))]);
        let moms = BTreeMap::from([("a".to_string(), momentum(40.0))]);
        let scores = compute_composite(&forms, &BTreeMap::new(), &moms, &CompositeWeights::default());
        // form 0.68, momentum 0.32
        assert!((scores["a"].composite - (0.68 * 80.0 + 0.32 * 40.0)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_sub_scores_default_neutral() {
        let forms = BTreeMap::from([("a".to_string(), form(80.0))]);
        let courses = BTreeMap::from([(
            "b".to_string(),
            CourseFitScore {
                score: 100.0,
                confidence: 1.0,
                rounds: 30,
            },
        )]);
        let scores = compute_composite(&forms, &courses, &BTreeMap::new(), &CompositeWeights::default());
        assert_eq!(scores.len(), 2);
        // b: course 100, form 50, momentum 50
        assert!((scores["b"].composite - 70.0).abs() < 1e-9);
        assert_eq!(scores["a"].momentum_direction, Direction::Unknown);
    }

    #[test]
    fn test_adjustment_is_capped() {
        let forms = BTreeMap::from([("a".to_string(), form(50.0))]);
        let mut scores = compute_composite(&forms, &BTreeMap::new(), &BTreeMap::new(), &CompositeWeights::default());
        let score = scores.get_mut("a").unwrap();
        score.apply_adjustment(
            &ScoreAdjustment {
                delta: 12.0,
                reason: "injury news".to_string(),
            },
            5.0,
        );
        assert!((score.composite - 55.0).abs() < 1e-9);
        assert_eq!(score.adjustment.as_ref().unwrap().delta, 5.0);
    }
}
