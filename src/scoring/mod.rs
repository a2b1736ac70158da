//! Sub-model scorers over PIT tables
//!
//! Form, course fit and momentum read PIT rows only, so every score is
//! reproducible as of the event's cutoff.

pub mod composite;
pub mod course_fit;
pub mod form;
pub mod momentum;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::PlayerKey;
use crate::pit::{PitCourseStat, PitRollingStat};

pub use composite::{compute_composite, CompositeScore, CompositeWeights, ScoreAdjustment};
pub use course_fit::{compute_course_fit, CourseFitScore, CourseFitWeights};
pub use form::{compute_form, FormScore, FormWeights};
pub use momentum::{compute_momentum, Direction, MomentumScore};

/// All sub-model weights
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub form: FormWeights,
    pub course_fit: CourseFitWeights,
    pub composite: CompositeWeights,
}

/// Score an event's field from its PIT rows
pub fn score_event(
    rolling: &[PitRollingStat],
    course: &[PitCourseStat],
    weights: &ScoringWeights,
) -> BTreeMap<PlayerKey, CompositeScore> {
    let form = compute_form(rolling, &weights.form);
    let course_fit = compute_course_fit(course, &weights.course_fit);
    let momentum = compute_momentum(rolling);
    compute_composite(&form, &course_fit, &momentum, &weights.composite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::form::tests::row;

    #[test]
    fn test_score_event_orders_field() {
        let mut rolling = Vec::new();
        for window in [8, 24] {
            rolling.push(row("a", window, 2.0, 1, window));
            rolling.push(row("b", window, 1.0, 2, window));
            rolling.push(row("c", window, 0.0, 3, window));
        }
        let scores = score_event(&rolling, &[], &ScoringWeights::default());
        assert!(scores["a"].composite > scores["b"].composite);
        assert!(scores["b"].composite > scores["c"].composite);
        assert!(scores.values().all(|s| (0.0..=100.0).contains(&s.composite)));
    }
}
