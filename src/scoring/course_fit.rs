//! Course-fit sub-model

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::ranking::{rank_field, rank_to_score, rounds_confidence, shrink_toward_neutral, NEUTRAL_SCORE};
use crate::models::{PlayerKey, SgCategory};
use crate::pit::course::PitCourseStat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseFitWeights {
    pub sg_total: f64,
    pub sg_app: f64,
    pub sg_ott: f64,
    pub sg_putt: f64,
    pub sg_arg: f64,
    pub finish: f64,
    /// Course rounds at which confidence reaches 1.0
    pub full_confidence_rounds: f64,
}

impl Default for CourseFitWeights {
    fn default() -> Self {
        Self {
            sg_total: 0.35,
            sg_app: 0.20,
            sg_ott: 0.15,
            sg_putt: 0.10,
            sg_arg: 0.05,
            finish: 0.15,
            full_confidence_rounds: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseFitScore {
    pub score: f64,
    pub confidence: f64,
    pub rounds: usize,
}

pub fn compute_course_fit(
    stats: &[PitCourseStat],
    weights: &CourseFitWeights,
) -> BTreeMap<PlayerKey, CourseFitScore> {
    let category_weights = [
        (SgCategory::Total, weights.sg_total),
        (SgCategory::Approach, weights.sg_app),
        (SgCategory::OffTee, weights.sg_ott),
        (SgCategory::Putting, weights.sg_putt),
        (SgCategory::AroundGreen, weights.sg_arg),
    ];

    let mut category_ranks: Vec<(f64, HashMap<&str, usize>, usize)> = Vec::new();
    for (category, weight) in category_weights {
        let values: Vec<(&str, Option<f64>)> = stats
            .iter()
            .map(|s| (s.player_key.as_str(), s.sg.get(category)))
            .collect();
        let ranked = rank_field(&values, true);
        let size = ranked.len();
        category_ranks.push((weight, ranked.into_iter().collect(), size));
    }

    // Lower average finish is better
    let finishes: Vec<(&str, Option<f64>)> = stats
        .iter()
        .map(|s| (s.player_key.as_str(), s.avg_finish))
        .collect();
    let finish_ranked = rank_field(&finishes, false);
    let finish_size = finish_ranked.len();
    let finish_ranks: HashMap<&str, usize> = finish_ranked.into_iter().collect();

    let component = |ranks: &HashMap<&str, usize>, size: usize, player: &str| -> f64 {
        ranks
            .get(player)
            .map(|r| rank_to_score(Some(*r), size))
            .unwrap_or(NEUTRAL_SCORE)
    };

    let mut results = BTreeMap::new();
    for stat in stats {
        let player = stat.player_key.as_str();
        let mut score: f64 = category_ranks
            .iter()
            .map(|(weight, ranks, size)| weight * component(ranks, *size, player))
            .sum();
        score += weights.finish * component(&finish_ranks, finish_size, player);

        let confidence = rounds_confidence(stat.rounds_played, weights.full_confidence_rounds);
        results.insert(
            stat.player_key.clone(),
            CourseFitScore {
                score: shrink_toward_neutral(score, confidence).clamp(0.0, 100.0),
                confidence,
                rounds: stat.rounds_played,
            },
        );
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::history::tests::date;
    use crate::models::SgLine;

    fn course_row(player: &str, total: f64, rounds: usize, avg_finish: Option<f64>) -> PitCourseStat {
        PitCourseStat {
            event_id: "m".to_string(),
            year: 2024,
            player_key: player.to_string(),
            course_id: "augusta".to_string(),
            sg: SgLine {
                total: Some(total),
                approach: Some(total),
                off_tee: Some(total),
                putting: Some(total),
                around_green: Some(total),
                tee_to_green: None,
            },
            rounds_played: rounds,
            events_played: rounds / 4,
            avg_finish,
            best_finish: avg_finish.map(|f| f as u32),
            cutoff_date: date(2024, 4, 11),
            latest_round_date: date(2023, 4, 9),
        }
    }

    #[test]
    fn test_full_confidence_best_player() {
        let stats = vec![
            course_row("a", 2.0, 40, Some(3.0)),
            course_row("b", 0.0, 40, Some(30.0)),
        ];
        let scores = compute_course_fit(&stats, &CourseFitWeights::default());
        assert!((scores["a"].score - 100.0).abs() < 1e-9);
        assert!(scores["b"].score.abs() < 1e-9);
        assert_eq!(scores["a"].confidence, 1.0);
    }

    #[test]
    fn test_few_rounds_shrink_toward_neutral() {
        let stats = vec![
            course_row("a", 2.0, 3, Some(3.0)),
            course_row("b", 0.0, 40, Some(30.0)),
        ];
        let scores = compute_course_fit(&stats, &CourseFitWeights::default());
        // confidence 0.3 + 0.7 * 3/30 = 0.37 -> 50 + 0.37 * 50
        assert!((scores["a"].confidence - 0.37).abs() < 1e-9);
        assert!((scores["a"].score - 68.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_finish_gets_neutral_component() {
        let stats = vec![
            course_row("a", 2.0, 40, None),
            course_row("b", 0.0, 40, None),
        ];
        let scores = compute_course_fit(&stats, &CourseFitWeights::default());
        // SG components 100 * 0.85 + neutral finish 50 * 0.15
        assert!((scores["a"].score - 92.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_course_fit(&[], &CourseFitWeights::default()).is_empty());
    }
}
