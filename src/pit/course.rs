//! Course-scoped point-in-time snapshots

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::settlement::FinishPosition;
use crate::data::history::RoundHistory;
use crate::models::{EventKey, PlayerKey, SgLine};
use crate::pit::rolling::{round4, round_line};

/// A player's record at the event's course as of the cutoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitCourseStat {
    pub event_id: String,
    pub year: i32,
    pub player_key: PlayerKey,
    pub course_id: String,
    pub sg: SgLine,
    pub rounds_played: usize,
    pub events_played: usize,
    /// Mean of one parsed finish per prior event; CUT/WD/DQ excluded
    pub avg_finish: Option<f64>,
    pub best_finish: Option<u32>,
    pub cutoff_date: NaiveDate,
    pub latest_round_date: NaiveDate,
}

/// Build course snapshots for every player in the event's field
pub fn build_course_stats(
    history: &RoundHistory,
    event: &EventKey,
    course_id: &str,
    cutoff: NaiveDate,
) -> Vec<PitCourseStat> {
    let mut stats = Vec::new();

    for player in history.field(event) {
        let rounds = history.prior_course_rounds(&player, course_id, cutoff, event);
        let Some(latest) = rounds.first().map(|r| r.event_completed) else {
            continue;
        };

        let events: BTreeSet<EventKey> = rounds.iter().map(|r| r.event_key()).collect();

        // One finish per (prior event, finish text)
        let finish_entries: BTreeSet<(EventKey, String)> = rounds
            .iter()
            .filter_map(|r| {
                r.finish_text
                    .as_ref()
                    .map(|t| (r.event_key(), t.trim().to_uppercase()))
            })
            .collect();
        let positions: Vec<u32> = finish_entries
            .iter()
            .filter_map(|(_, text)| FinishPosition::parse(text).position)
            .collect();

        let avg_finish = if positions.is_empty() {
            None
        } else {
            Some(round4(
                positions.iter().map(|&p| p as f64).sum::<f64>() / positions.len() as f64,
            ))
        };

        stats.push(PitCourseStat {
            event_id: event.event_id.clone(),
            year: event.year,
            player_key: player.clone(),
            course_id: course_id.to_string(),
            sg: round_line(SgLine::average(rounds.iter().map(|r| &r.sg))),
            rounds_played: rounds.len(),
            events_played: events.len(),
            avg_finish,
            best_finish: positions.iter().copied().min(),
            cutoff_date: cutoff,
            latest_round_date: latest,
        });
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::history::tests::{date, round};
    use crate::models::HistoricalRound;

    fn at_course(mut r: HistoricalRound, course: &str, finish: &str) -> HistoricalRound {
        r.course_id = Some(course.to_string());
        r.finish_text = Some(finish.to_string());
        r
    }

    #[test]
    fn test_finish_history_deduplicated_per_event() {
        let mut rounds = Vec::new();
        for rn in 1..=4u8 {
            rounds.push(at_course(round("a", "m22", date(2022, 4, 10), rn, Some(1.0)), "augusta", "T5"));
            rounds.push(at_course(round("a", "m23", date(2023, 4, 9), rn, Some(2.0)), "augusta", "1"));
        }
        for rn in 1..=2u8 {
            rounds.push(at_course(round("a", "m21", date(2021, 4, 11), rn, Some(-1.0)), "augusta", "CUT"));
        }
        rounds.push(at_course(round("a", "elsewhere", date(2023, 5, 1), 1, Some(4.0)), "quail", "2"));
        rounds.push(at_course(round("a", "m24", date(2024, 4, 14), 1, Some(9.0)), "augusta", "1"));
        let history = RoundHistory::from_rounds(rounds);

        let event = EventKey::new("m24", 2024);
        let stats = build_course_stats(&history, &event, "augusta", date(2024, 4, 11));
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.rounds_played, 10);
        assert_eq!(s.events_played, 3);
        // (5 + 1) / 2; the CUT is excluded and each event counts once
        assert!((s.avg_finish.unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(s.best_finish, Some(1));
        assert!(s.latest_round_date < s.cutoff_date);
    }

    #[test]
    fn test_no_course_rounds_no_record() {
        let history = RoundHistory::from_rounds(vec![
            round("a", "x", date(2023, 1, 1), 1, Some(1.0)),
            round("a", "y", date(2024, 1, 1), 1, Some(1.0)),
        ]);
        let stats = build_course_stats(&history, &EventKey::new("y", 2024), "course-zzz", date(2023, 12, 30));
        assert!(stats.is_empty());
    }
}
