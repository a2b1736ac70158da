//! Round History Index
//!
//! Immutable per-player index of historical rounds. Every query that feeds a
//! point-in-time snapshot goes through [`RoundHistory::prior_rounds`] or
//! [`RoundHistory::prior_course_rounds`], which apply the strict
//! `event_completed < cutoff` rule and exclude the target event's own rounds.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::data::csv_loader;
use crate::error::Result;
use crate::models::{EventKey, HistoricalRound, PlayerKey};

/// Historical rounds indexed by player and by event
#[derive(Debug, Default)]
pub struct RoundHistory {
    rounds: Vec<HistoricalRound>,
    /// player_key -> indexes into `rounds`, most recent first
    by_player: HashMap<PlayerKey, Vec<usize>>,
    /// event -> indexes into `rounds`
    by_event: BTreeMap<EventKey, Vec<usize>>,
}

impl RoundHistory {
    /// Build the index from canonical round records
    pub fn from_rounds(rounds: Vec<HistoricalRound>) -> Self {
        let mut by_player: HashMap<PlayerKey, Vec<usize>> = HashMap::new();
        let mut by_event: BTreeMap<EventKey, Vec<usize>> = BTreeMap::new();

        for (i, round) in rounds.iter().enumerate() {
            by_player.entry(round.player_key.clone()).or_default().push(i);
            by_event.entry(round.event_key()).or_default().push(i);
        }

        // Most recent first: completion date desc, then round number desc
        for indexes in by_player.values_mut() {
            indexes.sort_by(|&a, &b| {
                let (ra, rb) = (&rounds[a], &rounds[b]);
                rb.event_completed
                    .cmp(&ra.event_completed)
                    .then_with(|| rb.round_num.cmp(&ra.round_num))
            });
        }

        Self {
            rounds,
            by_player,
            by_event,
        }
    }

    /// Load and index all rounds from CSV
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self> {
        Ok(Self::from_rounds(csv_loader::load_rounds(csv_path)?))
    }

    /// Distinct players with at least one round in the event, sorted
    pub fn field(&self, event: &EventKey) -> Vec<PlayerKey> {
        let players: BTreeSet<&PlayerKey> = self
            .by_event
            .get(event)
            .map(|idx| idx.iter().map(|&i| &self.rounds[i].player_key).collect())
            .unwrap_or_default();
        players.into_iter().cloned().collect()
    }

    /// One finish text per player for the event (field tie detection)
    pub fn event_finishes(&self, event: &EventKey) -> BTreeMap<PlayerKey, String> {
        let mut finishes = BTreeMap::new();
        if let Some(idx) = self.by_event.get(event) {
            for &i in idx {
                let round = &self.rounds[i];
                if let Some(text) = &round.finish_text {
                    finishes
                        .entry(round.player_key.clone())
                        .or_insert_with(|| text.clone());
                }
            }
        }
        finishes
    }

    /// Completion date of an event, taken from its rounds
    pub fn event_completed(&self, event: &EventKey) -> Option<NaiveDate> {
        self.by_event
            .get(event)?
            .iter()
            .map(|&i| self.rounds[i].event_completed)
            .max()
    }

    /// Course recorded on the event's rounds, if any
    pub fn event_course(&self, event: &EventKey) -> Option<String> {
        self.by_event
            .get(event)?
            .iter()
            .find_map(|&i| self.rounds[i].course_id.clone())
    }

    /// Events present in the index, in key order
    pub fn events(&self) -> impl Iterator<Item = &EventKey> {
        self.by_event.keys()
    }

    /// Rounds usable for a snapshot of `exclude` as of `cutoff`, most recent first.
    ///
    /// Only rounds completed strictly before the cutoff, not belonging to the
    /// excluded event and carrying a total SG figure are returned.
    pub fn prior_rounds(
        &self,
        player: &str,
        cutoff: NaiveDate,
        exclude: &EventKey,
    ) -> Vec<&HistoricalRound> {
        self.player_rounds(player)
            .filter(|r| r.event_completed < cutoff && !r.belongs_to(exclude) && r.sg.total.is_some())
            .collect()
    }

    /// Same temporal rule as [`Self::prior_rounds`], restricted to one course.
    ///
    /// Rounds without total SG are kept so their finish still counts.
    pub fn prior_course_rounds(
        &self,
        player: &str,
        course_id: &str,
        cutoff: NaiveDate,
        exclude: &EventKey,
    ) -> Vec<&HistoricalRound> {
        self.player_rounds(player)
            .filter(|r| {
                r.event_completed < cutoff
                    && !r.belongs_to(exclude)
                    && r.course_id.as_deref() == Some(course_id)
            })
            .collect()
    }

    fn player_rounds<'a>(&'a self, player: &str) -> impl Iterator<Item = &'a HistoricalRound> + 'a {
        self.by_player
            .get(player)
            .into_iter()
            .flat_map(move |idx| idx.iter().map(move |&i| &self.rounds[i]))
    }

    /// Number of unique players in the index
    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::SgLine;
    use chrono::Datelike;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn round(
        player: &str,
        event: &str,
        completed: NaiveDate,
        round_num: u8,
        total: Option<f64>,
    ) -> HistoricalRound {
        HistoricalRound {
            player_key: player.to_string(),
            event_id: event.to_string(),
            year: completed.year(),
            event_completed: completed,
            course_id: Some(format!("course-{}", event)),
            round_num,
            finish_text: Some("T10".to_string()),
            sg: SgLine {
                total,
                approach: total.map(|t| t / 2.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_prior_rounds_strictly_before_cutoff() {
        let history = RoundHistory::from_rounds(vec![
            round("a", "1", date(2024, 1, 7), 4, Some(1.0)),
            round("a", "2", date(2024, 1, 14), 4, Some(2.0)),
            round("a", "3", date(2024, 1, 21), 4, Some(3.0)),
        ]);
        let target = EventKey::new("9", 2024);
        let rounds = history.prior_rounds("a", date(2024, 1, 14), &target);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].event_id, "1");
    }

    #[test]
    fn test_prior_rounds_exclude_own_event_and_null_total() {
        let history = RoundHistory::from_rounds(vec![
            round("a", "1", date(2024, 1, 7), 4, Some(1.0)),
            round("a", "1", date(2024, 1, 7), 3, None),
            round("a", "2", date(2024, 1, 14), 1, Some(2.0)),
        ]);
        let target = EventKey::new("2", 2024);
        let rounds = history.prior_rounds("a", date(2024, 12, 31), &target);
        assert_eq!(rounds.len(), 1);
        assert!(rounds.iter().all(|r| !r.belongs_to(&target)));
    }

    #[test]
    fn test_prior_rounds_ordering() {
        let history = RoundHistory::from_rounds(vec![
            round("a", "1", date(2024, 1, 7), 1, Some(1.0)),
            round("a", "2", date(2024, 1, 14), 1, Some(2.0)),
            round("a", "2", date(2024, 1, 14), 2, Some(2.5)),
        ]);
        let rounds = history.prior_rounds("a", date(2024, 2, 1), &EventKey::new("x", 2024));
        let order: Vec<(String, u8)> = rounds
            .iter()
            .map(|r| (r.event_id.clone(), r.round_num))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2".to_string(), 2),
                ("2".to_string(), 1),
                ("1".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_field_and_finishes() {
        let history = RoundHistory::from_rounds(vec![
            round("b", "1", date(2024, 1, 7), 1, Some(1.0)),
            round("a", "1", date(2024, 1, 7), 1, Some(1.0)),
            round("a", "1", date(2024, 1, 7), 2, Some(1.0)),
        ]);
        let event = EventKey::new("1", 2024);
        assert_eq!(history.field(&event), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(history.event_finishes(&event).len(), 2);
        assert_eq!(history.event_completed(&event), Some(date(2024, 1, 7)));
        assert_eq!(history.event_course(&event).as_deref(), Some("course-1"));
    }

    #[test]
    fn test_unknown_player() {
        let history = RoundHistory::default();
        assert!(history.is_empty());
        assert!(history
            .prior_rounds("ghost", date(2024, 1, 1), &EventKey::new("1", 2024))
            .is_empty());
    }
}
