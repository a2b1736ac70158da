//! Event calendar and cutoff resolution

use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::data::csv_loader;
use crate::data::history::RoundHistory;
use crate::error::{BacktestError, Result};
use crate::models::{EventInfo, EventKey};

/// Event metadata merged with completion dates observed in the round history
#[derive(Debug, Default)]
pub struct EventCalendar {
    events: BTreeMap<EventKey, EventInfo>,
    completed: BTreeMap<EventKey, NaiveDate>,
}

impl EventCalendar {
    /// Merge event metadata with the events seen in `history`.
    ///
    /// Events that only appear in the history get an entry without dates.
    /// A missing course id is filled from the event's rounds.
    pub fn build(infos: Vec<EventInfo>, history: &RoundHistory) -> Self {
        let mut events: BTreeMap<EventKey, EventInfo> =
            infos.into_iter().map(|info| (info.key(), info)).collect();

        for key in history.events() {
            events.entry(key.clone()).or_insert_with(|| EventInfo {
                event_id: key.event_id.clone(),
                year: key.year,
                start_date: None,
                end_date: None,
                course_id: None,
            });
        }

        let mut completed = BTreeMap::new();
        for (key, info) in events.iter_mut() {
            if info.course_id.is_none() {
                info.course_id = history.event_course(key);
            }
            if let Some(done) = history.event_completed(key).or(info.end_date) {
                completed.insert(key.clone(), done);
            }
        }

        Self { events, completed }
    }

    /// Load event metadata from CSV and merge it with the history
    pub fn load<P: AsRef<Path>>(csv_path: P, history: &RoundHistory) -> Result<Self> {
        Ok(Self::build(csv_loader::load_events(csv_path)?, history))
    }

    pub fn info(&self, event: &EventKey) -> Option<&EventInfo> {
        self.events.get(event)
    }

    pub fn course_id(&self, event: &EventKey) -> Option<&str> {
        self.events.get(event)?.course_id.as_deref()
    }

    pub fn completed(&self, event: &EventKey) -> Option<NaiveDate> {
        self.completed.get(event).copied()
    }

    /// Cutoff date for point-in-time snapshots of `event`.
    ///
    /// The recorded start date when present. Otherwise the day after the
    /// completion of the nearest earlier completed event, so that event's
    /// rounds qualify under the strict `<` rule.
    pub fn cutoff_date(&self, event: &EventKey) -> Result<NaiveDate> {
        if let Some(start) = self.events.get(event).and_then(|info| info.start_date) {
            return Ok(start);
        }

        let anchor = self
            .completed(event)
            .ok_or_else(|| BacktestError::MissingCutoff(event.clone()))?;

        let previous = self
            .completed
            .iter()
            .filter(|(key, done)| *key != event && **done < anchor)
            .map(|(_, done)| *done)
            .max()
            .ok_or_else(|| BacktestError::MissingCutoff(event.clone()))?;

        let cutoff = previous
            .checked_add_days(Days::new(1))
            .ok_or_else(|| BacktestError::MissingCutoff(event.clone()))?;
        debug!("No start date for {}, falling back to cutoff {}", event, cutoff);
        Ok(cutoff)
    }

    /// Events of a season ordered by cutoff date.
    ///
    /// Events without a resolvable cutoff are logged and skipped.
    pub fn events_in_year(&self, year: i32) -> Vec<(EventKey, NaiveDate)> {
        let mut ordered: Vec<(EventKey, NaiveDate)> = self
            .events
            .keys()
            .filter(|key| key.year == year)
            .filter_map(|key| match self.cutoff_date(key) {
                Ok(cutoff) => Some((key.clone(), cutoff)),
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    None
                }
            })
            .collect();
        ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ordered
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
