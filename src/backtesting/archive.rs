//! Replay source over the loaded archives and stored PIT tables

use tracing::debug;

use super::replay::EventSnapshot;
use super::simulator::ReplaySource;
use super::strategy::StrategyConfig;
use crate::data::calendar::EventCalendar;
use crate::data::history::RoundHistory;
use crate::data::odds_loader::OddsArchive;
use crate::error::Result;
use crate::models::EventKey;
use crate::pit::builder::PitStore;

/// Joins PIT snapshots, vigged closing prices and final finishes per event
pub struct ArchiveSource<'a, P: PitStore> {
    history: &'a RoundHistory,
    calendar: &'a EventCalendar,
    odds: &'a OddsArchive,
    pit: &'a P,
}

impl<'a, P: PitStore> ArchiveSource<'a, P> {
    pub fn new(history: &'a RoundHistory, calendar: &'a EventCalendar, odds: &'a OddsArchive, pit: &'a P) -> Self {
        Self {
            history,
            calendar,
            odds,
            pit,
        }
    }
}

impl<'a, P: PitStore> ReplaySource for ArchiveSource<'a, P> {
    fn events_in_year(&self, year: i32) -> Result<Vec<EventKey>> {
        Ok(self
            .calendar
            .events_in_year(year)
            .into_iter()
            .map(|(event, _)| event)
            .collect())
    }

    fn event_snapshot(&self, event: &EventKey, strategy: &StrategyConfig) -> Result<EventSnapshot> {
        let rolling = self.pit.rolling_stats(event, Some(strategy.stat_window))?;
        let prices = self.odds.best_prices(event, strategy.vig_factor);
        let finishes = self.history.event_finishes(event);
        debug!(
            "Snapshot {}: {} PIT rows, {} prices, {} finishes",
            event,
            rolling.len(),
            prices.len(),
            finishes.len()
        );
        Ok(EventSnapshot {
            event: event.clone(),
            rolling,
            prices,
            finishes,
        })
    }
}
