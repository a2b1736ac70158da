//! PIT build driver
//!
//! Resolves cutoffs, computes rolling and course snapshots for many events in
//! parallel, and writes them back in chronological order. Writes for one
//! event are serialized by a per-(event, year) lock and replace the event's
//! rows atomically.

use chrono::NaiveDate;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::data::calendar::EventCalendar;
use crate::data::history::RoundHistory;
use crate::error::{BacktestError, Result};
use crate::models::EventKey;
use crate::pit::course::{build_course_stats, PitCourseStat};
use crate::pit::rolling::{build_rolling_stats, PitRollingStat, DEFAULT_WINDOWS};

/// Persistence for PIT tables
pub trait PitStore {
    /// True when rows already exist for the event
    fn has_pit_stats(&self, event: &EventKey) -> Result<bool>;

    /// Delete and reinsert every row of one event in a single transaction.
    /// Returns the number of rows written.
    fn replace_pit_stats(&self, stats: &PitEventStats) -> Result<usize>;

    /// Rolling rows for an event, optionally restricted to one window
    fn rolling_stats(&self, event: &EventKey, window: Option<usize>) -> Result<Vec<PitRollingStat>>;

    fn course_stats(&self, event: &EventKey) -> Result<Vec<PitCourseStat>>;
}

/// PIT build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitConfig {
    pub windows: Vec<usize>,
    /// Rebuild events that already have rows
    pub force_rebuild: bool,
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS.to_vec(),
            force_rebuild: false,
        }
    }
}

/// All snapshots computed for one event
#[derive(Debug, Clone)]
pub struct PitEventStats {
    pub event: EventKey,
    pub cutoff: NaiveDate,
    pub rolling: Vec<PitRollingStat>,
    pub course: Vec<PitCourseStat>,
}

/// Outcome of a multi-event build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSummary {
    pub events_built: usize,
    pub events_skipped: usize,
    pub rows_written: usize,
    pub failures: Vec<(EventKey, String)>,
}

/// Result of a passing leakage audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub event: EventKey,
    pub cutoff: NaiveDate,
    pub players_checked: usize,
    pub rows_checked: usize,
}

/// Per-key mutual exclusion for single-event rebuilds
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<EventKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`
    pub fn with_lock<T>(&self, key: &EventKey, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(key.clone()).or_default().clone()
        };
        let _guard = lock.lock();
        f()
    }
}

/// Builds and audits PIT tables from an immutable round history
pub struct PitBuilder<'a> {
    history: &'a RoundHistory,
    calendar: &'a EventCalendar,
    config: PitConfig,
    locks: Arc<KeyedLocks>,
}

impl<'a> PitBuilder<'a> {
    pub fn new(history: &'a RoundHistory, calendar: &'a EventCalendar, config: PitConfig) -> Self {
        Self {
            history,
            calendar,
            config,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Share rebuild locks with other builders writing to the same store
    pub fn with_locks(mut self, locks: Arc<KeyedLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &PitConfig {
        &self.config
    }

    /// Compute an event's snapshots without touching storage
    pub fn compute_event(&self, event: &EventKey) -> Result<PitEventStats> {
        let cutoff = self.calendar.cutoff_date(event)?;
        let rolling = build_rolling_stats(self.history, event, cutoff, &self.config.windows);
        let course = match self.calendar.course_id(event) {
            Some(course_id) => build_course_stats(self.history, event, course_id, cutoff),
            None => Vec::new(),
        };

        debug!(
            "Computed {} rolling and {} course rows for {} (cutoff {})",
            rolling.len(),
            course.len(),
            event,
            cutoff
        );

        Ok(PitEventStats {
            event: event.clone(),
            cutoff,
            rolling,
            course,
        })
    }

    /// Rebuild one event: compute, then delete and reinsert under its lock
    pub fn build_event<S: PitStore>(&self, store: &S, event: &EventKey) -> Result<usize> {
        let stats = self.compute_event(event)?;
        self.write_event(store, &stats)
    }

    fn write_event<S: PitStore>(&self, store: &S, stats: &PitEventStats) -> Result<usize> {
        let written = self
            .locks
            .with_lock(&stats.event, || store.replace_pit_stats(stats))?;
        info!("Built {} PIT rows for event {}", written, stats.event);
        Ok(written)
    }

    /// Build every event of the given seasons.
    ///
    /// Snapshots are computed in parallel and written in cutoff order. Events
    /// that already have rows are skipped unless `force_rebuild` is set. A
    /// failing event is logged and recorded without stopping the run.
    pub fn build_years<S: PitStore + Sync>(&self, store: &S, years: &[i32]) -> BuildSummary {
        let mut summary = BuildSummary::default();

        let mut pending: Vec<EventKey> = Vec::new();
        let mut ordered: Vec<(EventKey, NaiveDate)> = years
            .iter()
            .flat_map(|&year| self.calendar.events_in_year(year))
            .collect();
        ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        for (event, _) in ordered {
            if !self.config.force_rebuild {
                match store.has_pit_stats(&event) {
                    Ok(true) => {
                        debug!("PIT rows exist for {}, skipping", event);
                        summary.events_skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Could not check PIT rows for {}: {}", event, e);
                        summary.failures.push((event, e.to_string()));
                        continue;
                    }
                }
            }
            pending.push(event);
        }

        let computed: Vec<(EventKey, Result<PitEventStats>)> = pending
            .par_iter()
            .map(|event| (event.clone(), self.compute_event(event)))
            .collect();

        // par_iter preserves input order, so writes follow cutoff order
        for (event, result) in computed {
            match result.and_then(|stats| self.write_event(store, &stats)) {
                Ok(rows) => {
                    summary.events_built += 1;
                    summary.rows_written += rows;
                }
                Err(e) => {
                    warn!("PIT build failed for {}: {}", event, e);
                    summary.failures.push((event, e.to_string()));
                }
            }
        }

        info!(
            "PIT build complete: {} built, {} skipped, {} failed, {} rows",
            summary.events_built,
            summary.events_skipped,
            summary.failures.len(),
            summary.rows_written
        );
        summary
    }

    /// Verify stored rolling snapshots for an event.
    ///
    /// Checks every stored row of `player`, or of the whole stored field when
    /// no player is named:
    /// - `rounds_used <= window`
    /// - `rounds_used` does not exceed the rounds actually available before
    ///   the cutoff (own event excluded)
    /// - the latest contributing round predates the cutoff
    /// - the stored cutoff matches the calendar's cutoff
    pub fn audit_leakage<S: PitStore>(
        &self,
        store: &S,
        event: &EventKey,
        player: Option<&str>,
    ) -> Result<AuditReport> {
        let cutoff = self.calendar.cutoff_date(event)?;
        let rows: Vec<PitRollingStat> = store
            .rolling_stats(event, None)?
            .into_iter()
            .filter(|row| player.map_or(true, |p| row.player_key == p))
            .collect();

        let mut available: HashMap<String, usize> = HashMap::new();
        for row in &rows {
            let count = *available
                .entry(row.player_key.clone())
                .or_insert_with(|| self.history.prior_rounds(&row.player_key, cutoff, event).len());

            let violation = if row.rounds_used > row.window {
                Some(format!(
                    "rounds_used {} exceeds window {}",
                    row.rounds_used, row.window
                ))
            } else if row.rounds_used > count {
                Some(format!(
                    "rounds_used {} exceeds {} rounds available before {}",
                    row.rounds_used, count, cutoff
                ))
            } else if row.latest_round_date >= row.cutoff_date {
                Some(format!(
                    "latest round {} not before cutoff {}",
                    row.latest_round_date, row.cutoff_date
                ))
            } else if row.cutoff_date != cutoff {
                Some(format!(
                    "stored cutoff {} differs from event cutoff {}",
                    row.cutoff_date, cutoff
                ))
            } else {
                None
            };

            if let Some(detail) = violation {
                error!(
                    "Leakage detected for {} player {} window {}: {}",
                    event, row.player_key, row.window, detail
                );
                return Err(BacktestError::LeakageDetected {
                    event: event.clone(),
                    player: row.player_key.clone(),
                    detail,
                });
            }
        }

        info!(
            "Leakage audit passed for {}: {} rows across {} players",
            event,
            rows.len(),
            available.len()
        );
        Ok(AuditReport {
            event: event.clone(),
            cutoff,
            players_checked: available.len(),
            rows_checked: rows.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::history::tests::{date, round};

    /// In-memory PIT store for builder tests
    #[derive(Default)]
    pub(crate) struct MemoryPitStore {
        pub rows: Mutex<HashMap<EventKey, PitEventStats>>,
        pub writes: Mutex<Vec<EventKey>>,
    }

    impl PitStore for MemoryPitStore {
        fn has_pit_stats(&self, event: &EventKey) -> Result<bool> {
            Ok(self.rows.lock().contains_key(event))
        }

        fn replace_pit_stats(&self, stats: &PitEventStats) -> Result<usize> {
            self.writes.lock().push(stats.event.clone());
            self.rows.lock().insert(stats.event.clone(), stats.clone());
            Ok(stats.rolling.len() + stats.course.len())
        }

        fn rolling_stats(&self, event: &EventKey, window: Option<usize>) -> Result<Vec<PitRollingStat>> {
            Ok(self
                .rows
                .lock()
                .get(event)
                .map(|s| {
                    s.rolling
                        .iter()
                        .filter(|r| window.map_or(true, |w| r.window == w))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        fn course_stats(&self, event: &EventKey) -> Result<Vec<PitCourseStat>> {
            Ok(self
                .rows
                .lock()
                .get(event)
                .map(|s| s.course.clone())
                .unwrap_or_default())
        }
    }

    fn season() -> RoundHistory {
        let mut rounds = Vec::new();
        for (i, (event, day)) in [("e1", 7u32), ("e2", 14), ("e3", 21), ("e4", 28)]
            .iter()
            .enumerate()
        {
            for player in ["a", "b", "c"] {
                for rn in 1..=4u8 {
                    rounds.push(round(player, event, date(2024, 1, *day), rn, Some(i as f64)));
                }
            }
        }
        RoundHistory::from_rounds(rounds)
    }

    #[test]
    fn test_build_years_writes_in_chronological_order() {
        let history = season();
        let calendar = EventCalendar::build(Vec::new(), &history);
        let builder = PitBuilder::new(&history, &calendar, PitConfig::default());
        let store = MemoryPitStore::default();

        let summary = builder.build_years(&store, &[2024]);
        // e1 has no earlier event and therefore no cutoff
        assert_eq!(summary.events_built, 3);
        let writes: Vec<String> = store.writes.lock().iter().map(|k| k.event_id.clone()).collect();
        assert_eq!(writes, vec!["e2", "e3", "e4"]);

        // Second run skips everything unless forced
        let again = builder.build_years(&store, &[2024]);
        assert_eq!(again.events_built, 0);
        assert_eq!(again.events_skipped, 3);

        let forced = PitBuilder::new(
            &history,
            &calendar,
            PitConfig {
                force_rebuild: true,
                ..PitConfig::default()
            },
        );
        assert_eq!(forced.build_years(&store, &[2024]).events_built, 3);
    }

    #[test]
    fn test_build_event_missing_cutoff_errors() {
        let history = season();
        let calendar = EventCalendar::build(Vec::new(), &history);
        let builder = PitBuilder::new(&history, &calendar, PitConfig::default());
        let store = MemoryPitStore::default();
        let err = builder
            .build_event(&store, &EventKey::new("e1", 2024))
            .unwrap_err();
        assert!(matches!(err, BacktestError::MissingCutoff(_)));
    }

    #[test]
    fn test_audit_passes_on_clean_build() {
        let history = season();
        let calendar = EventCalendar::build(Vec::new(), &history);
        let builder = PitBuilder::new(&history, &calendar, PitConfig::default());
        let store = MemoryPitStore::default();
        let event = EventKey::new("e4", 2024);

        builder.build_event(&store, &event).unwrap();
        let report = builder.audit_leakage(&store, &event, None).unwrap();
        assert_eq!(report.players_checked, 3);
        assert!(builder.audit_leakage(&store, &event, Some("a")).is_ok());
    }

    #[test]
    fn test_audit_detects_tampered_rows() {
        let history = season();
        let calendar = EventCalendar::build(Vec::new(), &history);
        let builder = PitBuilder::new(&history, &calendar, PitConfig::default());
        let store = MemoryPitStore::default();
        let event = EventKey::new("e3", 2024);

        let mut stats = builder.compute_event(&event).unwrap();
        // Pretend the event's own rounds were counted
        for row in stats.rolling.iter_mut().filter(|r| r.player_key == "b") {
            row.rounds_used += 4;
        }
        store.replace_pit_stats(&stats).unwrap();

        let err = builder.audit_leakage(&store, &event, Some("b")).unwrap_err();
        match err {
            BacktestError::LeakageDetected { player, .. } => assert_eq!(player, "b"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_keyed_locks_run_closure() {
        let locks = KeyedLocks::new();
        let key = EventKey::new("e1", 2024);
        assert_eq!(locks.with_lock(&key, || 7), 7);
        assert_eq!(locks.with_lock(&key, || 8), 8);
    }

    #[test]
    fn test_shared_locks_serialize_concurrent_rebuilds() {
        let history = season();
        let calendar = EventCalendar::build(Vec::new(), &history);
        let locks = Arc::new(KeyedLocks::new());
        let first = PitBuilder::new(&history, &calendar, PitConfig::default()).with_locks(locks.clone());
        let second = PitBuilder::new(&history, &calendar, PitConfig::default()).with_locks(locks);
        let store = MemoryPitStore::default();
        let event = EventKey::new("e3", 2024);

        std::thread::scope(|s| {
            let a = s.spawn(|| first.build_event(&store, &event));
            let b = s.spawn(|| second.build_event(&store, &event));
            assert!(a.join().unwrap().is_ok());
            assert!(b.join().unwrap().is_ok());
        });

        assert_eq!(store.writes.lock().len(), 2);
        assert!(first.audit_leakage(&store, &event, None).is_ok());
    }
}
