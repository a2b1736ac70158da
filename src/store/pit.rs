use rusqlite::{params, Row};

use super::{count_from_sql, Store};
use crate::error::Result;
use crate::models::{EventKey, SgLine};
use crate::pit::builder::{PitEventStats, PitStore};
use crate::pit::course::PitCourseStat;
use crate::pit::rolling::PitRollingStat;

const ROLLING_COLUMNS: &str = "event_id, year, player_key, window_size, sg_total, sg_ott, sg_app, sg_arg, \
     sg_putt, sg_t2g, rounds_used, sg_total_rank, cutoff_date, latest_round_date";

const COURSE_COLUMNS: &str = "event_id, year, player_key, course_id, sg_total, sg_ott, sg_app, sg_arg, \
     sg_putt, sg_t2g, rounds_played, events_played, avg_finish, best_finish, cutoff_date, latest_round_date";

/// SG columns start at `offset`
fn sg_from_row(row: &Row, offset: usize) -> rusqlite::Result<SgLine> {
    Ok(SgLine {
        total: row.get(offset)?,
        off_tee: row.get(offset + 1)?,
        approach: row.get(offset + 2)?,
        around_green: row.get(offset + 3)?,
        putting: row.get(offset + 4)?,
        tee_to_green: row.get(offset + 5)?,
    })
}

fn row_to_rolling(row: &Row) -> rusqlite::Result<PitRollingStat> {
    let window: i64 = row.get(3)?;
    let rounds_used: i64 = row.get(10)?;
    let rank: Option<i64> = row.get(11)?;
    Ok(PitRollingStat {
        event_id: row.get(0)?,
        year: row.get(1)?,
        player_key: row.get(2)?,
        window: count_from_sql(window),
        sg: sg_from_row(row, 4)?,
        rounds_used: count_from_sql(rounds_used),
        sg_total_rank: rank.map(count_from_sql),
        cutoff_date: row.get(12)?,
        latest_round_date: row.get(13)?,
    })
}

fn row_to_course(row: &Row) -> rusqlite::Result<PitCourseStat> {
    let rounds_played: i64 = row.get(10)?;
    let events_played: i64 = row.get(11)?;
    Ok(PitCourseStat {
        event_id: row.get(0)?,
        year: row.get(1)?,
        player_key: row.get(2)?,
        course_id: row.get(3)?,
        sg: sg_from_row(row, 4)?,
        rounds_played: count_from_sql(rounds_played),
        events_played: count_from_sql(events_played),
        avg_finish: row.get(12)?,
        best_finish: row.get(13)?,
        cutoff_date: row.get(14)?,
        latest_round_date: row.get(15)?,
    })
}

impl PitStore for Store {
    fn has_pit_stats(&self, event: &EventKey) -> Result<bool> {
        let conn = self.conn.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pit_rolling_stats WHERE event_id = ?1 AND year = ?2)
                 OR EXISTS(SELECT 1 FROM pit_course_stats WHERE event_id = ?1 AND year = ?2)",
            params![event.event_id, event.year],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn replace_pit_stats(&self, stats: &PitEventStats) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let event = &stats.event;

        tx.execute(
            "DELETE FROM pit_rolling_stats WHERE event_id = ?1 AND year = ?2",
            params![event.event_id, event.year],
        )?;
        tx.execute(
            "DELETE FROM pit_course_stats WHERE event_id = ?1 AND year = ?2",
            params![event.event_id, event.year],
        )?;

        let mut written = 0;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO pit_rolling_stats ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                ROLLING_COLUMNS
            ))?;
            for row in &stats.rolling {
                written += insert.execute(params![
                    row.event_id,
                    row.year,
                    row.player_key,
                    row.window as i64,
                    row.sg.total,
                    row.sg.off_tee,
                    row.sg.approach,
                    row.sg.around_green,
                    row.sg.putting,
                    row.sg.tee_to_green,
                    row.rounds_used as i64,
                    row.sg_total_rank.map(|r| r as i64),
                    row.cutoff_date,
                    row.latest_round_date,
                ])?;
            }

            let mut insert = tx.prepare(&format!(
                "INSERT INTO pit_course_stats ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                COURSE_COLUMNS
            ))?;
            for row in &stats.course {
                written += insert.execute(params![
                    row.event_id,
                    row.year,
                    row.player_key,
                    row.course_id,
                    row.sg.total,
                    row.sg.off_tee,
                    row.sg.approach,
                    row.sg.around_green,
                    row.sg.putting,
                    row.sg.tee_to_green,
                    row.rounds_played as i64,
                    row.events_played as i64,
                    row.avg_finish,
                    row.best_finish,
                    row.cutoff_date,
                    row.latest_round_date,
                ])?;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    fn rolling_stats(&self, event: &EventKey, window: Option<usize>) -> Result<Vec<PitRollingStat>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pit_rolling_stats
             WHERE event_id = ?1 AND year = ?2 AND (?3 IS NULL OR window_size = ?3)
             ORDER BY window_size, player_key",
            ROLLING_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![event.event_id, event.year, window.map(|w| w as i64)],
                row_to_rolling,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn course_stats(&self, event: &EventKey) -> Result<Vec<PitCourseStat>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pit_course_stats WHERE event_id = ?1 AND year = ?2 ORDER BY player_key",
            COURSE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![event.event_id, event.year], row_to_course)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
