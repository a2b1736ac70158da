//! CSV boundary loading for rounds, event metadata and archived odds
//!
//! Upstream exports disagree on column types (ids arrive as ints or text,
//! SG columns can be entirely empty), so every column is cast to the
//! canonical type before it is read. Rows missing a required field are
//! skipped and counted.

use chrono::NaiveDate;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{EventInfo, HistoricalRound, Market, OddsQuote, SgLine};

/// SG column names in upstream exports, in `SgCategory::ALL` order
const SG_COLUMNS: [&str; 6] = ["sg_total", "sg_ott", "sg_app", "sg_arg", "sg_putt", "sg_t2g"];

fn read_csv<P: AsRef<Path>>(csv_path: P) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(csv_path.as_ref().to_path_buf()))?
        .finish()
}

/// Cast a column to text; `None` when the column is absent
fn str_column(df: &DataFrame, name: &str) -> PolarsResult<Option<StringChunked>> {
    match df.column(name) {
        Ok(series) => Ok(Some(series.cast(&DataType::String)?.str()?.clone())),
        Err(_) => Ok(None),
    }
}

fn f64_column(df: &DataFrame, name: &str) -> PolarsResult<Option<Float64Chunked>> {
    match df.column(name) {
        Ok(series) => Ok(Some(series.cast(&DataType::Float64)?.f64()?.clone())),
        Err(_) => Ok(None),
    }
}

fn i64_column(df: &DataFrame, name: &str) -> PolarsResult<Option<Int64Chunked>> {
    match df.column(name) {
        Ok(series) => Ok(Some(series.cast(&DataType::Int64)?.i64()?.clone())),
        Err(_) => Ok(None),
    }
}

fn required<T>(column: Option<T>, name: &str) -> PolarsResult<T> {
    column.ok_or_else(|| PolarsError::ColumnNotFound(name.to_string().into()))
}

fn text_at(column: &Option<StringChunked>, i: usize) -> Option<String> {
    column
        .as_ref()
        .and_then(|c| c.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn date_at(column: &Option<StringChunked>, i: usize) -> Option<NaiveDate> {
    text_at(column, i).and_then(|s| parse_date(&s))
}

/// Parse `YYYY-MM-DD`, tolerating a trailing time component
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let day = text.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Canonical player key: trimmed, lowercase, single-spaced
pub fn normalize_player_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Load historical rounds.
///
/// Required columns: `player_key`, `event_id`, `year`, `event_completed`,
/// `round_num`. Optional: `course_id`, `fin_text`, and the SG columns.
pub fn load_rounds<P: AsRef<Path>>(csv_path: P) -> Result<Vec<HistoricalRound>> {
    let df = read_csv(&csv_path)?;

    let player_col = required(str_column(&df, "player_key")?, "player_key")?;
    let event_col = required(str_column(&df, "event_id")?, "event_id")?;
    let year_col = required(i64_column(&df, "year")?, "year")?;
    let completed_col = str_column(&df, "event_completed")?;
    let round_col = required(i64_column(&df, "round_num")?, "round_num")?;
    let course_col = str_column(&df, "course_id")?;
    let finish_col = str_column(&df, "fin_text")?;

    let mut sg_cols = Vec::with_capacity(SG_COLUMNS.len());
    for name in SG_COLUMNS {
        sg_cols.push(f64_column(&df, name)?);
    }

    let mut rounds = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for i in 0..df.height() {
        let (Some(player), Some(event_id), Some(year), Some(completed), Some(round_num)) = (
            player_col.get(i),
            event_col.get(i),
            year_col.get(i),
            date_at(&completed_col, i),
            round_col.get(i),
        ) else {
            skipped += 1;
            continue;
        };

        let mut sg = SgLine::default();
        for (category, column) in crate::models::SgCategory::ALL.iter().zip(&sg_cols) {
            let value = column
                .as_ref()
                .and_then(|c| c.get(i))
                .filter(|v| v.is_finite());
            sg.set(*category, value);
        }

        rounds.push(HistoricalRound {
            player_key: normalize_player_key(player),
            event_id: event_id.trim().to_string(),
            year: year as i32,
            event_completed: completed,
            course_id: text_at(&course_col, i),
            round_num: round_num.clamp(0, u8::MAX as i64) as u8,
            finish_text: text_at(&finish_col, i),
            sg,
        });
    }

    if skipped > 0 {
        debug!("Skipped {} round rows with missing required fields", skipped);
    }
    info!("Loaded {} rounds from {}", rounds.len(), csv_path.as_ref().display());
    Ok(rounds)
}

/// Load event metadata.
///
/// Required columns: `event_id`, `year`. Optional: `start_date`,
/// `end_date`, `course_id`.
pub fn load_events<P: AsRef<Path>>(csv_path: P) -> Result<Vec<EventInfo>> {
    let df = read_csv(&csv_path)?;

    let event_col = required(str_column(&df, "event_id")?, "event_id")?;
    let year_col = required(i64_column(&df, "year")?, "year")?;
    let start_col = str_column(&df, "start_date")?;
    let end_col = str_column(&df, "end_date")?;
    let course_col = str_column(&df, "course_id")?;

    let mut events = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        if let (Some(event_id), Some(year)) = (event_col.get(i), year_col.get(i)) {
            events.push(EventInfo {
                event_id: event_id.trim().to_string(),
                year: year as i32,
                start_date: date_at(&start_col, i),
                end_date: date_at(&end_col, i),
                course_id: text_at(&course_col, i),
            });
        }
    }

    info!("Loaded {} events from {}", events.len(), csv_path.as_ref().display());
    Ok(events)
}

/// Load archived odds.
///
/// Required columns: `event_id`, `year`, `player_key`, `market`, `book`.
/// `close_line` is an American price and may be empty. Unknown markets are
/// skipped.
pub fn load_odds<P: AsRef<Path>>(csv_path: P) -> Result<Vec<OddsQuote>> {
    let df = read_csv(&csv_path)?;

    let event_col = required(str_column(&df, "event_id")?, "event_id")?;
    let year_col = required(i64_column(&df, "year")?, "year")?;
    let player_col = required(str_column(&df, "player_key")?, "player_key")?;
    let market_col = required(str_column(&df, "market")?, "market")?;
    let book_col = str_column(&df, "book")?;
    let close_col = i64_column(&df, "close_line")?;

    let mut quotes = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for i in 0..df.height() {
        let (Some(event_id), Some(year), Some(player), Some(market)) = (
            event_col.get(i),
            year_col.get(i),
            player_col.get(i),
            market_col.get(i).and_then(Market::parse),
        ) else {
            skipped += 1;
            continue;
        };

        quotes.push(OddsQuote {
            event_id: event_id.trim().to_string(),
            year: year as i32,
            player_key: normalize_player_key(player),
            market,
            book: text_at(&book_col, i).unwrap_or_else(|| "unknown".to_string()),
            close_line: close_col
                .as_ref()
                .and_then(|c| c.get(i))
                .and_then(|v| i32::try_from(v).ok())
                .filter(|v| *v != 0),
        });
    }

    if skipped > 0 {
        debug!("Skipped {} odds rows with missing fields or unknown market", skipped);
    }
    info!("Loaded {} odds quotes from {}", quotes.len(), csv_path.as_ref().display());
    Ok(quotes)
}
