use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized player identifier (lowercase, collaborator-normalized name or id)
pub type PlayerKey = String;

/// (event_id, year) pair identifying one tournament edition
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub event_id: String,
    pub year: i32,
}

impl EventKey {
    pub fn new(event_id: impl Into<String>, year: i32) -> Self {
        Self {
            event_id: event_id.into(),
            year,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.year)
    }
}

/// Strokes-gained categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SgCategory {
    Total,
    OffTee,
    Approach,
    AroundGreen,
    Putting,
    TeeToGreen,
}

impl SgCategory {
    /// Categories averaged by the PIT builders
    pub const ALL: [SgCategory; 6] = [
        SgCategory::Total,
        SgCategory::OffTee,
        SgCategory::Approach,
        SgCategory::AroundGreen,
        SgCategory::Putting,
        SgCategory::TeeToGreen,
    ];

    /// Categories blended by the scorers and the replay composite
    pub const SCORED: [SgCategory; 5] = [
        SgCategory::Total,
        SgCategory::Approach,
        SgCategory::OffTee,
        SgCategory::Putting,
        SgCategory::AroundGreen,
    ];
}

/// Per-category strokes-gained values; `None` when the source had no figure
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SgLine {
    pub total: Option<f64>,
    pub off_tee: Option<f64>,
    pub approach: Option<f64>,
    pub around_green: Option<f64>,
    pub putting: Option<f64>,
    pub tee_to_green: Option<f64>,
}

impl SgLine {
    pub fn get(&self, category: SgCategory) -> Option<f64> {
        match category {
            SgCategory::Total => self.total,
            SgCategory::OffTee => self.off_tee,
            SgCategory::Approach => self.approach,
            SgCategory::AroundGreen => self.around_green,
            SgCategory::Putting => self.putting,
            SgCategory::TeeToGreen => self.tee_to_green,
        }
    }

    pub fn set(&mut self, category: SgCategory, value: Option<f64>) {
        match category {
            SgCategory::Total => self.total = value,
            SgCategory::OffTee => self.off_tee = value,
            SgCategory::Approach => self.approach = value,
            SgCategory::AroundGreen => self.around_green = value,
            SgCategory::Putting => self.putting = value,
            SgCategory::TeeToGreen => self.tee_to_green = value,
        }
    }

    /// Average each category over the non-null values of the given lines
    pub fn average<'a, I>(lines: I) -> SgLine
    where
        I: IntoIterator<Item = &'a SgLine> + Clone,
    {
        let mut avg = SgLine::default();
        for category in SgCategory::ALL {
            let values: Vec<f64> = lines
                .clone()
                .into_iter()
                .filter_map(|l| l.get(category))
                .collect();
            if !values.is_empty() {
                avg.set(
                    category,
                    Some(values.iter().sum::<f64>() / values.len() as f64),
                );
            }
        }
        avg
    }
}

/// One player's single-round performance. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalRound {
    pub player_key: PlayerKey,
    pub event_id: String,
    pub year: i32,
    /// Completion date of the event the round belongs to
    pub event_completed: NaiveDate,
    pub course_id: Option<String>,
    pub round_num: u8,
    pub finish_text: Option<String>,
    pub sg: SgLine,
}

impl HistoricalRound {
    pub fn event_key(&self) -> EventKey {
        EventKey::new(self.event_id.clone(), self.year)
    }

    pub fn belongs_to(&self, event: &EventKey) -> bool {
        self.year == event.year && self.event_id == event.event_id
    }
}

/// Event metadata; dates may be missing for older archive entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInfo {
    pub event_id: String,
    pub year: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub course_id: Option<String>,
}

impl EventInfo {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.event_id.clone(), self.year)
    }
}

/// Bet market types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "win")]
    Win,
    #[serde(rename = "top_5")]
    Top5,
    #[serde(rename = "top_10")]
    Top10,
    #[serde(rename = "top_20")]
    Top20,
    #[serde(rename = "make_cut")]
    MakeCut,
    #[serde(rename = "matchup")]
    Matchup,
}

impl Market {
    /// Markets the replay engine prices from the field softmax
    pub const FIELD_MARKETS: [Market; 5] = [
        Market::Win,
        Market::Top5,
        Market::Top10,
        Market::Top20,
        Market::MakeCut,
    ];

    /// Highest finishing position that still pays, for placement markets
    pub fn placement_threshold(&self) -> Option<u32> {
        match self {
            Market::Win => Some(1),
            Market::Top5 => Some(5),
            Market::Top10 => Some(10),
            Market::Top20 => Some(20),
            Market::MakeCut | Market::Matchup => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Win => "win",
            Market::Top5 => "top_5",
            Market::Top10 => "top_10",
            Market::Top20 => "top_20",
            Market::MakeCut => "make_cut",
            Market::Matchup => "matchup",
        }
    }

    /// Parse upstream market labels; accepts both `top5` and `top_5` spellings
    pub fn parse(label: &str) -> Option<Market> {
        match label.trim().to_lowercase().as_str() {
            "win" | "outright" => Some(Market::Win),
            "top_5" | "top5" => Some(Market::Top5),
            "top_10" | "top10" => Some(Market::Top10),
            "top_20" | "top20" => Some(Market::Top20),
            "make_cut" | "makecut" => Some(Market::MakeCut),
            "matchup" => Some(Market::Matchup),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archived price for one (event, player, market, book)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuote {
    pub event_id: String,
    pub year: i32,
    pub player_key: PlayerKey,
    pub market: Market,
    pub book: String,
    /// American price at close
    pub close_line: Option<i32>,
}
