//! Historical odds archive
//!
//! Archived closing lines are model-derived rather than real sportsbook
//! prices, so every price is shortened by the strategy's vig factor before
//! use. The best vigged price per (player, market) across books wins.

use std::collections::HashMap;
use std::path::Path;

use crate::core::odds::{american_to_decimal, apply_vig};
use crate::data::csv_loader;
use crate::error::Result;
use crate::models::{EventKey, Market, OddsQuote, PlayerKey};

/// Odds quotes indexed by event
#[derive(Debug, Default)]
pub struct OddsArchive {
    by_event: HashMap<EventKey, Vec<OddsQuote>>,
}

impl OddsArchive {
    pub fn from_quotes(quotes: Vec<OddsQuote>) -> Self {
        let mut by_event: HashMap<EventKey, Vec<OddsQuote>> = HashMap::new();
        for quote in quotes {
            by_event
                .entry(EventKey::new(quote.event_id.clone(), quote.year))
                .or_default()
                .push(quote);
        }
        Self { by_event }
    }

    /// Load odds from CSV
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self> {
        Ok(Self::from_quotes(csv_loader::load_odds(csv_path)?))
    }

    pub fn quotes(&self, event: &EventKey) -> &[OddsQuote] {
        self.by_event.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Best vigged American price per (player, market) for an event.
    ///
    /// Quotes without a closing line are ignored.
    pub fn best_prices(&self, event: &EventKey, vig_factor: f64) -> HashMap<(PlayerKey, Market), i32> {
        let mut best: HashMap<(PlayerKey, Market), i32> = HashMap::new();

        for quote in self.quotes(event) {
            let Some(close) = quote.close_line else {
                continue;
            };
            let vigged = apply_vig(close, vig_factor);
            let Some(decimal) = american_to_decimal(vigged) else {
                continue;
            };

            best.entry((quote.player_key.clone(), quote.market))
                .and_modify(|current| {
                    let current_decimal = american_to_decimal(*current).unwrap_or(1.0);
                    if decimal > current_decimal {
                        *current = vigged;
                    }
                })
                .or_insert(vigged);
        }

        best
    }

    /// Number of events with odds
    pub fn len(&self) -> usize {
        self.by_event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}
