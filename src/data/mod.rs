//! Historical data loading and indexing

pub mod calendar;
pub mod csv_loader;
pub mod history;
pub mod odds_loader;

// Re-export commonly used types
pub use calendar::EventCalendar;
pub use csv_loader::{load_events, load_odds, load_rounds};
pub use history::RoundHistory;
pub use odds_loader::OddsArchive;
