//! Point-in-time statistics
//!
//! Snapshots of each player's strokes-gained record as it stood before an
//! event started. No snapshot may use a round completed on or after the
//! event's cutoff, nor any round of the event itself.

pub mod builder;
pub mod course;
pub mod rolling;

pub use builder::{AuditReport, BuildSummary, KeyedLocks, PitBuilder, PitConfig, PitEventStats, PitStore};
pub use course::{build_course_stats, PitCourseStat};
pub use rolling::{build_rolling_stats, PitRollingStat, DEFAULT_WINDOWS};
