//! Strategy experiments: tracking, significance and exploration

pub mod explore;
pub mod significance;
pub mod tracker;

pub use explore::{generate_neighbors, ExploreConfig};
pub use significance::{bootstrap_roi, evaluate_returns, evaluate_roi, BootstrapInterval, SignificanceConfig, SignificanceVerdict};
pub use tracker::{
    ActiveStrategy, Experiment, ExperimentStatus, ExperimentStore, ExperimentSummary, ExperimentTracker,
    LeaderboardEntry, NewExperiment, GLOBAL_SCOPE,
};
