pub mod comet;
pub mod error;
pub mod experiment;
pub mod offline;
mod tracker;

pub use comet::{CometConfig, CometTracker};
pub use error::{Result, TrackingErr};
pub use experiment::{Experiment, TrackerKind};
pub use offline::OfflineTracker;
pub use tracker::Tracker;
