use std::{fmt, path::Path, str::FromStr};

use serde_json::Value;

use crate::{CometConfig, CometTracker, OfflineTracker, Result, Tracker, TrackingErr};

/// The backends an experiment can be logged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerKind {
    /// JSON lines on the local filesystem.
    #[default]
    Offline,
    /// The Comet REST API.
    Comet,
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerKind::Offline => write!(f, "offline"),
            TrackerKind::Comet => write!(f, "comet"),
        }
    }
}

impl FromStr for TrackerKind {
    type Err = TrackingErr;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "comet" => Ok(Self::Comet),
            _ => Err(TrackingErr::UnknownKind(s.to_string())),
        }
    }
}

/// A tracked experiment, independent of where it is logged to.
pub struct Experiment {
    tracker: Box<dyn Tracker>,
}

impl Experiment {
    /// Opens a new experiment.
    ///
    /// # Arguments
    /// * `kind` - The backend to log to.
    /// * `project_name` - The project the experiment belongs to.
    /// * `dir` - Where offline experiments are written, unused by other backends.
    pub async fn open<P: AsRef<Path>>(kind: TrackerKind, project_name: &str, dir: P) -> Result<Self> {
        let tracker: Box<dyn Tracker> = match kind {
            TrackerKind::Offline => Box::new(OfflineTracker::create(dir, project_name).await?),
            TrackerKind::Comet => {
                let config = CometConfig::from_env()?;
                Box::new(CometTracker::create(config, project_name).await?)
            }
        };

        Ok(Self::from_tracker(tracker))
    }

    pub fn from_tracker(tracker: Box<dyn Tracker>) -> Self {
        Self { tracker }
    }

    pub fn key(&self) -> &str {
        self.tracker.experiment_key()
    }

    pub async fn log_other<V: Into<Value>>(&mut self, key: &str, value: V) -> Result<()> {
        self.tracker.log_other(key, value.into()).await
    }

    pub async fn log_metric(&mut self, name: &str, value: f64, epoch: usize) -> Result<()> {
        self.tracker.log_metric(name, value, epoch).await
    }

    pub async fn end(mut self) -> Result<()> {
        self.tracker.end().await
    }
}
