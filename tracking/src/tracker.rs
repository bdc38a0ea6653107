use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// A session of an experiment tracking backend.
#[async_trait]
pub trait Tracker: Send {
    /// The key identifying the experiment inside its backend.
    fn experiment_key(&self) -> &str;

    /// Records a piece of run metadata.
    async fn log_other(&mut self, key: &str, value: Value) -> Result<()>;

    /// Records the value of a metric at the end of `epoch`.
    async fn log_metric(&mut self, name: &str, value: f64, epoch: usize) -> Result<()>;

    /// Flushes and closes the session, further logging fails.
    async fn end(&mut self) -> Result<()>;
}
