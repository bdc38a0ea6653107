use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use serde_json::Value;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use uuid::Uuid;

use crate::{Result, Tracker, TrackingErr};

/// One line of an offline experiment file.
#[derive(Debug, Serialize)]
struct Record<'a> {
    kind: &'a str,
    key: &'a str,
    value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    epoch: Option<usize>,
    timestamp: DateTime<Utc>,
}

/// Writes the experiment as JSON lines to `<dir>/<experiment_key>.jsonl`.
pub struct OfflineTracker {
    key: String,
    path: PathBuf,
    file: Option<File>,
}

impl OfflineTracker {
    /// Starts a new experiment under `dir`, creating the directory if needed.
    pub async fn create<P: AsRef<Path>>(dir: P, project_name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let key = Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("{key}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let mut tracker = Self {
            key,
            path,
            file: Some(file),
        };

        tracker
            .append("start", "project_name", Value::from(project_name), None)
            .await?;
        info!("offline experiment {} at {}", tracker.key, tracker.path.display());
        Ok(tracker)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&mut self, kind: &str, key: &str, value: Value, epoch: Option<usize>) -> Result<()> {
        let file = self.file.as_mut().ok_or(TrackingErr::Ended)?;

        let record = Record {
            kind,
            key,
            value,
            epoch,
            timestamp: Utc::now(),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        file.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl Tracker for OfflineTracker {
    fn experiment_key(&self) -> &str {
        &self.key
    }

    async fn log_other(&mut self, key: &str, value: Value) -> Result<()> {
        self.append("other", key, value, None).await
    }

    async fn log_metric(&mut self, name: &str, value: f64, epoch: usize) -> Result<()> {
        self.append("metric", name, Value::from(value), Some(epoch)).await
    }

    async fn end(&mut self) -> Result<()> {
        self.append("end", "status", Value::from("finished"), None).await?;

        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .await
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn records_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = OfflineTracker::create(dir.path(), "demo").await.unwrap();

        tracker.log_other("run_id", Value::from(12)).await.unwrap();
        tracker.log_metric("train_loss", 0.5, 3).await.unwrap();
        tracker.end().await.unwrap();

        let path = dir.path().join(format!("{}.jsonl", tracker.experiment_key()));
        assert_eq!(tracker.path(), path);

        let records = lines(&path).await;
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["kind"], "start");
        assert_eq!(records[0]["value"], "demo");
        assert_eq!(records[1]["key"], "run_id");
        assert_eq!(records[1]["value"], 12);
        assert!(records[1].get("epoch").is_none());
        assert_eq!(records[2]["kind"], "metric");
        assert_eq!(records[2]["value"], 0.5);
        assert_eq!(records[2]["epoch"], 3);
        assert_eq!(records[3]["kind"], "end");
    }

    #[tokio::test]
    async fn logging_after_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = OfflineTracker::create(dir.path().join("nested"), "demo").await.unwrap();
        tracker.end().await.unwrap();

        let err = tracker.log_metric("train_loss", 1., 0).await.unwrap_err();
        assert!(matches!(err, TrackingErr::Ended));
    }

    #[tokio::test]
    async fn experiments_get_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a = OfflineTracker::create(dir.path(), "demo").await.unwrap();
        let b = OfflineTracker::create(dir.path(), "demo").await.unwrap();

        assert_ne!(a.experiment_key(), b.experiment_key());
        assert_eq!(a.experiment_key().len(), 32);
    }
}
