use std::{path::PathBuf, time::Duration};

use clap::Parser;
use machine_learning::optimization::Adam;
use tracking::TrackerKind;
use worker::{ConnectOptions, TrainConfig};

/// Trains the Fashion-MNIST classifier as one worker of a synchronous data parallel cluster.
#[derive(Debug, Parser)]
#[command(name = "node", version)]
pub struct Args {
    /// Numeric identifier of the run, logged as experiment metadata.
    #[arg(long = "run_id", allow_negative_numbers = true)]
    pub run_id: i64,

    /// The `host:port` of every worker, separated by commas.
    #[arg(long = "worker_hosts")]
    pub worker_hosts: String,

    /// This worker's position in `worker_hosts`, 0 is the chief.
    #[arg(long = "task_index")]
    pub task_index: usize,

    /// Directory holding the Fashion-MNIST IDX files.
    #[arg(long, env = "FASHION_MNIST_DIR", default_value = "data/fashion-mnist")]
    pub data_dir: PathBuf,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size_per_replica: usize,

    #[arg(long, default_value_t = Adam::DEFAULT_LEARNING_RATE)]
    pub learning_rate: f32,

    /// Seed of the run, the chief picks one at random when missing.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Where the chief logs the experiment: offline or comet.
    #[arg(long, default_value_t = TrackerKind::Offline)]
    pub tracker: TrackerKind,

    /// Directory of offline experiments.
    #[arg(long, default_value = ".tracking")]
    pub tracking_dir: PathBuf,

    /// Attempts to reach the ring successor.
    #[arg(long, default_value_t = 60)]
    pub connect_attempts: usize,

    /// Pause between two connection attempts, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub connect_backoff_ms: u64,
}

impl Args {
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            epochs: self.epochs,
            batch_size_per_replica: self.batch_size_per_replica,
            learning_rate: self.learning_rate,
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            attempts: self.connect_attempts,
            backoff: Duration::from_millis(self.connect_backoff_ms),
        }
    }
}
