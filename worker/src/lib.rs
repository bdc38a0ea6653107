pub mod config;
pub mod data;
pub mod error;
pub mod net;
pub mod strategy;
pub mod trainer;

pub use config::{ConnectOptions, RetryPolicy, TrainConfig};
pub use data::{DistributedDataset, InputContext, ShardSpec};
pub use error::{Result, WorkerErr};
pub use net::{Ring, TcpRing};
pub use strategy::MultiWorkerStrategy;
pub use trainer::{EpochStats, Trainer};
