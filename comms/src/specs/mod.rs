pub mod cluster;

pub use cluster::{CLUSTER_CONFIG_ENV, ClusterErr, ClusterSpec, FAIL_FAST_ENV, FailFast, TaskType};
