use std::{env, error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The environment variable holding the JSON encoded `ClusterSpec`.
pub const CLUSTER_CONFIG_ENV: &str = "CLUSTER_CONFIG";

/// The environment variable selecting the connection failure handling mode.
pub const FAIL_FAST_ENV: &str = "RPC_FAIL_FAST";

/// Failures while assembling or reading a cluster descriptor.
#[derive(Debug)]
pub enum ClusterErr {
    EmptyHostList,
    EmptyHost { position: usize },
    IndexOutOfRange { index: usize, workers: usize },
    MissingEnv(&'static str),
    InvalidJson(serde_json::Error),
    InvalidFailFast(String),
}

impl fmt::Display for ClusterErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterErr::EmptyHostList => write!(f, "the worker host list is empty"),
            ClusterErr::EmptyHost { position } => {
                write!(f, "the worker host at position {position} is empty")
            }
            ClusterErr::IndexOutOfRange { index, workers } => write!(
                f,
                "task index {index} is out of range for a cluster of {workers} workers"
            ),
            ClusterErr::MissingEnv(var) => write!(f, "environment variable {var} is not set"),
            ClusterErr::InvalidJson(e) => write!(f, "invalid cluster descriptor: {e}"),
            ClusterErr::InvalidFailFast(value) => write!(
                f,
                "invalid {FAIL_FAST_ENV} value {value:?}, expected true, false or use_caller"
            ),
        }
    }
}

impl Error for ClusterErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClusterErr::InvalidJson(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClusterErr {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidJson(value)
    }
}

/// The role of a process inside the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Worker,
}

/// The addresses of every member of the cluster, grouped by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDef {
    pub worker: Vec<String>,
}

/// This process' place inside the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub index: usize,
}

/// Cluster topology descriptor.
///
/// Serialized as `{"cluster":{"worker":[..]},"task":{"type":"worker","index":i}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub cluster: ClusterDef,
    pub task: TaskSpec,
}

impl ClusterSpec {
    /// Assembles a descriptor for a worker out of a comma separated host list.
    ///
    /// # Arguments
    /// * `worker_hosts` - The `host:port` of every worker, separated by commas.
    /// * `task_index` - The position of this process inside `worker_hosts`.
    ///
    /// # Returns
    /// A validated `ClusterSpec` or the reason why it is not valid.
    pub fn from_hosts(worker_hosts: &str, task_index: usize) -> Result<Self, ClusterErr> {
        let worker = worker_hosts
            .split(',')
            .map(|host| host.trim().to_string())
            .collect();

        let spec = Self {
            cluster: ClusterDef { worker },
            task: TaskSpec {
                kind: TaskType::Worker,
                index: task_index,
            },
        };

        spec.validate()?;
        Ok(spec)
    }

    /// Checks that the host list is usable and that the task index points into it.
    pub fn validate(&self) -> Result<(), ClusterErr> {
        let workers = &self.cluster.worker;
        if workers.is_empty() {
            return Err(ClusterErr::EmptyHostList);
        }

        if let Some(position) = workers.iter().position(|host| host.is_empty()) {
            return Err(ClusterErr::EmptyHost { position });
        }

        if self.task.index >= workers.len() {
            return Err(ClusterErr::IndexOutOfRange {
                index: self.task.index,
                workers: workers.len(),
            });
        }

        Ok(())
    }

    /// Encodes the descriptor as the value expected in `CLUSTER_CONFIG`.
    pub fn to_json(&self) -> String {
        // SAFETY: The Serialize impl is derived and only holds strings and integers.
        serde_json::to_string(self).unwrap()
    }

    /// Decodes and validates a descriptor.
    pub fn from_json(value: &str) -> Result<Self, ClusterErr> {
        let spec: Self = serde_json::from_str(value)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Reads the descriptor from the `CLUSTER_CONFIG` environment variable.
    pub fn from_env() -> Result<Self, ClusterErr> {
        let value = env::var(CLUSTER_CONFIG_ENV).map_err(|_| ClusterErr::MissingEnv(CLUSTER_CONFIG_ENV))?;
        Self::from_json(&value)
    }

    pub fn workers(&self) -> &[String] {
        &self.cluster.worker
    }

    pub fn num_workers(&self) -> usize {
        self.cluster.worker.len()
    }

    pub fn task_index(&self) -> usize {
        self.task.index
    }

    /// The first worker coordinates the run.
    pub fn is_chief(&self) -> bool {
        self.task.index == 0
    }

    /// This worker's own address.
    pub fn own_host(&self) -> &str {
        &self.cluster.worker[self.task.index]
    }

    /// The address of the next worker along the ring.
    pub fn successor_host(&self) -> &str {
        &self.cluster.worker[(self.task.index + 1) % self.num_workers()]
    }

    /// The index of the previous worker along the ring.
    pub fn predecessor_index(&self) -> usize {
        let n = self.num_workers();
        (self.task.index + n - 1) % n
    }
}

/// How connection failures towards other workers are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailFast {
    /// Give up after the first failed attempt.
    Enabled,
    /// Keep retrying until the peer shows up.
    #[default]
    Disabled,
    /// Defer to the retry policy configured by the caller.
    UseCaller,
}

impl FailFast {
    pub fn as_str(self) -> &'static str {
        match self {
            FailFast::Enabled => "true",
            FailFast::Disabled => "false",
            FailFast::UseCaller => "use_caller",
        }
    }

    /// Reads the mode from `RPC_FAIL_FAST`, defaulting to `Disabled` when unset.
    pub fn from_env() -> Result<Self, ClusterErr> {
        match env::var(FAIL_FAST_ENV) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }
}

impl FromStr for FailFast {
    type Err = ClusterErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Self::Enabled),
            "false" | "0" => Ok(Self::Disabled),
            "use_caller" => Ok(Self::UseCaller),
            _ => Err(ClusterErr::InvalidFailFast(s.to_string())),
        }
    }
}
