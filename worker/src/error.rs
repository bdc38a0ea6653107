use std::{error::Error, fmt, io};

use comms::specs::ClusterErr;
use machine_learning::MlErr;
use tokio::task::JoinError;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Ml(MlErr),
    Cluster(ClusterErr),
    Connect {
        addr: String,
        attempts: usize,
        source: io::Error,
    },
    Handshake(String),
    Peer(String),
    UnexpectedMessage {
        during: &'static str,
        got: &'static str,
    },
    LengthMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Compute(JoinError),
    ReplicaLost,
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Ml(e) => write!(f, "training error: {e}"),
            WorkerErr::Cluster(e) => write!(f, "cluster error: {e}"),
            WorkerErr::Connect {
                addr,
                attempts,
                source,
            } => write!(
                f,
                "could not connect to {addr} after {attempts} attempt(s): {source}"
            ),
            WorkerErr::Handshake(reason) => write!(f, "ring handshake failed: {reason}"),
            WorkerErr::Peer(reason) => write!(f, "peer reported an error: {reason}"),
            WorkerErr::UnexpectedMessage { during, got } => {
                write!(f, "unexpected message during {during}: got {got}")
            }
            WorkerErr::LengthMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} length mismatch: got {got}, expected {expected}"),
            WorkerErr::Compute(e) => write!(f, "compute task failed: {e}"),
            WorkerErr::ReplicaLost => {
                write!(f, "replica state was lost by a previously failed step")
            }
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Ml(e) => Some(e),
            WorkerErr::Cluster(e) => Some(e),
            WorkerErr::Connect { source, .. } => Some(source),
            WorkerErr::Compute(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<ClusterErr> for WorkerErr {
    fn from(value: ClusterErr) -> Self {
        Self::Cluster(value)
    }
}

impl From<JoinError> for WorkerErr {
    fn from(value: JoinError) -> Self {
        Self::Compute(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
