use std::{error::Error, fmt, io};

/// The tracking module's result type.
pub type Result<T> = std::result::Result<T, TrackingErr>;

/// Experiment tracking failures.
#[derive(Debug)]
pub enum TrackingErr {
    Io(io::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Api { endpoint: String, status: u16, body: String },
    MissingEnv(&'static str),
    UnknownKind(String),
    Ended,
}

impl fmt::Display for TrackingErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingErr::Io(e) => write!(f, "io error: {e}"),
            TrackingErr::Json(e) => write!(f, "json error: {e}"),
            TrackingErr::Http(e) => write!(f, "http error: {e}"),
            TrackingErr::Api {
                endpoint,
                status,
                body,
            } => write!(f, "{endpoint} answered {status}: {body}"),
            TrackingErr::MissingEnv(var) => write!(f, "environment variable {var} is not set"),
            TrackingErr::UnknownKind(kind) => {
                write!(f, "unknown tracker {kind:?}, expected offline or comet")
            }
            TrackingErr::Ended => write!(f, "the experiment has already ended"),
        }
    }
}

impl Error for TrackingErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrackingErr::Io(e) => Some(e),
            TrackingErr::Json(e) => Some(e),
            TrackingErr::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrackingErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrackingErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<reqwest::Error> for TrackingErr {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrackingErr> for io::Error {
    fn from(value: TrackingErr) -> Self {
        match value {
            TrackingErr::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}
