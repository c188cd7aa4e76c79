use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DepartureError>;

/// Failure taxonomy for a departure cycle.
///
/// `ReferenceUnavailable` is scoped to one airport and never aborts a cycle on its own.
/// `NetworkUnavailable` and `MalformedSnapshot` abort the current cycle, `StoreCorrupt`
/// aborts the process.
#[derive(Error, Debug)]
pub enum DepartureError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("malformed network snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("no usable airport reference for {icao}: {reason}")]
    ReferenceUnavailable { icao: String, reason: String },

    #[error("airport reference store {path:?} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("failed to encode departure report: {0}")]
    EncodingFailure(#[from] serde_json::Error),

    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error {0}")]
    Config(String),
}

impl DepartureError {
    pub fn reference_unavailable(icao: &str, reason: impl Into<String>) -> Self {
        DepartureError::ReferenceUnavailable {
            icao: icao.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error invalidates the whole cycle rather than a single airport
    pub fn is_cycle_fatal(&self) -> bool {
        !matches!(self, DepartureError::ReferenceUnavailable { .. })
    }
}

impl From<reqwest::Error> for DepartureError {
    fn from(e: reqwest::Error) -> Self {
        DepartureError::NetworkUnavailable(e.to_string())
    }
}
