use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body the backend attaches to rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Failure outcome of a start/stop command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The backend answered with a non-2xx status. Carries the backend's own
    /// `detail` text, or a generic message when the error body was missing or
    /// malformed.
    #[error("{0}")]
    Rejected(String),
    /// The backend could not be reached at all.
    #[error("device backend unreachable: {0}")]
    Unreachable(String),
}

impl CommandError {
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(err) => Self::Rejected(err.detail),
            Err(_) => Self::Rejected(format!("device command failed (HTTP {status})")),
        }
    }
}
