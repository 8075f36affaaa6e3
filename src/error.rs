use std::fmt;

use crate::object::TrackerStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Referenced task, project, account or record does not exist.
    NotFound(String),
    /// The requested transition is not legal from the current status.
    InvalidState { expected: String, actual: String },
    /// The actor lacks the role or relationship the operation requires.
    Unauthorized(String),
    /// A debit would drive the balance below zero.
    InsufficientBalance { requested: u64, available: u64 },
    /// Malformed caller input.
    Validation(String),
    Storage(String),
    Serialize(String),
}

impl Error {
    pub(crate) fn not_found(what: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{} {}", what, id))
    }

    pub(crate) fn tracker_state(expected: TrackerStatus, actual: TrackerStatus) -> Self {
        Self::InvalidState {
            expected: expected.as_str().to_string(),
            actual: actual.as_str().to_string(),
        }
    }

    pub(crate) fn state(expected: &str, actual: &str) -> Self {
        Self::InvalidState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// True for failures the caller may resolve by retrying the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::InvalidState { expected, actual } => {
                write!(f, "Invalid state: expected {}, found {}", expected, actual)
            }
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::InsufficientBalance {
                requested,
                available,
            } => write!(
                f,
                "Insufficient balance: requested {}, available {}",
                requested, available
            ),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Serialize(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
