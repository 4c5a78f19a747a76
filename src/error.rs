//! Error taxonomy for the timer engine

use thiserror::Error;

use crate::state::TimerStatus;

/// Failures of the durable storage collaborator
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored timers are not valid JSON: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("failed to encode timers: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by timer operations
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timer not found: {0}")]
    NotFound(String),

    #[error("cannot {action} timer {id} while it is {status}")]
    InvalidTransition {
        id: String,
        status: TimerStatus,
        action: &'static str,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type Result<T, E = TimerError> = std::result::Result<T, E>;
