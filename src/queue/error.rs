// src/queue/error.rs

use thiserror::Error;

/// Errors raised by a [`Broker`](super::Broker).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The broker could not be reached. Transient: the same call may succeed
    /// later.
    #[error("broker unreachable: {0}")]
    Connection(String),

    /// The broker URL could not be parsed. Not retried.
    #[error("invalid broker url: {0}")]
    InvalidUrl(String),

    /// The broker answered with an error (wrong key type, auth, ...).
    #[error("broker error: {0}")]
    Backend(String),

    #[error("failed to encode task message: {0}")]
    Encode(String),

    #[error("failed to decode task message: {0}")]
    Decode(String),
}

impl QueueError {
    /// True for transient connectivity failures.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, QueueError::Connection(_))
    }
}
