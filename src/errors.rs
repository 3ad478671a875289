// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::queue::QueueError;

#[derive(Error, Debug)]
pub enum FallaxError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task not registered: {0}")]
    UnknownTask(String),

    #[error("Invalid task context: {0}")]
    InvalidContext(String),

    #[error("Transport encoding error: {0}")]
    Transport(#[from] serde_json::Error),

    /// Local copy into a workflow input directory failed.
    ///
    /// Kept apart from [`FallaxError::Queue`]: one is a local I/O fault, the
    /// other a remote queue fault.
    #[error("copying {from:?} to {to:?} for workflow '{workflow}' failed: {source}")]
    CopyFailed {
        workflow: String,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FallaxError>;
