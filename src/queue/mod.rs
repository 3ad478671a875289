// src/queue/mod.rs

//! Queue collaborator seam.
//!
//! The task queue itself (storage, delivery) is external. This module only
//! defines what fallax needs from it:
//! - publish a [`TaskMessage`] onto a named queue without waiting for it to run;
//! - receive the next message from a set of queues (worker side);
//! - report connectivity problems as [`QueueError::Connection`].
//!
//! [`RedisBroker`] talks to a Redis server; [`MemoryBroker`] keeps messages in
//! memory for tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub mod error;
pub mod memory;
pub mod redis;

pub use error::QueueError;
pub use memory::MemoryBroker;
pub use self::redis::RedisBroker;

/// Boxed future returned by [`Broker`] methods.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

/// Message placed on a queue: which task to run and with which keyword
/// arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: Uuid,
    pub task: String,
    pub queue: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskMessage {
    pub fn new(task: impl Into<String>, queue: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            queue: queue.into(),
            kwargs,
        }
    }

    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Encode(e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Self, QueueError> {
        serde_json::from_str(payload).map_err(|e| QueueError::Decode(e.to_string()))
    }
}

/// Trait abstracting the external task queue.
///
/// Production code uses [`RedisBroker`]; tests use [`MemoryBroker`].
pub trait Broker: Send + Sync + std::fmt::Debug {
    /// Put `message` on `message.queue`. Must not wait for the task to run.
    fn publish<'a>(&'a self, message: &'a TaskMessage) -> BrokerFuture<'a, ()>;

    /// Take the next message from any of `queues`, waiting at most `wait`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn receive<'a>(
        &'a self,
        queues: &'a [String],
        wait: Duration,
    ) -> BrokerFuture<'a, Option<TaskMessage>>;
}
