// src/task/mod.rs

//! Named, queued tasks and their working-directory contexts.
//!
//! - [`context`]: [`TaskContext`], the per-task `in/out/tmp` descriptor.
//! - [`app`]: [`QueueApp`], the registry of tasks bound to one broker, plus
//!   [`Task`], [`Signature`] and [`TaskHandle`].
//! - [`factory`]: [`TaskFactory`], binding one function to one context as a
//!   task routed to its own queue, and [`Workflow`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

pub mod app;
pub mod context;
pub mod factory;

pub use app::{QueueApp, Signature, Task, TaskHandle};
pub use context::{ContextParams, TaskContext};
pub use factory::{TaskFactory, Workflow};

/// Everything a task function receives when a worker runs it.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub id: Uuid,
    pub task_name: String,
    /// Context rebuilt from the message's `context` argument.
    pub context: TaskContext,
    /// Remaining keyword arguments (e.g. `fp` and `meta` for file dispatch).
    pub kwargs: Map<String, Value>,
}

impl TaskInvocation {
    /// The `fp` argument set by file dispatch, if any.
    pub fn file_path(&self) -> Option<&str> {
        self.kwargs.get("fp").and_then(Value::as_str)
    }

    /// A string field of the `meta` argument set by file dispatch.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.kwargs
            .get("meta")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }
}

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A function bound to a task. Called by workers, never by producers.
pub type TaskFn = Arc<dyn Fn(TaskInvocation) -> TaskFuture + Send + Sync>;

/// Wrap an async closure as a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn(TaskInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |inv| Box::pin(f(inv)) as TaskFuture)
}
