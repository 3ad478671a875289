// src/task/app.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{FallaxError, Result};
use crate::queue::{Broker, QueueError, TaskMessage};

use super::TaskFn;

/// Registry of named tasks, all published through one [`Broker`].
///
/// One `QueueApp` exists per process. Producers (sensors) use it to send
/// messages; workers use it to find the function for a received message, so
/// both sides must register the same tasks.
pub struct QueueApp {
    name: String,
    broker: Arc<dyn Broker>,
    tasks: RwLock<BTreeMap<String, RegisteredTask>>,
}

/// A registry entry: task name, its queue and the bound function.
#[derive(Clone)]
pub struct RegisteredTask {
    pub name: String,
    pub queue: String,
    pub func: TaskFn,
}

impl fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for QueueApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueApp")
            .field("name", &self.name)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

impl QueueApp {
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            broker,
            tasks: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Register `func` as task `name`, routed to `queue`.
    ///
    /// Task names are unique per app: registering a name twice fails with
    /// [`FallaxError::DuplicateTask`] and leaves the first registration in
    /// place.
    pub fn register(
        self: &Arc<Self>,
        name: impl Into<String>,
        queue: impl Into<String>,
        func: TaskFn,
    ) -> Result<Task> {
        let name = name.into();
        let queue = queue.into();

        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if tasks.contains_key(&name) {
            return Err(FallaxError::DuplicateTask(name));
        }
        debug!(task = %name, queue = %queue, "registering task");
        tasks.insert(
            name.clone(),
            RegisteredTask {
                name: name.clone(),
                queue: queue.clone(),
                func,
            },
        );

        Ok(Task {
            name,
            queue,
            app: Arc::clone(self),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<RegisteredTask> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(name).cloned()
    }

    /// `(task, queue)` pairs, sorted by task name.
    pub fn registered(&self) -> Vec<(String, String)> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks
            .values()
            .map(|t| (t.name.clone(), t.queue.clone()))
            .collect()
    }

    /// Publish a message for `task` on `queue` and return without waiting.
    pub async fn send_task(
        &self,
        task: &str,
        queue: &str,
        kwargs: Map<String, Value>,
    ) -> std::result::Result<TaskHandle, QueueError> {
        let message = TaskMessage::new(task, queue, kwargs);
        self.broker.publish(&message).await?;
        debug!(task, queue, id = %message.id, "task message published");
        Ok(TaskHandle {
            id: message.id,
            task: message.task,
            queue: message.queue,
        })
    }
}

/// A registered task.
#[derive(Clone)]
pub struct Task {
    name: String,
    queue: String,
    app: Arc<QueueApp>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// A ready-to-submit reference with `kwargs` bound.
    pub fn signature(&self, kwargs: Map<String, Value>) -> Signature {
        Signature {
            task: self.name.clone(),
            queue: self.queue.clone(),
            kwargs,
            app: Arc::clone(&self.app),
        }
    }
}

/// Pre-bound, ready-to-submit task reference.
#[derive(Clone)]
pub struct Signature {
    task: String,
    queue: String,
    kwargs: Map<String, Value>,
    app: Arc<QueueApp>,
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("task", &self.task)
            .field("queue", &self.queue)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

impl Signature {
    pub fn task_name(&self) -> &str {
        &self.task
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Bound keyword arguments.
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// Submit for asynchronous execution.
    ///
    /// `kwargs` are merged over the bound ones (call values win). The task
    /// function is never run here; only a message is published.
    pub async fn delay(
        &self,
        kwargs: Map<String, Value>,
    ) -> std::result::Result<TaskHandle, QueueError> {
        let mut merged = self.kwargs.clone();
        merged.extend(kwargs);
        self.app.send_task(&self.task, &self.queue, merged).await
    }
}

/// Returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: Uuid,
    pub task: String,
    pub queue: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryBroker;
    use crate::task::task_fn;
    use serde_json::json;

    fn noop() -> TaskFn {
        task_fn(|_inv| async { Ok(()) })
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let app = QueueApp::new("test", Arc::new(MemoryBroker::new()));
        app.register("wf", "wf", noop()).unwrap();

        let err = app.register("wf", "other", noop()).unwrap_err();

        assert!(matches!(err, FallaxError::DuplicateTask(ref n) if n == "wf"));
        assert_eq!(app.registered(), vec![("wf".to_string(), "wf".to_string())]);
    }

    #[tokio::test]
    async fn delay_publishes_merged_kwargs() {
        let broker = Arc::new(MemoryBroker::new());
        let app = QueueApp::new("test", broker.clone());
        let task = app.register("wf", "wf-queue", noop()).unwrap();

        let mut bound = Map::new();
        bound.insert("context".into(), json!({"name": "wf"}));
        bound.insert("mode".into(), json!("bound"));
        let sig = task.signature(bound);

        let mut call = Map::new();
        call.insert("mode".into(), json!("call"));
        let handle = sig.delay(call).await.unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, handle.id);
        assert_eq!(published[0].queue, "wf-queue");
        assert_eq!(published[0].kwargs["mode"], json!("call"));
        assert_eq!(published[0].kwargs["context"], json!({"name": "wf"}));
    }
}
