// src/task/factory.rs

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::errors::Result;
use crate::types::WorkerArgs;

use super::app::{QueueApp, Signature, Task};
use super::context::TaskContext;
use super::TaskFn;

/// Binds one function to one [`TaskContext`] as a named, queued task.
///
/// The task is registered under `context.name()` and routed to a queue of the
/// same name, so each factory gets its own queue (and, through the supervisor
/// config, its own worker). The same function can back several factories with
/// different contexts, e.g. one `ftpsend` function per destination host.
///
/// Registration happens on the first call to [`TaskFactory::task`] and is
/// cached: at most one registration per factory.
pub struct TaskFactory {
    app: Arc<QueueApp>,
    context: TaskContext,
    func: TaskFn,
    worker_overrides: WorkerArgs,
    task: Mutex<Option<Task>>,
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("context", &self.context)
            .field("worker_overrides", &self.worker_overrides)
            .finish_non_exhaustive()
    }
}

impl TaskFactory {
    pub fn new(
        app: Arc<QueueApp>,
        context: TaskContext,
        func: TaskFn,
        worker_args: Option<WorkerArgs>,
    ) -> Self {
        Self {
            app,
            context,
            func,
            worker_overrides: worker_args.unwrap_or_default(),
            task: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Queue this factory's task is routed to. Always the context name.
    pub fn queue_name(&self) -> &str {
        self.context.name()
    }

    /// The registered task, registering it with the app on first call.
    pub fn task(&self) -> Result<Task> {
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.as_ref() {
            return Ok(task.clone());
        }
        let task = self
            .app
            .register(self.context.name(), self.queue_name(), Arc::clone(&self.func))?;
        *slot = Some(task.clone());
        Ok(task)
    }

    /// Enqueueable reference bound with the serialized context plus `extra`.
    pub fn signature(&self, extra: Map<String, Value>) -> Result<Signature> {
        let mut kwargs = Map::new();
        kwargs.insert("context".to_string(), self.context.to_transport());
        kwargs.extend(extra);
        Ok(self.task()?.signature(kwargs))
    }

    /// `(signature, context)` pair for file dispatch.
    pub fn workflow(&self) -> Result<Workflow> {
        Ok(Workflow {
            signature: self.signature(Map::new())?,
            context: self.context.clone(),
        })
    }

    /// Worker launch parameters: the defaults with this factory's overrides
    /// applied on top.
    pub fn worker_launch_args(&self) -> WorkerArgs {
        WorkerArgs::defaults().merged(&self.worker_overrides)
    }
}

/// A registered pairing of a task reference and its context, as fanned out
/// to by file dispatch.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub signature: Signature,
    pub context: TaskContext,
}

impl Workflow {
    pub fn name(&self) -> &str {
        self.context.name()
    }
}
