// src/worker/mod.rs

//! Queue consumer: pulls task messages and runs the registered functions.
//!
//! A single receive loop polls the broker for the worker's queues. Each
//! message runs on its own Tokio task while holding a semaphore permit, so at
//! most `concurrency` tasks run at once. Tasks are fire-and-forget: failures
//! are logged, nothing is retried or reported back to the producer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::queue::TaskMessage;
use crate::task::{QueueApp, TaskContext, TaskInvocation};
use crate::types::{parse_autoscale, DEFAULT_CONCURRENCY};

pub mod command;

const RECEIVE_WAIT: Duration = Duration::from_secs(1);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Launch options, mirroring the `worker` CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    pub queues: Vec<String>,
    pub hostname: Option<String>,
    pub concurrency: usize,
    /// `"max,min"`; the maximum caps `concurrency`.
    pub autoscale: Option<String>,
    /// Accepted for command-line compatibility; not enforced.
    pub max_memory_per_child: Option<u64>,
}

impl WorkerOptions {
    pub fn new(queues: Vec<String>) -> Self {
        Self {
            queues,
            hostname: None,
            concurrency: DEFAULT_CONCURRENCY,
            autoscale: None,
            max_memory_per_child: None,
        }
    }

    /// Number of tasks allowed to run at the same time.
    pub fn pool_size(&self) -> usize {
        let mut size = self.concurrency.max(1);
        if let Some(policy) = &self.autoscale {
            match parse_autoscale(policy) {
                Ok((max, _min)) => size = size.min(max.max(1)),
                Err(e) => warn!("ignoring autoscale policy: {e}"),
            }
        }
        size
    }
}

pub struct Worker {
    app: Arc<QueueApp>,
    options: WorkerOptions,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(app: Arc<QueueApp>, options: WorkerOptions) -> Self {
        Self { app, options }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Consume until Ctrl-C.
    pub async fn run(&self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Consume until `shutdown` resolves, then wait for running tasks.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let pool = self.options.pool_size();
        let permits = Arc::new(Semaphore::new(pool));
        let mut running = JoinSet::new();

        info!(
            queues = ?self.options.queues,
            hostname = self.options.hostname.as_deref().unwrap_or(""),
            pool,
            "worker started"
        );
        if let Some(limit) = self.options.max_memory_per_child {
            debug!(limit_kb = limit, "max-memory-per-child is not enforced");
        }

        tokio::pin!(shutdown);

        loop {
            // Reap finished tasks so the set does not grow without bound.
            while running.try_join_next().is_some() {}

            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                _ = &mut shutdown => break,
                received = self.app.broker().receive(&self.options.queues, RECEIVE_WAIT) => received,
            };

            match received {
                Ok(Some(message)) => {
                    let app = Arc::clone(&self.app);
                    running.spawn(async move {
                        execute(&app, message).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "failed to receive from broker; retrying");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }

        info!(in_flight = running.len(), "worker stopping; waiting for running tasks");
        while running.join_next().await.is_some() {}
        info!("worker stopped");
    }
}

/// Run one message against the app's registry.
///
/// Returns `true` when the task function ran and succeeded.
pub async fn execute(app: &QueueApp, message: TaskMessage) -> bool {
    let fp = message
        .kwargs
        .get("fp")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let span = info_span!(
        "task",
        task_id = %message.id,
        task_name = %message.task,
        fp = %fp
    );

    async move {
        let Some(registered) = app.lookup(&message.task) else {
            error!("received message for unregistered task; dropping it");
            return false;
        };

        let mut kwargs = message.kwargs;
        let context = match kwargs.remove("context") {
            Some(value) => match TaskContext::from_transport(&value) {
                Ok(ctx) => ctx,
                Err(err) => {
                    error!(error = %err, "invalid task context");
                    return false;
                }
            },
            None => {
                error!("task message carries no context");
                return false;
            }
        };

        let invocation = TaskInvocation {
            id: message.id,
            task_name: message.task,
            context,
            kwargs,
        };

        info!("task received");
        match (registered.func)(invocation).await {
            Ok(()) => {
                info!("task succeeded");
                true
            }
            Err(err) => {
                let chain = format!("{err:#}");
                error!(error = %chain, "task failed");
                false
            }
        }
    }
    .instrument(span)
    .await
}
