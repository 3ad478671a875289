// src/queue/memory.rs

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use super::{Broker, BrokerFuture, QueueError, TaskMessage};

const POLL_STEP: Duration = Duration::from_millis(10);

/// In-process broker used by tests.
///
/// Records every published message and can be told that a queue is
/// unreachable, in which case publishing to it fails with
/// [`QueueError::Connection`].
#[derive(Debug, Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<TaskMessage>>>,
    published: Mutex<Vec<TaskMessage>>,
    unreachable: Mutex<BTreeSet<String>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `publish` to `queue` fail (or succeed again).
    pub fn set_unreachable(&self, queue: &str, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap_or_else(|e| e.into_inner());
        if unreachable {
            set.insert(queue.to_string());
        } else {
            set.remove(queue);
        }
    }

    /// Every message successfully published so far, in publish order.
    pub fn published(&self) -> Vec<TaskMessage> {
        self.published.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Messages published to `queue`, in publish order.
    pub fn published_to(&self, queue: &str) -> Vec<TaskMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.queue == queue)
            .collect()
    }

    /// Number of messages still waiting on `queue`.
    pub fn pending(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    fn try_pop(&self, queues: &[String]) -> Option<TaskMessage> {
        let mut map = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .iter()
            .find_map(|q| map.get_mut(q).and_then(VecDeque::pop_front))
    }
}

impl Broker for MemoryBroker {
    fn publish<'a>(&'a self, message: &'a TaskMessage) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let unreachable = self
                .unreachable
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(&message.queue);
            if unreachable {
                return Err(QueueError::Connection(format!(
                    "queue '{}' is unreachable",
                    message.queue
                )));
            }
            self.queues
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(message.queue.clone())
                .or_default()
                .push_back(message.clone());
            self.published.lock().unwrap_or_else(|e| e.into_inner()).push(message.clone());
            Ok(())
        })
    }

    fn receive<'a>(
        &'a self,
        queues: &'a [String],
        wait: Duration,
    ) -> BrokerFuture<'a, Option<TaskMessage>> {
        Box::pin(async move {
            let deadline = Instant::now() + wait;
            loop {
                if let Some(msg) = self.try_pop(queues) {
                    return Ok(Some(msg));
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep(POLL_STEP.min(deadline - now)).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn publish_then_receive_in_fifo_order() {
        let broker = MemoryBroker::new();
        let first = TaskMessage::new("t", "q", Map::new());
        let second = TaskMessage::new("t", "q", Map::new());
        broker.publish(&first).await.unwrap();
        broker.publish(&second).await.unwrap();

        let queues = vec!["q".to_string()];
        let got = broker.receive(&queues, Duration::ZERO).await.unwrap();
        assert_eq!(got.map(|m| m.id), Some(first.id));
        assert_eq!(broker.pending("q"), 1);
    }

    #[tokio::test]
    async fn unreachable_queue_reports_connectivity_error() {
        let broker = MemoryBroker::new();
        broker.set_unreachable("q", true);

        let err = broker
            .publish(&TaskMessage::new("t", "q", Map::new()))
            .await
            .unwrap_err();

        assert!(err.is_connectivity());
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn receive_times_out_with_none() {
        let broker = MemoryBroker::new();
        let queues = vec!["empty".to_string()];
        let got = broker
            .receive(&queues, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
