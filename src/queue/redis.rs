// src/queue/redis.rs

//! Redis-backed [`Broker`].
//!
//! Each queue is a Redis list at `{prefix}:queue:{name}`. Producers `LPUSH`
//! JSON-encoded [`TaskMessage`]s; workers `RPOP` them, so every list is
//! consumed in FIFO order.
//!
//! The multiplexed connection is opened lazily on first use and dropped again
//! after a connectivity error, so a broker that is down at startup (or goes
//! away later) surfaces as [`QueueError::Connection`] on the call that needed
//! it instead of failing construction.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Broker, BrokerFuture, QueueError, TaskMessage};

const DEFAULT_PREFIX: &str = "fallax";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct RedisBroker {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    key_prefix: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("key_prefix", &self.key_prefix)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl RedisBroker {
    /// Create a broker for `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    ///
    /// Only the URL is checked here; no connection is made.
    pub fn open(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            key_prefix: DEFAULT_PREFIX.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Sets a custom key prefix (builder pattern).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.key_prefix, queue)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        debug!("opening broker connection");
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the cached connection after a connectivity error.
    async fn reset_on(&self, err: &QueueError) {
        if err.is_connectivity() {
            warn!(error = %err, "dropping broker connection");
            *self.conn.lock().await = None;
        }
    }

    async fn publish_inner(&self, message: &TaskMessage) -> Result<(), QueueError> {
        let payload = message.encode()?;
        let mut conn = self.connection().await?;
        let _len: i64 = conn
            .lpush(self.queue_key(&message.queue), payload)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn pop_any(&self, queues: &[String]) -> Result<Option<TaskMessage>, QueueError> {
        let mut conn = self.connection().await?;
        for queue in queues {
            let payload: Option<String> = conn
                .rpop(self.queue_key(queue), None)
                .await
                .map_err(map_redis_error)?;
            if let Some(payload) = payload {
                return TaskMessage::decode(&payload).map(Some);
            }
        }
        Ok(None)
    }
}

fn map_redis_error(err: redis::RedisError) -> QueueError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        QueueError::Connection(err.to_string())
    } else {
        QueueError::Backend(err.to_string())
    }
}

impl Broker for RedisBroker {
    fn publish<'a>(&'a self, message: &'a TaskMessage) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let res = self.publish_inner(message).await;
            if let Err(err) = &res {
                self.reset_on(err).await;
            }
            res
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
                match self.pop_any(queues).await {
                    Ok(Some(msg)) => return Ok(Some(msg)),
                    Ok(None) => {}
                    Err(err) => {
                        self.reset_on(&err).await;
                        return Err(err);
                    }
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_rejected_without_connecting() {
        let err = RedisBroker::open("not a url").unwrap_err();
        assert!(matches!(err, QueueError::InvalidUrl(ref msg) if msg.starts_with("not a url")));
        assert!(!err.is_connectivity());
    }

    #[test]
    fn queue_keys_are_prefixed() {
        let broker = RedisBroker::open("redis://127.0.0.1:6379/0")
            .unwrap()
            .with_prefix("test");
        assert_eq!(broker.queue_key("wf1"), "test:queue:wf1");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connectivity_error() {
        // Port 1 is reserved and nothing listens there.
        let broker = RedisBroker::open("redis://127.0.0.1:1/0").unwrap();
        let err = broker
            .publish(&TaskMessage::new("t", "q", serde_json::Map::new()))
            .await
            .unwrap_err();
        assert!(err.is_connectivity(), "got {err:?}");
    }
}
