//! Publish/subscribe client over the durable queue.
//!
//! A subscription spawns a fixed pool of consumer tasks; each task claims,
//! handles, and settles strictly one message at a time, which is what makes
//! the ack contract meaningful. Parallelism comes from the pool size, never
//! from dispatching a claimed message off-task.

use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::queue::DurableQueue;
use super::types::{MessageHeaders, QueueMessage};

const IDLE_POLL: Duration = Duration::from_millis(100);

pub type MessageHandlerFn =
    Arc<dyn Fn(QueueMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

pub struct BusClient {
    queue: Arc<DurableQueue>,
}

/// Handle to a running consumer pool. Dropping it does not stop the
/// consumers; call [`Subscription::shutdown`].
pub struct Subscription {
    stop: Arc<AtomicBool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl BusClient {
    pub fn new(queue: Arc<DurableQueue>) -> Arc<Self> {
        Arc::new(Self { queue })
    }

    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.queue
    }

    /// Publishes a serializable payload with the given headers. Returns once
    /// the message is durably stored.
    pub async fn publish<T: Serialize>(
        &self,
        queue_name: &str,
        headers: MessageHeaders,
        payload: &T,
    ) -> Result<String> {
        let value = serde_json::to_value(payload)?;
        self.queue.publish(queue_name, headers, value).await
    }

    /// Subscribes `consumers` tasks to a queue.
    ///
    /// The handler's result settles the message: `Ok` acknowledges, `Err`
    /// releases it for redelivery. Handlers that want to drop a poisonous
    /// message (e.g. an unparseable payload) log the problem and return `Ok`.
    pub fn subscribe<F, Fut>(&self, queue_name: &str, consumers: usize, handler: F) -> Subscription
    where
        F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: MessageHandlerFn = Arc::new(move |message| Box::pin(handler(message)));
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(consumers);

        for consumer_id in 0..consumers {
            let queue = self.queue.clone();
            let queue_name = queue_name.to_string();
            let handler = handler.clone();
            let stop = stop.clone();

            handles.push(tokio::spawn(async move {
                tracing::info!("Consumer {} subscribed to {}", consumer_id, queue_name);
                loop {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match queue.claim_next(&queue_name) {
                        Some(message) => {
                            let id = message.id.clone();
                            match handler(message).await {
                                Ok(()) => queue.ack(&id).await,
                                Err(e) => {
                                    tracing::warn!(
                                        "Handler failed for message {} on {}: {}; releasing for redelivery",
                                        id,
                                        queue_name,
                                        e
                                    );
                                    queue.release(&id);
                                }
                            }
                        }
                        None => tokio::time::sleep(IDLE_POLL).await,
                    }
                }
                tracing::info!("Consumer {} on {} stopped", consumer_id, queue_name);
            }));
        }

        Subscription { stop, handles }
    }
}

impl Subscription {
    /// Signals the consumers to stop and waits up to `drain` for in-flight
    /// handlers to finish; stragglers are aborted.
    pub async fn shutdown(self, drain: Duration) {
        self.stop.store(true, Ordering::Relaxed);
        for mut handle in self.handles {
            if tokio::time::timeout(drain, &mut handle).await.is_err() {
                tracing::warn!("Consumer did not drain in {:?}; aborting", drain);
                handle.abort();
            }
        }
    }
}
