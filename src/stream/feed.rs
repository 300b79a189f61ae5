use super::{ChangeFeed, ChangeStream, Topic};
use crate::error::Result;
use crate::nats::ChangeMessage;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// In-process change feed built on broadcast channels, one per topic
pub struct MemoryFeed {
    topics: Mutex<HashMap<Topic, broadcast::Sender<ChangeMessage>>>,
    capacity: usize,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn sender(&self, topic: &Topic) -> broadcast::Sender<ChangeMessage> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish a change; returns how many live subscriptions received it
    pub fn publish(&self, topic: &Topic, change: ChangeMessage) -> usize {
        let delivered = self.sender(topic).send(change).unwrap_or(0);
        debug!("Published change on {} to {} subscriber(s)", topic, delivered);
        delivered
    }

    /// Number of live subscriptions on a topic
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.get(topic).map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChangeFeed for MemoryFeed {
    async fn subscribe(&self, topic: &Topic) -> Result<ChangeStream> {
        let rx = self.sender(topic).subscribe();
        let topic = topic.clone();

        let stream = futures::stream::unfold(rx, move |mut rx| {
            let topic = topic.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(change) => return Some((change, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Subscriber on {} lagged, skipped {} change(s)", topic, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
