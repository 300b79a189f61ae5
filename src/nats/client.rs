use super::messages::ChangeMessage;
use crate::error::{AppError, Result};
use crate::stream::{ChangeFeed, ChangeStream, Topic};
use anyhow::Context;
use async_nats::Client;
use futures::stream::StreamExt;
use tracing::{info, warn};

/// Change feed backed by NATS subjects
///
/// Topics map to `{prefix}.messages.{session_id}` and
/// `{prefix}.sessions.{owner_id}`; payloads are JSON [`ChangeMessage`]s.
pub struct NatsClient {
    client: Client,
    subject_prefix: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: impl Into<String>) -> anyhow::Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject_prefix: subject_prefix.into(),
        })
    }

    /// Subject carrying changes for a topic
    pub fn subject_for(&self, topic: &Topic) -> String {
        topic.subject(&self.subject_prefix)
    }
}

#[async_trait::async_trait]
impl ChangeFeed for NatsClient {
    async fn subscribe(&self, topic: &Topic) -> Result<ChangeStream> {
        let subject = self.subject_for(topic);

        info!("Subscribing to changes on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| AppError::connection(format!("subscribe to {} failed: {}", subject, e)))?;

        // Undecodable payloads are logged and skipped; the subscriber is
        // unsubscribed when the returned stream is dropped.
        let stream = subscriber.filter_map(|msg| async move {
            match serde_json::from_slice::<ChangeMessage>(&msg.payload) {
                Ok(change) => Some(change),
                Err(e) => {
                    warn!("Failed to parse change message: {}", e);
                    None
                }
            }
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
