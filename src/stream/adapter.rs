use super::{ChangeFeed, ChangeStream, Topic};
use crate::error::{AppError, Result};
use crate::model::{Message, MessageFeedback, OwnerId, Session, SessionId};
use crate::nats::{ChangeMessage, ChangeType};
use futures::future::poll_fn;
use futures::stream::StreamExt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::task::Poll;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which record kind a change is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Session,
    Message,
    Feedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl From<ChangeType> for Operation {
    fn from(change: ChangeType) -> Self {
        match change {
            ChangeType::Insert => Operation::Insert,
            ChangeType::Update => Operation::Update,
            ChangeType::Delete => Operation::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Session(Session),
    Message(Message),
    Feedback(MessageFeedback),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Session(_) => EntityKind::Session,
            Entity::Message(_) => EntityKind::Message,
            Entity::Feedback(_) => EntityKind::Feedback,
        }
    }
}

/// Normalized change notification handed to the reconciler
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Subscription the change arrived on
    pub topic: Topic,
    pub kind: EntityKind,
    pub operation: Operation,
    pub entity: Entity,
}

impl ChangeEvent {
    pub fn new(topic: Topic, operation: Operation, entity: Entity) -> Self {
        Self {
            topic,
            kind: entity.kind(),
            operation,
            entity,
        }
    }
}

/// Turn a raw feed message into a [`ChangeEvent`]
pub fn normalize(topic: &Topic, change: &ChangeMessage) -> Result<ChangeEvent> {
    let record = change
        .record()
        .cloned()
        .ok_or_else(|| AppError::query(format!("{} change without a row", change.table)))?;

    let entity = match change.table.as_str() {
        "sessions" => Entity::Session(serde_json::from_value(record)?),
        "messages" => Entity::Message(serde_json::from_value(record)?),
        "message_feedback" => Entity::Feedback(serde_json::from_value(record)?),
        other => {
            return Err(AppError::Unknown(format!(
                "change for unknown table: {}",
                other
            )))
        }
    };

    Ok(ChangeEvent::new(
        topic.clone(),
        change.event_type.into(),
        entity,
    ))
}

/// Live subscription to one topic.
///
/// The handle owns the feed stream. Releasing (explicitly or by drop) drops
/// the stream before returning, so the feed sees the unsubscribe at once;
/// the forwarding task then finds the slot empty and exits.
pub struct SubscriptionHandle {
    topic: Topic,
    stream: Arc<StdMutex<Option<ChangeStream>>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn is_live(&self) -> bool {
        lock(&self.stream).is_some()
    }

    /// Release the subscription
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let stream = lock(&self.stream).take();
        drop(stream);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Released subscription {}", self.topic);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(slot: &StdMutex<Option<ChangeStream>>) -> MutexGuard<'_, Option<ChangeStream>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Next change from a shared stream slot; `None` once the slot is emptied
async fn next_change(slot: &StdMutex<Option<ChangeStream>>) -> Option<ChangeMessage> {
    poll_fn(|cx| match lock(slot).as_mut() {
        Some(stream) => stream.poll_next_unpin(cx),
        None => Poll::Ready(None),
    })
    .await
}

/// Keeps at most one subscription for the active session's messages and one
/// for the owner's session list, forwarding normalized events into `sink`
pub struct ChangeStreamAdapter {
    feed: Arc<dyn ChangeFeed>,
    sink: mpsc::UnboundedSender<ChangeEvent>,
    messages: Option<SubscriptionHandle>,
    sessions: Option<SubscriptionHandle>,
}

impl ChangeStreamAdapter {
    pub fn new(feed: Arc<dyn ChangeFeed>, sink: mpsc::UnboundedSender<ChangeEvent>) -> Self {
        Self {
            feed,
            sink,
            messages: None,
            sessions: None,
        }
    }

    /// Follow the messages of `session_id`, releasing any previous session's
    /// subscription first
    pub async fn watch_messages(&mut self, session_id: &SessionId) -> Result<()> {
        let topic = Topic::Messages(session_id.clone());
        if self.messages.as_ref().map(|h| h.topic()) == Some(&topic) {
            return Ok(());
        }

        self.release_messages();
        self.messages = Some(self.open(topic).await?);
        Ok(())
    }

    /// Follow the owner's session list
    pub async fn watch_sessions(&mut self, owner_id: &OwnerId) -> Result<()> {
        let topic = Topic::Sessions(owner_id.clone());
        if self.sessions.as_ref().map(|h| h.topic()) == Some(&topic) {
            return Ok(());
        }

        if let Some(handle) = self.sessions.take() {
            handle.release();
        }
        self.sessions = Some(self.open(topic).await?);
        Ok(())
    }

    pub fn release_messages(&mut self) {
        if let Some(handle) = self.messages.take() {
            handle.release();
        }
    }

    /// Release every subscription before returning
    pub fn release_all(&mut self) {
        self.release_messages();
        if let Some(handle) = self.sessions.take() {
            handle.release();
        }
    }

    /// Topics with a live subscription
    pub fn active_topics(&self) -> Vec<Topic> {
        self.messages
            .iter()
            .chain(self.sessions.iter())
            .filter(|h| h.is_live())
            .map(|h| h.topic().clone())
            .collect()
    }

    async fn open(&self, topic: Topic) -> Result<SubscriptionHandle> {
        let stream = self.feed.subscribe(&topic).await?;
        info!("Subscribed to {} via {} feed", topic, self.feed.name());

        let stream = Arc::new(StdMutex::new(Some(stream)));
        let slot = Arc::clone(&stream);
        let task_topic = topic.clone();
        let sink = self.sink.clone();

        let task = tokio::spawn(async move {
            while let Some(change) = next_change(&slot).await {
                match normalize(&task_topic, &change) {
                    Ok(event) => {
                        if sink.send(event).is_err() {
                            // Reconciler is gone
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping change on {}: {}", task_topic, e),
                }
            }

            debug!("Forwarding stopped for {}", task_topic);
        });

        Ok(SubscriptionHandle {
            topic,
            stream,
            task: Some(task),
        })
    }
}

impl Drop for ChangeStreamAdapter {
    fn drop(&mut self) {
        self.release_all();
    }
}
