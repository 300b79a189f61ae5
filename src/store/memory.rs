use super::{FeedbackPatch, NewMessage, NewSession, RemoteStore, SessionPatch};
use crate::error::{AppError, Result};
use crate::model::{
    FeedbackScores, Message, MessageFeedback, MessageId, OwnerId, Session, SessionId,
};
use crate::nats::ChangeMessage;
use crate::stream::{MemoryFeed, Topic};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionId, Session>,
    messages: HashMap<SessionId, Vec<Message>>,
    feedback: HashMap<MessageId, FeedbackScores>,
    message_sessions: HashMap<MessageId, SessionId>,
}

/// In-process backend with server-side semantics: assigned ids, per-session
/// sequence numbers, ownership filtering and timestamp touching.
///
/// When built with a [`MemoryFeed`] every write is published as a change,
/// the way the real backend's change feed would.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    owner: RwLock<Option<OwnerId>>,
    failures: StdMutex<VecDeque<AppError>>,
    feed: Option<Arc<MemoryFeed>>,
    requests: AtomicUsize,
}

impl MemoryStore {
    pub fn new(owner: Option<OwnerId>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            owner: RwLock::new(owner),
            failures: StdMutex::new(VecDeque::new()),
            feed: None,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_feed(owner: Option<OwnerId>, feed: Arc<MemoryFeed>) -> Self {
        Self {
            feed: Some(feed),
            ..Self::new(owner)
        }
    }

    /// Change the authenticated owner (`None` signs out)
    pub fn set_owner(&self, owner: Option<OwnerId>) {
        *self.owner.write().unwrap_or_else(|e| e.into_inner()) = owner;
    }

    /// Make the next transmitted request fail with `error`
    pub fn fail_next(&self, error: AppError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Number of requests that passed validation and reached the backend
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Insert a message as another author (e.g. the automated counterpart)
    pub async fn insert_foreign_message(
        &self,
        session_id: &SessionId,
        author_id: &OwnerId,
        input: NewMessage,
    ) -> Result<Message> {
        self.create_message(session_id, author_id, input).await
    }

    fn transmit(&self, op: &str) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match injected {
            Some(error) => {
                warn!("Injected failure for {}: {}", op, error);
                Err(error)
            }
            None => {
                debug!("Memory store handling {}", op);
                Ok(())
            }
        }
    }

    fn publish<T: Serialize>(&self, topic: Topic, table: &str, update: bool, row: &T) {
        let Some(feed) = &self.feed else {
            return;
        };

        match serde_json::to_value(row) {
            Ok(value) => {
                let change = if update {
                    ChangeMessage::update(table, value)
                } else {
                    ChangeMessage::insert(table, value)
                };
                feed.publish(&topic, change);
            }
            Err(e) => warn!("Failed to encode {} change: {}", table, e),
        }
    }

    fn publish_feedback(&self, session_id: &SessionId, feedback: &MessageFeedback, update: bool) {
        self.publish(
            Topic::Messages(session_id.clone()),
            "message_feedback",
            update,
            feedback,
        );
    }
}

fn owned_session<'a>(
    tables: &'a mut Tables,
    session_id: &SessionId,
    owner_id: &OwnerId,
) -> Result<&'a mut Session> {
    tables
        .sessions
        .get_mut(session_id)
        .filter(|s| &s.owner_id == owner_id)
        .ok_or_else(|| AppError::query(format!("session {} not found", session_id)))
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    fn current_owner(&self) -> Option<OwnerId> {
        self.owner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn create_session(&self, owner_id: &OwnerId, input: NewSession) -> Result<Session> {
        input.validate()?;
        self.transmit("create_session")?;

        let now = Utc::now();
        let session = Session {
            id: SessionId::new(uuid::Uuid::new_v4().to_string()),
            owner_id: owner_id.clone(),
            title: input.title,
            language: input.language,
            level: input.level,
            status: input.status,
            last_message_at: now,
            last_accessed_at: now,
            created_at: now,
        };

        self.tables
            .lock()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());

        self.publish(Topic::Sessions(owner_id.clone()), "sessions", false, &session);
        Ok(session)
    }

    async fn list_sessions(&self, owner_id: &OwnerId) -> Result<Vec<Session>> {
        self.transmit("list_sessions")?;

        let tables = self.tables.lock().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| &s.owner_id == owner_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(sessions)
    }

    async fn get_session(&self, session_id: &SessionId, owner_id: &OwnerId) -> Result<Session> {
        self.transmit("get_session")?;

        let mut tables = self.tables.lock().await;
        owned_session(&mut tables, session_id, owner_id).map(|s| s.clone())
    }

    async fn update_session(
        &self,
        session_id: &SessionId,
        owner_id: &OwnerId,
        patch: SessionPatch,
    ) -> Result<Session> {
        patch.validate()?;
        self.transmit("update_session")?;

        let updated = {
            let mut tables = self.tables.lock().await;
            let session = owned_session(&mut tables, session_id, owner_id)?;
            if let Some(title) = patch.title {
                session.title = title;
            }
            if let Some(language) = patch.language {
                session.language = language;
            }
            if let Some(level) = patch.level {
                session.level = level;
            }
            if let Some(status) = patch.status {
                session.status = status;
            }
            session.last_accessed_at = Utc::now();
            session.clone()
        };

        self.publish(Topic::Sessions(owner_id.clone()), "sessions", true, &updated);
        Ok(updated)
    }

    async fn create_message(
        &self,
        session_id: &SessionId,
        author_id: &OwnerId,
        input: NewMessage,
    ) -> Result<Message> {
        input.validate()?;
        self.transmit("create_message")?;

        let (message, session) = {
            let mut tables = self.tables.lock().await;
            let now = Utc::now();

            // foreign key on messages.session_id
            let session = tables.sessions.get_mut(session_id).ok_or_else(|| {
                AppError::constraint(format!("session {} does not exist", session_id))
            })?;
            session.last_message_at = now;
            session.last_accessed_at = now;
            let session = session.clone();

            let rows = tables.messages.entry(session_id.clone()).or_default();
            let sequence_number = rows.last().map_or(1, |m| m.sequence_number + 1);

            let message = Message {
                id: MessageId::new(uuid::Uuid::new_v4().to_string()),
                session_id: session_id.clone(),
                author_id: author_id.clone(),
                content: input.content,
                kind: input.kind,
                translation: input.translation,
                sequence_number,
                created_at: now,
                feedback: input.feedback,
            };
            rows.push(message.clone());

            tables
                .message_sessions
                .insert(message.id.clone(), session_id.clone());
            if let Some(scores) = input.feedback {
                tables.feedback.insert(message.id.clone(), scores);
            }

            (message, session)
        };

        // The feed carries bare message rows; feedback travels separately
        let row = Message {
            feedback: None,
            ..message.clone()
        };
        self.publish(Topic::Messages(session_id.clone()), "messages", false, &row);
        if let Some(scores) = message.feedback {
            let feedback = MessageFeedback {
                message_id: message.id.clone(),
                scores,
            };
            self.publish_feedback(session_id, &feedback, false);
        }
        self.publish(
            Topic::Sessions(session.owner_id.clone()),
            "sessions",
            true,
            &session,
        );

        Ok(message)
    }

    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        self.transmit("list_messages")?;

        let tables = self.tables.lock().await;
        let messages = tables
            .messages
            .get(session_id)
            .map(|rows| {
                rows.iter()
                    .map(|m| Message {
                        feedback: tables.feedback.get(&m.id).copied(),
                        ..m.clone()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn add_feedback(
        &self,
        message_id: &MessageId,
        scores: FeedbackScores,
    ) -> Result<MessageFeedback> {
        scores.validate()?;
        self.transmit("add_feedback")?;

        let session_id = {
            let mut tables = self.tables.lock().await;
            let session_id = tables.message_sessions.get(message_id).cloned().ok_or_else(|| {
                AppError::constraint(format!("message {} does not exist", message_id))
            })?;
            if tables.feedback.contains_key(message_id) {
                return Err(AppError::constraint(format!(
                    "feedback for message {} already exists",
                    message_id
                )));
            }
            tables.feedback.insert(message_id.clone(), scores);
            session_id
        };

        let feedback = MessageFeedback {
            message_id: message_id.clone(),
            scores,
        };
        self.publish_feedback(&session_id, &feedback, false);
        Ok(feedback)
    }

    async fn update_feedback(
        &self,
        message_id: &MessageId,
        patch: FeedbackPatch,
    ) -> Result<MessageFeedback> {
        patch.validate()?;
        self.transmit("update_feedback")?;

        let (session_id, scores) = {
            let mut tables = self.tables.lock().await;
            let session_id = tables.message_sessions.get(message_id).cloned();
            let scores = tables.feedback.get_mut(message_id);
            match (session_id, scores) {
                (Some(session_id), Some(scores)) => {
                    patch.apply(scores);
                    (session_id, *scores)
                }
                _ => {
                    return Err(AppError::query(format!(
                        "no feedback for message {}",
                        message_id
                    )))
                }
            }
        };

        let feedback = MessageFeedback {
            message_id: message_id.clone(),
            scores,
        };
        self.publish_feedback(&session_id, &feedback, true);
        Ok(feedback)
    }
}
