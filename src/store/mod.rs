//! Typed request/response boundary to the backend
//!
//! Every operation validates its input before anything is transmitted and
//! returns an already-classified [`AppError`](crate::error::AppError).
//! Implementations:
//! - `RestStore`: PostgREST-style HTTP backend
//! - `MemoryStore`: in-process backend publishing to a `MemoryFeed`

mod inputs;
mod memory;
mod rest;

pub use inputs::{FeedbackPatch, NewMessage, NewSession, SessionPatch, DEFAULT_SESSION_TITLE};
pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::error::Result;
use crate::model::{
    FeedbackScores, Message, MessageFeedback, MessageId, OwnerId, Session, SessionId,
};

#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Authenticated owner, if any
    fn current_owner(&self) -> Option<OwnerId>;

    async fn create_session(&self, owner_id: &OwnerId, input: NewSession) -> Result<Session>;

    /// Owner's sessions, most recently accessed first
    async fn list_sessions(&self, owner_id: &OwnerId) -> Result<Vec<Session>>;

    async fn get_session(&self, session_id: &SessionId, owner_id: &OwnerId) -> Result<Session>;

    async fn update_session(
        &self,
        session_id: &SessionId,
        owner_id: &OwnerId,
        patch: SessionPatch,
    ) -> Result<Session>;

    /// Insert a message (and its feedback, if any). The backend touches the
    /// session's `last_message_at` and `last_accessed_at`.
    async fn create_message(
        &self,
        session_id: &SessionId,
        author_id: &OwnerId,
        input: NewMessage,
    ) -> Result<Message>;

    /// Messages of a session in sequence order, with embedded feedback
    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<Message>>;

    async fn add_feedback(
        &self,
        message_id: &MessageId,
        scores: FeedbackScores,
    ) -> Result<MessageFeedback>;

    async fn update_feedback(
        &self,
        message_id: &MessageId,
        patch: FeedbackPatch,
    ) -> Result<MessageFeedback>;
}
