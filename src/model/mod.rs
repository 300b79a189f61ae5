//! Domain records shared by the store, the change stream and the reconciler
//!
//! Field names follow the backend's row shape so the same types decode
//! request/response bodies and change-feed payloads.

mod ids;
mod message;
mod session;

pub use ids::{DraftId, EntryId, MessageId, OwnerId, SessionId};
pub(crate) use message::validate_score;
pub use message::{FeedbackScores, Message, MessageFeedback, MessageKind, ASSISTANT_AUTHOR_ID};
pub use session::{Language, Level, Session, SessionStatus};
