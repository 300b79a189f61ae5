pub mod config;
pub mod error;
pub mod model;
pub mod nats;
pub mod speech;
pub mod store;
pub mod stream;
pub mod sync;

pub use config::Config;
pub use error::{AppError, DataStoreErrorKind, Result};
pub use model::{
    DraftId, EntryId, FeedbackScores, Language, Level, Message, MessageFeedback, MessageId,
    MessageKind, OwnerId, Session, SessionId, SessionStatus,
};
pub use nats::{ChangeMessage, ChangeType, NatsClient};
pub use speech::{ReplayEngine, SpeechConfig, SpeechEngine, SpeechSession, SpeechState};
pub use store::{MemoryStore, RemoteStore, RestStore};
pub use stream::{ChangeFeed, ChangeStreamAdapter, MemoryFeed, Topic};
pub use sync::{LoadingTracker, Reconciler, SessionUpdate, ViewMessage};
