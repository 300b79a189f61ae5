//! Change stream plumbing
//!
//! This module provides:
//! - `ChangeFeed`: the push-notification collaborator (NATS or in-memory)
//! - `ChangeStreamAdapter`: per-topic subscriptions with explicit release
//! - `ChangeEvent`: the normalized `{kind, operation, entity}` shape the
//!   reconciler consumes

mod adapter;
mod feed;

pub use adapter::{
    normalize, ChangeEvent, ChangeStreamAdapter, Entity, EntityKind, Operation,
    SubscriptionHandle,
};
pub use feed::MemoryFeed;

use crate::error::Result;
use crate::model::{OwnerId, SessionId};
use crate::nats::ChangeMessage;
use futures::stream::BoxStream;
use std::fmt;

/// Raw change notifications for one topic
pub type ChangeStream = BoxStream<'static, ChangeMessage>;

/// A change-feed filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Messages (and their feedback) of one session
    Messages(SessionId),
    /// The owner's session list
    Sessions(OwnerId),
}

impl Topic {
    /// Dotted subject name under a prefix
    pub fn subject(&self, prefix: &str) -> String {
        match self {
            Topic::Messages(id) => format!("{}.messages.{}", prefix, id),
            Topic::Sessions(owner) => format!("{}.sessions.{}", prefix, owner),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Messages(id) => write!(f, "messages:{}", id),
            Topic::Sessions(owner) => write!(f, "sessions:{}", owner),
        }
    }
}

/// Push-based change notification source
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription; dropping the returned stream releases it
    async fn subscribe(&self, topic: &Topic) -> Result<ChangeStream>;

    /// Feed name for logging
    fn name(&self) -> &str;
}
