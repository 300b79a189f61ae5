use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! server_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

server_id!(
    /// Server-assigned session id
    SessionId
);
server_id!(
    /// Server-assigned message id
    MessageId
);
server_id!(
    /// Authenticated owner (user) id
    OwnerId
);

/// Client-generated id of an optimistic entry.
///
/// Distinct in type from [`MessageId`]: a draft only ever becomes a server
/// message through an explicit promotion in the conversation view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DraftId(Uuid);

impl DraftId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "draft-{}", self.0)
    }
}

/// Identity of one row in a conversation view
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryId {
    Draft(DraftId),
    Server(MessageId),
}

impl EntryId {
    pub fn is_draft(&self) -> bool {
        matches!(self, EntryId::Draft(_))
    }

    pub fn server_id(&self) -> Option<&MessageId> {
        match self {
            EntryId::Server(id) => Some(id),
            EntryId::Draft(_) => None,
        }
    }
}
