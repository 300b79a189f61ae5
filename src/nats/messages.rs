use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of row change carried by a [`ChangeMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// Row change notification as published on the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// Source table ("sessions", "messages", "message_feedback")
    pub table: String,

    #[serde(rename = "eventType")]
    pub event_type: ChangeType,

    /// Row after the change (insert/update)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,

    /// Row before the change (update/delete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,

    /// RFC3339 commit timestamp, if the backend provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl ChangeMessage {
    pub fn insert(table: &str, row: Value) -> Self {
        Self {
            table: table.to_string(),
            event_type: ChangeType::Insert,
            new: Some(row),
            old: None,
            commit_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn update(table: &str, row: Value) -> Self {
        Self {
            event_type: ChangeType::Update,
            ..Self::insert(table, row)
        }
    }

    pub fn delete(table: &str, old: Value) -> Self {
        Self {
            table: table.to_string(),
            event_type: ChangeType::Delete,
            new: None,
            old: Some(old),
            commit_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// The row the change is about: `new` for inserts/updates, `old` for deletes
    pub fn record(&self) -> Option<&Value> {
        match self.event_type {
            ChangeType::Delete => self.old.as_ref(),
            ChangeType::Insert | ChangeType::Update => self.new.as_ref(),
        }
    }
}
