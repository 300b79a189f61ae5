use super::ids::{MessageId, OwnerId, SessionId};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Author id carried by messages produced by the automated counterpart
pub const ASSISTANT_AUTHOR_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Kind of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Audio,
    System,
}

impl FromStr for MessageKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "audio" => Ok(MessageKind::Audio),
            "system" => Ok(MessageKind::System),
            other => Err(AppError::validation(format!("unknown message type: {}", other))),
        }
    }
}

/// Four pronunciation sub-scores, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackScores {
    pub pronunciation_score: f64,
    pub accuracy_score: f64,
    pub fluency_score: f64,
    pub completeness_score: f64,
}

impl FeedbackScores {
    /// Reject any score outside [0, 100] (NaN included)
    pub fn validate(&self) -> Result<(), AppError> {
        let scores = [
            ("pronunciation_score", self.pronunciation_score),
            ("accuracy_score", self.accuracy_score),
            ("fluency_score", self.fluency_score),
            ("completeness_score", self.completeness_score),
        ];
        for (name, value) in scores {
            validate_score(name, value)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_score(name: &str, value: f64) -> Result<(), AppError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "{} must be within [0, 100], got {}",
            name, value
        )))
    }
}

/// Feedback record as stored in the `message_feedback` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFeedback {
    pub message_id: MessageId,

    #[serde(flatten)]
    pub scores: FeedbackScores,
}

/// One confirmed turn in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,

    #[serde(rename = "user_id")]
    pub author_id: OwnerId,

    pub content: String,

    #[serde(rename = "type")]
    pub kind: MessageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,

    /// Strictly increasing per session, assigned by the backend
    pub sequence_number: i64,

    pub created_at: DateTime<Utc>,

    /// Embedded feedback row, present on list responses and once attached
    #[serde(
        default,
        rename = "message_feedback",
        skip_serializing_if = "Option::is_none"
    )]
    pub feedback: Option<FeedbackScores>,
}

impl Message {
    pub fn is_from_assistant(&self) -> bool {
        self.author_id.as_str() == ASSISTANT_AUTHOR_ID
    }
}
