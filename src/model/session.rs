use super::ids::{OwnerId, SessionId};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target language of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Fr,
    De,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
        }
    }

    /// Locale handed to the speech engine
    pub fn speech_locale(&self) -> &'static str {
        match self {
            Language::En => "en-US",
            Language::Es => "es-ES",
            Language::Fr => "fr-FR",
            Language::De => "de-DE",
        }
    }
}

impl FromStr for Language {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            "fr" => Ok(Language::Fr),
            "de" => Ok(Language::De),
            other => Err(AppError::validation(format!("unsupported language: {}", other))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Proficiency level of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl FromStr for Level {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(AppError::validation(format!("unsupported level: {}", other))),
        }
    }
}

/// Session lifecycle status.
///
/// Variants are declared in progression order, so `Ord` encodes the one-way
/// transition rule: a status may only be replaced by one that compares
/// greater or equal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Archived,
    Deleted,
}

impl SessionStatus {
    /// Whether moving from `self` to `next` respects the one-way order
    pub fn can_become(&self, next: SessionStatus) -> bool {
        next >= *self
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "archived" => Ok(SessionStatus::Archived),
            "deleted" => Ok(SessionStatus::Deleted),
            other => Err(AppError::validation(format!("unknown session status: {}", other))),
        }
    }
}

/// One learning conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Owner of the session (row-level ownership key)
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,

    pub title: String,
    pub language: Language,
    pub level: Level,
    pub status: SessionStatus,

    /// Touched server-side whenever a message is inserted
    pub last_message_at: DateTime<Utc>,

    /// Touched server-side on message insert and session update
    pub last_accessed_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}
