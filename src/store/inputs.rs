use crate::error::{AppError, Result};
use crate::model::validate_score;
use crate::model::{FeedbackScores, Language, Level, MessageKind, SessionStatus};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_TITLE: &str = "New Chat Session";

/// Payload for creating a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub title: String,
    pub language: Language,
    pub level: Level,
    pub status: SessionStatus,
}

impl NewSession {
    pub fn new(language: Language, level: Level) -> Self {
        Self {
            title: DEFAULT_SESSION_TITLE.to_string(),
            language,
            level,
            status: SessionStatus::Active,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("session title must not be empty"));
        }
        Ok(())
    }
}

/// Partial session update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
}

impl SessionPatch {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.language.is_none()
            && self.level.is_none()
            && self.status.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(AppError::validation("session update has no changes"));
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(AppError::validation("session title must not be empty"));
            }
        }
        Ok(())
    }

    /// Check the patch against the session's current status
    pub fn validate_transition(&self, current: SessionStatus) -> Result<()> {
        match self.status {
            Some(next) if !current.can_become(next) => Err(AppError::validation(format!(
                "session status cannot move from {:?} to {:?}",
                current, next
            ))),
            _ => Ok(()),
        }
    }
}

/// Payload for creating a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackScores>,
}

impl NewMessage {
    pub fn new(content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            content: content.into(),
            kind,
            translation: None,
            feedback: None,
        }
    }

    pub fn with_feedback(mut self, feedback: Option<FeedbackScores>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(AppError::validation("message content must not be empty"));
        }
        if let Some(feedback) = &self.feedback {
            feedback.validate()?;
        }
        Ok(())
    }
}

/// Partial feedback update; every present score is range-checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluency_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness_score: Option<f64>,
}

impl FeedbackPatch {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("pronunciation_score", self.pronunciation_score),
            ("accuracy_score", self.accuracy_score),
            ("fluency_score", self.fluency_score),
            ("completeness_score", self.completeness_score),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                validate_score(name, value)?;
            }
        }
        Ok(())
    }

    /// Apply on top of existing scores
    pub fn apply(&self, scores: &mut FeedbackScores) {
        if let Some(v) = self.pronunciation_score {
            scores.pronunciation_score = v;
        }
        if let Some(v) = self.accuracy_score {
            scores.accuracy_score = v;
        }
        if let Some(v) = self.fluency_score {
            scores.fluency_score = v;
        }
        if let Some(v) = self.completeness_score {
            scores.completeness_score = v;
        }
    }
}

impl From<FeedbackScores> for FeedbackPatch {
    fn from(scores: FeedbackScores) -> Self {
        Self {
            pronunciation_score: Some(scores.pronunciation_score),
            accuracy_score: Some(scores.accuracy_score),
            fluency_score: Some(scores.fluency_score),
            completeness_score: Some(scores.completeness_score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_defaults() {
        let input = NewSession::new(Language::default(), Level::default());
        assert_eq!(input.title, DEFAULT_SESSION_TITLE);
        assert_eq!(input.language, Language::En);
        assert_eq!(input.level, Level::Beginner);
        assert_eq!(input.status, SessionStatus::Active);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(NewMessage::new("   ", MessageKind::Text).validate().is_err());
        assert!(NewMessage::new("Hola", MessageKind::Text).validate().is_ok());
    }

    #[test]
    fn out_of_range_feedback_is_rejected() {
        let feedback = FeedbackScores {
            pronunciation_score: 101.0,
            accuracy_score: 10.0,
            fluency_score: 10.0,
            completeness_score: 10.0,
        };
        let input = NewMessage::new("Hola", MessageKind::Audio).with_feedback(Some(feedback));
        assert!(matches!(input.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn backwards_status_patch_is_rejected() {
        let patch = SessionPatch::status(SessionStatus::Active);
        assert!(patch.validate_transition(SessionStatus::Archived).is_err());
        assert!(patch.validate_transition(SessionStatus::Active).is_ok());
        assert!(SessionPatch::title("Verbs")
            .validate_transition(SessionStatus::Deleted)
            .is_ok());
    }

    #[test]
    fn feedback_patch_checks_only_present_scores() {
        let patch = FeedbackPatch {
            fluency_score: Some(55.0),
            ..FeedbackPatch::default()
        };
        assert!(patch.validate().is_ok());

        let bad = FeedbackPatch {
            accuracy_score: Some(-3.0),
            ..FeedbackPatch::default()
        };
        assert!(bad.validate().is_err());

        let mut scores = FeedbackScores {
            pronunciation_score: 1.0,
            accuracy_score: 2.0,
            fluency_score: 3.0,
            completeness_score: 4.0,
        };
        patch.apply(&mut scores);
        assert_eq!(scores.fluency_score, 55.0);
        assert_eq!(scores.accuracy_score, 2.0);
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let json = serde_json::to_value(SessionPatch::status(SessionStatus::Archived)).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "archived" }));
    }
}
