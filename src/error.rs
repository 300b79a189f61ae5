//! Error taxonomy shared by every component.
//!
//! Errors are classified exactly once, where they enter the crate (the
//! `RemoteStore` implementations and the speech engine). Callers match on
//! the variant and never re-inspect the underlying transport error.

use thiserror::Error;

/// Which part of the data store failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStoreErrorKind {
    /// Could not reach the backend at all
    Connection,
    /// The backend rejected or failed the query
    Query,
    /// A unique or foreign key constraint was violated
    Constraint,
}

/// All errors surfaced by the synchronization engine and speech pipeline
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("data store error ({kind:?}): {message}")]
    DataStore {
        kind: DataStoreErrorKind,
        message: String,
    },

    /// Malformed intent payload, caught before anything is transmitted
    #[error("validation error: {0}")]
    Validation(String),

    /// No authenticated owner at call time
    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("speech engine error: {0}")]
    SpeechEngine(String),

    #[error("unexpected error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        AppError::DataStore {
            kind: DataStoreErrorKind::Connection,
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        AppError::DataStore {
            kind: DataStoreErrorKind::Query,
            message: message.into(),
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        AppError::DataStore {
            kind: DataStoreErrorKind::Constraint,
            message: message.into(),
        }
    }

    /// Classify a Postgres / PostgREST error code into the taxonomy
    pub fn from_postgres_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            // undefined_table, undefined_parameter
            "42P01" | "42P02" => AppError::query(message),
            // unique_violation, foreign_key_violation
            "23505" | "23503" => AppError::constraint(message),
            // JWT expired / invalid
            "PGRST301" | "PGRST302" => AppError::AuthRequired(message),
            _ => AppError::query(message),
        }
    }

    /// Whether the caller should send the user to sign-in
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, AppError::AuthRequired(_))
    }

    /// Message suitable for showing to the learner
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::DataStore {
                kind: DataStoreErrorKind::Connection,
                ..
            } => "Unable to connect to the server. Please try again later.",
            AppError::DataStore {
                kind: DataStoreErrorKind::Query,
                ..
            } => "There was an error processing your request. Please try again.",
            AppError::DataStore {
                kind: DataStoreErrorKind::Constraint,
                ..
            } => "This action cannot be completed due to data constraints.",
            AppError::Validation(_) => "Please check your input and try again.",
            AppError::AuthRequired(_) => "Please sign in to continue.",
            AppError::SpeechEngine(_) => "Speech recognition is unavailable right now.",
            AppError::Unknown(_) => "An unexpected error occurred. Please try again later.",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::query(format!("malformed payload: {}", e))
    }
}
