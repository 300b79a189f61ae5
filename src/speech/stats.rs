use super::session::SpeechState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Statistics about a speech session
#[derive(Debug, Clone, Serialize)]
pub struct SpeechStats {
    pub state: SpeechState,

    /// When the current (or last) recording pass started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Recognition results captured in the current buffer
    pub results_count: usize,
}
