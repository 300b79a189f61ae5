//! Speech capture and pronunciation scoring
//!
//! This module provides:
//! - `SpeechEngine`: the recognition collaborator (ranked results with
//!   pronunciation sub-scores)
//! - `SpeechSession`: one recording pass (start/stop/cancel) owning the
//!   result buffer
//! - `reduce_feedback`: folds a finished buffer into one feedback record

mod config;
mod engine;
mod feedback;
mod session;
mod stats;

pub use config::SpeechConfig;
pub use engine::{AssessmentScores, Alternative, RecognitionResult, ReplayEngine, SpeechEngine};
pub use feedback::reduce_feedback;
pub use session::{SpeechSession, SpeechState};
pub use stats::SpeechStats;
