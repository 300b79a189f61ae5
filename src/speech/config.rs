use crate::model::Language;
use serde::{Deserialize, Serialize};

/// Configuration for one recording pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Recognition locale (e.g. "es-ES"); empty means unset
    pub language: String,

    /// Phrase the learner is expected to say, scored against
    pub reference_text: String,

    /// Recognition results buffered between engine and session
    pub result_buffer: usize,
}

impl SpeechConfig {
    pub fn new(language: Language, reference_text: impl Into<String>) -> Self {
        Self {
            language: language.speech_locale().to_string(),
            reference_text: reference_text.into(),
            ..Self::default()
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: String::new(),
            reference_text: String::new(),
            result_buffer: 64,
        }
    }
}
