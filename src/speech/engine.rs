use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// Pronunciation sub-scores of one alternative, as reported by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentScores {
    #[serde(rename = "AccuracyScore", default)]
    pub accuracy: Option<f64>,
    #[serde(rename = "FluencyScore", default)]
    pub fluency: Option<f64>,
    #[serde(rename = "CompletenessScore", default)]
    pub completeness: Option<f64>,
    #[serde(rename = "PronScore", default)]
    pub pronunciation: Option<f64>,
}

/// One ranked recognition hypothesis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    #[serde(rename = "Display", default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    #[serde(
        rename = "PronunciationAssessment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub scores: Option<AssessmentScores>,
}

/// One recognition event; alternatives arrive best-first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    #[serde(rename = "NBest", default)]
    pub alternatives: Vec<Alternative>,
}

/// Speech recognition collaborator
///
/// Implementations wrap a vendor recognizer configured for pronunciation
/// assessment against a reference phrase.
#[async_trait::async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Open the engine and start recognizing
    ///
    /// Returns a channel receiver that yields results until `stop` is called
    async fn start(
        &mut self,
        language: &str,
        reference_text: &str,
    ) -> Result<mpsc::Receiver<RecognitionResult>>;

    /// Stop recognizing; the result channel closes once drained
    async fn stop(&mut self) -> Result<()>;

    /// Check if the engine is currently capturing
    fn is_capturing(&self) -> bool;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// Engine that replays a fixed list of results (offline runs and tests)
pub struct ReplayEngine {
    results: Vec<RecognitionResult>,
    unavailable: Option<String>,
    tx: Option<mpsc::Sender<RecognitionResult>>,
}

impl ReplayEngine {
    pub fn new(results: Vec<RecognitionResult>) -> Self {
        Self {
            results,
            unavailable: None,
            tx: None,
        }
    }

    /// Engine whose start always fails (e.g. microphone permission denied)
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            unavailable: Some(reason.into()),
            tx: None,
        }
    }
}

#[async_trait::async_trait]
impl SpeechEngine for ReplayEngine {
    async fn start(
        &mut self,
        language: &str,
        reference_text: &str,
    ) -> Result<mpsc::Receiver<RecognitionResult>> {
        if let Some(reason) = &self.unavailable {
            return Err(AppError::SpeechEngine(reason.clone()));
        }

        info!(
            "Replaying {} recognition result(s) for {} ({:?})",
            self.results.len(),
            language,
            reference_text
        );

        let (tx, rx) = mpsc::channel(self.results.len().max(1));
        for result in &self.results {
            tx.try_send(result.clone())
                .map_err(|e| AppError::SpeechEngine(format!("replay buffer: {}", e)))?;
        }
        self.tx = Some(tx);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        // dropping the sender closes the channel
        self.tx = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "replay"
    }
}
