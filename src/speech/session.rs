use super::config::SpeechConfig;
use super::engine::{RecognitionResult, SpeechEngine};
use super::feedback::reduce_feedback;
use super::stats::SpeechStats;
use crate::error::{AppError, Result};
use crate::model::FeedbackScores;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Recording lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechState {
    Idle,
    Recording,
    Stopping,
}

/// One learner's recording passes against a speech engine.
///
/// `Idle → Recording → Stopping → Idle`. The result buffer of the last pass
/// survives `stop()` so feedback can be read afterwards; engine failures are
/// kept in [`SpeechSession::error`] and leave the session Idle.
pub struct SpeechSession {
    config: SpeechConfig,
    engine: Box<dyn SpeechEngine>,
    state: SpeechState,
    results: Arc<Mutex<VecDeque<RecognitionResult>>>,
    collector: Option<JoinHandle<()>>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    stopped: bool,
    error: Option<AppError>,
}

impl SpeechSession {
    pub fn new(config: SpeechConfig, engine: Box<dyn SpeechEngine>) -> Self {
        Self {
            config,
            engine,
            state: SpeechState::Idle,
            results: Arc::new(Mutex::new(VecDeque::new())),
            collector: None,
            started_at: None,
            stopped_at: None,
            stopped: false,
            error: None,
        }
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SpeechState::Recording
    }

    /// Error retained from the last failed start/stop
    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    /// Start a recording pass with a fresh result buffer
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SpeechState::Idle {
            warn!("Recording already started");
            return Err(AppError::validation("recording already in progress"));
        }

        self.error = None;

        if self.config.language.trim().is_empty() {
            return Err(self.fail(AppError::SpeechEngine("Language is not set".to_string())));
        }

        info!(
            "Starting speech recognition ({}) with {} engine",
            self.config.language,
            self.engine.name()
        );

        let mut rx = match self
            .engine
            .start(&self.config.language, &self.config.reference_text)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                let e = match e {
                    AppError::SpeechEngine(_) => e,
                    other => AppError::SpeechEngine(other.to_string()),
                };
                return Err(self.fail(e));
            }
        };

        // the previous pass stays readable until the engine is actually running
        self.results = Arc::new(Mutex::new(VecDeque::new()));
        let results = Arc::clone(&self.results);
        let capacity = self.config.result_buffer.max(1);
        self.collector = Some(tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                let mut buffer = results.lock().await;
                if buffer.len() >= capacity {
                    // keep the newest results; feedback reads the last one
                    buffer.pop_front();
                }
                buffer.push_back(result);
            }
        }));

        self.state = SpeechState::Recording;
        self.started_at = Some(Utc::now());
        self.stopped_at = None;

        info!("Speech recognition started");
        Ok(())
    }

    /// Stop the pass, keeping its results for [`SpeechSession::get_feedback`]
    pub async fn stop(&mut self) -> Result<SpeechStats> {
        if self.state != SpeechState::Recording {
            warn!("Recording not active");
            return Err(AppError::validation("recording is not active"));
        }

        self.state = SpeechState::Stopping;
        info!("Stopping speech recognition");

        let stop_result = self.engine.stop().await;

        if let Some(collector) = self.collector.take() {
            if stop_result.is_err() {
                // the engine may never close its channel
                collector.abort();
            } else if let Err(e) = collector.await {
                error!("Result collector panicked: {}", e);
            }
        }

        self.state = SpeechState::Idle;
        self.stopped = true;
        self.stopped_at = Some(Utc::now());

        if let Err(e) = stop_result {
            error!("Failed to stop speech engine: {}", e);
            self.error = Some(AppError::SpeechEngine(e.to_string()));
        }

        Ok(self.stats().await)
    }

    /// Abandon the pass and discard whatever was captured
    pub async fn cancel(&mut self) {
        if self.state != SpeechState::Recording {
            return;
        }

        info!("Cancelling speech recognition");
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        if let Err(e) = self.engine.stop().await {
            warn!("Speech engine stop failed during cancel: {}", e);
        }

        self.results = Arc::new(Mutex::new(VecDeque::new()));
        self.state = SpeechState::Idle;
        self.stopped_at = Some(Utc::now());
    }

    /// Feedback for the last stopped pass; `None` means "no feedback"
    /// (nothing stopped yet, silence, or incomplete scores)
    pub async fn get_feedback(&self) -> Option<FeedbackScores> {
        if !self.stopped || self.state != SpeechState::Idle {
            return None;
        }

        let mut results = self.results.lock().await;
        reduce_feedback(results.make_contiguous())
    }

    pub async fn stats(&self) -> SpeechStats {
        let ended = self.stopped_at.unwrap_or_else(Utc::now);
        let duration_secs = self.started_at.map_or(0.0, |started| {
            ended.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
        });

        SpeechStats {
            state: self.state,
            started_at: self.started_at,
            duration_secs,
            results_count: self.results.lock().await.len(),
        }
    }

    fn fail(&mut self, error: AppError) -> AppError {
        error!("Speech recognition failed: {}", error);
        self.error = Some(error.clone());
        self.state = SpeechState::Idle;
        error
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
    }
}
