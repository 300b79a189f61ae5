use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Operation names tracked by the reconciler
pub mod ops {
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const CREATE_SESSION: &str = "createSession";
    pub const UPDATE_SESSION: &str = "updateSession";
    pub const LOAD_SESSIONS: &str = "loadSessions";
    pub const LOAD_MESSAGES: &str = "loadMessages";
    pub const RECORD_FEEDBACK: &str = "recordFeedback";
}

/// Named in-flight operations.
///
/// Keys are independent of each other. Each key counts overlapping
/// operations, so a key reads as loading until the last one finishes.
#[derive(Debug, Clone, Default)]
pub struct LoadingTracker {
    in_flight: Arc<Mutex<HashMap<String, usize>>>,
}

impl LoadingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, key: &str) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *in_flight.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn stop(&self, key: &str) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = in_flight.get_mut(key) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn is_loading(&self, key: &str) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.get(key).is_some_and(|count| *count > 0)
    }

    /// Every key seen so far and whether it is loading
    pub fn snapshot(&self) -> HashMap<String, bool> {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight
            .iter()
            .map(|(key, count)| (key.clone(), *count > 0))
            .collect()
    }

    /// Mark `key` loading until the returned guard is dropped
    pub fn guard(&self, key: &str) -> LoadingGuard {
        self.start(key);
        LoadingGuard {
            tracker: self.clone(),
            key: key.to_string(),
        }
    }

    /// Run `operation` with `key` marked loading; released on every exit
    /// path, including cancellation of the returned future
    pub async fn with_loading<F, T>(&self, key: &str, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.guard(key);
        operation.await
    }
}

/// Releases its key on drop
pub struct LoadingGuard {
    tracker: LoadingTracker,
    key: String,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.tracker.stop(&self.key);
    }
}
