use super::loading::{ops, LoadingTracker};
use super::sessions::SessionBook;
use super::view::{ConversationView, MergeOutcome, ViewMessage};
use crate::error::{AppError, DataStoreErrorKind, Result};
use crate::model::{
    DraftId, FeedbackScores, Language, Level, MessageId, MessageKind, OwnerId, Session, SessionId,
    SessionStatus,
};
use crate::store::{NewMessage, NewSession, RemoteStore, SessionPatch};
use crate::stream::{ChangeEvent, ChangeFeed, ChangeStreamAdapter, Entity, Operation, Topic};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

/// What an accepted session update means for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    Updated,
    /// The session was archived; the caller should navigate away from it
    Archived,
    Deleted,
}

#[derive(Default)]
struct SyncState {
    sessions: SessionBook,
    views: HashMap<SessionId, ConversationView>,
    active: Option<SessionId>,
    /// In-flight message fetch and the session it belongs to
    fetch: Option<(SessionId, AbortHandle)>,
}

impl SyncState {
    fn view_mut(&mut self, session_id: &SessionId) -> &mut ConversationView {
        self.views
            .entry(session_id.clone())
            .or_insert_with(|| ConversationView::new(session_id.clone()))
    }

    fn cancel_fetch(&mut self) {
        if let Some((session_id, handle)) = self.fetch.take() {
            debug!("Cancelling message fetch for {}", session_id);
            handle.abort();
        }
    }

    fn apply(&mut self, event: ChangeEvent) -> MergeOutcome {
        match (event.operation, event.entity) {
            (Operation::Delete, Entity::Session(session)) => {
                self.sessions.mark_deleted(&session.id)
            }
            (_, Entity::Session(session)) => self.sessions.apply(session),
            (Operation::Delete, Entity::Message(message)) => {
                self.view_mut(&message.session_id).remove(&message.id)
            }
            (_, Entity::Message(message)) => {
                let session_id = message.session_id.clone();
                self.view_mut(&session_id).apply_message(message)
            }
            (Operation::Delete, Entity::Feedback(feedback)) => {
                match self.view_holding(&feedback.message_id) {
                    Some(view) => view.clear_feedback(&feedback.message_id),
                    None => MergeOutcome::Ignored,
                }
            }
            (_, Entity::Feedback(feedback)) => {
                if let Some(view) = self.view_holding(&feedback.message_id) {
                    return view.apply_feedback(feedback);
                }
                match event.topic {
                    Topic::Messages(session_id) => {
                        self.view_mut(&session_id).apply_feedback(feedback)
                    }
                    Topic::Sessions(_) => MergeOutcome::Ignored,
                }
            }
        }
    }

    fn view_holding(&mut self, message_id: &MessageId) -> Option<&mut ConversationView> {
        self.views.values_mut().find(|v| v.contains(message_id))
    }
}

struct Inner {
    store: Arc<dyn RemoteStore>,
    state: Arc<Mutex<SyncState>>,
    stream: Mutex<ChangeStreamAdapter>,
    loading: LoadingTracker,
    refreshing: AtomicBool,
    pump: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Keeps one consistent view of the owner's sessions and each session's
/// messages, merging optimistic writes, store responses and change-stream
/// events.
///
/// Cheap to clone; clones share state. Must be created inside a tokio
/// runtime.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RemoteStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent>();
        let state = Arc::new(Mutex::new(SyncState::default()));

        let pump_state = Arc::clone(&state);
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let outcome = pump_state.lock().await.apply(event);
                debug!("Applied change event: {:?}", outcome);
            }
        });

        Self {
            inner: Arc::new(Inner {
                store,
                state,
                stream: Mutex::new(ChangeStreamAdapter::new(feed, tx)),
                loading: LoadingTracker::new(),
                refreshing: AtomicBool::new(false),
                pump,
            }),
        }
    }

    pub fn loading(&self) -> &LoadingTracker {
        &self.inner.loading
    }

    fn owner(&self) -> Result<OwnerId> {
        self.inner
            .store
            .current_owner()
            .ok_or_else(|| AppError::AuthRequired("no signed-in user".to_string()))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Last good snapshot of the owner's sessions, most recently accessed
    /// first. Starts a background refresh unless one is already running.
    pub async fn list_sessions(&self, owner_id: &OwnerId) -> Vec<Session> {
        let snapshot = self.inner.state.lock().await.sessions.ordered();

        if !self.inner.refreshing.swap(true, Ordering::SeqCst) {
            let this = self.clone();
            let owner_id = owner_id.clone();
            tokio::spawn(async move {
                if let Err(e) = this.refresh_sessions(&owner_id).await {
                    warn!("Background session refresh failed: {}", e);
                }
                this.inner.refreshing.store(false, Ordering::SeqCst);
            });
        }

        snapshot
    }

    /// Fetch the owner's sessions and merge them into the local list
    pub async fn refresh_sessions(&self, owner_id: &OwnerId) -> Result<Vec<Session>> {
        let _loading = self.inner.loading.guard(ops::LOAD_SESSIONS);

        // subscribe first so nothing committed during the fetch is missed
        self.inner.stream.lock().await.watch_sessions(owner_id).await?;

        let fetched = self.inner.store.list_sessions(owner_id).await.map_err(|e| {
            error!("Failed to load sessions: {}", e);
            e
        })?;

        let mut state = self.inner.state.lock().await;
        for session in fetched {
            state.sessions.apply(session);
        }
        Ok(state.sessions.ordered())
    }

    pub async fn session(&self, session_id: &SessionId) -> Option<Session> {
        self.inner.state.lock().await.sessions.get(session_id).cloned()
    }

    /// Create a session, put it at the front of the list and make it active
    pub async fn create_session(&self, language: Language, level: Level) -> Result<Session> {
        let owner_id = self.owner()?;
        let input = NewSession::new(language, level);
        input.validate()?;

        let _loading = self.inner.loading.guard(ops::CREATE_SESSION);
        let session = self
            .inner
            .store
            .create_session(&owner_id, input)
            .await
            .map_err(|e| {
                error!("Failed to create session: {}", e);
                e
            })?;

        info!("Created session {} ({})", session.id, session.language);

        {
            let mut state = self.inner.state.lock().await;
            state.sessions.apply(session.clone());
            state
                .views
                .insert(session.id.clone(), ConversationView::empty_loaded(session.id.clone()));
            state.cancel_fetch();
            state.active = Some(session.id.clone());
        }

        if let Err(e) = self.inner.stream.lock().await.watch_messages(&session.id).await {
            warn!("Failed to subscribe to new session {}: {}", session.id, e);
        }

        Ok(session)
    }

    /// Apply a patch after checking it against the one-way status order
    pub async fn update_session(
        &self,
        session_id: &SessionId,
        patch: SessionPatch,
    ) -> Result<SessionUpdate> {
        patch.validate()?;
        let owner_id = self.owner()?;

        let _loading = self.inner.loading.guard(ops::UPDATE_SESSION);

        let current = match self.session(session_id).await {
            Some(current) => current,
            None => {
                // not listed yet; the backend row decides the transition
                let fetched = self
                    .inner
                    .store
                    .get_session(session_id, &owner_id)
                    .await
                    .map_err(|e| {
                        error!("Failed to load session {}: {}", session_id, e);
                        e
                    })?;
                self.inner.state.lock().await.sessions.apply(fetched.clone());
                fetched
            }
        };
        patch.validate_transition(current.status)?;

        let updated = self
            .inner
            .store
            .update_session(session_id, &owner_id, patch.clone())
            .await
            .map_err(|e| {
                error!("Failed to update session {}: {}", session_id, e);
                e
            })?;

        self.inner.state.lock().await.sessions.apply(updated);

        Ok(match patch.status {
            Some(SessionStatus::Archived) => SessionUpdate::Archived,
            Some(SessionStatus::Deleted) => SessionUpdate::Deleted,
            _ => SessionUpdate::Updated,
        })
    }

    pub async fn archive_session(&self, session_id: &SessionId) -> Result<SessionUpdate> {
        self.update_session(session_id, SessionPatch::status(SessionStatus::Archived))
            .await
    }

    pub async fn delete_session(&self, session_id: &SessionId) -> Result<SessionUpdate> {
        self.update_session(session_id, SessionPatch::status(SessionStatus::Deleted))
            .await
    }

    // ------------------------------------------------------------------
    // Active session and messages
    // ------------------------------------------------------------------

    pub async fn active_session(&self) -> Option<SessionId> {
        self.inner.state.lock().await.active.clone()
    }

    /// Make `session_id` active, follow its change stream and fetch its
    /// messages unless they are already cached.
    ///
    /// A fetch for a previously active session is cancelled, and a response
    /// that still arrives after the switch is discarded.
    pub async fn select_session(&self, session_id: &SessionId) -> Result<()> {
        let _loading = self.inner.loading.guard(ops::LOAD_MESSAGES);

        let (needs_fetch, known) = {
            let mut state = self.inner.state.lock().await;
            if state.active.as_ref() != Some(session_id) {
                state.cancel_fetch();
            }
            state.active = Some(session_id.clone());
            let needs_fetch = !state.view_mut(session_id).is_loaded();
            (needs_fetch, state.sessions.get(session_id).is_some())
        };

        info!("Selected session {}", session_id);
        self.inner
            .stream
            .lock()
            .await
            .watch_messages(session_id)
            .await?;

        if !known {
            let owner_id = self.owner()?;
            let session = self.inner.store.get_session(session_id, &owner_id).await?;
            self.inner.state.lock().await.sessions.apply(session);
        }

        if !needs_fetch {
            return Ok(());
        }

        let store = Arc::clone(&self.inner.store);
        let fetch_id = session_id.clone();
        let task = tokio::spawn(async move { store.list_messages(&fetch_id).await });

        {
            let mut state = self.inner.state.lock().await;
            if state.active.as_ref() != Some(session_id) {
                task.abort();
                return Ok(());
            }
            if let Some((previous, handle)) =
                state.fetch.replace((session_id.clone(), task.abort_handle()))
            {
                if &previous != session_id {
                    handle.abort();
                }
            }
        }

        let fetched = match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                debug!("Message fetch for {} cancelled", session_id);
                return Ok(());
            }
            Err(e) => return Err(AppError::Unknown(e.to_string())),
        };

        let mut state = self.inner.state.lock().await;
        if matches!(&state.fetch, Some((id, _)) if id == session_id) {
            state.fetch = None;
        }
        if state.active.as_ref() != Some(session_id) {
            debug!("Discarding stale messages for {}", session_id);
            return Ok(());
        }

        let messages = fetched.map_err(|e| {
            error!("Failed to load messages for {}: {}", session_id, e);
            e
        })?;
        info!("Loaded {} message(s) for {}", messages.len(), session_id);
        state.view_mut(session_id).load(messages);
        Ok(())
    }

    /// Clear the active session and release its subscription
    pub async fn deselect(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.cancel_fetch();
            state.active = None;
        }
        self.inner.stream.lock().await.release_messages();
    }

    pub async fn messages(&self, session_id: &SessionId) -> Vec<ViewMessage> {
        let state = self.inner.state.lock().await;
        state
            .views
            .get(session_id)
            .map(|v| v.messages().to_vec())
            .unwrap_or_default()
    }

    pub async fn active_messages(&self) -> Vec<ViewMessage> {
        match self.active_session().await {
            Some(session_id) => self.messages(&session_id).await,
            None => Vec::new(),
        }
    }

    /// Show the message immediately as an optimistic entry, then create it.
    ///
    /// On success the entry is promoted to the server row (whichever of the
    /// response or the change-stream insert lands first wins, the other
    /// merges into the same entry). On failure the entry is removed.
    pub async fn send_message(
        &self,
        session_id: &SessionId,
        content: impl Into<String>,
        kind: MessageKind,
        feedback: Option<FeedbackScores>,
    ) -> Result<MessageId> {
        let input = NewMessage::new(content, kind).with_feedback(feedback);
        input.validate()?;
        let owner_id = self.owner()?;

        let _loading = self.inner.loading.guard(ops::SEND_MESSAGE);
        let draft_id = DraftId::generate();
        self.inner
            .state
            .lock()
            .await
            .view_mut(session_id)
            .push_draft(draft_id, &owner_id, &input);

        debug!("Optimistic entry {} in {}", draft_id, session_id);

        match self
            .inner
            .store
            .create_message(session_id, &owner_id, input)
            .await
        {
            Ok(message) => {
                let message_id = message.id.clone();
                let outcome = self
                    .inner
                    .state
                    .lock()
                    .await
                    .view_mut(session_id)
                    .confirm_draft(draft_id, message);
                debug!("Confirmed {} as {}: {:?}", draft_id, message_id, outcome);
                Ok(message_id)
            }
            Err(e) => {
                self.inner
                    .state
                    .lock()
                    .await
                    .view_mut(session_id)
                    .rollback(draft_id);
                error!("Failed to send message, rolled back {}: {}", draft_id, e);
                Err(e)
            }
        }
    }

    /// Store feedback for a message (create, or overwrite when it already
    /// exists) and attach it locally
    pub async fn record_feedback(
        &self,
        message_id: &MessageId,
        scores: FeedbackScores,
    ) -> Result<()> {
        scores.validate()?;

        let _loading = self.inner.loading.guard(ops::RECORD_FEEDBACK);
        let feedback = match self.inner.store.add_feedback(message_id, scores).await {
            Ok(feedback) => feedback,
            Err(AppError::DataStore {
                kind: DataStoreErrorKind::Constraint,
                ..
            }) => {
                debug!("Feedback for {} exists, overwriting", message_id);
                self.inner
                    .store
                    .update_feedback(message_id, scores.into())
                    .await?
            }
            Err(e) => return Err(e),
        };

        let mut state = self.inner.state.lock().await;
        if let Some(view) = state.view_holding(message_id) {
            view.apply_feedback(feedback);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Change stream
    // ------------------------------------------------------------------

    /// Merge one normalized change event
    pub async fn apply_change(&self, event: ChangeEvent) -> MergeOutcome {
        self.inner.state.lock().await.apply(event)
    }

    pub async fn subscribed_topics(&self) -> Vec<Topic> {
        self.inner.stream.lock().await.active_topics()
    }

    /// Release every subscription and cancel any in-flight fetch
    pub async fn shutdown(&self) {
        self.inner.state.lock().await.cancel_fetch();
        self.inner.stream.lock().await.release_all();
        info!("Reconciler shut down");
    }
}
