use super::view::MergeOutcome;
use crate::model::{Session, SessionId, SessionStatus};
use std::collections::HashMap;
use tracing::debug;

/// Known sessions keyed by id, with monotonic status
#[derive(Debug, Clone, Default)]
pub struct SessionBook {
    sessions: HashMap<SessionId, Session>,
}

impl SessionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Upsert a session row, dropping it when its status is behind the one
    /// already held
    pub fn apply(&mut self, session: Session) -> MergeOutcome {
        match self.sessions.get(&session.id) {
            Some(current) if !current.status.can_become(session.status) => {
                debug!(
                    "Dropping stale session {} ({:?} is behind {:?})",
                    session.id, session.status, current.status
                );
                MergeOutcome::Ignored
            }
            Some(_) => {
                self.sessions.insert(session.id.clone(), session);
                MergeOutcome::Replaced
            }
            None => {
                self.sessions.insert(session.id.clone(), session);
                MergeOutcome::Inserted
            }
        }
    }

    /// Tombstone a session deleted on the backend
    pub fn mark_deleted(&mut self, id: &SessionId) -> MergeOutcome {
        match self.sessions.get_mut(id) {
            Some(session) if session.status != SessionStatus::Deleted => {
                session.status = SessionStatus::Deleted;
                MergeOutcome::Removed
            }
            _ => MergeOutcome::Ignored,
        }
    }

    /// Visible sessions, most recently accessed first
    pub fn ordered(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .values()
            .filter(|s| s.status != SessionStatus::Deleted)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Language, Level, OwnerId};
    use chrono::{Duration, Utc};

    fn session(id: &str, status: SessionStatus, accessed_mins_ago: i64) -> Session {
        let now = Utc::now();
        Session {
            id: SessionId::from(id),
            owner_id: OwnerId::from("u-1"),
            title: "New Chat Session".to_string(),
            language: Language::Es,
            level: Level::Beginner,
            status,
            last_message_at: now,
            last_accessed_at: now - Duration::minutes(accessed_mins_ago),
            created_at: now - Duration::days(1),
        }
    }

    #[test]
    fn stale_status_is_dropped() {
        let mut book = SessionBook::new();
        book.apply(session("s-1", SessionStatus::Archived, 0));

        let outcome = book.apply(session("s-1", SessionStatus::Active, 0));
        assert_eq!(outcome, MergeOutcome::Ignored);
        assert_eq!(
            book.get(&SessionId::from("s-1")).unwrap().status,
            SessionStatus::Archived
        );
    }

    #[test]
    fn ordered_by_last_access_without_deleted() {
        let mut book = SessionBook::new();
        book.apply(session("old", SessionStatus::Active, 30));
        book.apply(session("new", SessionStatus::Active, 1));
        book.apply(session("gone", SessionStatus::Deleted, 0));

        let ids: Vec<_> = book.ordered().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SessionId::from("new"), SessionId::from("old")]);
    }

    #[test]
    fn deletion_cannot_be_undone_by_late_rows() {
        let mut book = SessionBook::new();
        book.apply(session("s-1", SessionStatus::Active, 0));
        assert_eq!(book.mark_deleted(&SessionId::from("s-1")), MergeOutcome::Removed);
        assert_eq!(
            book.apply(session("s-1", SessionStatus::Archived, 0)),
            MergeOutcome::Ignored
        );
        assert!(book.ordered().is_empty());
    }
}
