use crate::model::{
    DraftId, EntryId, FeedbackScores, Message, MessageFeedback, MessageId, MessageKind, OwnerId,
    SessionId,
};
use crate::store::NewMessage;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// What a merge step did to a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// Known entity replaced in place
    Replaced,
    /// Optimistic entry took over the server identity
    Promoted(DraftId),
    Removed,
    /// Feedback held until its message appears
    Deferred,
    /// Nothing changed (stale or irrelevant)
    Ignored,
}

/// One row of a conversation as shown to the learner
#[derive(Debug, Clone, PartialEq)]
pub struct ViewMessage {
    pub id: EntryId,
    pub session_id: SessionId,
    pub author_id: OwnerId,
    pub content: String,
    pub kind: MessageKind,
    pub translation: Option<String>,
    pub feedback: Option<FeedbackScores>,
    /// Server-assigned for confirmed rows; a local guess for drafts
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

impl ViewMessage {
    fn confirmed(message: Message) -> Self {
        Self {
            id: EntryId::Server(message.id),
            session_id: message.session_id,
            author_id: message.author_id,
            content: message.content,
            kind: message.kind,
            translation: message.translation,
            feedback: message.feedback,
            sequence_number: message.sequence_number,
            created_at: message.created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_draft()
    }

    /// Whether `message` is the server copy of this draft
    fn confirms(&self, message: &Message) -> bool {
        self.id.is_draft()
            && self.author_id == message.author_id
            && self.content == message.content
            && self.kind == message.kind
            && message.sequence_number >= self.sequence_number
    }
}

/// Ordered, deduplicated view of one session's messages.
///
/// Every merge is keyed by entity id and is idempotent: applying the same
/// confirmed message twice, in any order relative to its draft's
/// confirmation, leaves exactly one entry.
#[derive(Debug, Clone)]
pub struct ConversationView {
    session_id: SessionId,
    entries: Vec<ViewMessage>,
    promoted: HashMap<DraftId, MessageId>,
    orphan_feedback: HashMap<MessageId, FeedbackScores>,
    /// Deleted rows; late inserts for these are dropped
    deleted: HashSet<MessageId>,
    loaded: bool,
}

impl ConversationView {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            entries: Vec::new(),
            promoted: HashMap::new(),
            orphan_feedback: HashMap::new(),
            deleted: HashSet::new(),
            loaded: false,
        }
    }

    /// View for a session known to have no messages yet
    pub fn empty_loaded(session_id: SessionId) -> Self {
        Self {
            loaded: true,
            ..Self::new(session_id)
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn messages(&self) -> &[ViewMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(&EntryId::Server(id.clone())).is_some()
    }

    /// Highest sequence number in the view, drafts included
    pub fn max_sequence(&self) -> i64 {
        self.entries
            .iter()
            .map(|e| e.sequence_number)
            .max()
            .unwrap_or(0)
    }

    fn position(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    fn sort(&mut self) {
        // confirmed rows sort before drafts sharing a sequence number
        self.entries
            .sort_by_key(|e| (e.sequence_number, e.id.is_draft()));
    }

    /// Append an optimistic entry with sequence `max + 1`
    pub fn push_draft(&mut self, draft_id: DraftId, author_id: &OwnerId, input: &NewMessage) {
        let entry = ViewMessage {
            id: EntryId::Draft(draft_id),
            session_id: self.session_id.clone(),
            author_id: author_id.clone(),
            content: input.content.clone(),
            kind: input.kind,
            translation: input.translation.clone(),
            feedback: input.feedback,
            sequence_number: self.max_sequence() + 1,
            created_at: Utc::now(),
        };
        self.entries.push(entry);
        self.sort();
    }

    /// Merge a confirmed message from the change stream or a fetch
    pub fn apply_message(&mut self, message: Message) -> MergeOutcome {
        if self.deleted.contains(&message.id) {
            debug!("Dropping deleted message {}", message.id);
            return MergeOutcome::Ignored;
        }

        if let Some(pos) = self.position(&EntryId::Server(message.id.clone())) {
            let kept_feedback = self.entries[pos].feedback;
            let mut entry = ViewMessage::confirmed(message);
            entry.feedback = entry.feedback.or(kept_feedback);
            self.entries[pos] = entry;
            self.sort();
            return MergeOutcome::Replaced;
        }

        let orphan = self.orphan_feedback.remove(&message.id);

        let draft = self
            .entries
            .iter()
            .enumerate()
            .find_map(|(pos, e)| match e.id {
                EntryId::Draft(draft_id) if e.confirms(&message) => Some((pos, draft_id)),
                _ => None,
            });
        if let Some((pos, draft_id)) = draft {
            return self.promote_at(pos, draft_id, message, orphan);
        }

        let mut entry = ViewMessage::confirmed(message);
        entry.feedback = entry.feedback.or(orphan);
        self.entries.push(entry);
        self.sort();
        MergeOutcome::Inserted
    }

    /// Merge the direct response to a draft's create request
    pub fn confirm_draft(&mut self, draft_id: DraftId, message: Message) -> MergeOutcome {
        // the stream already promoted this draft (possibly to another row
        // with identical content); merging by id converges either way
        if self.promoted.contains_key(&draft_id) {
            return self.apply_message(message);
        }

        let Some(pos) = self.position(&EntryId::Draft(draft_id)) else {
            return self.apply_message(message);
        };

        if self.deleted.contains(&message.id) {
            self.entries.remove(pos);
            self.promoted.insert(draft_id, message.id);
            return MergeOutcome::Removed;
        }

        if self.contains(&message.id) {
            self.entries.remove(pos);
            self.promoted.insert(draft_id, message.id.clone());
            self.apply_message(message);
            return MergeOutcome::Promoted(draft_id);
        }

        let orphan = self.orphan_feedback.remove(&message.id);
        self.promote_at(pos, draft_id, message, orphan)
    }

    fn promote_at(
        &mut self,
        pos: usize,
        draft_id: DraftId,
        message: Message,
        orphan: Option<FeedbackScores>,
    ) -> MergeOutcome {
        debug!("Promoting {} to {}", draft_id, message.id);

        let draft_feedback = self.entries[pos].feedback;
        self.promoted.insert(draft_id, message.id.clone());

        let mut entry = ViewMessage::confirmed(message);
        entry.feedback = entry.feedback.or(orphan).or(draft_feedback);
        self.entries[pos] = entry;
        self.sort();
        MergeOutcome::Promoted(draft_id)
    }

    /// Drop a draft whose create request failed
    pub fn rollback(&mut self, draft_id: DraftId) -> bool {
        match self.position(&EntryId::Draft(draft_id)) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Attach feedback to its message (last write wins), or hold it until
    /// the message arrives
    pub fn apply_feedback(&mut self, feedback: MessageFeedback) -> MergeOutcome {
        if self.deleted.contains(&feedback.message_id) {
            return MergeOutcome::Ignored;
        }
        match self.position(&EntryId::Server(feedback.message_id.clone())) {
            Some(pos) => {
                self.entries[pos].feedback = Some(feedback.scores);
                MergeOutcome::Replaced
            }
            None => {
                self.orphan_feedback
                    .insert(feedback.message_id, feedback.scores);
                MergeOutcome::Deferred
            }
        }
    }

    pub fn clear_feedback(&mut self, message_id: &MessageId) -> MergeOutcome {
        self.orphan_feedback.remove(message_id);
        match self.position(&EntryId::Server(message_id.clone())) {
            Some(pos) if self.entries[pos].feedback.is_some() => {
                self.entries[pos].feedback = None;
                MergeOutcome::Replaced
            }
            _ => MergeOutcome::Ignored,
        }
    }

    /// Remove a message and remember it, so a delayed insert or refetch
    /// cannot bring it back
    pub fn remove(&mut self, message_id: &MessageId) -> MergeOutcome {
        self.deleted.insert(message_id.clone());
        self.orphan_feedback.remove(message_id);
        match self.position(&EntryId::Server(message_id.clone())) {
            Some(pos) => {
                self.entries.remove(pos);
                MergeOutcome::Removed
            }
            None => MergeOutcome::Ignored,
        }
    }

    /// Merge a full fetch; pending drafts survive
    pub fn load(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.apply_message(message);
        }
        self.loaded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::from("u-1")
    }

    fn message(id: &str, seq: i64, content: &str) -> Message {
        Message {
            id: MessageId::from(id),
            session_id: SessionId::from("s-1"),
            author_id: owner(),
            content: content.to_string(),
            kind: MessageKind::Text,
            translation: None,
            sequence_number: seq,
            created_at: Utc::now(),
            feedback: None,
        }
    }

    fn scores(value: f64) -> FeedbackScores {
        FeedbackScores {
            pronunciation_score: value,
            accuracy_score: value,
            fluency_score: value,
            completeness_score: value,
        }
    }

    fn view_with(messages: &[Message]) -> ConversationView {
        let mut view = ConversationView::new(SessionId::from("s-1"));
        view.load(messages.to_vec());
        view
    }

    #[test]
    fn draft_gets_next_sequence_guess() {
        let mut view = view_with(&[message("m-1", 1, "a"), message("m-2", 2, "b")]);
        let draft = DraftId::generate();
        view.push_draft(draft, &owner(), &NewMessage::new("Hola", MessageKind::Text));

        let last = view.messages().last().unwrap();
        assert_eq!(last.id, EntryId::Draft(draft));
        assert_eq!(last.sequence_number, 3);
        assert!(last.is_pending());
    }

    #[test]
    fn stream_insert_promotes_matching_draft() {
        let mut view = view_with(&[message("m-1", 1, "a")]);
        let draft = DraftId::generate();
        view.push_draft(draft, &owner(), &NewMessage::new("Hola", MessageKind::Text));

        let outcome = view.apply_message(message("m-2", 2, "Hola"));
        assert_eq!(outcome, MergeOutcome::Promoted(draft));
        assert_eq!(view.len(), 2);
        assert_eq!(view.pending_count(), 0);

        // direct response arriving afterwards converges on the same row
        let outcome = view.confirm_draft(draft, message("m-2", 2, "Hola"));
        assert_eq!(outcome, MergeOutcome::Replaced);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn response_then_stream_keeps_one_entry() {
        let mut view = view_with(&[]);
        let draft = DraftId::generate();
        view.push_draft(draft, &owner(), &NewMessage::new("Hola", MessageKind::Text));

        assert_eq!(
            view.confirm_draft(draft, message("m-1", 1, "Hola")),
            MergeOutcome::Promoted(draft)
        );
        assert_eq!(view.apply_message(message("m-1", 1, "Hola")), MergeOutcome::Replaced);
        assert_eq!(view.apply_message(message("m-1", 1, "Hola")), MergeOutcome::Replaced);
        assert_eq!(view.len(), 1);
        assert_eq!(view.messages()[0].sequence_number, 1);
    }

    #[test]
    fn identical_drafts_resolve_to_distinct_rows_out_of_order() {
        let mut view = view_with(&[]);
        let first = DraftId::generate();
        let second = DraftId::generate();
        let input = NewMessage::new("Sí", MessageKind::Text);
        view.push_draft(first, &owner(), &input);
        view.push_draft(second, &owner(), &input);

        // the second row is pushed before anything else resolves
        view.apply_message(message("m-2", 2, "Sí"));
        view.confirm_draft(first, message("m-1", 1, "Sí"));
        view.confirm_draft(second, message("m-2", 2, "Sí"));
        view.apply_message(message("m-1", 1, "Sí"));

        let ids: Vec<_> = view
            .messages()
            .iter()
            .map(|m| m.id.server_id().cloned())
            .collect();
        assert_eq!(
            ids,
            vec![Some(MessageId::from("m-1")), Some(MessageId::from("m-2"))]
        );
    }

    #[test]
    fn rollback_removes_only_the_draft() {
        let mut view = view_with(&[message("m-1", 1, "a")]);
        let draft = DraftId::generate();
        view.push_draft(draft, &owner(), &NewMessage::new("Hola", MessageKind::Text));

        assert!(view.rollback(draft));
        assert!(!view.rollback(draft));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn unknown_messages_insert_in_sequence_order() {
        let mut view = view_with(&[message("m-1", 1, "a"), message("m-5", 5, "e")]);
        view.apply_message(message("m-3", 3, "c"));

        let seqs: Vec<i64> = view.messages().iter().map(|m| m.sequence_number).collect();
        assert_eq!(seqs, vec![1, 3, 5]);
    }

    #[test]
    fn feedback_before_message_is_attached_on_arrival() {
        let mut view = view_with(&[]);
        let outcome = view.apply_feedback(MessageFeedback {
            message_id: MessageId::from("m-1"),
            scores: scores(42.0),
        });
        assert_eq!(outcome, MergeOutcome::Deferred);

        view.apply_message(message("m-1", 1, "Hola"));
        assert_eq!(view.messages()[0].feedback, Some(scores(42.0)));

        // a later bare row does not wipe the attached feedback
        view.apply_message(message("m-1", 1, "Hola"));
        assert_eq!(view.messages()[0].feedback, Some(scores(42.0)));

        // last write wins
        view.apply_feedback(MessageFeedback {
            message_id: MessageId::from("m-1"),
            scores: scores(90.0),
        });
        assert_eq!(view.messages()[0].feedback, Some(scores(90.0)));
    }

    #[test]
    fn old_row_with_same_text_does_not_claim_new_draft() {
        let mut view = view_with(&[message("m-1", 1, "Hola")]);
        let draft = DraftId::generate();
        view.push_draft(draft, &owner(), &NewMessage::new("Hola", MessageKind::Text));

        assert_eq!(view.apply_message(message("m-1", 1, "Hola")), MergeOutcome::Replaced);
        assert_eq!(view.pending_count(), 1);
    }

    #[test]
    fn delete_removes_confirmed_row() {
        let mut view = view_with(&[message("m-1", 1, "a")]);
        assert_eq!(view.remove(&MessageId::from("m-1")), MergeOutcome::Removed);
        assert_eq!(view.remove(&MessageId::from("m-1")), MergeOutcome::Ignored);
        assert!(view.is_empty());
    }

    #[test]
    fn deleted_row_stays_gone_after_late_insert() {
        let mut view = view_with(&[message("m-1", 1, "a"), message("m-2", 2, "b")]);
        view.remove(&MessageId::from("m-2"));

        // duplicate insert and a refetch that raced the delete
        assert_eq!(view.apply_message(message("m-2", 2, "b")), MergeOutcome::Ignored);
        view.load(vec![message("m-1", 1, "a"), message("m-2", 2, "b")]);
        let outcome = view.apply_feedback(MessageFeedback {
            message_id: MessageId::from("m-2"),
            scores: scores(50.0),
        });
        assert_eq!(outcome, MergeOutcome::Ignored);

        assert_eq!(view.len(), 1);
        assert!(!view.contains(&MessageId::from("m-2")));
    }

    #[test]
    fn delete_before_insert_is_remembered() {
        let mut view = view_with(&[]);
        let draft = DraftId::generate();
        view.push_draft(draft, &owner(), &NewMessage::new("Hola", MessageKind::Text));

        assert_eq!(view.remove(&MessageId::from("m-1")), MergeOutcome::Ignored);
        assert_eq!(view.apply_message(message("m-1", 1, "Hola")), MergeOutcome::Ignored);
        assert_eq!(view.confirm_draft(draft, message("m-1", 1, "Hola")), MergeOutcome::Removed);
        assert!(view.is_empty());
    }
}
