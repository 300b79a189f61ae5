//! Conversation synchronization
//!
//! This module provides:
//! - `Reconciler`: the state machine merging optimistic writes, store
//!   responses and change-stream events
//! - `ConversationView`: per-session ordered, deduplicated messages
//! - `SessionBook`: the owner's sessions with monotonic status
//! - `LoadingTracker`: named in-flight operations for UI gating

mod loading;
mod reconciler;
mod sessions;
mod view;

pub use loading::{ops, LoadingGuard, LoadingTracker};
pub use reconciler::{Reconciler, SessionUpdate};
pub use sessions::SessionBook;
pub use view::{ConversationView, MergeOutcome, ViewMessage};
