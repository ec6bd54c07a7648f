//! Conversation log for the assistant session
//!
//! The log is the single source of truth for what the presentation layer
//! renders. It is append-only: a turn's id and role never change after
//! creation, and ids are the one-based position at append time. Insertion
//! order is display order.

use serde::Serialize;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

/// One entry in the conversation log.
///
/// Immutable once appended; the text is final, never progressively streamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub id: u64,
    pub role: Role,
    pub text: String,
}

/// Append-only ordered sequence of turns.
///
/// Owned exclusively by the session coordinator; the presentation layer only
/// ever sees a [`snapshot`](ConversationLog::snapshot).
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh log seeded with the assistant's greeting turn.
    pub fn with_greeting(greeting: &str) -> Self {
        let mut log = Self::new();
        log.append(Role::Assistant, greeting);
        log
    }

    /// Append a turn, assigning the next sequential id (one-based position).
    ///
    /// Appends only ever happen inside a single state-machine transition, so
    /// length-derived ids cannot collide.
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> u64 {
        let id = self.turns.len() as u64 + 1;
        self.turns.push(Turn {
            id,
            role,
            text: text.into(),
        });
        id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The newest assistant turn, used by the presentation layer for its
    /// progressive-reveal treatment. Cosmetic only; does not affect ordering.
    pub fn latest_assistant(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }

    /// Clone of the full log for the presentation layer.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_sequential_one_based_ids() {
        let mut log = ConversationLog::new();
        assert_eq!(log.append(Role::User, "first"), 1);
        assert_eq!(log.append(Role::Assistant, "second"), 2);
        assert_eq!(log.append(Role::User, "third"), 3);

        let ids: Vec<u64> = log.turns().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn greeting_seeds_one_assistant_turn() {
        let log = ConversationLog::with_greeting("Hello!");
        assert_eq!(log.len(), 1);
        assert_eq!(log.turns()[0].role, Role::Assistant);
        assert_eq!(log.turns()[0].text, "Hello!");
        assert_eq!(log.turns()[0].id, 1);
    }

    #[test]
    fn latest_assistant_tracks_newest_assistant_turn() {
        let mut log = ConversationLog::with_greeting("Hi");
        assert_eq!(log.latest_assistant().map(|t| t.id), Some(1));

        log.append(Role::User, "question");
        assert_eq!(log.latest_assistant().map(|t| t.id), Some(1));

        log.append(Role::Assistant, "answer");
        assert_eq!(log.latest_assistant().map(|t| t.id), Some(3));
    }

    #[test]
    fn latest_assistant_is_none_for_user_only_log() {
        let mut log = ConversationLog::new();
        log.append(Role::User, "hello?");
        assert!(log.latest_assistant().is_none());
    }

    #[test]
    fn snapshot_is_independent_of_later_appends() {
        let mut log = ConversationLog::with_greeting("Hi");
        let snapshot = log.snapshot();
        log.append(Role::User, "more");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }
}
