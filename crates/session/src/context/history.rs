//! Conversation history storage.

use chatstack_core::{ChatTurn, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;

/// The stored user/assistant turns of one session.
///
/// Turns are kept newest-first. The store only grows: nothing is trimmed
/// or reordered, budgeting happens at assembly time.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Arc<ChatTurn>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a turn as the newest entry.
    ///
    /// Only user and assistant turns belong in history; system and context
    /// turns are rejected with `Error::InvalidTurn`.
    pub fn push(&mut self, turn: Arc<ChatTurn>) -> Result<()> {
        if !turn.is_conversation() {
            return Err(Error::InvalidTurn(format!(
                "{:?} turns cannot be stored in conversation history",
                turn.kind()
            )));
        }
        self.turns.push_front(turn);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a completed exchange: the user turn, then the reply.
    pub(crate) fn push_exchange(
        &mut self,
        user: Arc<ChatTurn>,
        assistant: Arc<ChatTurn>,
    ) -> Result<()> {
        self.push(user)?;
        self.push(assistant)
    }

    /// Turns from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChatTurn>> {
        self.turns.iter()
    }

    /// Turns from oldest to newest.
    pub fn chronological(&self) -> impl Iterator<Item = &Arc<ChatTurn>> {
        self.turns.iter().rev()
    }

    pub fn newest(&self) -> Option<&Arc<ChatTurn>> {
        self.turns.front()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Sum of stored token counts.
    pub fn total_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.token_count()).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the last turn was recorded.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
