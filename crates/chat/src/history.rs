//! Conversation state per namespace.
//!
//! Turns are only ever appended as a (user, assistant) pair under the
//! namespace's map entry, so readers never observe half an exchange.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ragline_llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One message of a past exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }

    /// The turn as a prompt message.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Per-namespace conversation history with bounded retention.
pub struct ConversationStore {
    histories: DashMap<String, VecDeque<ConversationTurn>>,
    max_turns: usize,
}

impl ConversationStore {
    /// `max_turns == 0` keeps every turn. Odd bounds round up to whole
    /// exchanges.
    pub fn new(max_turns: usize) -> Self {
        Self {
            histories: DashMap::new(),
            max_turns: max_turns + max_turns % 2,
        }
    }

    /// Append one exchange atomically, dropping the oldest exchanges past
    /// the retention bound.
    pub fn append(&self, namespace: &str, user_text: &str, assistant_text: &str) {
        let mut turns = self.histories.entry(namespace.to_string()).or_default();
        turns.push_back(ConversationTurn::new(Role::User, user_text));
        turns.push_back(ConversationTurn::new(Role::Assistant, assistant_text));

        if self.max_turns > 0 {
            while turns.len() > self.max_turns {
                turns.pop_front();
                turns.pop_front();
            }
        }
    }

    /// The last `max_turns` turns in original order.
    pub fn recent(&self, namespace: &str, max_turns: usize) -> Vec<ConversationTurn> {
        match self.histories.get(namespace) {
            Some(turns) => {
                let skip = turns.len().saturating_sub(max_turns);
                turns.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// The most recent user question, if any.
    pub fn last_user_question(&self, namespace: &str) -> Option<String> {
        self.histories.get(namespace).and_then(|turns| {
            turns
                .iter()
                .rev()
                .find(|t| t.role == Role::User)
                .map(|t| t.content.clone())
        })
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.histories.get(namespace).map_or(0, |turns| turns.len())
    }

    pub fn clear(&self, namespace: &str) {
        self.histories.remove(namespace);
    }
}
