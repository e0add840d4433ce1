//! Conversation turns and the bounded buffer that holds them.

use std::collections::VecDeque;

use serde::Serialize;

/// Number of turns kept per conversation unless configured otherwise.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Largest window the gateway accepts from configuration.
pub const MAX_WINDOW_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation. Turns are never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    fn new(role: Role, content: String) -> Self {
        debug_assert!(!content.is_empty(), "turn content must not be empty");
        Self { role, content }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered turns of one conversation, capped at `window_size` entries.
///
/// Every append trims from the oldest end until the cap holds again. A window
/// smaller than one still retains the most recent turn.
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    turns: VecDeque<Turn>,
    window_size: usize,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl ConversationBuffer {
    pub fn new(window_size: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            window_size,
        }
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.push(Turn::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.push(Turn::assistant(text));
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        self.trim();
    }

    fn trim(&mut self) {
        let limit = self.window_size.max(1);
        while self.turns.len() > limit {
            self.turns.pop_front();
        }
    }

    /// Copy of the current turns, oldest first.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Takes effect on the next append; does not trim or restore anything now.
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = window_size;
    }
}
