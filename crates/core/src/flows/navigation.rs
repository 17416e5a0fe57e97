use serde::{Deserialize, Serialize};

use crate::flows::states::ConversationState;

/// States visited before the current one, most recent last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationStack {
    entries: Vec<ConversationState>,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: ConversationState) {
        self.entries.push(state);
    }

    /// Popping an empty stack is a no-op.
    pub fn pop(&mut self) -> Option<ConversationState> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<ConversationState> {
        self.entries.last().copied()
    }

    pub fn contains(&self, state: ConversationState) -> bool {
        self.entries.contains(&state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
