//! Default conversation thread: an ordered, shared list of chat turns.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::traits::ConversationThread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One dialogue turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Shared handle to a conversation thread.
///
/// Cloning is cheap and yields another handle to the same thread, so a
/// request handler and the store can hold the same thread at once. Turns
/// appended through any handle are visible through all of them.
#[derive(Debug, Clone)]
pub struct ChatThread {
    inner: Arc<ChatThreadInner>,
}

#[derive(Debug)]
struct ChatThreadInner {
    id: Uuid,
    created_at: DateTime<Utc>,
    turns: RwLock<Vec<ChatTurn>>,
    /// Sum of `content.len()` over `turns`, maintained under the write lock.
    content_bytes: AtomicUsize,
}

impl ChatThread {
    /// Create an empty thread with a fresh id.
    pub fn new() -> Self {
        Self::with_turns(Vec::new())
    }

    pub fn with_turns(turns: Vec<ChatTurn>) -> Self {
        let content_bytes = turns.iter().map(|turn| turn.content.len()).sum();
        Self {
            inner: Arc::new(ChatThreadInner {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                turns: RwLock::new(turns),
                content_bytes: AtomicUsize::new(content_bytes),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// True if both handles point at the same thread.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn add_user_message(&self, content: impl Into<String>) {
        self.add_turn(ChatTurn::new(TurnRole::User, content));
    }

    pub fn add_assistant_message(&self, content: impl Into<String>) {
        self.add_turn(ChatTurn::new(TurnRole::Assistant, content));
    }

    pub fn add_turn(&self, turn: ChatTurn) {
        let mut turns = self.inner.turns.write();
        self.inner
            .content_bytes
            .fetch_add(turn.content.len(), Ordering::Relaxed);
        turns.push(turn);
    }

    /// Snapshot of all turns, oldest first.
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.inner.turns.read().clone()
    }

    pub fn last_turn(&self) -> Option<ChatTurn> {
        self.inner.turns.read().last().cloned()
    }

    pub fn turn_count(&self) -> usize {
        self.inner.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turn_count() == 0
    }

    /// Detached copy of this thread's turns under a new id. Changes to the
    /// copy are not visible through the original.
    pub fn deep_copy(&self) -> Self {
        Self::with_turns(self.turns())
    }
}

impl Default for ChatThread {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationThread for ChatThread {
    /// Total bytes of turn content. Constant time; the store calls this for
    /// every entry while holding its lock.
    fn approx_size(&self) -> usize {
        self.inner.content_bytes.load(Ordering::Relaxed)
    }
}
