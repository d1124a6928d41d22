//! Conversation history: a process-local, time-expiring cache of chat
//! threads keyed by (user, discussion).

pub mod clock;
pub mod expiry;
pub mod in_memory;
pub mod key;
pub mod stats;
pub mod thread;
pub mod traits;

pub use clock::{ManualClock, SystemClock};
pub use expiry::{ExpirationPolicy, DEFAULT_TTL};
pub use in_memory::{ConversationStore, ConversationStoreBuilder};
pub use key::ConversationKey;
pub use stats::{DetailedCacheInfo, HistoryStats};
pub use thread::{ChatThread, ChatTurn, TurnRole};
pub use traits::{Clock, ConversationThread, ThreadFactory};

use crate::config::HistoryConfig;

/// Create the default history store from config.
pub fn create_history_store(config: &HistoryConfig) -> ConversationStore {
    ConversationStore::from_config(config)
}
