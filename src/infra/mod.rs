pub mod sweeper;

pub use sweeper::{spawn_sweeper, SweeperHandle};

use crate::config::HistoryConfig;
use crate::history::{ConversationStore, ConversationThread};

/// Start a sweeper for `store` if the config enables one.
pub fn create_sweeper<T: ConversationThread>(
    store: &ConversationStore<T>,
    config: &HistoryConfig,
) -> Option<SweeperHandle> {
    config
        .sweeper_enabled
        .then(|| spawn_sweeper(store.clone(), config.sweep_interval()))
}
