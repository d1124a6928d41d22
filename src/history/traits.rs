//! Seams between the history store and the layers around it.

use chrono::{DateTime, Utc};

/// A conversation thread as the store sees it.
///
/// Threads are handled as atomic values: the store clones handles in and out
/// and asks for a size estimate when reporting statistics. Turn structure and
/// mutation rules belong to the agent layer.
pub trait ConversationThread: Clone + Send + Sync + 'static {
    /// Approximate size of the thread contents in bytes. Informational only.
    fn approx_size(&self) -> usize;
}

/// Mints an empty thread for a new or expired conversation slot.
pub trait ThreadFactory<T>: Send + Sync {
    fn create(&self) -> T;
}

impl<T, F> ThreadFactory<T> for F
where
    F: Fn() -> T + Send + Sync,
{
    fn create(&self) -> T {
        self()
    }
}

/// Wall-clock source for last-access timestamps and staleness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
