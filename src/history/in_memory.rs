//! In-memory conversation history store.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::clock::SystemClock;
use super::expiry::{ExpirationPolicy, DEFAULT_TTL};
use super::key::ConversationKey;
use super::stats::{self, DetailedCacheInfo, EntrySample, HistoryStats};
use super::thread::ChatThread;
use super::traits::{Clock, ConversationThread, ThreadFactory};
use crate::config::HistoryConfig;

/// A cached thread and the time it was created or last written back.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    thread: T,
    last_access: DateTime<Utc>,
}

/// Thread-safe, time-expiring map from (user, discussion) to a conversation
/// thread.
///
/// One mutex guards the whole map and every operation holds it for its full
/// duration, so check-and-act sequences such as [`get_or_create`] are atomic.
/// The lock is released before a thread handle is returned: whatever the
/// agent layer does with the thread afterwards happens outside the store, and
/// when two callers write back the same slot the last [`update`] wins.
///
/// The store is a cheap cloneable handle. Construct one at startup and pass
/// clones to request handlers and to the sweeper.
///
/// [`get_or_create`]: ConversationStore::get_or_create
/// [`update`]: ConversationStore::update
pub struct ConversationStore<T: ConversationThread = ChatThread> {
    inner: Arc<StoreInner<T>>,
}

struct StoreInner<T> {
    entries: Mutex<HashMap<ConversationKey, CacheEntry<T>>>,
    policy: ExpirationPolicy,
    factory: Box<dyn ThreadFactory<T>>,
    clock: Arc<dyn Clock>,
}

impl<T: ConversationThread> Clone for ConversationStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ConversationThread> fmt::Debug for ConversationStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationStore")
            .field("ttl", &self.inner.policy.ttl())
            .field("entries", &self.inner.entries.try_lock().map(|entries| entries.len()))
            .finish_non_exhaustive()
    }
}

impl ConversationStore<ChatThread> {
    /// Store of [`ChatThread`]s on the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::builder().ttl(ttl).build()
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.ttl())
    }

    pub fn builder() -> ConversationStoreBuilder<ChatThread> {
        ConversationStoreBuilder::new()
    }
}

impl Default for ConversationStore<ChatThread> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<T: ConversationThread> ConversationStore<T> {
    /// Return the live thread for this conversation, or a new empty one.
    ///
    /// A missing or stale slot is filled with a freshly minted thread
    /// stamped with the current time. A live slot is returned unchanged;
    /// plain lookups do not refresh its timestamp.
    pub fn get_or_create(&self, user_id: &str, discussion_id: &str) -> T {
        let key = ConversationKey::derive(user_id, discussion_id);
        let mut entries = self.inner.entries.lock();
        let now = self.inner.clock.now();

        let replacing_stale = match entries.get(&key) {
            Some(entry) if !self.inner.policy.is_expired(entry.last_access, now) => {
                tracing::debug!(user_id, discussion_id, "Retrieved cached chat history");
                return entry.thread.clone();
            }
            Some(_) => true,
            None => false,
        };

        tracing::info!(
            user_id,
            discussion_id,
            replacing_stale,
            "Creating new chat history"
        );
        let thread = self.inner.factory.create();
        entries.insert(
            key,
            CacheEntry {
                thread: thread.clone(),
                last_access: now,
            },
        );
        thread
    }

    /// Write a thread back and refresh its timestamp.
    ///
    /// Returns `false` without inserting anything if the slot no longer
    /// exists (cleared or swept since it was handed out). The caller should
    /// start over from [`get_or_create`](Self::get_or_create).
    pub fn update(&self, user_id: &str, discussion_id: &str, thread: T) -> bool {
        let key = ConversationKey::derive(user_id, discussion_id);
        let mut entries = self.inner.entries.lock();
        let now = self.inner.clock.now();

        match entries.get_mut(&key) {
            Some(entry) => {
                entry.thread = thread;
                entry.last_access = now;
                true
            }
            None => {
                tracing::debug!(
                    user_id,
                    discussion_id,
                    "Chat history no longer cached, update dropped"
                );
                false
            }
        }
    }

    /// Remove a conversation. Returns whether anything was removed.
    pub fn clear(&self, user_id: &str, discussion_id: &str) -> bool {
        let key = ConversationKey::derive(user_id, discussion_id);
        let removed = self.inner.entries.lock().remove(&key).is_some();
        if removed {
            tracing::debug!(user_id, discussion_id, "Cleared chat history");
        }
        removed
    }

    /// The live thread for this conversation, if any. Never creates an entry
    /// and never refreshes the timestamp.
    pub fn peek(&self, user_id: &str, discussion_id: &str) -> Option<T> {
        let key = ConversationKey::derive(user_id, discussion_id);
        let entries = self.inner.entries.lock();
        let now = self.inner.clock.now();
        entries
            .get(&key)
            .filter(|entry| !self.inner.policy.is_expired(entry.last_access, now))
            .map(|entry| entry.thread.clone())
    }

    /// When the conversation was created or last written back, stale or not.
    pub fn last_access(&self, user_id: &str, discussion_id: &str) -> Option<DateTime<Utc>> {
        let key = ConversationKey::derive(user_id, discussion_id);
        self.inner
            .entries
            .lock()
            .get(&key)
            .map(|entry| entry.last_access)
    }

    /// Snapshot of every key currently held, in no particular order.
    pub fn list_keys(&self) -> Vec<ConversationKey> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    /// Remove every stale entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.inner.entries.lock();
        let now = self.inner.clock.now();
        let policy = self.inner.policy;
        let before = entries.len();
        entries.retain(|_, entry| !policy.is_expired(entry.last_access, now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!(removed, remaining = entries.len(), "Swept expired chat histories");
        }
        removed
    }

    pub fn stats(&self) -> HistoryStats {
        let entries = self.inner.entries.lock();
        stats::summarize(entries.values().map(sample))
    }

    pub fn detailed_info(&self) -> DetailedCacheInfo {
        let entries = self.inner.entries.lock();
        let now = self.inner.clock.now();
        stats::describe(entries.values().map(sample), &self.inner.policy, now)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.inner.policy.ttl()
    }
}

fn sample<T: ConversationThread>(entry: &CacheEntry<T>) -> EntrySample {
    EntrySample {
        size: entry.thread.approx_size(),
        last_access: entry.last_access,
    }
}

/// Builds a [`ConversationStore`] with a custom TTL, thread factory, or clock.
pub struct ConversationStoreBuilder<T> {
    ttl: Duration,
    factory: Box<dyn ThreadFactory<T>>,
    clock: Arc<dyn Clock>,
}

impl ConversationStoreBuilder<ChatThread> {
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            factory: Box::new(ChatThread::new),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<T: ConversationThread> ConversationStoreBuilder<T> {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the thread factory. This also switches the thread type.
    pub fn factory<U, F>(self, factory: F) -> ConversationStoreBuilder<U>
    where
        U: ConversationThread,
        F: ThreadFactory<U> + 'static,
    {
        ConversationStoreBuilder {
            ttl: self.ttl,
            factory: Box::new(factory),
            clock: self.clock,
        }
    }

    pub fn build(self) -> ConversationStore<T> {
        tracing::debug!(ttl_secs = self.ttl.as_secs(), "Conversation store created");
        ConversationStore {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(HashMap::new()),
                policy: ExpirationPolicy::new(self.ttl),
                factory: self.factory,
                clock: self.clock,
            }),
        }
    }
}

impl<T> fmt::Debug for ConversationStoreBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationStoreBuilder")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
