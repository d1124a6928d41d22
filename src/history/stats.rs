//! Read-only aggregate views over the store's contents.
//!
//! Figures are informational: the size estimate never drives eviction.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::expiry::ExpirationPolicy;

/// Cheap summary of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total_histories: usize,
    pub memory_usage_estimate: usize,
}

/// Full snapshot of the cache, including age bounds and pending expirations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailedCacheInfo {
    pub total_histories: usize,
    pub total_memory_usage_estimate: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub oldest_entry_age_secs: Option<u64>,
    pub newest_entry_age_secs: Option<u64>,
    pub ttl_secs: u64,
    /// Entries already stale but not yet swept or replaced.
    pub expired_entries: usize,
}

/// Per-entry input to the reporter: estimated size and last-access time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntrySample {
    pub size: usize,
    pub last_access: DateTime<Utc>,
}

pub(crate) fn summarize(samples: impl IntoIterator<Item = EntrySample>) -> HistoryStats {
    samples
        .into_iter()
        .fold(HistoryStats::default(), |mut stats, sample| {
            stats.total_histories += 1;
            stats.memory_usage_estimate = stats.memory_usage_estimate.saturating_add(sample.size);
            stats
        })
}

pub(crate) fn describe(
    samples: impl IntoIterator<Item = EntrySample>,
    policy: &ExpirationPolicy,
    now: DateTime<Utc>,
) -> DetailedCacheInfo {
    let mut info = DetailedCacheInfo {
        total_histories: 0,
        total_memory_usage_estimate: 0,
        oldest_entry: None,
        newest_entry: None,
        oldest_entry_age_secs: None,
        newest_entry_age_secs: None,
        ttl_secs: policy.ttl().as_secs(),
        expired_entries: 0,
    };

    for sample in samples {
        info.total_histories += 1;
        info.total_memory_usage_estimate =
            info.total_memory_usage_estimate.saturating_add(sample.size);
        if policy.is_expired(sample.last_access, now) {
            info.expired_entries += 1;
        }
        if info.oldest_entry.map_or(true, |oldest| sample.last_access < oldest) {
            info.oldest_entry = Some(sample.last_access);
        }
        if info.newest_entry.map_or(true, |newest| sample.last_access > newest) {
            info.newest_entry = Some(sample.last_access);
        }
    }

    let age_secs = |at: DateTime<Utc>| ExpirationPolicy::age(at, now).as_secs();
    info.oldest_entry_age_secs = info.oldest_entry.map(age_secs);
    info.newest_entry_age_secs = info.newest_entry.map(age_secs);
    info
}
