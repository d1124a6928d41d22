use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default inactivity window before a conversation is considered stale (60 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Time-based staleness check shared by lookups and sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    ttl: Duration,
}

impl ExpirationPolicy {
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub const fn from_minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time elapsed since `last_access`. A timestamp in the future (clock
    /// skew) counts as zero age.
    pub fn age(last_access: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (now - last_access).to_std().unwrap_or(Duration::ZERO)
    }

    /// An entry is stale once its age strictly exceeds the TTL.
    pub fn is_expired(&self, last_access: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        Self::age(last_access, now) > self.ttl
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
