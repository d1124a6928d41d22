//! Composite lookup keys for conversation slots.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of an encoded key: base64 of a 32-byte SHA-256 digest.
pub const KEY_LEN: usize = 44;

/// Opaque key identifying one (user, discussion) conversation slot.
///
/// The key is the standard-base64 SHA-256 digest of
/// `"{user_len}:{user_id}:{discussion_id}"`. The byte length of the user id
/// is written first so that a `:` inside either identifier cannot make two
/// different pairs hash the same input. No normalization is applied: ids
/// that differ in case or whitespace map to different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn derive(user_id: &str, discussion_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(user_id.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(user_id.as_bytes());
        hasher.update(b":");
        hasher.update(discussion_id.as_bytes());
        Self(STANDARD.encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConversationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn derive_is_deterministic() {
        let a = ConversationKey::derive("alice", "d1");
        let b = ConversationKey::derive("alice", "d1");
        assert_eq!(a, b);
    }

    #[test]
    fn derive_matches_known_digest() {
        assert_eq!(
            ConversationKey::derive("alice", "d1").as_str(),
            "ibF1g+gKkDD3lqXzKWylsfkmK7fgAC5rJHrN8PGAxo4="
        );
        assert_eq!(
            ConversationKey::derive("", "").as_str(),
            "0GCcTPefBdhNxQZaD4AB0U79aDQ0NEBkbQXIiMCxR9s="
        );
    }

    #[test]
    fn keys_have_fixed_length() {
        let pairs = [
            ("a", "b"),
            ("", ""),
            ("user@example.com", "a much longer discussion id"),
        ];
        for (user, discussion) in pairs {
            let key = ConversationKey::derive(user, discussion);
            assert_eq!(key.as_str().len(), KEY_LEN);
        }
    }

    #[test]
    fn distinct_pairs_yield_distinct_keys() {
        let users = ["alice", "bob", "Alice", "alice ", "carol"];
        let discussions = ["d1", "d2", "D1", "thread-42"];
        let mut seen = HashSet::new();
        for user in users {
            for discussion in discussions {
                assert!(
                    seen.insert(ConversationKey::derive(user, discussion)),
                    "duplicate key for ({user}, {discussion})"
                );
            }
        }
        assert_eq!(seen.len(), users.len() * discussions.len());
    }

    #[test]
    fn separator_inside_ids_does_not_collide() {
        let left = ConversationKey::derive("a", "b:c");
        let right = ConversationKey::derive("a:b", "c");
        assert_ne!(left, right);
        assert_eq!(left.as_str(), "9u+Daz3VissubBaFkzfRWjXeye1hZw0tQtiHzuc3UF0=");
        assert_eq!(right.as_str(), "y2AP1qAZj9Pn1WcpAfV5JnQU7wLdy7gH1VpOtP/P1+4=");
    }

    #[test]
    fn swapped_fields_are_distinct() {
        assert_ne!(
            ConversationKey::derive("alice", "bob"),
            ConversationKey::derive("bob", "alice")
        );
    }

    #[test]
    fn key_serializes_as_plain_string() {
        let key = ConversationKey::derive("alice", "d1");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key));
    }
}
