//! Achievement keys and completion-set encoding.
//!
//! Every achievement or criterion known to the host runtime is identified
//! by a namespaced string key (`"pack:path/criterion"`). The global catalog
//! is an ordered, append-only list of these keys; an entity's completion
//! set is a set of them, persisted as one comma-joined text column.

use serde::{Deserialize, Serialize};

/// Namespaced identifier for one achievement or criterion.
///
/// Keys are ordered and cheap to clone; the catalog relies on their
/// [`Ord`] for the stable, duplicate-free global list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AchievementKey(String);

impl AchievementKey {
    /// Parse a key from its string form.
    ///
    /// Returns `None` for the empty string or a key without a namespace
    /// separator -- such tokens in a stored payload are skipped, never a
    /// reason to reject the rest of the set.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.contains(':') {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    /// Return the key's string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for AchievementKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Join a completion set into its persisted comma-separated form.
///
/// Keys are sorted so the payload is stable across saves of the same set.
pub fn encode_completion_set<I>(keys: I) -> String
where
    I: IntoIterator<Item = AchievementKey>,
{
    let mut sorted: Vec<AchievementKey> = keys.into_iter().collect();
    sorted.sort();
    sorted.dedup();
    let parts: Vec<&str> = sorted.iter().map(AchievementKey::as_str).collect();
    parts.join(",")
}

/// Split a persisted comma-separated payload into keys.
///
/// Returns the parsed keys plus the number of malformed tokens that were
/// skipped. An empty payload yields an empty set.
pub fn decode_completion_set(payload: &str) -> (Vec<AchievementKey>, usize) {
    let mut keys = Vec::new();
    let mut skipped = 0_usize;
    for token in payload.split(',') {
        if token.trim().is_empty() {
            continue;
        }
        match AchievementKey::parse(token) {
            Some(key) => keys.push(key),
            None => skipped = skipped.saturating_add(1),
        }
    }
    (keys, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_empty_and_unnamespaced() {
        assert!(AchievementKey::parse("").is_none());
        assert!(AchievementKey::parse("   ").is_none());
        assert!(AchievementKey::parse("no_namespace").is_none());
        assert!(AchievementKey::parse("pack:story/root").is_some());
    }

    #[test]
    fn encode_is_sorted_and_deduplicated() {
        let keys = ["pack:b", "pack:a", "pack:b"]
            .iter()
            .filter_map(|raw| AchievementKey::parse(raw))
            .collect::<Vec<_>>();
        assert_eq!(encode_completion_set(keys), "pack:a,pack:b");
    }

    #[test]
    fn decode_skips_malformed_tokens() {
        let (keys, skipped) = decode_completion_set("pack:a,garbage,,pack:b");
        assert_eq!(keys.len(), 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn decode_empty_payload() {
        let (keys, skipped) = decode_completion_set("");
        assert!(keys.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn roundtrip_preserves_set() {
        let payload = "pack:a,pack:b,pack:c";
        let (keys, _) = decode_completion_set(payload);
        assert_eq!(encode_completion_set(keys), payload);
    }
}
