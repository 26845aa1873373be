use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::models::SessionId;

/// C6. Per-`(sid, agent_role)` full-vs-reference selection. Striped
/// concurrency comes from `DashMap`'s internal sharding — same shape as
/// `services/conversation/cache.rs`'s `DashMap`-backed session cache, here
/// keyed one level finer.
#[derive(Default)]
pub struct PromptCache {
    seen: DashMap<(SessionId, String), ()>,
}

pub struct PromptSelection {
    pub text: String,
    pub was_cached: bool,
}

impl PromptCache {
    pub fn new() -> Self {
        Self { seen: DashMap::new() }
    }

    /// Returns the full prompt on the first call for this pair, the
    /// reference prompt thereafter. `was_cached` mirrors the contract of
    /// §4.5: false on first call, true after.
    pub fn resolve(&self, sid: &str, agent_role: &str, full_prompt: &str, reference_prompt: &str) -> PromptSelection {
        let key = (sid.to_string(), agent_role.to_string());

        match self.seen.entry(key) {
            Entry::Occupied(_) => PromptSelection { text: reference_prompt.to_string(), was_cached: true },
            Entry::Vacant(entry) => {
                entry.insert(());
                PromptSelection { text: full_prompt.to_string(), was_cached: false }
            }
        }
    }

    /// Eviction on session delete — no global TTL, sessions are long-lived
    /// but bounded per §9.
    pub fn evict_session(&self, sid: &str) {
        self.seen.retain(|(session, _), _| session != sid);
    }
}

/// 4-chars-per-token approximation mandated by §4.5 for reporting;
/// advisory only, correctness never depends on it.
pub fn estimate_tokens(text: &str) -> i64 {
    ((text.chars().count() as f64) / 4.0).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_sends_full_prompt() {
        let cache = PromptCache::new();
        let selection = cache.resolve("sid-1", "architect", "FULL", "REF");
        assert_eq!(selection.text, "FULL");
        assert!(!selection.was_cached);
    }

    #[test]
    fn second_call_sends_reference_prompt() {
        let cache = PromptCache::new();
        cache.resolve("sid-1", "architect", "FULL", "REF");
        let selection = cache.resolve("sid-1", "architect", "FULL", "REF");
        assert_eq!(selection.text, "REF");
        assert!(selection.was_cached);
        assert!(selection.text.len() < "FULL PROMPT LONGER THAN REF".len());
    }

    #[test]
    fn distinct_roles_cache_independently() {
        let cache = PromptCache::new();
        cache.resolve("sid-1", "architect", "FULL", "REF");
        let selection = cache.resolve("sid-1", "dba", "FULL", "REF");
        assert!(!selection.was_cached);
    }

    #[test]
    fn evict_session_clears_all_roles() {
        let cache = PromptCache::new();
        cache.resolve("sid-1", "architect", "FULL", "REF");
        cache.resolve("sid-1", "dba", "FULL", "REF");
        cache.evict_session("sid-1");
        let selection = cache.resolve("sid-1", "architect", "FULL", "REF");
        assert!(!selection.was_cached);
    }

    #[test]
    fn token_estimate_matches_four_chars_per_token() {
        assert_eq!(estimate_tokens("12345678"), 2);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("123"), 1);
    }
}
