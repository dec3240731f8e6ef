// 🗂 Key Resolution Cache
// Natural-key → persisted-id map, one instance per entity type per run

use std::collections::HashMap;

// ============================================================================
// KEY CACHE
// ============================================================================

/// In-memory map from a composite natural key (e.g. `lastname|firstname|yob`)
/// to a resolved row id, fronting the backing store.
///
/// One cache exists per entity type and is owned by a single orchestrator
/// run: caches are created at run start, threaded explicitly into each
/// committer, and dropped at run end. They are never process-wide state.
///
/// After a key resolves once, resolving the same exact key again never
/// re-queries the store.
#[derive(Debug, Default)]
pub struct KeyCache {
    entries: HashMap<String, i64>,
    store_queries: u64,
}

impl KeyCache {
    pub fn new() -> Self {
        KeyCache::default()
    }

    /// Record a resolved id under its natural key
    pub fn store(&mut self, key: &str, id: i64) {
        self.entries.insert(key.to_string(), id);
    }

    /// Cache-only lookup, no store round-trip
    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries.get(key).copied()
    }

    /// Resolve a key: check the map first, fall back to `query` on a miss
    /// and populate the map when the store knows the key.
    ///
    /// `query` is the committer's find-by-natural-key call; it runs at most
    /// once per invocation and not at all on a cache hit.
    pub fn resolve_with<Q, E>(&mut self, key: &str, query: Q) -> Result<Option<i64>, E>
    where
        Q: FnOnce() -> Result<Option<i64>, E>,
    {
        if let Some(id) = self.entries.get(key) {
            return Ok(Some(*id));
        }

        self.store_queries += 1;
        match query()? {
            Some(id) => {
                self.entries.insert(key.to_string(), id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Number of fallback store queries issued so far (test instrumentation)
    pub fn store_queries(&self) -> u64 {
        self.store_queries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_skips_store() {
        let mut cache = KeyCache::new();
        cache.store("DOE|JOHN|1970", 42);

        let id = cache
            .resolve_with::<_, ()>("DOE|JOHN|1970", || panic!("store must not be queried"))
            .unwrap();

        assert_eq!(id, Some(42));
        assert_eq!(cache.store_queries(), 0);
    }

    #[test]
    fn test_miss_queries_once_then_caches() {
        let mut cache = KeyCache::new();

        let id = cache
            .resolve_with::<_, ()>("DOE|JOHN|1970", || Ok(Some(7)))
            .unwrap();
        assert_eq!(id, Some(7));
        assert_eq!(cache.store_queries(), 1);

        // Second resolution of the same exact key: no further query
        let id = cache
            .resolve_with::<_, ()>("DOE|JOHN|1970", || panic!("must be served from cache"))
            .unwrap();
        assert_eq!(id, Some(7));
        assert_eq!(cache.store_queries(), 1);
    }

    #[test]
    fn test_not_found_is_not_cached() {
        let mut cache = KeyCache::new();

        let id = cache.resolve_with::<_, ()>("UNKNOWN", || Ok(None)).unwrap();
        assert_eq!(id, None);

        // A later run of the same key may now exist in the store
        let id = cache.resolve_with::<_, ()>("UNKNOWN", || Ok(Some(9))).unwrap();
        assert_eq!(id, Some(9));
        assert_eq!(cache.store_queries(), 2);
    }

    #[test]
    fn test_query_error_propagates() {
        let mut cache = KeyCache::new();
        let result = cache.resolve_with("KEY", || Err("store down"));
        assert_eq!(result, Err("store down"));
        assert!(cache.is_empty());
    }
}
