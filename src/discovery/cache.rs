//! Request-scoped memoization of discovery results.
//!
//! One CLI invocation performs many internal lookups (runtime resolution,
//! sibling-command deps, execute-deps); this cache guarantees a single
//! filesystem pass. Entries are immutable `Arc` snapshots once written.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::set::{CommandInfo, CommandSet};

#[derive(Default)]
struct CacheInner {
    discover: Option<Arc<CommandSet>>,
    validated: Option<Arc<CommandSet>>,
    finds: HashMap<String, (Arc<CommandInfo>, usize)>,
}

/// Per-invocation discovery cache. Cheap to clone and share.
#[derive(Default)]
pub struct DiscoveryCache {
    inner: Mutex<CacheInner>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_discover(&self) -> Option<Arc<CommandSet>> {
        self.inner.lock().expect("cache lock").discover.clone()
    }

    pub fn put_discover(&self, set: Arc<CommandSet>) {
        self.inner.lock().expect("cache lock").discover = Some(set);
    }

    pub fn get_validated(&self) -> Option<Arc<CommandSet>> {
        self.inner.lock().expect("cache lock").validated.clone()
    }

    /// Store a validated set; also seeds the plain discover entry so
    /// callers needing both see one filesystem pass.
    pub fn put_validated(&self, set: Arc<CommandSet>) {
        let mut inner = self.inner.lock().expect("cache lock");
        inner.validated = Some(Arc::clone(&set));
        inner.discover.get_or_insert(set);
    }

    /// Cached per-name lookup: the resolved command plus the number of
    /// tokens the longest-match consumed.
    pub fn get_find(&self, key: &str) -> Option<(Arc<CommandInfo>, usize)> {
        self.inner.lock().expect("cache lock").finds.get(key).cloned()
    }

    pub fn put_find(&self, key: String, info: Arc<CommandInfo>, consumed: usize) {
        self.inner
            .lock()
            .expect("cache lock")
            .finds
            .insert(key, (info, consumed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_seeds_discover() {
        let cache = DiscoveryCache::new();
        assert!(cache.get_discover().is_none());

        let set = Arc::new(CommandSet::new());
        cache.put_validated(Arc::clone(&set));

        assert!(cache.get_validated().is_some());
        assert!(cache.get_discover().is_some());
    }

    #[test]
    fn discover_does_not_seed_validated() {
        let cache = DiscoveryCache::new();
        cache.put_discover(Arc::new(CommandSet::new()));
        assert!(cache.get_validated().is_none());
    }

    #[test]
    fn find_entries_are_keyed() {
        let cache = DiscoveryCache::new();
        assert!(cache.get_find("build").is_none());
    }
}
