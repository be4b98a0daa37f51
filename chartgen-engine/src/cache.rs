//! The generation-keyed route cache.
//!
//! Routing a series means running every candidate selector, rendering an
//! identity and resolving a dimension name. The result only changes when
//! the program changes or the series itself is new, so it is cached per
//! series and invalidated by generation: an entry is only served while
//! both the program revision and the series' first-seen sequence number
//! still match. Empty route lists are cached too, otherwise unmatched
//! series would re-run the full selector set every cycle.

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use crate::route::RouteList;

#[derive(Debug)]
struct CacheEntry {
    revision: u64,
    first_seen_seq: u64,
    routes: RouteList,
}

/// A per-series route cache keyed by series ID.
#[derive(Debug, Default)]
pub struct RouteCache {
    entries: RwLock<HashMap<u64, CacheEntry>>,
}

impl RouteCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached routes for a series, if the entry's generation
    /// still matches.
    ///
    /// A stale entry is treated as a miss; the caller overwrites it via
    /// [`store`](Self::store).
    pub fn lookup(&self, series_id: u64, revision: u64, first_seen_seq: u64) -> Option<RouteList> {
        let entries = self.entries.read();
        let entry = entries.get(&series_id)?;
        if entry.revision == revision && entry.first_seen_seq == first_seen_seq {
            Some(entry.routes.clone())
        } else {
            None
        }
    }

    /// Stores the routes of a series, replacing any stale entry.
    pub fn store(&self, series_id: u64, revision: u64, first_seen_seq: u64, routes: RouteList) {
        self.entries.write().insert(
            series_id,
            CacheEntry {
                revision,
                first_seen_seq,
                routes,
            },
        );
    }

    /// Drops entries for series that were not observed this cycle.
    pub fn retain_series(&self, live: &HashSet<u64>) {
        self.entries.write().retain(|id, _| live.contains(id));
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// The number of cached series.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if no series is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> RouteList {
        RouteList::new()
    }

    #[test]
    fn test_lookup_requires_matching_generation() {
        let cache = RouteCache::new();
        cache.store(7, 1, 3, routes());

        assert!(cache.lookup(7, 1, 3).is_some());
        // Program reloaded.
        assert!(cache.lookup(7, 2, 3).is_none());
        // Series identity was recycled for a new series.
        assert!(cache.lookup(7, 1, 5).is_none());
        assert!(cache.lookup(8, 1, 3).is_none());
    }

    #[test]
    fn test_negative_entries_are_cached() {
        let cache = RouteCache::new();
        cache.store(1, 1, 1, RouteList::new());
        let hit = cache.lookup(1, 1, 1).unwrap();
        assert!(hit.is_empty());
    }

    #[test]
    fn test_retain_drops_dead_series() {
        let cache = RouteCache::new();
        cache.store(1, 1, 1, routes());
        cache.store(2, 1, 1, routes());

        let live = HashSet::from([2u64]);
        cache.retain_series(&live);

        assert!(cache.lookup(1, 1, 1).is_none());
        assert!(cache.lookup(2, 1, 1).is_some());
        assert_eq!(cache.len(), 1);
    }
}
