//! Transaction-scoped page cache.
//!
//! A write transaction keeps every node page it touches in a
//! [`TransactionLogCache`]: a bounded LRU map of page containers whose
//! evicted entries spill into an on-disk [`OverflowLog`]. The cache lives
//! exactly as long as its transaction and is cleared on commit or abort.

mod overflow;

use std::{num::NonZeroUsize, path::PathBuf};

use lru::LruCache;
pub(crate) use overflow::OverflowLog;

use crate::{error::Result, page::NodePageContainer};

/// Counters describing cache behaviour over one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from memory.
    pub hits: u64,
    /// Lookups answered from the overflow log.
    pub overflow_hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Containers evicted to the overflow log.
    pub spills: u64,
}

/// Bounded LRU of page containers with a persistent overflow.
///
/// Lookups check memory first, then the overflow log. An overflow hit is
/// not promoted back into memory; only [`put`](Self::put) fills the hot tier.
pub struct TransactionLogCache {
    hot: LruCache<u64, NodePageContainer>,
    overflow: OverflowLog,
    stats: CacheStats,
}

impl TransactionLogCache {
    /// Creates a cache holding up to `capacity` containers in memory and
    /// spilling the rest into `log_dir`.
    ///
    /// The overflow directory is created on the first spill.
    pub fn new(capacity: usize, log_dir: impl Into<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            hot: LruCache::new(capacity),
            overflow: OverflowLog::new(log_dir.into()),
            stats: CacheStats::default(),
        }
    }

    /// Returns the container cached for `page_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the overflow log cannot be read.
    pub fn get(&mut self, page_key: u64) -> Result<Option<NodePageContainer>> {
        if let Some(container) = self.hot.get(&page_key) {
            self.stats.hits += 1;
            return Ok(Some(container.clone()));
        }
        let found = self.overflow.get(page_key)?;
        if found.is_some() {
            self.stats.overflow_hits += 1;
        } else {
            self.stats.misses += 1;
        }
        Ok(found)
    }

    /// Inserts or replaces the container for `page_key`.
    ///
    /// If the insertion pushes the hot tier over capacity, the least recently
    /// used container is written to the overflow log.
    ///
    /// # Errors
    ///
    /// Returns an error if the evicted container cannot be persisted. The
    /// container is lost from memory, so the enclosing transaction must abort.
    pub fn put(&mut self, page_key: u64, container: NodePageContainer) -> Result<()> {
        let Some((evicted_key, evicted)) = self.hot.push(page_key, container) else {
            return Ok(());
        };
        if evicted_key == page_key {
            // Replaced in place; nothing left the hot tier.
            return Ok(());
        }
        tracing::debug!(page_key = evicted_key, "Spilling page container to overflow log");
        self.overflow.put(evicted_key, &evicted)?;
        self.stats.spills += 1;
        Ok(())
    }

    /// Drops every cached container and deletes the overflow log.
    ///
    /// Calling this more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the overflow directory cannot be removed.
    pub fn clear(&mut self) -> Result<()> {
        self.hot.clear();
        self.overflow.clear()
    }

    /// Number of containers held in memory.
    pub fn len(&self) -> usize {
        self.hot.len()
    }

    /// Returns true if no container is held in memory.
    pub fn is_empty(&self) -> bool {
        self.hot.is_empty()
    }

    /// Returns the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use palimpsest_test_utils::TestDir;

    use super::*;
    use crate::page::{NodePage, NodeRecord};

    fn container(page_key: u64, value: &str) -> NodePageContainer {
        let mut modified = NodePage::new(page_key, 1);
        modified.set_slot(0, Some(NodeRecord::Data(value.as_bytes().to_vec())));
        NodePageContainer::new(NodePage::new(page_key, 0), modified)
    }

    #[test]
    fn test_get_returns_put_container() {
        let dir = TestDir::new();
        let mut cache = TransactionLogCache::new(4, dir.join("log"));
        cache.put(1, container(1, "a")).unwrap();
        assert_eq!(cache.get(1).unwrap(), Some(container(1, "a")));
        assert_eq!(cache.get(2).unwrap(), None);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_overflow_directory_is_created_lazily() {
        let dir = TestDir::new();
        let mut cache = TransactionLogCache::new(2, dir.join("log"));
        cache.put(1, container(1, "a")).unwrap();
        cache.put(2, container(2, "b")).unwrap();
        assert!(!dir.join("log").exists());
        cache.put(3, container(3, "c")).unwrap();
        assert!(dir.join("log").exists());
    }

    #[test]
    fn test_capacity_plus_one_spills_exactly_once() {
        let dir = TestDir::new();
        let capacity = 3;
        let mut cache = TransactionLogCache::new(capacity, dir.join("log"));
        for key in 0..=capacity as u64 {
            cache.put(key, container(key, &format!("v{key}"))).unwrap();
        }
        assert_eq!(cache.stats().spills, 1);
        assert_eq!(cache.len(), capacity);

        // Key 0 was least recently used and now lives in the overflow log.
        assert_eq!(cache.get(0).unwrap(), Some(container(0, "v0")));
        assert_eq!(cache.stats().overflow_hits, 1);
    }

    #[test]
    fn test_overflow_hit_is_not_promoted() {
        let dir = TestDir::new();
        let mut cache = TransactionLogCache::new(1, dir.join("log"));
        cache.put(0, container(0, "a")).unwrap();
        cache.put(1, container(1, "b")).unwrap();

        assert!(cache.get(0).unwrap().is_some());
        assert!(cache.get(0).unwrap().is_some());
        assert_eq!(cache.stats().overflow_hits, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_replacing_a_key_does_not_spill() {
        let dir = TestDir::new();
        let mut cache = TransactionLogCache::new(1, dir.join("log"));
        cache.put(5, container(5, "a")).unwrap();
        cache.put(5, container(5, "b")).unwrap();
        assert_eq!(cache.stats().spills, 0);
        assert_eq!(cache.get(5).unwrap(), Some(container(5, "b")));
    }

    #[test]
    fn test_hot_entry_shadows_stale_overflow_copy() {
        let dir = TestDir::new();
        let mut cache = TransactionLogCache::new(1, dir.join("log"));
        cache.put(0, container(0, "old")).unwrap();
        cache.put(1, container(1, "x")).unwrap();
        cache.put(0, container(0, "new")).unwrap();
        assert_eq!(cache.get(0).unwrap(), Some(container(0, "new")));
    }

    #[test]
    fn test_clear_twice_is_harmless() {
        let dir = TestDir::new();
        let mut cache = TransactionLogCache::new(1, dir.join("log"));
        cache.put(0, container(0, "a")).unwrap();
        cache.put(1, container(1, "b")).unwrap();

        cache.clear().unwrap();
        cache.clear().unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.get(0).unwrap(), None);
        assert_eq!(cache.get(1).unwrap(), None);
        assert!(!dir.join("log").exists());
    }

    #[test]
    fn test_cache_is_reusable_after_clear() {
        let dir = TestDir::new();
        let mut cache = TransactionLogCache::new(1, dir.join("log"));
        cache.put(0, container(0, "a")).unwrap();
        cache.put(1, container(1, "b")).unwrap();
        cache.clear().unwrap();

        cache.put(2, container(2, "c")).unwrap();
        cache.put(3, container(3, "d")).unwrap();
        assert_eq!(cache.get(2).unwrap(), Some(container(2, "c")));
    }
}
