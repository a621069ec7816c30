//! LRU (Least Recently Used) cache of committed table pages.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifies one page: the table it belongs to and its block number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    /// Table name
    pub table: String,
    /// Block number inside the table file
    pub block: u32,
}

impl PageId {
    /// Create a new page id
    pub fn new(table: impl Into<String>, block: u32) -> Self {
        Self {
            table: table.into(),
            block,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.block)
    }
}

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of insertions
    pub insertions: u64,
    /// Number of evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Cached page bytes and the tick of their last use
    pages: HashMap<PageId, (Bytes, u64)>,
    /// Last-use tick to page, oldest first
    recency: BTreeMap<u64, PageId>,
    tick: u64,
    size: usize,
    stats: CacheStats,
}

impl Inner {
    fn bump(&mut self, id: &PageId) {
        self.tick += 1;
        let tick = self.tick;
        if let Some((_, last)) = self.pages.get_mut(id) {
            self.recency.remove(&*last);
            *last = tick;
            self.recency.insert(tick, id.clone());
        }
    }

    fn remove(&mut self, id: &PageId) -> Option<Bytes> {
        let (bytes, last) = self.pages.remove(id)?;
        self.recency.remove(&last);
        self.size -= bytes.len();
        Some(bytes)
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = match self.recency.iter().next() {
            Some((_, id)) => id.clone(),
            None => return false,
        };
        self.remove(&oldest);
        self.stats.evictions += 1;
        true
    }
}

/// Byte-bounded LRU cache for clean table pages.
///
/// Only committed page images are cached; a transaction's private writes
/// never reach it. Recency is tracked with a monotonic tick so both lookup
/// and eviction stay logarithmic.
#[derive(Debug)]
pub struct PageCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl PageCache {
    /// Create a new PageCache holding at most `capacity` bytes.
    ///
    /// A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Get a page from the cache, marking it most recently used.
    pub fn get(&self, id: &PageId) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        inner.stats.lookups += 1;

        let hit = inner.pages.get(id).map(|(bytes, _)| bytes.clone());
        match hit {
            Some(bytes) => {
                inner.stats.hits += 1;
                inner.bump(id);
                Some(bytes)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a page, evicting least recently used pages as needed.
    pub fn insert(&self, id: PageId, page: Bytes) {
        if self.capacity == 0 || page.len() > self.capacity {
            return;
        }

        let mut inner = self.inner.lock();
        inner.remove(&id);
        while inner.size + page.len() > self.capacity {
            if !inner.evict_oldest() {
                break;
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.size += page.len();
        inner.recency.insert(tick, id.clone());
        inner.pages.insert(id, (page, tick));
        inner.stats.insertions += 1;
    }

    /// Drop a page from the cache.
    pub fn invalidate(&self, id: &PageId) {
        self.inner.lock().remove(id);
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.pages.clear();
        inner.recency.clear();
        inner.size = 0;
    }

    /// Get the current size of cached data in bytes.
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    /// Get the number of cached pages.
    pub fn len(&self) -> usize {
        self.inner.lock().pages.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
