//! Page cache for committed table pages.
//!
//! Provides an LRU (Least Recently Used) cache so repeated scans of the
//! directory, catalog and bucket tables avoid re-reading their files.

mod lru;

pub use lru::{CacheStats, PageCache, PageId};
