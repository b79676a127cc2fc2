//! LRU cache for parsed objects.

use std::num::NonZeroUsize;

use grit_hash::ObjectId;
use grit_object::Object;
use lru::LruCache;

/// LRU cache keyed by digest.
pub struct ObjectCache {
    cache: LruCache<ObjectId, Object>,
}

impl ObjectCache {
    /// Create with the given capacity (number of objects).
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
        }
    }

    /// Get a cached object (promotes it to most-recently-used).
    pub fn get(&mut self, oid: &ObjectId) -> Option<&Object> {
        self.cache.get(oid)
    }

    /// Insert an object, evicting the least-recently-used when full.
    pub fn insert(&mut self, oid: ObjectId, obj: Object) {
        self.cache.push(oid, obj);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
