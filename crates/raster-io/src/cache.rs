//! LRU cache for decoded GeoTIFF chunks.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// A decoded strip or tile, row-major with `width` samples per row.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub width: usize,
    pub data: Arc<[f32]>,
}

impl Chunk {
    fn bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memory-bounded LRU cache keyed by TIFF chunk index.
///
/// Chunks are shared as `Arc<[f32]>`, so a caller can hold on to the chunk
/// it is sampling from while the cache evicts it.
pub struct ChunkCache {
    cache: LruCache<u32, Chunk>,
    memory_limit: usize,
    current_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ChunkCache {
    /// Create a cache holding at most `memory_limit` bytes of decoded samples.
    pub fn new(memory_limit: usize) -> Self {
        // Entry cap assumes 256x256 f32 tiles; the byte budget is what binds.
        let chunk_size_estimate = 256 * 256 * 4;
        let max_entries = (memory_limit / chunk_size_estimate).max(16);

        Self {
            cache: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
            memory_limit,
            current_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn get(&mut self, index: u32) -> Option<Chunk> {
        match self.cache.get(&index) {
            Some(chunk) => {
                self.hits += 1;
                Some(chunk.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert a chunk, evicting least recently used entries to make room.
    ///
    /// A chunk larger than the whole budget is not cached.
    pub fn insert(&mut self, index: u32, chunk: Chunk) {
        let size = chunk.bytes();

        while self.current_memory + size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(evicted.bytes());
                self.evictions += 1;
            }
        }

        if size <= self.memory_limit {
            if let Some((_, replaced)) = self.cache.push(index, chunk) {
                // push returns either the old value for this key or an entry
                // evicted by the entry cap
                self.current_memory = self.current_memory.saturating_sub(replaced.bytes());
            }
            self.current_memory += size;
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions,
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(len: usize, value: f32) -> Chunk {
        Chunk {
            width: len,
            data: vec![value; len].into(),
        }
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = ChunkCache::new(1024 * 1024);
        cache.insert(3, chunk(100, 1.5));

        let hit = cache.get(3).unwrap();
        assert_eq!(hit.data[0], 1.5);
        assert!(cache.get(4).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.memory_bytes, 400);
    }

    #[test]
    fn test_cache_eviction_by_memory() {
        // Room for two 100-sample chunks
        let mut cache = ChunkCache::new(800);
        cache.insert(0, chunk(100, 0.0));
        cache.insert(1, chunk(100, 1.0));
        cache.get(0);
        cache.insert(2, chunk(100, 2.0));

        // 1 was least recently used
        assert!(cache.get(1).is_none());
        assert!(cache.get(0).is_some());
        assert!(cache.get(2).is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.memory_usage() <= 800);
    }

    #[test]
    fn test_oversized_chunk_not_cached() {
        let mut cache = ChunkCache::new(100);
        cache.insert(0, chunk(1000, 0.0));
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_reinsert_same_key_keeps_accounting() {
        let mut cache = ChunkCache::new(1024);
        cache.insert(7, chunk(10, 0.0));
        cache.insert(7, chunk(10, 1.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 40);
        assert_eq!(cache.get(7).unwrap().data[0], 1.0);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
