use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::{
    core::tile_key::{TileId, TileKey},
    data::{heightfield::HeightField, image::GeoImage},
    traits::{CacheCounters, CacheStats},
    Result,
};

/// Per-layer tile storage keyed by layer name, format and tile id.
///
/// Keys are always in the layer's native profile.
pub trait Cache: Send + Sync {
    fn is_cached(&self, key: &TileKey, layer_name: &str, format: &str) -> bool;

    fn get_image(&self, key: &TileKey, layer_name: &str, format: &str) -> Option<GeoImage>;

    fn put_image(&self, key: &TileKey, layer_name: &str, format: &str, image: &GeoImage) -> Result<()>;

    fn get_heightfield(&self, key: &TileKey, layer_name: &str) -> Option<HeightField>;

    fn put_heightfield(&self, key: &TileKey, layer_name: &str, heightfield: &HeightField) -> Result<()>;

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Format tag under which heightfields are stored.
pub const HEIGHTFIELD_FORMAT: &str = "hf";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub layer: String,
    pub format: String,
    pub id: TileId,
}

impl CacheKey {
    pub fn new(key: &TileKey, layer_name: &str, format: &str) -> Self {
        Self {
            layer: layer_name.to_string(),
            format: format.to_string(),
            id: key.tile_id(),
        }
    }
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Image(GeoImage),
    HeightField(Arc<HeightField>),
}

/// In-memory tile cache using LRU eviction
#[derive(Debug)]
pub struct MemoryCache {
    cache: Arc<Mutex<LruCache<CacheKey, CacheEntry>>>,
    counters: Arc<CacheCounters>,
}

impl MemoryCache {
    /// Create a new cache with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Create a new cache with default capacity (1024 tiles)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().map(|cache| cache.cap().get()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.cache.lock().ok()?.get(key).cloned();
        self.counters.record(entry)
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, entry);
        }
    }
}

impl Cache for MemoryCache {
    fn is_cached(&self, key: &TileKey, layer_name: &str, format: &str) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(&CacheKey::new(key, layer_name, format)))
            .unwrap_or(false)
    }

    fn get_image(&self, key: &TileKey, layer_name: &str, format: &str) -> Option<GeoImage> {
        match self.get(&CacheKey::new(key, layer_name, format))? {
            CacheEntry::Image(image) => Some(image),
            CacheEntry::HeightField(_) => None,
        }
    }

    fn put_image(&self, key: &TileKey, layer_name: &str, format: &str, image: &GeoImage) -> Result<()> {
        self.put(
            CacheKey::new(key, layer_name, format),
            CacheEntry::Image(image.clone()),
        );
        Ok(())
    }

    fn get_heightfield(&self, key: &TileKey, layer_name: &str) -> Option<HeightField> {
        match self.get(&CacheKey::new(key, layer_name, HEIGHTFIELD_FORMAT))? {
            CacheEntry::HeightField(hf) => Some(hf.as_ref().clone()),
            CacheEntry::Image(_) => None,
        }
    }

    fn put_heightfield(&self, key: &TileKey, layer_name: &str, heightfield: &HeightField) -> Result<()> {
        self.put(
            CacheKey::new(key, layer_name, HEIGHTFIELD_FORMAT),
            CacheEntry::HeightField(Arc::new(heightfield.clone())),
        );
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }
}

impl Clone for MemoryCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::Profile;
    use image::{Rgba, RgbaImage};

    fn key(level: u32, x: u32, y: u32) -> TileKey {
        TileKey::new(level, x, y, Profile::global_geodetic())
    }

    fn image_for(key: &TileKey) -> GeoImage {
        GeoImage::new(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])), key.extent())
    }

    #[test]
    fn test_memory_cache_basic_operations() {
        let cache = MemoryCache::new(4);
        let k = key(1, 0, 0);
        assert!(cache.is_empty());
        assert!(!cache.is_cached(&k, "imagery", "png"));

        cache.put_image(&k, "imagery", "png", &image_for(&k)).unwrap();
        assert!(cache.is_cached(&k, "imagery", "png"));
        assert!(!cache.is_cached(&k, "other", "png"));
        assert!(!cache.is_cached(&k, "imagery", "jpg"));

        let image = cache.get_image(&k, "imagery", "png").unwrap();
        assert_eq!(image.image().get_pixel(1, 1).0, [1, 2, 3, 255]);

        let hf = HeightField::create_reference(&k.extent(), 4, 4);
        cache.put_heightfield(&k, "dem", &hf).unwrap();
        assert_eq!(cache.get_heightfield(&k, "dem"), Some(hf));
        assert!(cache.get_image(&k, "dem", HEIGHTFIELD_FORMAT).is_none());
    }

    #[test]
    fn test_memory_cache_lru_eviction() {
        let cache = MemoryCache::new(2);
        let (k1, k2, k3) = (key(2, 0, 0), key(2, 1, 0), key(2, 2, 0));

        cache.put_image(&k1, "a", "png", &image_for(&k1)).unwrap();
        cache.put_image(&k2, "a", "png", &image_for(&k2)).unwrap();
        cache.put_image(&k3, "a", "png", &image_for(&k3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.is_cached(&k1, "a", "png")); // Evicted
        assert!(cache.is_cached(&k2, "a", "png"));
        assert!(cache.is_cached(&k3, "a", "png"));
    }

    #[test]
    fn test_memory_cache_stats() {
        let cache = MemoryCache::new(2);
        let k = key(0, 0, 0);
        assert!(cache.get_image(&k, "a", "png").is_none());
        cache.put_image(&k, "a", "png", &image_for(&k)).unwrap();
        assert!(cache.get_image(&k, "a", "png").is_some());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }
}
