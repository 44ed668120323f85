use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::{
    core::tile_key::{TileId, TileKey},
    data::image::GeoImage,
    layers::map_layer::MapLayer,
    traits::{CacheCounters, CacheStats},
};

/// Small in-process image cache shared by every build of one factory.
///
/// Sits in front of the layers' own caches so that sibling builds asking for
/// the same layer image do not hit the source twice.
#[derive(Debug)]
pub struct L2Cache {
    images: Mutex<LruCache<(String, TileId), GeoImage>>,
    counters: CacheCounters,
}

impl L2Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            images: Mutex::new(LruCache::new(capacity)),
            counters: CacheCounters::default(),
        }
    }

    /// Image of `layer` for `key`, built through the layer on a miss.
    pub fn create_image(&self, layer: &MapLayer, key: &TileKey) -> Option<GeoImage> {
        let slot = (layer.name().to_string(), key.tile_id());
        let cached = self.images.lock().get(&slot).cloned();
        if let Some(image) = self.counters.record(cached) {
            return Some(image);
        }

        let image = layer.create_image(key, None)?;
        self.images.lock().put(slot, image.clone());
        Some(image)
    }

    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.images.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }
}
