use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::{
    core::tile_key::TileId,
    prelude::HashMap,
    terrain::tile::{CustomTile, TerrainTechnique},
};

static NEXT_ENGINE_ID: AtomicU32 = AtomicU32::new(0);

/// The live tile set of one terrain.
///
/// Tiles are owned by the nodes that display them; the registry only tracks
/// them, so a tile dropped by its node simply stops resolving.
#[derive(Debug)]
pub struct CustomTerrain {
    engine_id: u32,
    tiles: RwLock<HashMap<TileId, Weak<CustomTile>>>,
    revision: AtomicU64,
    technique_prototype: TerrainTechnique,
}

impl CustomTerrain {
    pub fn new() -> Self {
        Self::with_technique(TerrainTechnique::default())
    }

    pub fn with_technique(technique_prototype: TerrainTechnique) -> Self {
        Self {
            engine_id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            tiles: RwLock::new(HashMap::default()),
            revision: AtomicU64::new(0),
            technique_prototype,
        }
    }

    /// Process-unique id embedded in the child URIs of this terrain's tiles.
    pub fn engine_id(&self) -> u32 {
        self.engine_id
    }

    pub fn get_custom_tile(&self, id: &TileId) -> Option<Arc<CustomTile>> {
        self.tiles.read().get(id).and_then(Weak::upgrade)
    }

    /// Registers `tile` unless a live tile of the same or a newer terrain
    /// revision already holds its id. Returns whether this call registered it.
    pub fn register_tile(&self, tile: &Arc<CustomTile>) -> bool {
        let id = tile.tile_id();
        let mut tiles = self.tiles.write();
        let held = tiles
            .get(&id)
            .and_then(Weak::upgrade)
            .map_or(false, |existing| existing.terrain_revision() >= tile.terrain_revision());
        if held {
            log::debug!("tile {} already registered", id);
            return false;
        }
        tiles.insert(id, Arc::downgrade(tile));
        true
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Marks every existing tile stale. Returns the new revision.
    pub fn bump_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn technique_prototype(&self) -> &TerrainTechnique {
        &self.technique_prototype
    }

    /// Tiles still owned by some node.
    pub fn live_tiles(&self) -> Vec<Arc<CustomTile>> {
        self.tiles.read().values().filter_map(Weak::upgrade).collect()
    }

    /// Drops entries whose tiles are gone. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut tiles = self.tiles.write();
        let before = tiles.len();
        tiles.retain(|_, tile| tile.strong_count() > 0);
        before - tiles.len()
    }

    /// Number of registry entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.tiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CustomTerrain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{locator::GeoLocator, map::MapOptions, profile::Profile, tile_key::TileKey};

    fn tile(level: u32, x: u32, y: u32) -> Arc<CustomTile> {
        let key = TileKey::new(level, x, y, Profile::global_geodetic());
        let locator = GeoLocator::create_for_key(&key, &MapOptions::default());
        Arc::new(CustomTile::new(key, locator.into(), TerrainTechnique::default()))
    }

    #[test]
    fn test_first_registration_wins() {
        let terrain = CustomTerrain::new();
        let first = tile(1, 0, 0);
        let second = tile(1, 0, 0);

        assert!(terrain.register_tile(&first));
        assert!(!terrain.register_tile(&second));

        let found = terrain.get_custom_tile(&TileId::new(1, 0, 0)).unwrap();
        assert!(Arc::ptr_eq(&found, &first));
    }

    #[test]
    fn test_dropped_tiles_expire() {
        let terrain = CustomTerrain::new();
        let kept = tile(0, 0, 0);
        terrain.register_tile(&kept);
        {
            let dropped = tile(0, 1, 0);
            terrain.register_tile(&dropped);
        }

        assert!(terrain.get_custom_tile(&TileId::new(0, 1, 0)).is_none());
        assert_eq!(terrain.live_tiles().len(), 1);
        assert_eq!(terrain.purge_expired(), 1);
        assert_eq!(terrain.len(), 1);

        // An expired slot can be taken over.
        let replacement = tile(0, 1, 0);
        assert!(terrain.register_tile(&replacement));
    }

    #[test]
    fn test_newer_revision_replaces_live_tile() {
        let terrain = CustomTerrain::new();
        let old = tile(2, 1, 1);
        assert!(terrain.register_tile(&old));

        let revision = terrain.bump_revision();
        let key = TileKey::new(2, 1, 1, Profile::global_geodetic());
        let locator = GeoLocator::create_for_key(&key, &MapOptions::default());
        let mut rebuilt = CustomTile::new(key, locator.into(), TerrainTechnique::default());
        rebuilt.set_terrain_revision(revision);
        let rebuilt = Arc::new(rebuilt);

        assert!(terrain.register_tile(&rebuilt));
        assert!(!terrain.register_tile(&old));
        let found = terrain.get_custom_tile(&TileId::new(2, 1, 1)).unwrap();
        assert!(Arc::ptr_eq(&found, &rebuilt));
    }

    #[test]
    fn test_revision_and_engine_ids() {
        let a = CustomTerrain::new();
        let b = CustomTerrain::new();
        assert_ne!(a.engine_id(), b.engine_id());

        assert_eq!(a.revision(), 0);
        assert_eq!(a.bump_revision(), 1);
        assert_eq!(a.revision(), 1);
        assert_eq!(a.technique_prototype().name(), "geometry");
    }
}
