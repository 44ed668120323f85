//! Renderable terrain tiles and the layers they carry.

use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::Vector3;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    constants::SYNTHETIC_ELEVATION_LOD,
    core::{
        config::TextureFilterMode,
        locator::Locator,
        tile_key::{TileId, TileKey},
    },
    data::{heightfield::HeightField, image::GeoImage},
    spatial::culling::{BoundingSphere, ClusterCullingCone},
};

/// Per-tile rendering technique, cloned from the terrain's prototype so each
/// tile can be regenerated independently.
#[derive(Debug)]
pub struct TerrainTechnique {
    name: String,
    dirty: AtomicBool,
}

impl TerrainTechnique {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dirty: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flags the tile's geometry for regeneration.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}

impl Clone for TerrainTechnique {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            dirty: AtomicBool::new(self.is_dirty()),
        }
    }
}

impl Default for TerrainTechnique {
    fn default() -> Self {
        Self::new("geometry")
    }
}

/// One color slot of a tile.
#[derive(Debug, Clone)]
pub struct ImageLayer {
    pub layer_name: String,
    pub image: GeoImage,
    pub locator: Locator,
    pub min_filter: TextureFilterMode,
    pub mag_filter: TextureFilterMode,
    /// Level the image data was actually produced at.
    pub data_level: u32,
}

impl ImageLayer {
    /// Whether the image came from a coarser key than the tile's own.
    pub fn is_fallback(&self, tile_level: u32) -> bool {
        self.data_level < tile_level
    }
}

#[derive(Debug, Clone)]
pub struct HeightFieldLayer {
    pub heightfield: HeightField,
    pub locator: Locator,
}

/// The mutable part of a tile, guarded by the tile's own lock.
#[derive(Debug, Clone, Default)]
pub struct TileLayers {
    pub elevation: Option<HeightFieldLayer>,
    /// Color slots in map order. `None` marks a slot that is still pending.
    pub color: Vec<Option<ImageLayer>>,
    /// Level the elevation was produced at; negative when synthesized.
    pub elevation_lod: i32,
}

impl TileLayers {
    pub fn num_color_layers(&self) -> usize {
        self.color.len()
    }

    pub fn color_layer(&self, index: usize) -> Option<&ImageLayer> {
        self.color.get(index).and_then(|slot| slot.as_ref())
    }

    /// Places `layer` at `index`, growing the slot list as needed.
    pub fn set_color_layer(&mut self, index: usize, layer: ImageLayer) {
        if self.color.len() <= index {
            self.color.resize(index + 1, None);
        }
        self.color[index] = Some(layer);
    }
}

/// The renderable node for one tile key.
#[derive(Debug)]
pub struct CustomTile {
    key: TileKey,
    locator: Locator,
    vertical_scale: f32,
    requires_normals: bool,
    use_layer_requests: bool,
    has_elevation_hint: bool,
    normalize_edges: bool,
    terrain_revision: u64,
    technique: TerrainTechnique,
    cluster_culling: Option<ClusterCullingCone>,
    bound: BoundingSphere,
    layers: RwLock<TileLayers>,
}

impl CustomTile {
    pub fn new(key: TileKey, locator: Locator, technique: TerrainTechnique) -> Self {
        Self {
            key,
            locator,
            vertical_scale: 1.0,
            requires_normals: true,
            use_layer_requests: false,
            has_elevation_hint: false,
            normalize_edges: false,
            terrain_revision: 0,
            technique,
            cluster_culling: None,
            bound: BoundingSphere::new(Vector3::zeros(), 0.0),
            layers: RwLock::new(TileLayers {
                elevation_lod: SYNTHETIC_ELEVATION_LOD,
                ..TileLayers::default()
            }),
        }
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn tile_id(&self) -> TileId {
        self.key.tile_id()
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn vertical_scale(&self) -> f32 {
        self.vertical_scale
    }

    pub fn set_vertical_scale(&mut self, scale: f32) {
        self.vertical_scale = scale;
    }

    pub fn requires_normals(&self) -> bool {
        self.requires_normals
    }

    pub fn set_requires_normals(&mut self, requires: bool) {
        self.requires_normals = requires;
    }

    /// Whether layers still stream in through asynchronous requests.
    pub fn use_layer_requests(&self) -> bool {
        self.use_layer_requests
    }

    pub fn set_use_layer_requests(&mut self, enabled: bool) {
        self.use_layer_requests = enabled;
    }

    /// Whether the tile was built with real elevation.
    pub fn has_elevation_hint(&self) -> bool {
        self.has_elevation_hint
    }

    pub fn set_has_elevation_hint(&mut self, has_elevation: bool) {
        self.has_elevation_hint = has_elevation;
    }

    pub fn normalize_edges(&self) -> bool {
        self.normalize_edges
    }

    pub fn set_normalize_edges(&mut self, normalize: bool) {
        self.normalize_edges = normalize;
    }

    pub fn terrain_revision(&self) -> u64 {
        self.terrain_revision
    }

    pub fn set_terrain_revision(&mut self, revision: u64) {
        self.terrain_revision = revision;
    }

    pub fn technique(&self) -> &TerrainTechnique {
        &self.technique
    }

    pub fn cluster_culling(&self) -> Option<&ClusterCullingCone> {
        self.cluster_culling.as_ref()
    }

    pub fn set_cluster_culling(&mut self, cone: Option<ClusterCullingCone>) {
        self.cluster_culling = cone;
    }

    pub fn bound(&self) -> &BoundingSphere {
        &self.bound
    }

    pub fn read_layers(&self) -> RwLockReadGuard<'_, TileLayers> {
        self.layers.read()
    }

    pub fn write_layers(&self) -> RwLockWriteGuard<'_, TileLayers> {
        self.layers.write()
    }

    /// Layer access for a tile still under construction.
    pub fn layers_mut(&mut self) -> &mut TileLayers {
        self.layers.get_mut()
    }

    pub fn elevation_lod(&self) -> i32 {
        self.layers.read().elevation_lod
    }

    /// Recomputes the world-space bound from the elevation grid, or from the
    /// flat extent when there is none.
    pub fn compute_bound(&mut self) -> BoundingSphere {
        const MAX_STEPS: u32 = 16;

        let vertical_scale = self.vertical_scale as f64;
        let layers = self.layers.get_mut();
        let mut points = Vec::new();
        match layers.elevation.as_ref() {
            Some(layer) => {
                let hf = &layer.heightfield;
                let cols = hf.num_columns();
                let rows = hf.num_rows();
                let col_step = ((cols - 1) / MAX_STEPS).max(1);
                let row_step = ((rows - 1) / MAX_STEPS).max(1);
                let sample_cols = (0..cols).step_by(col_step as usize).chain(std::iter::once(cols - 1));
                for col in sample_cols {
                    let sample_rows = (0..rows).step_by(row_step as usize).chain(std::iter::once(rows - 1));
                    for row in sample_rows {
                        let h = hf.height(col, row) as f64 * vertical_scale;
                        let local = Vector3::new(
                            col as f64 / (cols - 1) as f64,
                            row as f64 / (rows - 1) as f64,
                            h,
                        );
                        points.push(self.locator.convert_local_to_model(&local));
                    }
                }
            }
            None => {
                for (u, v) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.5, 0.5)] {
                    points.push(self.locator.convert_local_to_model(&Vector3::new(u, v, 0.0)));
                }
            }
        }

        if let Some(bound) = BoundingSphere::from_points(&points) {
            self.bound = bound;
        }
        self.bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{locator::GeoLocator, map::MapOptions, profile::Profile};
    use approx::assert_relative_eq;

    fn tile_at(level: u32, x: u32, y: u32) -> CustomTile {
        let key = TileKey::new(level, x, y, Profile::global_geodetic());
        let locator = GeoLocator::create_for_key(&key, &MapOptions::default());
        CustomTile::new(key, locator.into(), TerrainTechnique::default())
    }

    #[test]
    fn test_technique_clone_is_independent() {
        let prototype = TerrainTechnique::default();
        assert!(prototype.take_dirty());

        let copy = prototype.clone();
        copy.mark_dirty();
        assert!(copy.is_dirty());
        assert!(!prototype.is_dirty());
    }

    #[test]
    fn test_color_slots_grow() {
        let mut layers = TileLayers::default();
        assert!(layers.color_layer(2).is_none());

        let key = TileKey::new(0, 0, 0, Profile::global_geodetic());
        let layer = ImageLayer {
            layer_name: "base".into(),
            image: GeoImage::transparent(key.extent()),
            locator: GeoLocator::create_for_key(&key, &MapOptions::default()).into(),
            min_filter: TextureFilterMode::Linear,
            mag_filter: TextureFilterMode::Linear,
            data_level: 0,
        };
        layers.set_color_layer(2, layer);

        assert_eq!(layers.num_color_layers(), 3);
        assert!(layers.color_layer(0).is_none());
        assert_eq!(layers.color_layer(2).map(|l| l.layer_name.as_str()), Some("base"));
        assert!(!layers.color_layer(2).unwrap().is_fallback(0));
    }

    #[test]
    fn test_new_tile_defaults() {
        let tile = tile_at(2, 1, 1);
        assert_eq!(tile.elevation_lod(), SYNTHETIC_ELEVATION_LOD);
        assert!(tile.requires_normals());
        assert!(!tile.use_layer_requests());
        assert!(tile.cluster_culling().is_none());
        assert_eq!(tile.tile_id(), TileId::new(2, 1, 1));
    }

    #[test]
    fn test_bound_tracks_elevation() {
        let mut bare = tile_at(3, 4, 2);
        assert!(bare.compute_bound().radius > 0.0);

        let with_height = |height: f32| {
            let mut tile = tile_at(3, 4, 2);
            let mut hf = HeightField::create_reference(&tile.key().extent(), 9, 9);
            hf.fill(height);
            let locator = tile.locator().clone();
            tile.layers_mut().elevation = Some(HeightFieldLayer { heightfield: hf, locator });
            tile.compute_bound()
        };

        let flat = with_height(0.0);
        let raised = with_height(10_000.0);
        assert_relative_eq!(
            raised.center.norm() - flat.center.norm(),
            10_000.0,
            max_relative = 0.05
        );
        assert!(flat.center.norm() < crate::core::geo::Ellipsoid::wgs84().radius_equator);
    }
}
