use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::{
    core::{config::ElevationInterpolation, geo::Ellipsoid, profile::Profile, tile_key::TileKey},
    data::heightfield::HeightField,
    layers::{manager::MapLayers, map_layer::MapLayer},
    Result,
};

/// How the terrain is laid out in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapCoordinateSystem {
    /// Round earth, tiled by the map profile.
    Geocentric,
    /// Round earth tiled as a cube. Tiles never carry cluster culling.
    GeocentricCube,
    /// Flat map in the profile's reference system.
    Projected,
}

impl Default for MapCoordinateSystem {
    fn default() -> Self {
        Self::Geocentric
    }
}

#[derive(Debug, Clone)]
pub struct MapOptions {
    pub name: String,
    pub coordinate_system: MapCoordinateSystem,
    /// Tiling scheme every terrain tile key belongs to.
    pub profile: Arc<Profile>,
    pub ellipsoid: Ellipsoid,
}

impl MapOptions {
    pub fn new(coordinate_system: MapCoordinateSystem, profile: Arc<Profile>) -> Self {
        Self {
            coordinate_system,
            profile,
            ..Self::default()
        }
    }

    pub fn is_geocentric(&self) -> bool {
        matches!(
            self.coordinate_system,
            MapCoordinateSystem::Geocentric | MapCoordinateSystem::GeocentricCube
        )
    }

    pub fn is_cube(&self) -> bool {
        self.coordinate_system == MapCoordinateSystem::GeocentricCube
    }

    pub fn is_projected(&self) -> bool {
        self.coordinate_system == MapCoordinateSystem::Projected
    }

    /// A flat map drawn directly in geographic degrees.
    pub fn is_plate_carre(&self) -> bool {
        self.is_projected() && self.profile.srs().is_geographic()
    }
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            name: "map".to_string(),
            coordinate_system: MapCoordinateSystem::default(),
            profile: Profile::global_geodetic(),
            ellipsoid: Ellipsoid::wgs84(),
        }
    }
}

/// The layer model the terrain is built from.
///
/// Layers sit behind a reader/writer lock: tile builds hold the read side for
/// their whole duration, layer edits take the write side and bump the
/// revision.
#[derive(Debug)]
pub struct Map {
    options: MapOptions,
    layers: RwLock<MapLayers>,
    revision: AtomicU64,
}

impl Map {
    pub fn new(options: MapOptions) -> Self {
        Self {
            options,
            layers: RwLock::new(MapLayers::new()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.options.profile
    }

    pub fn is_geocentric(&self) -> bool {
        self.options.is_geocentric()
    }

    /// Shared access to the layer set. Hold the guard for the whole build so
    /// the layer set cannot change underneath it.
    pub fn read_layers(&self) -> RwLockReadGuard<'_, MapLayers> {
        self.layers.read()
    }

    pub fn add_layer(&self, layer: impl Into<Arc<MapLayer>>) -> Result<()> {
        let layer = layer.into();
        let name = layer.name().to_string();
        self.layers.write().add_layer(layer)?;
        self.bump_revision();
        log::info!("map '{}': added layer '{}'", self.options.name, name);
        Ok(())
    }

    pub fn remove_layer(&self, name: &str) -> Option<Arc<MapLayer>> {
        let removed = self.layers.write().remove_layer(name);
        if removed.is_some() {
            self.bump_revision();
            log::info!("map '{}': removed layer '{}'", self.options.name, name);
        }
        removed
    }

    pub fn move_layer(&self, name: &str, index: usize) -> Result<()> {
        self.layers.write().move_layer(name, index)?;
        self.bump_revision();
        Ok(())
    }

    /// Counter advanced on every change to the layer set.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Composite elevation for `key`; see [`MapLayers::create_heightfield`].
    pub fn create_heightfield(
        &self,
        key: &TileKey,
        fallback: bool,
        interpolation: ElevationInterpolation,
    ) -> Option<HeightField> {
        self.read_layers().create_heightfield(key, fallback, interpolation)
    }
}
