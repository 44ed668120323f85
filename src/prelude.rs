//! Prelude module for common terrakit types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use terrakit::prelude::*;`

pub use crate::core::{
    config::{
        ElevationInterpolation, LoadingMode, LoadingPolicy, RangeMode, TerrainOptions,
        TerrainPreset, TextureFilterMode,
    },
    extent::GeoExtent,
    geo::{Ellipsoid, LatLng},
    locator::{CoordinateSystemType, GeoLocator, Locator, MercatorLocator},
    map::{Map, MapCoordinateSystem, MapOptions},
    profile::Profile,
    srs::SpatialReference,
    tile_key::{Quadrant, TileId, TileKey},
};

pub use crate::data::{heightfield::HeightField, image::GeoImage};

pub use crate::layers::{
    base::{LayerKind, MapLayerOptions},
    manager::MapLayers,
    map_layer::MapLayer,
};

pub use crate::terrain::{
    factory::{CreatedTile, TileFactory},
    node::{PagedLod, TileNode},
    paging::TilePager,
    registry::CustomTerrain,
    tile::CustomTile,
};

pub use crate::tiles::{
    cache::{Cache, MemoryCache},
    disk_cache::DiskCache,
    source::{ProceduralElevationSource, SolidColorSource, TileSource},
};

pub use crate::traits::{CancelFlag, ProgressCallback};

pub use crate::{Error as TerrainError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
