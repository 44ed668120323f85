//! # terrakit
//!
//! A quadtree terrain tile factory for paged, level-of-detail globe and flat
//! map rendering.
//!
//! A [`Map`] holds ordered imagery and elevation layers. The [`TileFactory`]
//! turns `(Map, CustomTerrain, TileKey)` into renderable [`CustomTile`]s wrapped
//! in pageable LOD nodes, falling back to ancestor data or synthesized
//! placeholders while real data streams in. [`TilePager`] resolves the child
//! URIs those nodes advertise and services asynchronous layer requests once
//! per frame.

pub mod background;
pub mod core;
pub mod data;
pub mod layers;
pub mod prelude;
pub mod runtime;
pub mod spatial;
pub mod terrain;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    config::{TerrainOptions, TerrainPreset},
    extent::GeoExtent,
    locator::{GeoLocator, Locator, MercatorLocator},
    map::{Map, MapCoordinateSystem, MapOptions},
    profile::Profile,
    srs::SpatialReference,
    tile_key::{Quadrant, TileId, TileKey},
};

pub use data::{heightfield::HeightField, image::GeoImage};

pub use layers::{base::LayerKind, manager::MapLayers, map_layer::MapLayer};

pub use terrain::{
    factory::{CreatedTile, TileFactory},
    node::{PagedLod, TileNode},
    paging::TilePager,
    registry::CustomTerrain,
    tile::CustomTile,
};

pub use tiles::{cache::Cache, source::TileSource};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TerrainError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid tile key: {0}")]
    InvalidKey(String),

    #[error("Invalid child URI: {0}")]
    InvalidUri(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Task error: {0}")]
    Task(String),
}

/// Error type alias for convenience
pub type Error = TerrainError;

/// Installs `env_logger`, honouring `RUST_LOG`. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
