//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use nalgebra::Vector3;
use terrakit::prelude::*;
use terrakit::terrain::node::LodView;

pub fn geodetic_key(level: u32, x: u32, y: u32) -> TileKey {
    TileKey::new(level, x, y, Profile::global_geodetic())
}

pub fn color_layer(name: &str, color: [u8; 4]) -> MapLayer {
    MapLayer::image(
        MapLayerOptions::new(name),
        Arc::new(SolidColorSource::new(name, Profile::global_geodetic(), color).with_tile_size(16)),
    )
}

pub fn capped_color_layer(name: &str, color: [u8; 4], max_level: u32) -> MapLayer {
    MapLayer::image(
        MapLayerOptions::new(name).with_levels(None, Some(max_level)),
        Arc::new(SolidColorSource::new(name, Profile::global_geodetic(), color).with_tile_size(16)),
    )
}

pub fn dem_layer(name: &str) -> MapLayer {
    MapLayer::heightfield(
        MapLayerOptions::new(name),
        Arc::new(ProceduralElevationSource::new(name, Profile::global_geodetic()).with_samples(9)),
    )
}

/// Elevation that only exists over `extent`.
pub fn inset_dem_layer(name: &str, extent: GeoExtent) -> MapLayer {
    MapLayer::heightfield(
        MapLayerOptions::new(name),
        Arc::new(
            ProceduralElevationSource::new(name, Profile::global_geodetic())
                .with_samples(9)
                .with_data_extent(extent),
        ),
    )
}

pub fn geocentric_map() -> Map {
    Map::new(MapOptions::default())
}

pub fn projected_map() -> Map {
    Map::new(MapOptions::new(MapCoordinateSystem::Projected, Profile::global_geodetic()))
}

pub fn options_with_mode(mode: LoadingMode) -> TerrainOptions {
    TerrainOptions {
        loading_policy: LoadingPolicy {
            mode,
            ..Default::default()
        },
        ..TerrainOptions::default()
    }
}

/// A view from `altitude` meters above the given point of the globe.
pub fn view_above(lat: f64, lon: f64, altitude: f64) -> LodView {
    let eye = Ellipsoid::wgs84().lat_long_height_to_xyz(lat.to_radians(), lon.to_radians(), altitude);
    LodView::at(eye)
}

pub fn flat_view(x: f64, y: f64, z: f64) -> LodView {
    LodView::at(Vector3::new(x, y, z))
}
