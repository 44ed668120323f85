//! Tiling schemes: a spatial reference, a domain extent and the level-0 tile matrix.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::core::{
    constants::MERCATOR_HALF_EXTENT, extent::GeoExtent, srs::SpatialReference,
    tile_key::TileKey,
};

static GLOBAL_GEODETIC: Lazy<Arc<Profile>> = Lazy::new(|| {
    Arc::new(Profile::new(
        GeoExtent::new(SpatialReference::Geographic, -180.0, -90.0, 180.0, 90.0),
        2,
        1,
    ))
});

static SPHERICAL_MERCATOR: Lazy<Arc<Profile>> = Lazy::new(|| {
    Arc::new(Profile::new(
        GeoExtent::new(
            SpatialReference::SphericalMercator,
            -MERCATOR_HALF_EXTENT,
            -MERCATOR_HALF_EXTENT,
            MERCATOR_HALF_EXTENT,
            MERCATOR_HALF_EXTENT,
        ),
        1,
        1,
    ))
});

/// A quadtree tiling scheme. Rows are counted from the top (north) edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    extent: GeoExtent,
    num_tiles_wide: u32,
    num_tiles_high: u32,
}

impl Profile {
    pub fn new(extent: GeoExtent, num_tiles_wide: u32, num_tiles_high: u32) -> Self {
        Self {
            extent,
            num_tiles_wide: num_tiles_wide.max(1),
            num_tiles_high: num_tiles_high.max(1),
        }
    }

    /// Geographic profile with two tiles at level 0.
    pub fn global_geodetic() -> Arc<Profile> {
        GLOBAL_GEODETIC.clone()
    }

    /// Spherical mercator profile with one tile at level 0.
    pub fn spherical_mercator() -> Arc<Profile> {
        SPHERICAL_MERCATOR.clone()
    }

    pub fn srs(&self) -> &SpatialReference {
        self.extent.srs()
    }

    pub fn extent(&self) -> &GeoExtent {
        &self.extent
    }

    pub fn is_equivalent_to(&self, other: &Profile) -> bool {
        self.srs().is_equivalent_to(other.srs())
            && self.num_tiles_wide == other.num_tiles_wide
            && self.num_tiles_high == other.num_tiles_high
            && (self.extent.xmin - other.extent.xmin).abs() < 1e-9
            && (self.extent.ymin - other.extent.ymin).abs() < 1e-9
            && (self.extent.xmax - other.extent.xmax).abs() < 1e-9
            && (self.extent.ymax - other.extent.ymax).abs() < 1e-9
    }

    /// Number of (columns, rows) in the tile matrix at `level`.
    pub fn num_tiles(&self, level: u32) -> (u32, u32) {
        let factor = 1u64 << level.min(31);
        (
            (self.num_tiles_wide as u64 * factor).min(u32::MAX as u64) as u32,
            (self.num_tiles_high as u64 * factor).min(u32::MAX as u64) as u32,
        )
    }

    /// Width and height of one tile at `level`, in profile units.
    pub fn tile_dimensions(&self, level: u32) -> (f64, f64) {
        let (cols, rows) = self.num_tiles(level);
        (
            self.extent.width() / cols as f64,
            self.extent.height() / rows as f64,
        )
    }

    pub fn tile_extent(&self, level: u32, x: u32, y: u32) -> GeoExtent {
        let (width, height) = self.tile_dimensions(level);
        let xmin = self.extent.xmin + width * x as f64;
        let ymax = self.extent.ymax - height * y as f64;
        GeoExtent::new(self.srs().clone(), xmin, ymax - height, xmin + width, ymax)
    }

    /// Collects the tiles of this profile whose union covers `key`'s extent.
    ///
    /// When `key` already belongs to an equivalent profile the result is the
    /// key itself. Otherwise the level chosen is the deepest one whose tiles
    /// are still at least as wide as the key's extent expressed in this
    /// profile's reference system.
    pub fn get_intersecting_tiles(self: &Arc<Self>, key: &TileKey) -> Vec<TileKey> {
        if self.is_equivalent_to(key.profile()) {
            return vec![key.clone()];
        }

        let extent = match key.extent().transform(self.srs()) {
            Some(extent) => extent,
            None => return Vec::new(),
        };

        let extent = match self.extent.intersection(&extent) {
            Some(extent) => extent,
            None => return Vec::new(),
        };

        let key_width = extent.width();
        let mut level = 0;
        while level < 31 {
            let (width, _) = self.tile_dimensions(level + 1);
            if width < key_width {
                break;
            }
            level += 1;
        }

        self.tiles_in_extent(level, &extent)
    }

    /// All keys at `level` whose extents overlap `extent` (already in this profile's SRS).
    pub fn tiles_in_extent(self: &Arc<Self>, level: u32, extent: &GeoExtent) -> Vec<TileKey> {
        const EPSILON: f64 = 1e-7;
        let (width, height) = self.tile_dimensions(level);
        let (cols, rows) = self.num_tiles(level);

        let to_col = |x: f64| ((x - self.extent.xmin) / width).floor();
        let to_row = |y: f64| ((self.extent.ymax - y) / height).floor();

        let clamp = |v: f64, max: u32| v.max(0.0).min((max - 1) as f64) as u32;

        let min_col = clamp(to_col(extent.xmin + width * EPSILON), cols);
        let max_col = clamp(to_col(extent.xmax - width * EPSILON), cols);
        let min_row = clamp(to_row(extent.ymax - height * EPSILON), rows);
        let max_row = clamp(to_row(extent.ymin + height * EPSILON), rows);

        let mut keys = Vec::new();
        for y in min_row..=max_row {
            for x in min_col..=max_col {
                keys.push(TileKey::new(level, x, y, self.clone()));
            }
        }
        keys
    }
}
