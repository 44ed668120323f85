//! Imagery and elevation layers of a map.

use std::sync::Arc;

use crate::{
    core::{
        config::{ElevationInterpolation, TextureFilterMode},
        extent::GeoExtent,
        profile::Profile,
        tile_key::TileKey,
    },
    constants::NO_DATA_VALUE,
    data::{
        heightfield::HeightField,
        image::{GeoImage, ImageMosaic},
    },
    layers::base::{LayerKind, MapLayerOptions},
    tiles::{cache::Cache, source::TileSource},
    traits::ProgressCallback,
};

/// A data source bound into a map, with its level limits and optional cache.
pub struct MapLayer {
    kind: LayerKind,
    options: MapLayerOptions,
    source: Arc<dyn TileSource>,
    cache: Option<Arc<dyn Cache>>,
}

impl MapLayer {
    pub fn new(kind: LayerKind, options: MapLayerOptions, source: Arc<dyn TileSource>) -> Self {
        Self {
            kind,
            options,
            source,
            cache: None,
        }
    }

    pub fn image(options: MapLayerOptions, source: Arc<dyn TileSource>) -> Self {
        Self::new(LayerKind::Image, options, source)
    }

    pub fn heightfield(options: MapLayerOptions, source: Arc<dyn TileSource>) -> Self {
        Self::new(LayerKind::HeightField, options, source)
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn options(&self) -> &MapLayerOptions {
        &self.options
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    pub fn profile(&self) -> Arc<Profile> {
        self.source.profile()
    }

    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    pub fn min_level(&self) -> Option<u32> {
        self.options.min_level
    }

    pub fn max_level(&self) -> Option<u32> {
        self.options.max_level
    }

    pub fn min_filter(&self) -> TextureFilterMode {
        self.options.min_filter
    }

    pub fn mag_filter(&self) -> TextureFilterMode {
        self.options.mag_filter
    }

    pub fn opacity(&self) -> f32 {
        self.options.opacity
    }

    pub fn cache_format(&self) -> &str {
        self.options
            .cache_format
            .as_deref()
            .unwrap_or_else(|| self.kind.default_cache_format())
    }

    pub fn use_mercator_fast_path(&self) -> Option<bool> {
        self.options.use_mercator_fast_path
    }

    /// Whether the layer will answer requests for `key`: the key must be
    /// valid, within the configured level range and over the source's data.
    pub fn is_key_valid(&self, key: &TileKey) -> bool {
        if !key.is_valid() {
            return false;
        }
        if matches!(self.options.min_level, Some(min) if key.level() < min) {
            return false;
        }
        if matches!(self.options.max_level, Some(max) if key.level() > max) {
            return false;
        }
        match self.source.data_extent() {
            Some(data_extent) => data_extent.intersects(&key.extent()),
            None => true,
        }
    }

    /// Produces the image for `key`, mosaicking native tiles when the layer's
    /// profile differs from the key's.
    pub fn create_image(&self, key: &TileKey, progress: Option<&dyn ProgressCallback>) -> Option<GeoImage> {
        if self.kind != LayerKind::Image {
            return None;
        }

        let profile = self.profile();
        if profile.is_equivalent_to(key.profile()) {
            return self.native_image(key, progress);
        }

        let mut mosaic = ImageMosaic::new();
        for native in profile.get_intersecting_tiles(key) {
            if progress.map_or(false, |p| p.is_canceled()) {
                return None;
            }
            if self.is_key_valid(&native) {
                if let Some(image) = self.native_image(&native, progress) {
                    mosaic.push(image);
                }
            }
        }
        let mosaic = mosaic.create_image()?;

        let size = self.source.tile_size();
        let keep_mercator = mosaic.srs().is_mercator()
            && key.profile().srs().is_geographic()
            && self.use_mercator_fast_path() != Some(false);

        if keep_mercator {
            // Crop in mercator; a mercator locator places the pixels later.
            let footprint = key.extent().transform(mosaic.srs())?;
            let footprint = mosaic.extent().intersection(&footprint)?;
            mosaic.resample(&footprint, size, size)
        } else {
            mosaic.resample(&key.extent(), size, size)
        }
    }

    /// Produces elevation for `key` on the key's own grid.
    pub fn create_heightfield(
        &self,
        key: &TileKey,
        progress: Option<&dyn ProgressCallback>,
    ) -> Option<HeightField> {
        if self.kind != LayerKind::HeightField {
            return None;
        }

        let profile = self.profile();
        if profile.is_equivalent_to(key.profile()) {
            return self.native_heightfield(key, progress);
        }

        let mut pieces: Vec<(GeoExtent, HeightField)> = Vec::new();
        for native in profile.get_intersecting_tiles(key) {
            if progress.map_or(false, |p| p.is_canceled()) {
                return None;
            }
            if self.is_key_valid(&native) {
                if let Some(hf) = self.native_heightfield(&native, progress) {
                    pieces.push((native.extent(), hf));
                }
            }
        }
        if pieces.is_empty() {
            return None;
        }

        let extent = key.extent();
        let size = self.source.tile_size().max(2);
        let mut out = HeightField::create_reference(&extent, size, size);
        let [ox, oy, _] = out.origin();
        for row in 0..out.num_rows() {
            let y = oy + out.y_interval() * row as f64;
            for col in 0..out.num_columns() {
                let x = ox + out.x_interval() * col as f64;
                let height = extent
                    .srs()
                    .transform_point(x, y, profile.srs())
                    .and_then(|(lx, ly)| {
                        covering_piece(&pieces, lx, ly)
                            .map(|hf| hf.height_at_location(lx, ly, ElevationInterpolation::Bilinear))
                    })
                    .unwrap_or(NO_DATA_VALUE);
                out.set_height(col, row, height);
            }
        }
        Some(out)
    }

    fn native_image(&self, key: &TileKey, progress: Option<&dyn ProgressCallback>) -> Option<GeoImage> {
        if let Some(cache) = &self.cache {
            if let Some(image) = cache.get_image(key, self.name(), self.cache_format()) {
                return Some(image);
            }
        }

        let image = self.source.create_image(key, progress)?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_image(key, self.name(), self.cache_format(), &image) {
                log::warn!("layer '{}': failed to cache image {}: {}", self.name(), key, e);
            }
        }
        Some(image)
    }

    fn native_heightfield(
        &self,
        key: &TileKey,
        progress: Option<&dyn ProgressCallback>,
    ) -> Option<HeightField> {
        if let Some(cache) = &self.cache {
            if let Some(hf) = cache.get_heightfield(key, self.name()) {
                return Some(hf);
            }
        }

        let hf = self.source.create_heightfield(key, progress)?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_heightfield(key, self.name(), &hf) {
                log::warn!("layer '{}': failed to cache heightfield {}: {}", self.name(), key, e);
            }
        }
        Some(hf)
    }
}

/// The native heightfield holding `(x, y)`. Points that miss every extent
/// by less than one sample interval, from reprojection round-off, snap to
/// the nearest piece.
fn covering_piece(pieces: &[(GeoExtent, HeightField)], x: f64, y: f64) -> Option<&HeightField> {
    if let Some((_, hf)) = pieces.iter().find(|(e, _)| e.contains(x, y)) {
        return Some(hf);
    }

    let gap = |e: &GeoExtent| {
        let dx = (e.xmin - x).max(x - e.xmax).max(0.0);
        let dy = (e.ymin - y).max(y - e.ymax).max(0.0);
        dx.max(dy)
    };
    pieces
        .iter()
        .filter(|(e, hf)| gap(e) <= hf.x_interval().max(hf.y_interval()))
        .min_by(|(a, _), (b, _)| gap(a).total_cmp(&gap(b)))
        .map(|(_, hf)| hf)
}

impl std::fmt::Debug for MapLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapLayer")
            .field("kind", &self.kind)
            .field("name", &self.options.name)
            .field("source", &self.source.name())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::srs::SpatialReference,
        tiles::{
            cache::MemoryCache,
            source::{ProceduralElevationSource, SolidColorSource},
        },
    };

    fn red_layer(profile: Arc<Profile>) -> MapLayer {
        MapLayer::image(
            MapLayerOptions::new("red").with_levels(Some(1), Some(4)),
            Arc::new(SolidColorSource::new("red", profile, [255, 0, 0, 255])),
        )
    }

    #[test]
    fn test_key_validity_honours_levels() {
        let profile = Profile::global_geodetic();
        let layer = red_layer(profile.clone());

        assert!(!layer.is_key_valid(&TileKey::new(0, 0, 0, profile.clone())));
        assert!(layer.is_key_valid(&TileKey::new(1, 0, 0, profile.clone())));
        assert!(layer.is_key_valid(&TileKey::new(4, 0, 0, profile.clone())));
        assert!(!layer.is_key_valid(&TileKey::new(5, 0, 0, profile.clone())));
        assert!(!layer.is_key_valid(&TileKey::new(1, 9, 0, profile)));
    }

    #[test]
    fn test_key_validity_honours_data_extent() {
        let profile = Profile::global_geodetic();
        let inset = GeoExtent::new(SpatialReference::Geographic, 10.0, 10.0, 20.0, 20.0);
        let layer = MapLayer::heightfield(
            MapLayerOptions::new("inset"),
            Arc::new(ProceduralElevationSource::new("inset", profile.clone()).with_data_extent(inset)),
        );

        assert!(layer.is_key_valid(&TileKey::new(0, 1, 0, profile.clone())));
        assert!(!layer.is_key_valid(&TileKey::new(0, 0, 0, profile)));
    }

    #[test]
    fn test_images_are_cached() {
        let profile = Profile::global_geodetic();
        let cache = Arc::new(MemoryCache::new(16));
        let layer = red_layer(profile.clone()).with_cache(cache.clone());
        let key = TileKey::new(2, 1, 1, profile);

        assert!(!cache.is_cached(&key, "red", "png"));
        assert!(layer.create_image(&key, None).is_some());
        assert!(cache.is_cached(&key, "red", "png"));
        assert!(layer.create_image(&key, None).is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_kind_mismatch_yields_nothing() {
        let profile = Profile::global_geodetic();
        let layer = red_layer(profile.clone());
        assert!(layer.create_heightfield(&TileKey::new(1, 0, 0, profile), None).is_none());
    }

    #[test]
    fn test_mercator_layer_on_geographic_key() {
        let layer = MapLayer::image(
            MapLayerOptions::new("merc"),
            Arc::new(SolidColorSource::new("merc", Profile::spherical_mercator(), [0, 255, 0, 255])),
        );
        let key = TileKey::new(1, 0, 0, Profile::global_geodetic());

        let image = layer.create_image(&key, None).unwrap();
        assert!(image.srs().is_mercator());
        assert!(!image.is_fully_transparent());

        let reprojected = MapLayer::image(
            MapLayerOptions::new("merc").with_mercator_fast_path(false),
            Arc::new(SolidColorSource::new("merc", Profile::spherical_mercator(), [0, 255, 0, 255])),
        )
        .create_image(&key, None)
        .unwrap();
        assert!(reprojected.srs().is_geographic());
        assert_eq!(reprojected.extent(), &key.extent());
    }

    #[test]
    fn test_heightfield_across_profiles() {
        let layer = MapLayer::heightfield(
            MapLayerOptions::new("dem"),
            Arc::new(ProceduralElevationSource::new("dem", Profile::spherical_mercator())),
        );
        let key = TileKey::new(2, 1, 1, Profile::global_geodetic());

        let hf = layer.create_heightfield(&key, None).unwrap();
        let (xmin, ymin, xmax, ymax) = hf.bounds();
        let expected = key.extent();
        assert!((xmin - expected.xmin).abs() < 1e-9 && (ymax - expected.ymax).abs() < 1e-9);
        assert!((xmax - expected.xmax).abs() < 1e-9 && (ymin - expected.ymin).abs() < 1e-9);
        assert!(!hf.has_no_data());
    }
}
