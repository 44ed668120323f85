use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::{
    core::{extent::GeoExtent, profile::Profile, tile_key::TileKey},
    data::{heightfield::HeightField, image::GeoImage},
    traits::ProgressCallback,
};

/// Trait representing anything that can produce imagery or elevation for a
/// tile key in its own profile.
///
/// Both producers return `None` when the source has no data for the key.
pub trait TileSource: Send + Sync {
    fn name(&self) -> &str;

    /// Native tiling scheme of the source.
    fn profile(&self) -> Arc<Profile>;

    fn create_image(
        &self,
        _key: &TileKey,
        _progress: Option<&dyn ProgressCallback>,
    ) -> Option<GeoImage> {
        None
    }

    fn create_heightfield(
        &self,
        _key: &TileKey,
        _progress: Option<&dyn ProgressCallback>,
    ) -> Option<HeightField> {
        None
    }

    /// Deepest level the source holds real data for.
    fn max_data_level(&self) -> u32 {
        23
    }

    /// Area the source covers, when narrower than its profile.
    fn data_extent(&self) -> Option<GeoExtent> {
        None
    }

    /// Edge length, in pixels or samples, of the tiles the source produces.
    fn tile_size(&self) -> u32 {
        256
    }
}

/// Produces single-color images for every key.
pub struct SolidColorSource {
    name: String,
    profile: Arc<Profile>,
    color: [u8; 4],
    tile_size: u32,
    max_level: u32,
}

impl SolidColorSource {
    pub fn new(name: impl Into<String>, profile: Arc<Profile>, color: [u8; 4]) -> Self {
        Self {
            name: name.into(),
            profile,
            color,
            tile_size: 16,
            max_level: 23,
        }
    }

    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }
}

impl TileSource for SolidColorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> Arc<Profile> {
        self.profile.clone()
    }

    fn create_image(
        &self,
        key: &TileKey,
        progress: Option<&dyn ProgressCallback>,
    ) -> Option<GeoImage> {
        if key.level() > self.max_level || progress.map_or(false, |p| p.is_canceled()) {
            return None;
        }
        let image = RgbaImage::from_pixel(self.tile_size, self.tile_size, Rgba(self.color));
        Some(GeoImage::new(image, key.extent()))
    }

    fn max_data_level(&self) -> u32 {
        self.max_level
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

/// Synthesizes smooth rolling elevation from the sample coordinates, so
/// neighbouring tiles always agree along shared edges.
pub struct ProceduralElevationSource {
    name: String,
    profile: Arc<Profile>,
    samples: u32,
    amplitude: f32,
    wavelength: f64,
    max_level: u32,
    data_extent: Option<GeoExtent>,
}

impl ProceduralElevationSource {
    pub fn new(name: impl Into<String>, profile: Arc<Profile>) -> Self {
        let wavelength = profile.extent().width() / 8.0;
        Self {
            name: name.into(),
            profile,
            samples: 17,
            amplitude: 2500.0,
            wavelength,
            max_level: 23,
            data_extent: None,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(2);
        self
    }

    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    /// Restricts the data to an inset area.
    pub fn with_data_extent(mut self, extent: GeoExtent) -> Self {
        self.data_extent = Some(extent);
        self
    }

    pub fn elevation_at(&self, x: f64, y: f64) -> f32 {
        let k = std::f64::consts::TAU / self.wavelength;
        ((x * k).sin() * (y * k).cos()) as f32 * self.amplitude
    }
}

impl TileSource for ProceduralElevationSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> Arc<Profile> {
        self.profile.clone()
    }

    fn create_heightfield(
        &self,
        key: &TileKey,
        progress: Option<&dyn ProgressCallback>,
    ) -> Option<HeightField> {
        if key.level() > self.max_level || progress.map_or(false, |p| p.is_canceled()) {
            return None;
        }
        let extent = key.extent();
        if let Some(data_extent) = &self.data_extent {
            if !data_extent.intersects(&extent) {
                return None;
            }
        }

        let mut hf = HeightField::create_reference(&extent, self.samples, self.samples);
        let [ox, oy, _] = hf.origin();
        for row in 0..hf.num_rows() {
            let y = oy + hf.y_interval() * row as f64;
            for col in 0..hf.num_columns() {
                let x = ox + hf.x_interval() * col as f64;
                hf.set_height(col, row, self.elevation_at(x, y));
            }
        }
        Some(hf)
    }

    fn max_data_level(&self) -> u32 {
        self.max_level
    }

    fn data_extent(&self) -> Option<GeoExtent> {
        self.data_extent.clone()
    }

    fn tile_size(&self) -> u32 {
        self.samples
    }
}
