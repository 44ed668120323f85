//! Georeferenced raster images.

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::core::{extent::GeoExtent, srs::SpatialReference};

/// A 1×1 fully transparent image, used as a placeholder for layers that
/// produced no data.
pub fn create_empty_image() -> RgbaImage {
    RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]))
}

/// An RGBA image tagged with the extent it covers. Row 0 is the northern edge.
#[derive(Debug, Clone)]
pub struct GeoImage {
    image: Arc<RgbaImage>,
    extent: GeoExtent,
}

impl GeoImage {
    pub fn new(image: RgbaImage, extent: GeoExtent) -> Self {
        Self {
            image: Arc::new(image),
            extent,
        }
    }

    pub fn from_shared(image: Arc<RgbaImage>, extent: GeoExtent) -> Self {
        Self { image, extent }
    }

    /// The transparent placeholder over `extent`.
    pub fn transparent(extent: GeoExtent) -> Self {
        Self::new(create_empty_image(), extent)
    }

    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    pub fn extent(&self) -> &GeoExtent {
        &self.extent
    }

    pub fn srs(&self) -> &SpatialReference {
        self.extent.srs()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Mean ground size of a pixel in the extent's units.
    pub fn units_per_pixel(&self) -> f64 {
        let uppw = self.extent.width() / self.image.width().max(1) as f64;
        let upph = self.extent.height() / self.image.height().max(1) as f64;
        (uppw + upph) / 2.0
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }

    /// Resamples onto `extent` at `width`×`height` using nearest-neighbour lookup.
    ///
    /// The target extent may be in a different reference system; pixels that
    /// fall outside this image, or cannot be transformed, come out transparent.
    pub fn resample(&self, extent: &GeoExtent, width: u32, height: u32) -> Option<GeoImage> {
        if width == 0 || height == 0 || !self.extent.intersects(extent) {
            return None;
        }

        let same_srs = extent.srs().is_equivalent_to(self.srs());
        let src_w = self.image.width();
        let src_h = self.image.height();
        let dx = extent.width() / width as f64;
        let dy = extent.height() / height as f64;

        let mut out = RgbaImage::new(width, height);
        for (col, row, pixel) in out.enumerate_pixels_mut() {
            let x = extent.xmin + (col as f64 + 0.5) * dx;
            let y = extent.ymax - (row as f64 + 0.5) * dy;
            let (sx, sy) = if same_srs {
                (x, y)
            } else {
                match extent.srs().transform_point(x, y, self.srs()) {
                    Some(p) => p,
                    None => continue,
                }
            };
            if !self.extent.contains(sx, sy) {
                continue;
            }

            let u = ((sx - self.extent.xmin) / self.extent.width() * src_w as f64) as u32;
            let v = ((self.extent.ymax - sy) / self.extent.height() * src_h as f64) as u32;
            *pixel = *self.image.get_pixel(u.min(src_w - 1), v.min(src_h - 1));
        }

        Some(GeoImage::new(out, extent.clone()))
    }
}

/// Stitches adjacent tiles of one profile into a single image.
#[derive(Debug, Default)]
pub struct ImageMosaic {
    tiles: Vec<GeoImage>,
}

impl ImageMosaic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, image: GeoImage) {
        self.tiles.push(image);
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn extent(&self) -> Option<GeoExtent> {
        let mut iter = self.tiles.iter();
        let first = iter.next()?.extent().clone();
        Some(iter.fold(first, |acc, t| acc.union(t.extent())))
    }

    /// Composites the tiles into one image covering their union. Resolution
    /// follows the first tile.
    pub fn create_image(&self) -> Option<GeoImage> {
        let first = self.tiles.first()?;
        if self.tiles.len() == 1 {
            return Some(first.clone());
        }

        let extent = self.extent()?;
        let upp_x = first.extent().width() / first.width() as f64;
        let upp_y = first.extent().height() / first.height() as f64;
        let width = (extent.width() / upp_x).round().max(1.0) as u32;
        let height = (extent.height() / upp_y).round().max(1.0) as u32;

        let mut out = RgbaImage::new(width, height);
        for tile in &self.tiles {
            let x0 = ((tile.extent().xmin - extent.xmin) / upp_x).round() as i64;
            let y0 = ((extent.ymax - tile.extent().ymax) / upp_y).round() as i64;
            let tile_w = (tile.extent().width() / upp_x).round() as u32;
            let tile_h = (tile.extent().height() / upp_y).round() as u32;

            for ty in 0..tile_h {
                for tx in 0..tile_w {
                    let (ox, oy) = (x0 + tx as i64, y0 + ty as i64);
                    if ox < 0 || oy < 0 || ox >= width as i64 || oy >= height as i64 {
                        continue;
                    }
                    let sx = (tx as u64 * tile.width() as u64 / tile_w.max(1) as u64) as u32;
                    let sy = (ty as u64 * tile.height() as u64 / tile_h.max(1) as u64) as u32;
                    out.put_pixel(ox as u32, oy as u32, *tile.image().get_pixel(sx, sy));
                }
            }
        }

        Some(GeoImage::new(out, extent))
    }
}
