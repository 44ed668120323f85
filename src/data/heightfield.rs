//! Regular elevation grids.

use serde::{Deserialize, Serialize};

use crate::core::{
    config::ElevationInterpolation,
    constants::{DEGREES_PER_METER_AT_EQUATOR, NO_DATA_VALUE},
    extent::GeoExtent,
};

/// A grid of height samples. Row 0 is the southern edge and the origin is the
/// south-west sample; heights are stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightField {
    cols: u32,
    rows: u32,
    origin: [f64; 3],
    x_interval: f64,
    y_interval: f64,
    heights: Vec<f32>,
    skirt_height: f32,
    border_width: u32,
}

impl HeightField {
    /// Allocates a zero-filled grid with unit spacing at the origin.
    pub fn new(cols: u32, rows: u32) -> Self {
        let cols = cols.max(2);
        let rows = rows.max(2);
        Self {
            cols,
            rows,
            origin: [0.0; 3],
            x_interval: 1.0,
            y_interval: 1.0,
            heights: vec![0.0; (cols * rows) as usize],
            skirt_height: 0.0,
            border_width: 0,
        }
    }

    /// A flat grid spanning `extent`, edge samples lying on the extent's edges.
    pub fn create_reference(extent: &GeoExtent, cols: u32, rows: u32) -> Self {
        let mut hf = Self::new(cols, rows);
        hf.origin = [extent.xmin, extent.ymin, 0.0];
        hf.x_interval = extent.width() / (hf.cols - 1) as f64;
        hf.y_interval = extent.height() / (hf.rows - 1) as f64;
        hf
    }

    /// Whether the sample buffer matches the grid dimensions. Decoded grids
    /// must be checked before sampling.
    pub fn is_well_formed(&self) -> bool {
        self.cols >= 2 && self.rows >= 2 && self.heights.len() == (self.cols as usize) * (self.rows as usize)
    }

    pub fn num_columns(&self) -> u32 {
        self.cols
    }

    pub fn num_rows(&self) -> u32 {
        self.rows
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn set_origin(&mut self, origin: [f64; 3]) {
        self.origin = origin;
    }

    pub fn x_interval(&self) -> f64 {
        self.x_interval
    }

    pub fn y_interval(&self) -> f64 {
        self.y_interval
    }

    pub fn skirt_height(&self) -> f32 {
        self.skirt_height
    }

    pub fn set_skirt_height(&mut self, skirt_height: f32) {
        self.skirt_height = skirt_height;
    }

    pub fn border_width(&self) -> u32 {
        self.border_width
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn height(&self, col: u32, row: u32) -> f32 {
        self.heights[(row * self.cols + col) as usize]
    }

    pub fn set_height(&mut self, col: u32, row: u32, height: f32) {
        self.heights[(row * self.cols + col) as usize] = height;
    }

    /// (xmin, ymin, xmax, ymax) covered by the samples.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            self.origin[0],
            self.origin[1],
            self.origin[0] + self.x_interval * (self.cols - 1) as f64,
            self.origin[1] + self.y_interval * (self.rows - 1) as f64,
        )
    }

    /// Geographic position of the grid's center sample.
    pub fn center(&self) -> (f64, f64) {
        let (xmin, ymin, xmax, ymax) = self.bounds();
        ((xmin + xmax) * 0.5, (ymin + ymax) * 0.5)
    }

    pub fn has_no_data(&self) -> bool {
        self.heights.iter().any(|h| is_no_data(*h))
    }

    /// (min, max) over valid samples, or `None` when every sample is missing.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.heights
            .iter()
            .copied()
            .filter(|h| !is_no_data(*h))
            .fold(None, |acc, h| match acc {
                None => Some((h, h)),
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
            })
    }

    pub fn fill(&mut self, value: f32) {
        self.heights.iter_mut().for_each(|h| *h = value);
    }

    /// Replaces missing samples with `value`.
    pub fn fill_no_data(&mut self, value: f32) {
        for h in self.heights.iter_mut().filter(|h| is_no_data(**h)) {
            *h = value;
        }
    }

    /// Samples the grid at a location in its own coordinate units.
    ///
    /// Locations outside the grid are clamped to the nearest edge. Returns
    /// [`NO_DATA_VALUE`] when the contributing samples are all missing.
    pub fn height_at_location(&self, x: f64, y: f64, interpolation: ElevationInterpolation) -> f32 {
        let px = ((x - self.origin[0]) / self.x_interval).clamp(0.0, (self.cols - 1) as f64);
        let py = ((y - self.origin[1]) / self.y_interval).clamp(0.0, (self.rows - 1) as f64);

        if interpolation == ElevationInterpolation::Nearest {
            return self.height(px.round() as u32, py.round() as u32);
        }

        let c0 = px.floor() as u32;
        let r0 = py.floor() as u32;
        let c1 = (c0 + 1).min(self.cols - 1);
        let r1 = (r0 + 1).min(self.rows - 1);

        let ll = self.height(c0, r0);
        let lr = self.height(c1, r0);
        let ul = self.height(c0, r1);
        let ur = self.height(c1, r1);

        match interpolation {
            ElevationInterpolation::Average => {
                let valid: Vec<f32> = [ll, lr, ul, ur]
                    .into_iter()
                    .filter(|h| !is_no_data(*h))
                    .collect();
                if valid.is_empty() {
                    NO_DATA_VALUE
                } else {
                    valid.iter().sum::<f32>() / valid.len() as f32
                }
            }
            _ => {
                if [ll, lr, ul, ur].iter().any(|h| is_no_data(*h)) {
                    return self.height(px.round() as u32, py.round() as u32);
                }
                let fx = (px - c0 as f64) as f32;
                let fy = (py - r0 as f64) as f32;
                let bottom = ll + (lr - ll) * fx;
                let top = ul + (ur - ul) * fx;
                bottom + (top - bottom) * fy
            }
        }
    }

    /// Resamples this grid, which spans `parent_extent`, onto `sub_extent` at
    /// the same resolution.
    pub fn create_sub_sample(&self, parent_extent: &GeoExtent, sub_extent: &GeoExtent) -> HeightField {
        let mut sub = HeightField::create_reference(sub_extent, self.cols, self.rows);
        sub.skirt_height = self.skirt_height;

        let x_scale = self.x_interval * (self.cols - 1) as f64 / parent_extent.width();
        let y_scale = self.y_interval * (self.rows - 1) as f64 / parent_extent.height();

        for row in 0..sub.rows {
            let y = sub_extent.ymin + sub.y_interval * row as f64;
            for col in 0..sub.cols {
                let x = sub_extent.xmin + sub.x_interval * col as f64;
                let sx = self.origin[0] + (x - parent_extent.xmin) * x_scale;
                let sy = self.origin[1] + (y - parent_extent.ymin) * y_scale;
                let h = self.height_at_location(sx, sy, ElevationInterpolation::Bilinear);
                sub.set_height(col, row, h);
            }
        }
        sub
    }

    /// Resamples onto a reference grid over `extent`.
    pub fn resample(
        &self,
        extent: &GeoExtent,
        cols: u32,
        rows: u32,
        interpolation: ElevationInterpolation,
    ) -> HeightField {
        let mut out = HeightField::create_reference(extent, cols, rows);
        for row in 0..out.rows {
            let y = out.origin[1] + out.y_interval * row as f64;
            for col in 0..out.cols {
                let x = out.origin[0] + out.x_interval * col as f64;
                out.set_height(col, row, self.height_at_location(x, y, interpolation));
            }
        }
        out
    }

    /// Converts heights from meters to degrees for plate-carrée tessellation.
    pub fn scale_to_degrees(&mut self) {
        let scale = DEGREES_PER_METER_AT_EQUATOR as f32;
        for h in self.heights.iter_mut().filter(|h| !is_no_data(**h)) {
            *h *= scale;
        }
    }
}

pub fn is_no_data(height: f32) -> bool {
    height.is_nan() || height == NO_DATA_VALUE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::srs::SpatialReference;
    use approx::assert_relative_eq;

    fn extent(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> GeoExtent {
        GeoExtent::new(SpatialReference::Geographic, xmin, ymin, xmax, ymax)
    }

    fn ramp(extent: &GeoExtent) -> HeightField {
        let mut hf = HeightField::create_reference(extent, 5, 5);
        for row in 0..5 {
            for col in 0..5 {
                hf.set_height(col, row, (col * 10) as f32);
            }
        }
        hf
    }

    #[test]
    fn test_reference_heightfield() {
        let hf = HeightField::create_reference(&extent(0.0, 0.0, 10.0, 20.0), 8, 8);
        assert_eq!(hf.num_columns(), 8);
        assert!(hf.heights().iter().all(|h| *h == 0.0));
        assert_eq!(hf.bounds(), (0.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn test_interpolation_modes() {
        let hf = ramp(&extent(0.0, 0.0, 4.0, 4.0));
        assert_relative_eq!(hf.height_at_location(1.5, 2.0, ElevationInterpolation::Bilinear), 15.0);
        assert_relative_eq!(hf.height_at_location(1.4, 2.0, ElevationInterpolation::Nearest), 10.0);
        assert_relative_eq!(hf.height_at_location(1.5, 2.0, ElevationInterpolation::Average), 15.0);
        // clamped outside the grid
        assert_relative_eq!(hf.height_at_location(100.0, 2.0, ElevationInterpolation::Bilinear), 40.0);
    }

    #[test]
    fn test_sub_sample_keeps_resolution() {
        let parent = extent(0.0, 0.0, 4.0, 4.0);
        let mut hf = ramp(&parent);
        hf.set_skirt_height(12.0);

        let sub = hf.create_sub_sample(&parent, &extent(2.0, 0.0, 4.0, 2.0));
        assert_eq!(sub.num_columns(), 5);
        assert_eq!(sub.bounds(), (2.0, 0.0, 4.0, 2.0));
        assert_relative_eq!(sub.height(0, 0), 20.0);
        assert_relative_eq!(sub.height(4, 0), 40.0);
        assert_relative_eq!(sub.height(2, 3), 30.0);
        assert_eq!(sub.skirt_height(), 12.0);
    }

    #[test]
    fn test_no_data_handling() {
        let mut hf = HeightField::create_reference(&extent(0.0, 0.0, 1.0, 1.0), 2, 2);
        hf.set_height(0, 0, NO_DATA_VALUE);
        hf.set_height(1, 0, 4.0);
        assert!(hf.has_no_data());
        assert_eq!(hf.min_max(), Some((0.0, 4.0)));

        hf.fill_no_data(1.0);
        assert!(!hf.has_no_data());
    }

    #[test]
    fn test_scale_to_degrees() {
        let mut hf = HeightField::create_reference(&extent(0.0, 0.0, 1.0, 1.0), 2, 2);
        hf.set_height(0, 0, 111_319.0);
        hf.scale_to_degrees();
        assert_relative_eq!(hf.height(0, 0), 1.0, epsilon = 1e-4);
    }
}
