use crate::core::{constants::MAX_MERCATOR_LATITUDE, srs::SpatialReference};
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle tagged with the spatial reference it is expressed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    srs: SpatialReference,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl GeoExtent {
    pub fn new(srs: SpatialReference, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            srs,
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn srs(&self) -> &SpatialReference {
        &self.srs
    }

    /// Gets the bounds as (xmin, ymin, xmax, ymax)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (self.xmin, self.ymin, self.xmax, self.ymax)
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Gets the center point of the extent
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    pub fn is_valid(&self) -> bool {
        self.xmax >= self.xmin && self.ymax >= self.ymin
    }

    /// Checks if the extent contains a point
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Checks if the extent overlaps another extent in the same reference system.
    /// Extents that merely touch along an edge do not intersect.
    pub fn intersects(&self, other: &GeoExtent) -> bool {
        if !self.srs.is_equivalent_to(&other.srs) {
            return match other.transform(&self.srs) {
                Some(other) => self.intersects(&other),
                None => false,
            };
        }

        !(other.xmax <= self.xmin
            || other.xmin >= self.xmax
            || other.ymax <= self.ymin
            || other.ymin >= self.ymax)
    }

    /// Gets the intersection of two extents
    pub fn intersection(&self, other: &GeoExtent) -> Option<GeoExtent> {
        let other = other.transform(&self.srs)?;
        if !self.intersects(&other) {
            return None;
        }

        Some(GeoExtent::new(
            self.srs.clone(),
            self.xmin.max(other.xmin),
            self.ymin.max(other.ymin),
            self.xmax.min(other.xmax),
            self.ymax.min(other.ymax),
        ))
    }

    /// Returns the union of this extent with another extent in the same system
    pub fn union(&self, other: &GeoExtent) -> GeoExtent {
        GeoExtent::new(
            self.srs.clone(),
            self.xmin.min(other.xmin),
            self.ymin.min(other.ymin),
            self.xmax.max(other.xmax),
            self.ymax.max(other.ymax),
        )
    }

    /// Transforms the extent's corners into another spatial reference.
    ///
    /// Latitudes beyond the mercator limit are clamped when the target is
    /// spherical mercator, so a global geographic extent still transforms.
    pub fn transform(&self, to: &SpatialReference) -> Option<GeoExtent> {
        if self.srs.is_equivalent_to(to) {
            return Some(self.clone());
        }

        let (ymin, ymax) = if self.srs.is_geographic() && to.is_mercator() {
            (
                self.ymin.max(-MAX_MERCATOR_LATITUDE),
                self.ymax.min(MAX_MERCATOR_LATITUDE),
            )
        } else {
            (self.ymin, self.ymax)
        };

        let (x0, y0) = self.srs.transform_point(self.xmin, ymin, to)?;
        let (x1, y1) = self.srs.transform_point(self.xmax, ymax, to)?;

        Some(GeoExtent::new(
            to.clone(),
            x0.min(x1),
            y0.min(y1),
            x0.max(x1),
            y0.max(y1),
        ))
    }
}

impl std::fmt::Display for GeoExtent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}] ({})",
            self.xmin, self.ymin, self.xmax, self.ymax, self.srs
        )
    }
}
