//! Spatial reference systems understood by the tile factory.

use serde::{Deserialize, Serialize};

use crate::core::geo::{LatLng, Point};

/// Horizontal coordinate reference system of a profile, extent or image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialReference {
    /// Longitude/latitude in degrees (EPSG:4326).
    Geographic,
    /// Spherical mercator in meters (EPSG:3857).
    SphericalMercator,
    /// Any other projected system. Coordinates pass through untransformed.
    Projected { name: String },
}

impl SpatialReference {
    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic)
    }

    pub fn is_mercator(&self) -> bool {
        matches!(self, Self::SphericalMercator)
    }

    pub fn is_projected(&self) -> bool {
        !self.is_geographic()
    }

    /// The geographic system this reference is based on.
    pub fn geographic(&self) -> SpatialReference {
        Self::Geographic
    }

    pub fn is_equivalent_to(&self, other: &SpatialReference) -> bool {
        self == other
    }

    /// Transforms a point into `to`. Returns `None` when no transformation exists.
    pub fn transform_point(&self, x: f64, y: f64, to: &SpatialReference) -> Option<(f64, f64)> {
        if self == to {
            return Some((x, y));
        }

        match (self, to) {
            (Self::Geographic, Self::SphericalMercator) => {
                let p = LatLng::new(y, x).to_mercator();
                Some((p.x, p.y))
            }
            (Self::SphericalMercator, Self::Geographic) => {
                let ll = LatLng::from_mercator(Point::new(x, y));
                Some((ll.lng, ll.lat))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geographic => write!(f, "EPSG:4326"),
            Self::SphericalMercator => write!(f, "EPSG:3857"),
            Self::Projected { name } => write!(f, "{}", name),
        }
    }
}
