use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::MAX_MERCATOR_LATITUDE;

/// Spherical mercator radius, also the WGS84 equatorial radius
const EARTH_RADIUS: f64 = 6378137.0;

/// WGS84 polar radius
const EARTH_RADIUS_POLAR: f64 = 6356752.3142;

/// Represents a geographical coordinate with latitude and longitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Clamps latitude to the range the mercator projection can represent
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
    }

    /// Converts to Web Mercator projection (EPSG:3857)
    pub fn to_mercator(&self) -> Point {
        let lat = Self::clamp_lat(self.lat);
        let x = self.lng.to_radians() * EARTH_RADIUS;
        let y = ((PI / 4.0 + lat.to_radians() / 2.0).tan().ln()) * EARTH_RADIUS;
        Point::new(x, y)
    }

    /// Creates LatLng from Web Mercator coordinates
    pub fn from_mercator(point: Point) -> Self {
        let lng = (point.x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        Self::new(lat, lng)
    }
}

/// Represents a point in projected or geographic map units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Reference ellipsoid used to place geocentric tiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub radius_equator: f64,
    pub radius_polar: f64,
}

impl Ellipsoid {
    pub fn new(radius_equator: f64, radius_polar: f64) -> Self {
        Self {
            radius_equator,
            radius_polar,
        }
    }

    pub fn wgs84() -> Self {
        Self::new(EARTH_RADIUS, EARTH_RADIUS_POLAR)
    }

    fn eccentricity_squared(&self) -> f64 {
        let flattening = (self.radius_equator - self.radius_polar) / self.radius_equator;
        2.0 * flattening - flattening * flattening
    }

    /// Latitude and longitude in radians, height in meters.
    pub fn lat_long_height_to_xyz(&self, latitude: f64, longitude: f64, height: f64) -> Vector3<f64> {
        let sin_lat = latitude.sin();
        let cos_lat = latitude.cos();
        let e2 = self.eccentricity_squared();
        let n = self.radius_equator / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        Vector3::new(
            (n + height) * cos_lat * longitude.cos(),
            (n + height) * cos_lat * longitude.sin(),
            (n * (1.0 - e2) + height) * sin_lat,
        )
    }

    /// Inverse of [`Ellipsoid::lat_long_height_to_xyz`]; returns (lat, lon, height).
    pub fn xyz_to_lat_long_height(&self, xyz: &Vector3<f64>) -> (f64, f64, f64) {
        let e2 = self.eccentricity_squared();
        let p = (xyz.x * xyz.x + xyz.y * xyz.y).sqrt();
        let theta = (xyz.z * self.radius_equator).atan2(p * self.radius_polar);
        let ep2 = (self.radius_equator * self.radius_equator
            - self.radius_polar * self.radius_polar)
            / (self.radius_polar * self.radius_polar);

        let sin_theta = theta.sin();
        let cos_theta = theta.cos();

        let latitude = (xyz.z + ep2 * self.radius_polar * sin_theta.powi(3))
            .atan2(p - e2 * self.radius_equator * cos_theta.powi(3));
        let longitude = xyz.y.atan2(xyz.x);

        let sin_lat = latitude.sin();
        let n = self.radius_equator / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let height = if latitude.cos().abs() > 1e-12 {
            p / latitude.cos() - n
        } else {
            xyz.z.abs() - self.radius_polar
        };

        (latitude, longitude, height)
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::wgs84()
    }
}
