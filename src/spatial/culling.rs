//! Visibility helpers for geocentric tiles.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    constants::CLUSTER_CULLING_CUTOFF,
    core::{geo::Ellipsoid, srs::SpatialReference},
    data::heightfield::{is_no_data, HeightField},
};

/// Horizon cone for a patch of the globe: the patch cannot be seen from any
/// eye point whose direction from `control_point` deviates from `normal` by
/// more than the cone allows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterCullingCone {
    pub control_point: Vector3<f64>,
    pub normal: Vector3<f64>,
    /// Minimum dot product between `normal` and the direction to the eye.
    pub deviation: f64,
    /// Within this distance of the control point nothing is culled.
    pub radius: f64,
}

impl ClusterCullingCone {
    /// Builds the cone for a heightfield whose sample coordinates are in
    /// `srs`. Returns `None` when the patch spans too much of the globe for a
    /// cone to be meaningful.
    pub fn compute(
        hf: &HeightField,
        srs: &SpatialReference,
        ellipsoid: &Ellipsoid,
        vertical_scale: f32,
    ) -> Option<Self> {
        let globe_radius = ellipsoid.radius_polar;
        let geographic = srs.geographic();
        let to_radians = |x: f64, y: f64| {
            srs.transform_point(x, y, &geographic)
                .map(|(lon, lat)| (lat.to_radians(), lon.to_radians()))
        };

        let [ox, oy, _] = hf.origin();
        let (mid_lat, mid_lon) = to_radians(
            ox + hf.x_interval() * (hf.num_columns() - 1) as f64 * 0.5,
            oy + hf.y_interval() * (hf.num_rows() - 1) as f64 * 0.5,
        )?;
        let center = ellipsoid.lat_long_height_to_xyz(mid_lat, mid_lon, 0.0);
        let normal = Vector3::new(
            mid_lat.cos() * mid_lon.cos(),
            mid_lat.cos() * mid_lon.sin(),
            mid_lat.sin(),
        );

        let mut min_dot = 1.0_f64;
        let mut max_height = 0.0_f64;
        let mut max_radius = 0.0_f64;

        for row in 0..hf.num_rows() {
            let y = oy + hf.y_interval() * row as f64;
            for col in 0..hf.num_columns() {
                let x = ox + hf.x_interval() * col as f64;
                let raw = hf.height(col, row);
                let height = if is_no_data(raw) { 0.0 } else { (raw * vertical_scale) as f64 };

                let (lat, lon) = to_radians(x, y)?;
                let v = ellipsoid.lat_long_height_to_xyz(lat, lon, height);
                let d = (v - center).norm();

                let theta = (globe_radius / (globe_radius + height.abs())).acos();
                let phi = 2.0 * (d * 0.5 / globe_radius).min(1.0).asin();
                let beta = theta + phi;
                if phi >= CLUSTER_CULLING_CUTOFF || beta >= CLUSTER_CULLING_CUTOFF {
                    return None;
                }

                min_dot = min_dot.min(-beta.sin());
                max_height = max_height.max(globe_radius * (1.0 / beta.cos() - 1.0));
                max_radius = max_radius.max(globe_radius * beta.tan());
            }
        }

        Some(Self {
            control_point: center + normal * max_height,
            normal,
            deviation: min_dot,
            radius: max_radius,
        })
    }

    /// True when nothing of the patch can be visible from `eye`.
    pub fn cull(&self, eye: &Vector3<f64>) -> bool {
        let eye_cp = eye - self.control_point;
        let distance = eye_cp.norm();
        if distance < self.radius {
            return false;
        }
        eye_cp.dot(&self.normal) / distance < self.deviation
    }
}

/// World-space bounding sphere of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vector3<f64>,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: Vector3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere about the centroid of `points` that holds them all.
    pub fn from_points(points: &[Vector3<f64>]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let center = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / points.len() as f64;
        let radius = points
            .iter()
            .map(|p| (p - center).norm())
            .fold(0.0_f64, f64::max);
        Some(Self { center, radius })
    }

    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        (point - self.center).norm() <= self.radius
    }

    pub fn distance_to(&self, point: &Vector3<f64>) -> f64 {
        ((point - self.center).norm() - self.radius).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{extent::GeoExtent, profile::Profile, tile_key::TileKey};
    use approx::assert_relative_eq;

    fn flat_patch(level: u32, x: u32, y: u32) -> HeightField {
        let key = TileKey::new(level, x, y, Profile::global_geodetic());
        HeightField::create_reference(&key.extent(), 8, 8)
    }

    #[test]
    fn test_cone_for_small_patch() {
        let hf = flat_patch(6, 40, 20);
        let ellipsoid = Ellipsoid::wgs84();
        let cone = ClusterCullingCone::compute(&hf, &SpatialReference::Geographic, &ellipsoid, 1.0)
            .unwrap();

        assert_relative_eq!(cone.normal.norm(), 1.0, epsilon = 1e-12);
        assert!(cone.deviation < 0.0 && cone.deviation > -1.0);
        assert!(cone.radius > 0.0);

        // Straight above the patch it is visible; from the far side of the
        // globe it is not.
        let (lon, lat) = hf.center();
        let above = ellipsoid.lat_long_height_to_xyz(lat.to_radians(), lon.to_radians(), 1.0e6);
        assert!(!cone.cull(&above));
        let antipode = -above;
        assert!(cone.cull(&antipode));
    }

    #[test]
    fn test_hemisphere_patch_has_no_cone() {
        let hf = flat_patch(0, 0, 0);
        assert!(ClusterCullingCone::compute(
            &hf,
            &SpatialReference::Geographic,
            &Ellipsoid::wgs84(),
            1.0
        )
        .is_none());
    }

    #[test]
    fn test_mercator_samples_are_converted() {
        let extent = GeoExtent::new(SpatialReference::SphericalMercator, 0.0, 0.0, 100_000.0, 100_000.0);
        let hf = HeightField::create_reference(&extent, 4, 4);
        let cone = ClusterCullingCone::compute(
            &hf,
            &SpatialReference::SphericalMercator,
            &Ellipsoid::wgs84(),
            1.0,
        );
        assert!(cone.is_some());
    }

    #[test]
    fn test_bounding_sphere() {
        let points = [
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        ];
        let sphere = BoundingSphere::from_points(&points).unwrap();
        assert_relative_eq!(sphere.radius, 1.0);
        assert!(sphere.contains(&Vector3::new(0.5, 0.5, 0.0)));
        assert_relative_eq!(sphere.distance_to(&Vector3::new(3.0, 0.0, 0.0)), 2.0);
        assert!(BoundingSphere::from_points(&[]).is_none());
    }
}
