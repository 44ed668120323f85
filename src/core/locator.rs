//! Locators map a tile's unit parametric space onto model coordinates.
//!
//! Local coordinates run from (0, 0) at the south-west corner of the extent to
//! (1, 1) at the north-east corner. Model coordinates are either the extent's
//! own units (geographic degrees or projected meters) or, for geocentric
//! locators, earth-centered XYZ.

use nalgebra::{Matrix4, Vector3, Vector4};

use crate::core::{
    extent::GeoExtent, geo::Ellipsoid, map::MapOptions, srs::SpatialReference,
    tile_key::TileKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystemType {
    Geographic,
    Projected,
    Geocentric,
}

/// Builds the matrix that scales the unit square onto an extent.
pub fn transform_from_extents(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Matrix4<f64> {
    #[rustfmt::skip]
    let transform = Matrix4::new(
        max_x - min_x, 0.0,           0.0, min_x,
        0.0,           max_y - min_y, 0.0, min_y,
        0.0,           0.0,           1.0, 0.0,
        0.0,           0.0,           0.0, 1.0,
    );
    transform
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocator {
    extent: GeoExtent,
    transform: Matrix4<f64>,
    inverse: Matrix4<f64>,
    cs_type: CoordinateSystemType,
    ellipsoid: Ellipsoid,
}

impl GeoLocator {
    /// A locator spanning `extent`. Geographic extents produce geographic
    /// locators unless `plate_carre` asks for a flat projected tessellation.
    pub fn for_extent(extent: &GeoExtent, plate_carre: bool, ellipsoid: Ellipsoid) -> Self {
        let cs_type = if extent.srs().is_geographic() && !plate_carre {
            CoordinateSystemType::Geographic
        } else {
            CoordinateSystemType::Projected
        };
        let transform = transform_from_extents(extent.xmin, extent.ymin, extent.xmax, extent.ymax);

        Self {
            extent: extent.clone(),
            inverse: transform.try_inverse().unwrap_or_else(Matrix4::identity),
            transform,
            cs_type,
            ellipsoid,
        }
    }

    /// The locator for `key` on a map with the given options.
    pub fn create_for_key(key: &TileKey, options: &MapOptions) -> Self {
        let mut locator = Self::for_extent(&key.extent(), options.is_plate_carre(), options.ellipsoid);
        if options.is_geocentric() {
            locator.set_coordinate_system_type(CoordinateSystemType::Geocentric);
        }
        locator
    }

    pub fn extent(&self) -> &GeoExtent {
        &self.extent
    }

    pub fn transform(&self) -> &Matrix4<f64> {
        &self.transform
    }

    pub fn coordinate_system_type(&self) -> CoordinateSystemType {
        self.cs_type
    }

    pub fn set_coordinate_system_type(&mut self, cs_type: CoordinateSystemType) {
        self.cs_type = cs_type;
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Local (u, v, height) into the extent's own units.
    fn local_to_extent(&self, local: &Vector3<f64>) -> Vector3<f64> {
        let v = self.transform * Vector4::new(local.x, local.y, local.z, 1.0);
        Vector3::new(v.x, v.y, v.z)
    }

    fn extent_to_local(&self, p: &Vector3<f64>) -> Vector3<f64> {
        let v = self.inverse * Vector4::new(p.x, p.y, p.z, 1.0);
        Vector3::new(v.x, v.y, v.z)
    }

    /// Maps extent units to model space, lifting onto the ellipsoid when geocentric.
    fn extent_to_model(&self, p: Vector3<f64>) -> Vector3<f64> {
        match self.cs_type {
            CoordinateSystemType::Geocentric => {
                let (lon, lat) = if self.extent.srs().is_geographic() {
                    (p.x, p.y)
                } else {
                    match self
                        .extent
                        .srs()
                        .transform_point(p.x, p.y, &SpatialReference::Geographic)
                    {
                        Some(ll) => ll,
                        None => return p,
                    }
                };
                self.ellipsoid
                    .lat_long_height_to_xyz(lat.to_radians(), lon.to_radians(), p.z)
            }
            _ => p,
        }
    }

    fn model_to_extent(&self, world: &Vector3<f64>) -> Vector3<f64> {
        match self.cs_type {
            CoordinateSystemType::Geocentric => {
                let (lat, lon, height) = self.ellipsoid.xyz_to_lat_long_height(world);
                let (lon, lat) = (lon.to_degrees(), lat.to_degrees());
                if self.extent.srs().is_geographic() {
                    Vector3::new(lon, lat, height)
                } else {
                    let (x, y) = SpatialReference::Geographic
                        .transform_point(lon, lat, self.extent.srs())
                        .unwrap_or((lon, lat));
                    Vector3::new(x, y, height)
                }
            }
            _ => *world,
        }
    }

    pub fn convert_local_to_model(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.extent_to_model(self.local_to_extent(local))
    }

    pub fn convert_model_to_local(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.extent_to_local(&self.model_to_extent(world))
    }
}

/// Places a spherical-mercator image over a geographic tile without
/// reprojecting its pixels.
///
/// The wrapped locator spans the image's extent transformed to geographic
/// coordinates; local coordinates, however, stay linear in mercator meters so
/// they address the image's texels directly.
#[derive(Debug, Clone, PartialEq)]
pub struct MercatorLocator {
    base: GeoLocator,
    mercator_extent: GeoExtent,
}

impl MercatorLocator {
    pub fn new(base: GeoLocator, mercator_extent: GeoExtent) -> Self {
        Self {
            base,
            mercator_extent,
        }
    }

    pub fn base(&self) -> &GeoLocator {
        &self.base
    }

    pub fn mercator_extent(&self) -> &GeoExtent {
        &self.mercator_extent
    }

    pub fn convert_local_to_model(&self, local: &Vector3<f64>) -> Vector3<f64> {
        let merc = &self.mercator_extent;
        let mx = merc.xmin + local.x * merc.width();
        let my = merc.ymin + local.y * merc.height();
        let (lon, lat) = merc
            .srs()
            .transform_point(mx, my, &SpatialReference::Geographic)
            .unwrap_or((mx, my));

        let geo = Vector3::new(lon, lat, local.z);
        match self.base.cs_type {
            CoordinateSystemType::Geocentric => self
                .base
                .ellipsoid
                .lat_long_height_to_xyz(lat.to_radians(), lon.to_radians(), local.z),
            _ => geo,
        }
    }

    pub fn convert_model_to_local(&self, world: &Vector3<f64>) -> Vector3<f64> {
        let geo = match self.base.cs_type {
            CoordinateSystemType::Geocentric => {
                let (lat, lon, height) = self.base.ellipsoid.xyz_to_lat_long_height(world);
                Vector3::new(lon.to_degrees(), lat.to_degrees(), height)
            }
            _ => *world,
        };

        let merc = &self.mercator_extent;
        let (mx, my) = SpatialReference::Geographic
            .transform_point(geo.x, geo.y, merc.srs())
            .unwrap_or((geo.x, geo.y));
        Vector3::new(
            (mx - merc.xmin) / merc.width(),
            (my - merc.ymin) / merc.height(),
            geo.z,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Locator {
    Geo(GeoLocator),
    Mercator(MercatorLocator),
}

impl Locator {
    pub fn geo(&self) -> &GeoLocator {
        match self {
            Self::Geo(locator) => locator,
            Self::Mercator(locator) => &locator.base,
        }
    }

    pub fn is_mercator(&self) -> bool {
        matches!(self, Self::Mercator(_))
    }

    pub fn coordinate_system_type(&self) -> CoordinateSystemType {
        self.geo().cs_type
    }

    pub fn set_coordinate_system_type(&mut self, cs_type: CoordinateSystemType) {
        match self {
            Self::Geo(locator) => locator.set_coordinate_system_type(cs_type),
            Self::Mercator(locator) => locator.base.set_coordinate_system_type(cs_type),
        }
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.geo().ellipsoid
    }

    pub fn convert_local_to_model(&self, local: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Geo(locator) => locator.convert_local_to_model(local),
            Self::Mercator(locator) => locator.convert_local_to_model(local),
        }
    }

    pub fn convert_model_to_local(&self, world: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Geo(locator) => locator.convert_model_to_local(world),
            Self::Mercator(locator) => locator.convert_model_to_local(world),
        }
    }
}

impl From<GeoLocator> for Locator {
    fn from(locator: GeoLocator) -> Self {
        Self::Geo(locator)
    }
}

impl From<MercatorLocator> for Locator {
    fn from(locator: MercatorLocator) -> Self {
        Self::Mercator(locator)
    }
}
