//! Scene nodes produced by the tile factory.

use std::sync::Arc;

use nalgebra::Vector3;

use crate::{
    constants::FULL_RANGE,
    core::config::RangeMode,
    spatial::culling::ClusterCullingCone,
    terrain::tile::CustomTile,
};

/// What the factory hands back for a key.
#[derive(Debug, Clone)]
pub enum TileNode {
    /// A bare tile, not wrapped for paging.
    Tile(Arc<CustomTile>),
    /// A tile inside a pageable LOD node.
    Paged(Box<PagedLod>),
    /// The four children of a subdivided key, in quadrant order.
    Group(Box<[Option<TileNode>; 4]>),
}

impl TileNode {
    /// The tile directly held by this node, if any.
    pub fn tile(&self) -> Option<&Arc<CustomTile>> {
        match self {
            TileNode::Tile(tile) => Some(tile),
            TileNode::Paged(plod) => Some(plod.tile()),
            TileNode::Group(_) => None,
        }
    }

    pub fn as_paged(&self) -> Option<&PagedLod> {
        match self {
            TileNode::Paged(plod) => Some(plod),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&[Option<TileNode>; 4]> {
        match self {
            TileNode::Group(children) => Some(children),
            _ => None,
        }
    }

    /// Every tile reachable from this node, depth first.
    pub fn tiles(&self) -> Vec<Arc<CustomTile>> {
        let mut out = Vec::new();
        self.collect_tiles(&mut out);
        out
    }

    fn collect_tiles(&self, out: &mut Vec<Arc<CustomTile>>) {
        match self {
            TileNode::Tile(tile) => out.push(tile.clone()),
            TileNode::Paged(plod) => out.push(plod.tile().clone()),
            TileNode::Group(children) => {
                for child in children.iter().flatten() {
                    child.collect_tiles(out);
                }
            }
        }
    }
}

/// Where the scene is viewed from when choosing levels of detail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodView {
    pub eye: Vector3<f64>,
    /// Screen pixels covered by one radian of view angle.
    pub pixels_per_radian: f64,
}

impl LodView {
    pub fn new(eye: Vector3<f64>, pixels_per_radian: f64) -> Self {
        Self { eye, pixels_per_radian }
    }

    /// A 1024-pixel viewport with a 60 degree field of view.
    pub fn at(eye: Vector3<f64>) -> Self {
        Self::new(eye, 1024.0 / std::f64::consts::FRAC_PI_3)
    }
}

/// A tile plus an optional reference to its next-level subdivision.
///
/// The tile is shown over `tile_range`; the child, addressed by a URI the
/// pager resolves, over `0..min_range`.
#[derive(Debug, Clone)]
pub struct PagedLod {
    tile: Arc<CustomTile>,
    center: Vector3<f64>,
    radius: f64,
    range_mode: RangeMode,
    tile_range: (f64, f64),
    child_uri: Option<String>,
    requires_backfill: bool,
    cluster_culling: Option<ClusterCullingCone>,
}

impl PagedLod {
    /// Wraps `tile` with the given visibility range and no child.
    pub fn new(tile: Arc<CustomTile>, range_mode: RangeMode, min_range: f64, max_range: f64) -> Self {
        let bound = *tile.bound();
        Self {
            tile,
            center: bound.center,
            radius: bound.radius,
            range_mode,
            tile_range: (min_range, max_range),
            child_uri: None,
            requires_backfill: false,
            cluster_culling: None,
        }
    }

    /// Advertises the next level under `uri`.
    pub fn set_child(&mut self, uri: String) {
        self.child_uri = Some(uri);
    }

    /// The tile occupies the full range and is never subdivided.
    pub fn set_full_range(&mut self) {
        self.child_uri = None;
        self.tile_range = (0.0, FULL_RANGE);
    }

    pub fn tile(&self) -> &Arc<CustomTile> {
        &self.tile
    }

    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn range_mode(&self) -> RangeMode {
        self.range_mode
    }

    pub fn tile_range(&self) -> (f64, f64) {
        self.tile_range
    }

    pub fn min_range(&self) -> f64 {
        self.tile_range.0
    }

    pub fn child_uri(&self) -> Option<&str> {
        self.child_uri.as_deref()
    }

    pub fn child_range(&self) -> Option<(f64, f64)> {
        self.child_uri.as_ref().map(|_| (0.0, self.tile_range.0))
    }

    pub fn requires_backfill(&self) -> bool {
        self.requires_backfill
    }

    pub fn set_requires_backfill(&mut self, backfill: bool) {
        self.requires_backfill = backfill;
    }

    pub fn cluster_culling(&self) -> Option<&ClusterCullingCone> {
        self.cluster_culling.as_ref()
    }

    pub fn set_cluster_culling(&mut self, cone: Option<ClusterCullingCone>) {
        self.cluster_culling = cone;
    }

    /// True when the node's or the tile's horizon cone hides it from `eye`.
    pub fn is_culled(&self, eye: &Vector3<f64>) -> bool {
        self.cluster_culling
            .as_ref()
            .or_else(|| self.tile.cluster_culling())
            .map_or(false, |cone| cone.cull(eye))
    }

    /// Whether the child should replace the tile for this view.
    ///
    /// Distance mode compares the eye distance against `0..min_range`. Pixel
    /// mode compares the tile's on-screen size instead; the child is wanted
    /// once the tile covers more than `min_range` pixels.
    pub fn wants_child(&self, view: &LodView) -> bool {
        if self.child_uri.is_none() || self.is_culled(&view.eye) {
            return false;
        }

        let distance = (view.eye - self.center).norm();
        match self.range_mode {
            RangeMode::DistanceFromEyePoint => distance < self.tile_range.0,
            RangeMode::PixelSizeOnScreen => {
                let pixels = if distance <= f64::EPSILON {
                    f64::INFINITY
                } else {
                    2.0 * self.radius / distance * view.pixels_per_radian
                };
                pixels > self.tile_range.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{locator::GeoLocator, map::MapOptions, profile::Profile, tile_key::TileKey},
        terrain::tile::TerrainTechnique,
    };

    fn paged(level: u32, x: u32, y: u32) -> PagedLod {
        let key = TileKey::new(level, x, y, Profile::global_geodetic());
        let locator = GeoLocator::create_for_key(&key, &MapOptions::default());
        let mut tile = CustomTile::new(key, locator.into(), TerrainTechnique::default());
        let bound = tile.compute_bound();
        PagedLod::new(
            Arc::new(tile),
            RangeMode::DistanceFromEyePoint,
            bound.radius * 6.0,
            crate::constants::MAX_TILE_RANGE,
        )
    }

    #[test]
    fn test_child_range_follows_min_range() {
        let mut plod = paged(2, 1, 1);
        assert!(plod.child_range().is_none());

        plod.set_child("2_1_1.0.osgearth_osgterrain_tile".into());
        let (near, far) = plod.child_range().unwrap();
        assert_eq!(near, 0.0);
        assert_eq!(far, plod.min_range());

        plod.set_full_range();
        assert!(plod.child_uri().is_none());
        assert_eq!(plod.tile_range(), (0.0, FULL_RANGE));
    }

    #[test]
    fn test_wants_child_by_distance() {
        let mut plod = paged(3, 4, 2);
        let center = *plod.center();
        let near = LodView::at(center * 1.01);
        let far = LodView::at(center * 10.0);

        assert!(!plod.wants_child(&near));
        plod.set_child("3_4_2.0.osgearth_osgterrain_tile".into());
        assert!(plod.wants_child(&near));
        assert!(!plod.wants_child(&far));
    }

    #[test]
    fn test_group_collects_tiles() {
        let a = paged(1, 0, 0);
        let b = paged(1, 1, 0);
        let group = TileNode::Group(Box::new([
            Some(TileNode::Paged(Box::new(a))),
            None,
            Some(TileNode::Tile(b.tile().clone())),
            None,
        ]));

        assert!(group.tile().is_none());
        assert_eq!(group.tiles().len(), 2);
        assert_eq!(group.children().map(|c| c.iter().flatten().count()), Some(2));
    }
}
