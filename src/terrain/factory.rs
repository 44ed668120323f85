//! Builds terrain tiles for tile keys.
//!
//! A tile is either *populated* from the map's layers or a *placeholder*
//! derived from the nearest registered ancestor while real data streams in.
//! Either way it is wrapped in a [`PagedLod`] that advertises the next level
//! through a child URI.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    constants::{
        DEFAULT_TILE_PIXELS, DEGREES_PER_METER_AT_EQUATOR, EMPTY_HEIGHTFIELD_SIZE, MAX_TILE_RANGE,
        SYNTHETIC_ELEVATION_LOD,
    },
    core::{
        config::{RangeMode, TerrainOptions},
        locator::{CoordinateSystemType, GeoLocator, Locator, MercatorLocator},
        map::{Map, MapOptions},
        tile_key::TileKey,
    },
    data::{heightfield::HeightField, image::GeoImage},
    layers::map_layer::MapLayer,
    spatial::culling::ClusterCullingCone,
    terrain::{
        blacklist::Blacklist,
        node::{PagedLod, TileNode},
        registry::CustomTerrain,
        tile::{CustomTile, HeightFieldLayer, ImageLayer},
        uri::create_uri,
    },
    tiles::l2_cache::L2Cache,
    traits::ProgressCallback,
};

/// Outcome of a tile build.
#[derive(Debug, Clone)]
pub struct CreatedTile {
    pub node: Option<TileNode>,
    /// Whether some layer produced real data for the key. Placeholders and
    /// builds on a map without layers always count as valid.
    pub valid_data: bool,
}

impl CreatedTile {
    fn missing() -> Self {
        Self {
            node: None,
            valid_data: false,
        }
    }
}

#[derive(Debug)]
pub struct TileFactory {
    options: TerrainOptions,
    l2_cache: Option<L2Cache>,
    blacklist: Arc<Blacklist>,
}

impl TileFactory {
    pub fn new(options: TerrainOptions) -> Self {
        let blacklist = Arc::new(Blacklist::new(options.blacklist_threshold));
        Self::with_blacklist(options, blacklist)
    }

    /// A factory sharing an existing blacklist, typically the pager's.
    pub fn with_blacklist(options: TerrainOptions, blacklist: Arc<Blacklist>) -> Self {
        info!(
            "Loading policy mode = {}, threads per core = {}",
            options.loading_policy.mode, options.loading_policy.num_threads_per_core
        );

        let l2_cache = options.l2_cache.enabled.then(|| {
            debug!("L2 image cache enabled, capacity {}", options.l2_cache.capacity);
            L2Cache::new(options.l2_cache.capacity)
        });

        Self {
            options,
            l2_cache,
            blacklist,
        }
    }

    pub fn options(&self) -> &TerrainOptions {
        &self.options
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    pub fn l2_cache(&self) -> Option<&L2Cache> {
        self.l2_cache.as_ref()
    }

    /// Builds the tile for `key`.
    ///
    /// Without `populate_layers` a placeholder is derived from the nearest
    /// registered ancestor and always reports valid data. Otherwise the
    /// tile is populated from the map's layers.
    pub fn create_tile(
        &self,
        map: &Map,
        terrain: &CustomTerrain,
        key: &TileKey,
        populate_layers: bool,
        wrap_in_paged_lod: bool,
        fallback: bool,
    ) -> CreatedTile {
        if !populate_layers {
            return CreatedTile {
                node: self.create_placeholder_tile(map, terrain, key),
                valid_data: true,
            };
        }
        self.create_populated_tile(map, terrain, key, wrap_in_paged_lod, fallback)
    }

    /// Builds the four children of `key` in quadrant order.
    ///
    /// Returns `None` when no quadrant has real data, which tells the caller
    /// to stop subdividing. Quadrants that failed while a sibling succeeded
    /// are retried with fallback data.
    pub fn create_sub_tiles(
        &self,
        map: &Map,
        terrain: &CustomTerrain,
        key: &TileKey,
        populate_layers: bool,
    ) -> Option<TileNode> {
        let children = key.children();
        let mut quadrants: [CreatedTile; 4] = std::array::from_fn(|i| {
            self.create_tile(map, terrain, &children[i], populate_layers, true, false)
        });

        if !quadrants.iter().any(|q| q.valid_data) {
            debug!(
                "Couldn't create any quadrants for {} time to stop subdividing!",
                key
            );
            return None;
        }

        for (child, quadrant) in children.iter().zip(quadrants.iter_mut()) {
            if quadrant.node.is_none() {
                *quadrant = self.create_tile(map, terrain, child, populate_layers, true, true);
            }
        }

        Some(TileNode::Group(Box::new(quadrants.map(|q| q.node))))
    }

    /// Builds a tile from the data of its nearest registered ancestor.
    pub fn create_placeholder_tile(
        &self,
        map: &Map,
        terrain: &CustomTerrain,
        key: &TileKey,
    ) -> Option<TileNode> {
        let Some(ancestor) = key
            .ancestors()
            .find_map(|ancestor_key| terrain.get_custom_tile(&ancestor_key.tile_id()))
        else {
            warn!("cannot find ancestor tile for {}", key);
            return None;
        };

        let layers = map.read_layers();
        let map_options = map.options();
        let has_elevation = layers.has_heightfield_layers();

        let locator: Locator = GeoLocator::create_for_key(key, map_options).into();
        let mut tile = self.new_tile(terrain, key, locator.clone());

        let inherited = {
            let parent = ancestor.read_layers();
            let target = tile.layers_mut();
            target.color = parent.color.clone();

            match parent.elevation.as_ref() {
                Some(elevation) => {
                    let parent_hf = &elevation.heightfield;
                    let mut hf = parent_hf.create_sub_sample(&ancestor.key().extent(), &key.extent());
                    hf.set_skirt_height(parent_hf.skirt_height() / 2.0);
                    target.elevation = Some(HeightFieldLayer {
                        heightfield: hf,
                        locator: locator.clone(),
                    });
                    target.elevation_lod = parent.elevation_lod;
                    true
                }
                None => {
                    let hf = self.create_empty_height_field(
                        key,
                        EMPTY_HEIGHTFIELD_SIZE,
                        EMPTY_HEIGHTFIELD_SIZE,
                    );
                    target.elevation = Some(HeightFieldLayer {
                        heightfield: hf,
                        locator: locator.clone(),
                    });
                    target.elevation_lod = SYNTHETIC_ELEVATION_LOD;
                    false
                }
            }
        };

        let bound = tile.compute_bound();
        let min_range = bound.radius * self.options.min_tile_range_factor;

        match tile.layers_mut().elevation.as_mut() {
            Some(elevation) => {
                let hf = &mut elevation.heightfield;
                hf.set_skirt_height((bound.radius * self.options.height_field_skirt_ratio) as f32);
                // Inherited heights were already converted when the ancestor was built.
                if map_options.is_plate_carre() && !inherited {
                    hf.scale_to_degrees();
                }
            }
            None => warn!("placeholder for {} is missing its elevation layer", key),
        }

        if self.options.loading_policy.is_async() {
            tile.set_use_layer_requests(true);
            tile.set_has_elevation_hint(has_elevation);
        }

        let cone = tile
            .layers_mut()
            .elevation
            .as_ref()
            .and_then(|elevation| {
                self.create_cluster_culling(map_options, &elevation.heightfield, key)
            });

        tile.set_terrain_revision(terrain.revision());
        let tile = Arc::new(tile);
        terrain.register_tile(&tile);

        let mut plod = PagedLod::new(tile, self.options.range_mode, min_range, MAX_TILE_RANGE);
        if key.level() < self.options.max_lod {
            plod.set_child(create_uri(terrain.engine_id(), key));
        } else {
            plod.set_full_range();
        }
        plod.set_requires_backfill(true);
        plod.set_cluster_culling(cone);

        Some(TileNode::Paged(Box::new(plod)))
    }

    /// Builds a tile from real layer data, degrading to ancestor or
    /// synthesized data for whatever is missing.
    ///
    /// With `fallback` off, a key no layer has data for yields no node.
    pub fn create_populated_tile(
        &self,
        map: &Map,
        terrain: &CustomTerrain,
        key: &TileKey,
        wrap_in_paged_lod: bool,
        fallback: bool,
    ) -> CreatedTile {
        let layers = map.read_layers();
        let map_options = map.options();
        let image_layers = layers.image_layers();
        let has_heightfield_layers = layers.has_heightfield_layers();
        let empty_map = image_layers.is_empty() && !has_heightfield_layers;

        // One layer opting out disables the fast path for the whole tile.
        let use_mercator_locator = image_layers
            .iter()
            .all(|layer| layer.use_mercator_fast_path() != Some(false));

        let mut images: Vec<Option<(GeoImage, u32)>> = image_layers
            .iter()
            .map(|layer| {
                if layer.is_key_valid(key) {
                    self.layer_image(layer, key).map(|image| (image, key.level()))
                } else {
                    None
                }
            })
            .collect();

        let interpolation = self.options.elevation_interpolation;
        let mut heightfield = if has_heightfield_layers {
            layers.create_heightfield(key, false, interpolation)
        } else {
            None
        };
        let mut elevation_lod = key.level() as i32;

        // Keeps a hemisphere from going missing when elevation only covers an inset.
        if heightfield.is_none() && map_options.is_geocentric() && key.level() <= 1 {
            heightfield = Some(self.create_empty_height_field(
                key,
                EMPTY_HEIGHTFIELD_SIZE,
                EMPTY_HEIGHTFIELD_SIZE,
            ));
            elevation_lod = SYNTHETIC_ELEVATION_LOD;
        }
        let mut has_elevation = heightfield.is_some();

        let valid_data = heightfield.is_some() || images.iter().any(Option::is_some) || empty_map;
        if !valid_data && !fallback {
            debug!("no layer has data for {}, not building it", key);
            return CreatedTile::missing();
        }

        for (layer, slot) in image_layers.iter().zip(images.iter_mut()) {
            if slot.is_none() {
                *slot = self
                    .find_valid_geo_image(layer, key, None)
                    .or_else(|| Some((GeoImage::transparent(key.extent()), key.level())));
            }
        }

        let mut heightfield = match heightfield {
            Some(hf) => hf,
            None if !has_heightfield_layers => {
                elevation_lod = SYNTHETIC_ELEVATION_LOD;
                self.create_empty_height_field(key, EMPTY_HEIGHTFIELD_SIZE, EMPTY_HEIGHTFIELD_SIZE)
            }
            None => match layers.create_heightfield(key, true, interpolation) {
                Some(hf) => {
                    has_elevation = true;
                    elevation_lod = key.level() as i32 - 1;
                    hf
                }
                None => {
                    elevation_lod = SYNTHETIC_ELEVATION_LOD;
                    self.create_empty_height_field(
                        key,
                        EMPTY_HEIGHTFIELD_SIZE,
                        EMPTY_HEIGHTFIELD_SIZE,
                    )
                }
            },
        };

        if map_options.is_plate_carre() {
            heightfield.scale_to_degrees();
        }

        let locator: Locator = GeoLocator::create_for_key(key, map_options).into();
        let mut tile = self.new_tile(terrain, key, locator.clone());
        tile.set_normalize_edges(has_elevation && self.options.normalize_edges);

        let geographic_map = map.profile().srs().is_geographic();
        let mut min_upp = f64::MAX;
        {
            let target = tile.layers_mut();
            target.elevation_lod = elevation_lod;
            target.elevation = Some(HeightFieldLayer {
                heightfield,
                locator: locator.clone(),
            });

            for (index, (layer, slot)) in image_layers.iter().zip(images).enumerate() {
                let Some((image, data_level)) = slot else {
                    continue;
                };
                let fast_path = use_mercator_locator && image.srs().is_mercator() && geographic_map;
                let image = fit_to_key(image, key, fast_path);

                let mut upp = image.units_per_pixel();
                if image.srs().is_mercator() && geographic_map {
                    upp *= DEGREES_PER_METER_AT_EQUATOR;
                }
                min_upp = min_upp.min(upp);

                let image_locator = self.image_locator(map_options, &image, fast_path);
                target.set_color_layer(
                    index,
                    ImageLayer {
                        layer_name: layer.name().to_string(),
                        image,
                        locator: image_locator,
                        min_filter: layer.min_filter(),
                        mag_filter: layer.mag_filter(),
                        data_level,
                    },
                );
            }
        }

        let bound = tile.compute_bound();
        let min_range = match self.options.range_mode {
            RangeMode::DistanceFromEyePoint => bound.radius * self.options.min_tile_range_factor,
            RangeMode::PixelSizeOnScreen => {
                let width = key.extent().width();
                if min_upp == f64::MAX || min_upp <= 0.0 {
                    min_upp = width / DEFAULT_TILE_PIXELS;
                }
                (width / min_upp) * self.options.min_tile_range_factor
            }
        };

        let skirt = (bound.radius * self.options.height_field_skirt_ratio) as f32;
        let cone = tile.layers_mut().elevation.as_mut().and_then(|elevation| {
            elevation.heightfield.set_skirt_height(skirt);
            self.create_cluster_culling(map_options, &elevation.heightfield, key)
        });
        tile.set_cluster_culling(cone);

        let use_layer_requests = self.options.loading_policy.is_async() && key.level() > 0;
        if use_layer_requests {
            tile.set_use_layer_requests(true);
            tile.set_has_elevation_hint(has_elevation);
        }

        tile.set_terrain_revision(terrain.revision());
        let tile = Arc::new(tile);
        terrain.register_tile(&tile);

        if !wrap_in_paged_lod {
            return CreatedTile {
                node: Some(TileNode::Tile(tile)),
                valid_data,
            };
        }

        let mut plod = PagedLod::new(tile, self.options.range_mode, min_range, MAX_TILE_RANGE);
        let child_uri = create_uri(terrain.engine_id(), key);
        if self.blacklist.contains(&child_uri) {
            debug!("{} is blacklisted, not subdividing", child_uri);
            plod.set_full_range();
        } else if valid_data && key.level() < self.options.max_lod {
            plod.set_child(child_uri);
        } else {
            plod.set_full_range();
        }
        plod.set_requires_backfill(use_layer_requests);

        CreatedTile {
            node: Some(TileNode::Paged(Box::new(plod))),
            valid_data,
        }
    }

    /// Builds every level-0 tile of the map's profile.
    pub fn create_root_tiles(&self, map: &Map, terrain: &CustomTerrain) -> Vec<TileNode> {
        let profile = map.profile();
        let (wide, high) = profile.num_tiles(0);
        let mut roots = Vec::with_capacity((wide * high) as usize);
        for y in 0..high {
            for x in 0..wide {
                let key = TileKey::new(0, x, y, profile.clone());
                match self.create_tile(map, terrain, &key, true, true, true).node {
                    Some(node) => roots.push(node),
                    None => warn!("could not build root tile {}", key),
                }
            }
        }
        info!("built {} root tiles for map '{}'", roots.len(), map.options().name);
        roots
    }

    /// Whether every layer's cache already holds the data for `key`.
    ///
    /// A layer without a cache makes the answer `false`; a map without
    /// layers is trivially cached.
    pub fn is_cached(&self, map: &Map, key: &TileKey) -> bool {
        let layers = map.read_layers();
        let map_profile = map.profile();

        layers
            .image_layers()
            .iter()
            .chain(layers.heightfield_layers())
            .all(|layer| {
                let Some(cache) = layer.cache() else {
                    return false;
                };
                let layer_profile = layer.profile();
                let keys = if map_profile.is_equivalent_to(&layer_profile) {
                    vec![key.clone()]
                } else {
                    layer_profile.get_intersecting_tiles(key)
                };
                keys.iter()
                    .filter(|native| layer.is_key_valid(native))
                    .all(|native| cache.is_cached(native, layer.name(), layer.cache_format()))
            })
    }

    /// Whether any layer may have data deeper than `key`.
    pub fn has_more_levels(&self, map: &Map, key: &TileKey) -> bool {
        let layers = map.read_layers();
        layers
            .image_layers()
            .iter()
            .chain(layers.heightfield_layers())
            .any(|layer| layer.max_level().map_or(true, |max| key.level() < max))
    }

    /// Finds an image for `key`, walking up to the first ancestor the layer
    /// has data for. Returns the image with the key it was produced at.
    pub fn create_valid_geo_image(
        &self,
        layer: &MapLayer,
        key: &TileKey,
        progress: Option<&dyn ProgressCallback>,
    ) -> Option<(GeoImage, TileKey)> {
        std::iter::once(key.clone())
            .chain(key.ancestors())
            .filter(|candidate| layer.is_key_valid(candidate))
            .find_map(|candidate| {
                layer
                    .create_image(&candidate, progress)
                    .map(|image| (image, candidate))
            })
    }

    fn find_valid_geo_image(
        &self,
        layer: &MapLayer,
        key: &TileKey,
        progress: Option<&dyn ProgressCallback>,
    ) -> Option<(GeoImage, u32)> {
        let (image, found) = self.create_valid_geo_image(layer, key, progress)?;
        if found.level() < key.level() {
            debug!("layer '{}' image for {} taken from {}", layer.name(), key, found);
        }
        Some((image, found.level()))
    }

    /// A single color layer for `key`. Keys the layer has no data for get a
    /// transparent image.
    pub fn create_image_layer(
        &self,
        map: &Map,
        layer: &MapLayer,
        key: &TileKey,
        progress: Option<&dyn ProgressCallback>,
    ) -> Option<ImageLayer> {
        let map_options = map.options();
        let image = if layer.is_key_valid(key) {
            layer.create_image(key, progress)?
        } else {
            GeoImage::transparent(key.extent())
        };

        let fast_path = layer.use_mercator_fast_path() != Some(false)
            && image.srs().is_mercator()
            && map.profile().srs().is_geographic();
        let image = fit_to_key(image, key, fast_path);
        let locator = self.image_locator(map_options, &image, fast_path);

        Some(ImageLayer {
            layer_name: layer.name().to_string(),
            image,
            locator,
            min_filter: layer.min_filter(),
            mag_filter: layer.mag_filter(),
            data_level: key.level(),
        })
    }

    /// The composite elevation layer for `key`. Unless `exact_only`, missing
    /// data falls back to ancestors and finally to a flat grid.
    pub fn create_height_field_layer(
        &self,
        map: &Map,
        key: &TileKey,
        exact_only: bool,
    ) -> Option<HeightFieldLayer> {
        let map_options = map.options();
        let mut heightfield = match map.create_heightfield(
            key,
            !exact_only,
            self.options.elevation_interpolation,
        ) {
            Some(hf) => hf,
            None if exact_only => return None,
            None => self.create_empty_height_field(key, EMPTY_HEIGHTFIELD_SIZE, EMPTY_HEIGHTFIELD_SIZE),
        };

        if map_options.is_plate_carre() {
            heightfield.scale_to_degrees();
        }

        Some(HeightFieldLayer {
            heightfield,
            locator: GeoLocator::create_for_key(key, map_options).into(),
        })
    }

    /// A flat grid spanning `key`'s extent.
    pub fn create_empty_height_field(&self, key: &TileKey, cols: u32, rows: u32) -> HeightField {
        HeightField::create_reference(&key.extent(), cols.max(2), rows.max(2))
    }

    /// The horizon cone for a tile on a round, non-cube globe.
    pub fn create_cluster_culling(
        &self,
        map_options: &MapOptions,
        heightfield: &HeightField,
        key: &TileKey,
    ) -> Option<ClusterCullingCone> {
        if !map_options.is_geocentric() || map_options.is_cube() {
            return None;
        }
        ClusterCullingCone::compute(
            heightfield,
            key.profile().srs(),
            &map_options.ellipsoid,
            self.options.vertical_scale,
        )
    }

    fn new_tile(&self, terrain: &CustomTerrain, key: &TileKey, locator: Locator) -> CustomTile {
        let mut tile = CustomTile::new(key.clone(), locator, terrain.technique_prototype().clone());
        tile.set_vertical_scale(self.options.vertical_scale);
        tile.set_requires_normals(true);
        tile
    }

    fn layer_image(&self, layer: &MapLayer, key: &TileKey) -> Option<GeoImage> {
        match &self.l2_cache {
            Some(l2) => l2.create_image(layer, key),
            None => layer.create_image(key, None),
        }
    }

    fn image_locator(&self, map_options: &MapOptions, image: &GeoImage, fast_path: bool) -> Locator {
        let extent = image.extent();
        let mut locator: Locator = match fast_path
            .then(|| extent.transform(&extent.srs().geographic()))
            .flatten()
        {
            Some(geographic) => MercatorLocator::new(
                GeoLocator::for_extent(&geographic, false, map_options.ellipsoid),
                extent.clone(),
            )
            .into(),
            None => GeoLocator::for_extent(extent, map_options.is_plate_carre(), map_options.ellipsoid).into(),
        };

        if map_options.is_geocentric() {
            locator.set_coordinate_system_type(CoordinateSystemType::Geocentric);
        }
        locator
    }
}

/// Reprojects `image` onto `key`'s extent unless the mercator locator will
/// place it as is.
fn fit_to_key(image: GeoImage, key: &TileKey, fast_path: bool) -> GeoImage {
    if fast_path || image.srs().is_equivalent_to(key.profile().srs()) {
        return image;
    }
    let (w, h) = (image.width(), image.height());
    image.resample(&key.extent(), w, h).unwrap_or(image)
}

impl Default for TileFactory {
    fn default() -> Self {
        Self::new(TerrainOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            config::LoadingMode,
            map::{MapCoordinateSystem, MapOptions},
            profile::Profile,
        },
        layers::base::MapLayerOptions,
        tiles::{cache::MemoryCache, source::{ProceduralElevationSource, SolidColorSource}},
    };
    use approx::assert_relative_eq;

    fn color_layer(name: &str, color: [u8; 4]) -> MapLayer {
        MapLayer::image(
            MapLayerOptions::new(name),
            Arc::new(SolidColorSource::new(name, Profile::global_geodetic(), color)),
        )
    }

    fn dem_layer(name: &str) -> MapLayer {
        MapLayer::heightfield(
            MapLayerOptions::new(name),
            Arc::new(ProceduralElevationSource::new(name, Profile::global_geodetic()).with_samples(9)),
        )
    }

    fn key(level: u32, x: u32, y: u32) -> TileKey {
        TileKey::new(level, x, y, Profile::global_geodetic())
    }

    #[test]
    fn test_populated_tile_with_layers() {
        let map = Map::new(MapOptions::default());
        map.add_layer(color_layer("base", [0, 0, 255, 255])).unwrap();
        map.add_layer(dem_layer("dem")).unwrap();
        let terrain = CustomTerrain::new();
        let factory = TileFactory::default();

        let created = factory.create_tile(&map, &terrain, &key(2, 3, 1), true, true, false);
        assert!(created.valid_data);
        let node = created.node.unwrap();
        let plod = node.as_paged().unwrap();
        let tile = plod.tile();

        assert_eq!(tile.elevation_lod(), 2);
        assert!(tile.cluster_culling().is_some());
        assert!(plod.child_uri().is_some());
        assert!(!plod.requires_backfill());
        assert_relative_eq!(plod.min_range(), tile.bound().radius * 6.0, max_relative = 1e-9);

        let layers = tile.read_layers();
        assert_eq!(layers.num_color_layers(), 1);
        let skirt = layers.elevation.as_ref().unwrap().heightfield.skirt_height();
        assert_relative_eq!(skirt as f64, tile.bound().radius * 0.05, max_relative = 1e-4);
        assert!(terrain.get_custom_tile(&tile.tile_id()).is_some());
    }

    #[test]
    fn test_missing_data_without_fallback() {
        let map = Map::new(MapOptions::default());
        map.add_layer(MapLayer::image(
            MapLayerOptions::new("shallow").with_levels(None, Some(1)),
            Arc::new(SolidColorSource::new("shallow", Profile::global_geodetic(), [9, 9, 9, 255])),
        ))
        .unwrap();
        let terrain = CustomTerrain::new();
        let factory = TileFactory::default();

        let created = factory.create_tile(&map, &terrain, &key(3, 0, 0), true, true, false);
        assert!(!created.valid_data);
        assert!(created.node.is_none());
        assert!(terrain.is_empty());

        // With fallback the tile is built but advertises no child.
        let created = factory.create_tile(&map, &terrain, &key(3, 0, 0), true, true, true);
        assert!(!created.valid_data);
        let node = created.node.unwrap();
        assert!(node.as_paged().unwrap().child_uri().is_none());
    }

    #[test]
    fn test_max_lod_stops_subdivision() {
        let map = Map::new(MapOptions::default());
        let terrain = CustomTerrain::new();
        let factory = TileFactory::new(TerrainOptions {
            max_lod: 2,
            ..TerrainOptions::default()
        });

        let at_max = factory.create_tile(&map, &terrain, &key(2, 0, 0), true, true, false);
        let plod = at_max.node.unwrap();
        let plod = plod.as_paged().unwrap();
        assert!(plod.child_uri().is_none());
        assert_eq!(plod.tile_range().0, 0.0);

        let below = factory.create_tile(&map, &terrain, &key(1, 0, 0), true, true, false);
        assert!(below.node.unwrap().as_paged().unwrap().child_uri().is_some());
    }

    #[test]
    fn test_blacklisted_uri_is_not_advertised() {
        let map = Map::new(MapOptions::default());
        let terrain = CustomTerrain::new();
        let factory = TileFactory::default();
        let k = key(1, 1, 0);
        factory.blacklist().add(create_uri(terrain.engine_id(), &k));

        let created = factory.create_tile(&map, &terrain, &k, true, true, false);
        assert!(created.valid_data);
        assert!(created.node.unwrap().as_paged().unwrap().child_uri().is_none());
    }

    #[test]
    fn test_unwrapped_tile() {
        let map = Map::new(MapOptions::default());
        let terrain = CustomTerrain::new();
        let factory = TileFactory::default();
        let created = factory.create_tile(&map, &terrain, &key(1, 0, 0), true, false, false);
        assert!(matches!(created.node, Some(TileNode::Tile(_))));
    }

    #[test]
    fn test_placeholder_inherits_ancestor() {
        let map = Map::new(MapOptions::default());
        map.add_layer(color_layer("base", [255, 0, 0, 255])).unwrap();
        map.add_layer(dem_layer("dem")).unwrap();
        let terrain = CustomTerrain::new();
        let factory = TileFactory::new(TerrainOptions {
            loading_policy: crate::core::config::LoadingPolicy {
                mode: LoadingMode::Sequential,
                ..Default::default()
            },
            ..TerrainOptions::default()
        });

        let parent = factory.create_tile(&map, &terrain, &key(2, 1, 1), true, true, false);
        let parent_node = parent.node.unwrap();
        let parent_tile = parent_node.tile().unwrap().clone();

        let child_key = key(4, 4, 4);
        let created = factory.create_tile(&map, &terrain, &child_key, false, true, false);
        assert!(created.valid_data);
        let node = created.node.unwrap();
        let plod = node.as_paged().unwrap();
        assert!(plod.requires_backfill());

        let tile = plod.tile();
        assert!(tile.use_layer_requests());
        assert!(tile.has_elevation_hint());
        assert_eq!(tile.elevation_lod(), parent_tile.elevation_lod());

        let layers = tile.read_layers();
        let parent_layers = parent_tile.read_layers();
        assert_eq!(layers.num_color_layers(), parent_layers.num_color_layers());
        assert_eq!(
            layers.color_layer(0).unwrap().image.extent(),
            parent_layers.color_layer(0).unwrap().image.extent()
        );
    }

    #[test]
    fn test_placeholder_without_ancestor() {
        let map = Map::new(MapOptions::default());
        let terrain = CustomTerrain::new();
        let factory = TileFactory::default();

        let created = factory.create_tile(&map, &terrain, &key(3, 2, 2), false, true, false);
        assert!(created.valid_data);
        assert!(created.node.is_none());
    }

    #[test]
    fn test_synthetic_placeholder_elevation() {
        let map = Map::new(MapOptions::default());
        let terrain = CustomTerrain::new();
        let factory = TileFactory::default();

        let root = factory.create_tile(&map, &terrain, &key(0, 0, 0), true, false, false);
        let root_tile = root.node.unwrap().tile().unwrap().clone();
        // Drop the root's elevation so the placeholder has to synthesize it.
        root_tile.write_layers().elevation = None;

        let created = factory.create_placeholder_tile(&map, &terrain, &key(1, 0, 0)).unwrap();
        let tile = created.tile().unwrap();
        assert_eq!(tile.elevation_lod(), SYNTHETIC_ELEVATION_LOD);
        let layers = tile.read_layers();
        let hf = &layers.elevation.as_ref().unwrap().heightfield;
        assert_eq!(hf.num_columns(), EMPTY_HEIGHTFIELD_SIZE);
        assert_eq!(hf.num_rows(), EMPTY_HEIGHTFIELD_SIZE);
    }

    #[test]
    fn test_cube_and_projected_maps_skip_culling() {
        let factory = TileFactory::default();
        let k = key(4, 3, 3);
        let hf = factory.create_empty_height_field(&k, 8, 8);

        let round = MapOptions::default();
        let cube = MapOptions::new(MapCoordinateSystem::GeocentricCube, Profile::global_geodetic());
        let flat = MapOptions::new(MapCoordinateSystem::Projected, Profile::global_geodetic());

        assert!(factory.create_cluster_culling(&round, &hf, &k).is_some());
        assert!(factory.create_cluster_culling(&cube, &hf, &k).is_none());
        assert!(factory.create_cluster_culling(&flat, &hf, &k).is_none());
    }

    #[test]
    fn test_has_more_levels() {
        let map = Map::new(MapOptions::default());
        let factory = TileFactory::default();
        assert!(!factory.has_more_levels(&map, &key(3, 0, 0)));

        map.add_layer(MapLayer::image(
            MapLayerOptions::new("capped").with_levels(None, Some(4)),
            Arc::new(SolidColorSource::new("capped", Profile::global_geodetic(), [1, 1, 1, 255])),
        ))
        .unwrap();
        assert!(factory.has_more_levels(&map, &key(3, 0, 0)));
        assert!(!factory.has_more_levels(&map, &key(4, 0, 0)));

        map.add_layer(dem_layer("open")).unwrap();
        assert!(factory.has_more_levels(&map, &key(9, 0, 0)));
    }

    #[test]
    fn test_l2_cache_serves_repeat_requests() {
        let map = Map::new(MapOptions::default());
        map.add_layer(color_layer("base", [0, 255, 0, 255])).unwrap();
        let terrain = CustomTerrain::new();
        let mut options = TerrainOptions::default();
        options.l2_cache.enabled = true;
        let factory = TileFactory::new(options);

        let k = key(3, 2, 1);
        let _first = factory.create_tile(&map, &terrain, &k, true, true, false);
        let _second = factory.create_tile(&map, &terrain, &k, true, true, false);

        let stats = factory.l2_cache().unwrap().stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_image_and_height_field_layers() {
        let map = Map::new(MapOptions::default());
        let base = color_layer("base", [10, 20, 30, 255]).with_cache(Arc::new(MemoryCache::new(16)));
        map.add_layer(base).unwrap();
        let factory = TileFactory::default();
        let k = key(2, 0, 0);

        let layers = map.read_layers();
        let image_layer = factory
            .create_image_layer(&map, &layers.image_layers()[0], &k, None)
            .unwrap();
        assert_eq!(image_layer.data_level, 2);
        assert!(!image_layer.image.is_fully_transparent());
        drop(layers);

        assert!(factory.create_height_field_layer(&map, &k, true).is_none());
        let flat = factory.create_height_field_layer(&map, &k, false).unwrap();
        assert_eq!(flat.heightfield.num_columns(), EMPTY_HEIGHTFIELD_SIZE);
    }

    fn mercator_layer(name: &str, options: MapLayerOptions) -> MapLayer {
        MapLayer::image(
            options,
            Arc::new(SolidColorSource::new(name, Profile::spherical_mercator(), [5, 6, 7, 255]).with_tile_size(16)),
        )
    }

    fn sequential_options() -> TerrainOptions {
        TerrainOptions {
            loading_policy: crate::core::config::LoadingPolicy {
                mode: LoadingMode::Sequential,
                ..Default::default()
            },
            ..TerrainOptions::default()
        }
    }

    #[test]
    fn test_image_layer_places_mercator_like_populated_tiles() {
        let map = Map::new(MapOptions::default());
        map.add_layer(mercator_layer("web", MapLayerOptions::new("web"))).unwrap();
        let terrain = CustomTerrain::new();
        let factory = TileFactory::default();
        let k = key(3, 5, 1);

        let created = factory.create_tile(&map, &terrain, &k, true, true, false);
        let node = created.node.unwrap();
        let populated = node.tile().unwrap().read_layers().color_layer(0).unwrap().clone();

        let layers = map.read_layers();
        let single = factory
            .create_image_layer(&map, &layers.image_layers()[0], &k, None)
            .unwrap();

        assert!(single.image.srs().is_mercator());
        assert!(matches!(single.locator, Locator::Mercator(_)));
        assert!(matches!(populated.locator, Locator::Mercator(_)));
        assert_eq!(single.image.extent(), populated.image.extent());
        // The locator spans the image, not the key.
        assert_ne!(single.image.extent(), &k.extent());
    }

    #[test]
    fn test_image_layer_mercator_on_plate_carre_map() {
        let map = Map::new(MapOptions::new(MapCoordinateSystem::Projected, Profile::global_geodetic()));
        map.add_layer(mercator_layer("web", MapLayerOptions::new("web"))).unwrap();
        let factory = TileFactory::default();

        let layers = map.read_layers();
        let single = factory
            .create_image_layer(&map, &layers.image_layers()[0], &key(3, 5, 1), None)
            .unwrap();
        assert!(matches!(single.locator, Locator::Mercator(_)));
    }

    #[test]
    fn test_image_layer_without_fast_path_is_reprojected() {
        let map = Map::new(MapOptions::default());
        let options = MapLayerOptions::new("web").with_mercator_fast_path(false);
        map.add_layer(mercator_layer("web", options)).unwrap();
        let factory = TileFactory::default();
        let k = key(3, 5, 1);

        let layers = map.read_layers();
        let single = factory
            .create_image_layer(&map, &layers.image_layers()[0], &k, None)
            .unwrap();
        assert!(matches!(single.locator, Locator::Geo(_)));
        assert!(!single.image.srs().is_mercator());
        assert_eq!(single.image.extent(), &k.extent());
    }

    #[test]
    fn test_placeholder_ranges_and_skirt() {
        let map = Map::new(MapOptions::default());
        map.add_layer(dem_layer("dem")).unwrap();
        let terrain = CustomTerrain::new();
        let factory = TileFactory::new(sequential_options());

        let _parent = factory.create_tile(&map, &terrain, &key(1, 0, 0), true, true, false);
        let created = factory.create_tile(&map, &terrain, &key(2, 1, 0), false, true, false);
        let node = created.node.unwrap();
        let plod = node.as_paged().unwrap();
        let tile = plod.tile();
        let radius = tile.bound().radius;

        let (min_range, max_range) = plod.tile_range();
        assert_relative_eq!(min_range, radius * 6.0, max_relative = 1e-9);
        assert_eq!(max_range, MAX_TILE_RANGE);

        let layers = tile.read_layers();
        let skirt = layers.elevation.as_ref().unwrap().heightfield.skirt_height();
        assert_relative_eq!(skirt as f64, radius * 0.05, max_relative = 1e-4);
    }

    #[test]
    fn test_async_root_tiles_skip_layer_requests() {
        let map = Map::new(MapOptions::default());
        map.add_layer(color_layer("base", [1, 2, 3, 255])).unwrap();
        map.add_layer(dem_layer("dem")).unwrap();
        let terrain = CustomTerrain::new();
        let factory = TileFactory::new(sequential_options());

        let root = factory.create_tile(&map, &terrain, &key(0, 0, 0), true, true, false);
        let node = root.node.unwrap();
        let plod = node.as_paged().unwrap();
        assert!(!plod.tile().use_layer_requests());
        assert!(!plod.tile().has_elevation_hint());
        assert!(!plod.requires_backfill());

        let child = factory.create_tile(&map, &terrain, &key(1, 0, 0), true, true, false);
        let node = child.node.unwrap();
        let plod = node.as_paged().unwrap();
        assert!(plod.tile().use_layer_requests());
        assert!(plod.requires_backfill());
    }
}
