//! Paging and backfill.
//!
//! [`TilePager`] keeps the root tiles of a terrain, resolves the child URIs
//! advertised by visible paged nodes into sub-tile builds on a worker pool,
//! and once per frame services the pending layer requests of tiles that
//! were built from placeholder data.
//!
//! Backfill runs in two phases. [`TileBackfill::collect_pending`] only
//! reads tile state and decides what to request. [`TileBackfill::commit`]
//! later installs finished layers under each tile's write lock.

use std::sync::Arc;

use log::{debug, info};

use crate::{
    background::tasks::{BackgroundTaskManager, TaskId, TaskManagerConfig, TaskPriority},
    core::{config::LoadingMode, map::Map, tile_key::TileId},
    prelude::{HashMap, HashSet},
    terrain::{
        factory::TileFactory,
        node::{LodView, TileNode},
        registry::CustomTerrain,
        tile::{CustomTile, HeightFieldLayer, ImageLayer},
        uri::parse_child_uri,
    },
    Error, Result,
};

/// Which part of a tile a layer request replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestSlot {
    Elevation,
    Color(usize),
}

/// A layer the tile still shows fallback data for.
#[derive(Debug, Clone)]
pub struct LayerRequest {
    pub tile: Arc<CustomTile>,
    pub slot: RequestSlot,
    /// Terrain revision the request was made under.
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub enum LayerData {
    Elevation(HeightFieldLayer),
    Color(ImageLayer),
}

/// A finished layer request. `data` is `None` when the layer had nothing
/// better to offer.
#[derive(Debug, Clone)]
pub struct LayerResponse {
    pub request: LayerRequest,
    pub data: Option<LayerData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// Nothing better exists; the slot is not requested again.
    Settled,
    /// The layer stack changed since the request was made.
    Stale,
}

/// Tracks the layer requests of tiles built with `use_layer_requests`.
#[derive(Debug)]
pub struct TileBackfill {
    mode: LoadingMode,
    in_flight: HashSet<(TileId, RequestSlot)>,
    settled: HashSet<(TileId, RequestSlot)>,
}

impl TileBackfill {
    pub fn new(mode: LoadingMode) -> Self {
        Self {
            mode,
            in_flight: HashSet::default(),
            settled: HashSet::default(),
        }
    }

    pub fn mode(&self) -> LoadingMode {
        self.mode
    }

    /// Query phase: the requests `tiles` still need. Sequential loading asks
    /// for one layer per tile at a time, elevation first; preemptive loading
    /// asks for everything at once. Stale tiles are skipped.
    pub fn collect_pending(
        &self,
        map: &Map,
        terrain: &CustomTerrain,
        tiles: &[Arc<CustomTile>],
    ) -> Vec<LayerRequest> {
        let revision = terrain.revision();
        let num_image_layers = map.read_layers().image_layers().len();
        let mut requests = Vec::new();

        for tile in tiles {
            if !tile.use_layer_requests() || tile.terrain_revision() != revision {
                continue;
            }
            let id = tile.tile_id();
            if self.mode == LoadingMode::Sequential
                && self.in_flight.iter().any(|(busy, _)| *busy == id)
            {
                continue;
            }

            let level = tile.key().level() as i32;
            let layers = tile.read_layers();
            let mut slots = Vec::new();
            if tile.has_elevation_hint() && layers.elevation_lod < level {
                slots.push(RequestSlot::Elevation);
            }
            for index in 0..num_image_layers {
                let fallback = layers
                    .color_layer(index)
                    .map_or(true, |layer| layer.is_fallback(tile.key().level()));
                if fallback {
                    slots.push(RequestSlot::Color(index));
                }
            }
            drop(layers);

            let open = slots.into_iter().filter(|slot| {
                !self.in_flight.contains(&(id, *slot)) && !self.settled.contains(&(id, *slot))
            });
            let take = if self.mode == LoadingMode::Sequential { 1 } else { usize::MAX };
            requests.extend(open.take(take).map(|slot| LayerRequest {
                tile: tile.clone(),
                slot,
                revision,
            }));
        }
        requests
    }

    pub fn mark_submitted(&mut self, request: &LayerRequest) {
        self.in_flight.insert((request.tile.tile_id(), request.slot));
    }

    /// Forgets a request whose task produced nothing, so a later frame asks
    /// again.
    pub fn release(&mut self, request: &LayerRequest) {
        self.in_flight.remove(&(request.tile.tile_id(), request.slot));
    }

    /// Commit phase: installs a finished layer into its tile.
    pub fn commit(&mut self, terrain: &CustomTerrain, response: LayerResponse) -> CommitOutcome {
        let LayerResponse { request, data } = response;
        let id = request.tile.tile_id();
        self.in_flight.remove(&(id, request.slot));

        let revision = terrain.revision();
        if request.revision != revision || request.tile.terrain_revision() != revision {
            debug!("dropping stale {:?} result for {}", request.slot, id);
            return CommitOutcome::Stale;
        }

        self.settled.insert((id, request.slot));
        let Some(data) = data else {
            return CommitOutcome::Settled;
        };

        {
            let mut layers = request.tile.write_layers();
            match (request.slot, data) {
                (RequestSlot::Elevation, LayerData::Elevation(elevation)) => {
                    layers.elevation = Some(elevation);
                    layers.elevation_lod = request.tile.key().level() as i32;
                }
                (RequestSlot::Color(index), LayerData::Color(image)) => {
                    layers.set_color_layer(index, image);
                }
                (slot, _) => {
                    debug!("mismatched layer data for {:?} of {}", slot, id);
                    return CommitOutcome::Settled;
                }
            }
        }
        request.tile.technique().mark_dirty();
        CommitOutcome::Applied
    }

    /// Forgets request state of tiles no longer alive in `terrain`.
    pub fn retain_live(&mut self, terrain: &CustomTerrain) {
        let live: HashSet<TileId> = terrain.live_tiles().iter().map(|t| t.tile_id()).collect();
        self.settled.retain(|(id, _)| live.contains(id));
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Produces the data for one layer request. Runs on a worker thread.
pub fn execute_layer_request(factory: &TileFactory, map: &Map, request: LayerRequest) -> LayerResponse {
    let key = request.tile.key().clone();
    let data = match request.slot {
        RequestSlot::Elevation => factory
            .create_height_field_layer(map, &key, true)
            .map(|mut elevation| {
                let skirt = request.tile.bound().radius * factory.options().height_field_skirt_ratio;
                elevation.heightfield.set_skirt_height(skirt as f32);
                LayerData::Elevation(elevation)
            }),
        RequestSlot::Color(index) => {
            let layers = map.read_layers();
            layers
                .image_layers()
                .get(index)
                .and_then(|layer| factory.create_image_layer(map, layer, &key, None))
                .map(LayerData::Color)
        }
    };
    LayerResponse { request, data }
}

/// What a submitted task was for, kept until its result arrives.
#[derive(Debug)]
enum PendingWork {
    Children(String),
    Layer(LayerRequest),
}

#[derive(Debug)]
enum PagerOutput {
    SubTiles {
        uri: String,
        revision: u64,
        node: Option<TileNode>,
    },
    Layer(LayerResponse),
}

/// Counters for one [`TilePager::frame`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub visible_tiles: usize,
    pub culled_nodes: usize,
    pub requested_children: usize,
    pub loaded_children: usize,
    pub failed_children: usize,
    pub requested_layers: usize,
    pub applied_layers: usize,
    pub failed_layers: usize,
    pub stale_results: usize,
}

/// Drives a terrain: owns its root tiles and everything paged in below them.
pub struct TilePager {
    map: Arc<Map>,
    terrain: Arc<CustomTerrain>,
    factory: Arc<TileFactory>,
    workers: BackgroundTaskManager<PagerOutput>,
    roots: Vec<TileNode>,
    loaded: HashMap<String, TileNode>,
    requested: HashSet<String>,
    pending: HashMap<TaskId, PendingWork>,
    backfill: TileBackfill,
    populate_layers: bool,
    map_revision: u64,
    visible: Vec<Arc<CustomTile>>,
}

impl TilePager {
    /// A pager with one worker pool sized from the factory's loading policy.
    pub fn new(map: Arc<Map>, terrain: Arc<CustomTerrain>, factory: Arc<TileFactory>) -> Self {
        let config = TaskManagerConfig {
            num_threads: factory.options().loading_policy.worker_threads(),
            ..Default::default()
        };
        Self::with_task_config(map, terrain, factory, config)
    }

    pub fn with_task_config(
        map: Arc<Map>,
        terrain: Arc<CustomTerrain>,
        factory: Arc<TileFactory>,
        config: TaskManagerConfig,
    ) -> Self {
        let policy = &factory.options().loading_policy;
        let mode = policy.mode;
        info!(
            "pager for terrain {} using {} loading on {} workers",
            terrain.engine_id(),
            mode,
            if config.test_mode { 0 } else { config.num_threads }
        );

        let roots = factory.create_root_tiles(&map, &terrain);
        let map_revision = map.revision();
        Self {
            populate_layers: !policy.is_async(),
            workers: BackgroundTaskManager::new(config),
            backfill: TileBackfill::new(mode),
            roots,
            loaded: HashMap::default(),
            requested: HashSet::default(),
            pending: HashMap::default(),
            map_revision,
            visible: Vec::new(),
            map,
            terrain,
            factory,
        }
    }

    pub fn map(&self) -> &Arc<Map> {
        &self.map
    }

    pub fn terrain(&self) -> &Arc<CustomTerrain> {
        &self.terrain
    }

    pub fn factory(&self) -> &Arc<TileFactory> {
        &self.factory
    }

    pub fn roots(&self) -> &[TileNode] {
        &self.roots
    }

    /// Tiles drawn by the last frame.
    pub fn visible_tiles(&self) -> &[Arc<CustomTile>] {
        &self.visible
    }

    /// Number of child URIs resolved into sub-tiles.
    pub fn loaded_children(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_loaded(&self, uri: &str) -> bool {
        self.loaded.contains_key(uri)
    }

    /// Whether no sub-tile build or layer request is outstanding.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && !self.workers.has_pending_results()
    }

    /// Schedules the sub-tile build a child URI stands for.
    pub fn request(&mut self, uri: &str, priority: TaskPriority) -> Result<TaskId> {
        let (engine_id, key) = parse_child_uri(uri, self.map.profile().clone())?;
        if engine_id != self.terrain.engine_id() {
            return Err(Error::InvalidUri(format!(
                "'{}' belongs to terrain {}, not {}",
                uri,
                engine_id,
                self.terrain.engine_id()
            )));
        }

        let map = self.map.clone();
        let terrain = self.terrain.clone();
        let factory = self.factory.clone();
        let populate = self.populate_layers;
        let owned_uri = uri.to_string();
        let id = self.workers.submit(priority, move || {
            let revision = terrain.revision();
            let node = factory.create_sub_tiles(&map, &terrain, &key, populate);
            Ok(PagerOutput::SubTiles {
                uri: owned_uri,
                revision,
                node,
            })
        })?;
        self.requested.insert(uri.to_string());
        self.pending.insert(id, PendingWork::Children(uri.to_string()));
        Ok(id)
    }

    /// Advances one frame as seen from `view`.
    ///
    /// Applies finished work, walks the tile tree choosing what to draw and
    /// which children to request, and schedules layer requests for the
    /// visible tiles.
    pub fn frame(&mut self, view: &LodView) -> FrameStats {
        let mut stats = FrameStats::default();

        let map_revision = self.map.revision();
        if map_revision != self.map_revision {
            self.map_revision = map_revision;
            let revision = self.terrain.bump_revision();
            info!("map changed, terrain {} now at revision {}", self.terrain.engine_id(), revision);
            self.loaded.clear();
            self.requested.clear();
            self.visible.clear();
            self.roots = self.factory.create_root_tiles(&self.map, &self.terrain);
        }

        self.drain_results(&mut stats);

        let mut visit = Visit::default();
        for root in &self.roots {
            self.traverse(root, view, &mut visit);
        }
        stats.visible_tiles = visit.tiles.len();
        stats.culled_nodes = visit.culled;

        for uri in visit.wanted {
            if self.requested.contains(&uri) || self.factory.blacklist().contains(&uri) {
                continue;
            }
            match self.request(&uri, TaskPriority::Normal) {
                Ok(_) => stats.requested_children += 1,
                Err(e) => debug!("not requesting '{}': {}", uri, e),
            }
        }

        let pending = self.backfill.collect_pending(&self.map, &self.terrain, &visit.tiles);
        for request in pending {
            let map = self.map.clone();
            let factory = self.factory.clone();
            let submitted = request.clone();
            let job = move || Ok(PagerOutput::Layer(execute_layer_request(&factory, &map, request)));
            match self.workers.submit(TaskPriority::High, job) {
                Ok(id) => {
                    self.backfill.mark_submitted(&submitted);
                    self.pending.insert(id, PendingWork::Layer(submitted));
                    stats.requested_layers += 1;
                }
                Err(e) => debug!("layer request for {} not submitted: {}", submitted.tile.key(), e),
            }
        }

        self.visible = visit.tiles;
        stats
    }

    fn drain_results(&mut self, stats: &mut FrameStats) {
        let mut drained = false;
        for result in self.workers.try_recv_results() {
            drained = true;
            let work = self.pending.remove(&result.task_id);
            let output = match result.result {
                Ok(output) => output,
                Err(e) => {
                    debug!("task {} failed: {}", result.task_id, e);
                    match work {
                        Some(PendingWork::Children(uri)) => {
                            self.requested.remove(&uri);
                            self.factory.blacklist().record_failure(&uri);
                            stats.failed_children += 1;
                        }
                        Some(PendingWork::Layer(request)) => {
                            self.backfill.release(&request);
                            stats.failed_layers += 1;
                        }
                        None => {}
                    }
                    continue;
                }
            };

            match output {
                PagerOutput::SubTiles { uri, revision, node } => {
                    self.requested.remove(&uri);
                    if revision != self.terrain.revision() {
                        stats.stale_results += 1;
                        continue;
                    }
                    let blacklist = self.factory.blacklist();
                    match node {
                        Some(node) => {
                            blacklist.record_success(&uri);
                            self.loaded.insert(uri, node);
                            stats.loaded_children += 1;
                        }
                        None => {
                            blacklist.record_failure(&uri);
                            stats.failed_children += 1;
                        }
                    }
                }
                PagerOutput::Layer(response) => match self.backfill.commit(&self.terrain, response) {
                    CommitOutcome::Applied => stats.applied_layers += 1,
                    CommitOutcome::Stale => stats.stale_results += 1,
                    CommitOutcome::Settled => {}
                },
            }
        }

        if drained {
            self.terrain.purge_expired();
            self.backfill.retain_live(&self.terrain);
        }
    }

    fn traverse(&self, node: &TileNode, view: &LodView, visit: &mut Visit) {
        match node {
            TileNode::Tile(tile) => visit.tiles.push(tile.clone()),
            TileNode::Group(children) => {
                for child in children.iter().flatten() {
                    self.traverse(child, view, visit);
                }
            }
            TileNode::Paged(plod) => {
                if plod.is_culled(&view.eye) {
                    visit.culled += 1;
                    return;
                }
                if plod.wants_child(view) {
                    if let Some(uri) = plod.child_uri() {
                        if let Some(children) = self.loaded.get(uri) {
                            self.traverse(children, view, visit);
                            return;
                        }
                        visit.wanted.push(uri.to_string());
                    }
                }
                visit.tiles.push(plod.tile().clone());
            }
        }
    }
}

impl std::fmt::Debug for TilePager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TilePager")
            .field("engine_id", &self.terrain.engine_id())
            .field("roots", &self.roots.len())
            .field("loaded", &self.loaded.len())
            .field("requested", &self.requested.len())
            .field("populate_layers", &self.populate_layers)
            .finish()
    }
}

#[derive(Default)]
struct Visit {
    tiles: Vec<Arc<CustomTile>>,
    wanted: Vec<String>,
    culled: usize,
}
