//! Async entry points for hosts running on tokio.
//!
//! Tile builds are CPU bound and take blocking locks, so under the
//! `tokio-runtime` feature they are moved onto the blocking pool. Without
//! the feature the same functions run the work inline.

use std::sync::Arc;

use crate::{
    core::{map::Map, tile_key::TileKey},
    terrain::{
        factory::{CreatedTile, TileFactory},
        node::TileNode,
        registry::CustomTerrain,
    },
    Result,
};

/// Runs a CPU-intensive task off the async executor.
pub async fn execute_blocking<F, R>(task: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    #[cfg(feature = "tokio-runtime")]
    {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| crate::Error::Task(format!("Task execution failed: {}", e)))?
    }

    #[cfg(not(feature = "tokio-runtime"))]
    {
        task()
    }
}

/// [`TileFactory::create_tile`] without blocking the caller's executor.
pub async fn build_tile_async(
    factory: Arc<TileFactory>,
    map: Arc<Map>,
    terrain: Arc<CustomTerrain>,
    key: TileKey,
    populate_layers: bool,
    fallback: bool,
) -> Result<CreatedTile> {
    execute_blocking(move || {
        Ok(factory.create_tile(&map, &terrain, &key, populate_layers, true, fallback))
    })
    .await
}

/// [`TileFactory::create_sub_tiles`] without blocking the caller's executor.
pub async fn build_sub_tiles_async(
    factory: Arc<TileFactory>,
    map: Arc<Map>,
    terrain: Arc<CustomTerrain>,
    key: TileKey,
    populate_layers: bool,
) -> Result<Option<TileNode>> {
    execute_blocking(move || Ok(factory.create_sub_tiles(&map, &terrain, &key, populate_layers))).await
}
