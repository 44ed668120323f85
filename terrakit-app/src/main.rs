use std::time::Duration;

use anyhow::{bail, Context};
use log::info;
use terrakit::{
    prelude::*,
    runtime::build_tile_async,
    terrain::{node::LodView, paging::FrameStats},
};

/// Pages a procedural globe under a descending eye and prints per-frame stats.
///
/// Usage: `terrakit-app [balanced|low|high|<options.json>] [frames]`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    terrakit::init_logging();

    let mut args = std::env::args().skip(1);
    let options = match args.next().as_deref() {
        None | Some("balanced") => TerrainPreset::Balanced.resolve(),
        Some("low") => TerrainPreset::LowResource.resolve(),
        Some("high") => TerrainPreset::HighQuality.resolve(),
        Some(path) => TerrainOptions::load(path).with_context(|| format!("loading options from {}", path))?,
    }
    .from_env_overrides();
    let frames: usize = match args.next() {
        Some(text) => text.parse().with_context(|| format!("invalid frame count '{}'", text))?,
        None => 60,
    };

    let map = Arc::new(Map::new(MapOptions::default()));
    map.add_layer(MapLayer::image(
        MapLayerOptions::new("ocean"),
        Arc::new(SolidColorSource::new("ocean", Profile::global_geodetic(), [16, 64, 160, 255])),
    ))?;
    map.add_layer(MapLayer::heightfield(
        MapLayerOptions::new("relief"),
        Arc::new(ProceduralElevationSource::new("relief", Profile::global_geodetic()).with_max_level(12)),
    ))?;

    let terrain = Arc::new(CustomTerrain::new());
    let factory = Arc::new(TileFactory::new(options));

    // A single tile built off the executor, the way a host would preload one.
    let sample_key = TileKey::new(2, 3, 1, Profile::global_geodetic());
    let created = build_tile_async(factory.clone(), map.clone(), terrain.clone(), sample_key.clone(), true, true).await?;
    if !created.valid_data {
        bail!("sample tile {} came back without data", sample_key);
    }
    info!("sample tile {} ready", sample_key);

    let mut pager = TilePager::new(map, terrain, factory);
    let ellipsoid = Ellipsoid::wgs84();
    let mut totals = FrameStats::default();

    for frame in 0..frames {
        let altitude = 20_000_000.0 * 0.9f64.powi(frame as i32);
        let eye = ellipsoid.lat_long_height_to_xyz(37.7f64.to_radians(), (-122.4f64).to_radians(), altitude);
        let stats = pager.frame(&LodView::at(eye));

        let deepest = pager.visible_tiles().iter().map(|t| t.key().level()).max().unwrap_or(0);
        println!(
            "frame {:>3}  alt {:>10.0} m  visible {:>4}  deepest {:>2}  loaded {:>3}  layers {:>3}",
            frame,
            altitude,
            stats.visible_tiles,
            deepest,
            stats.loaded_children,
            stats.applied_layers
        );

        totals.loaded_children += stats.loaded_children;
        totals.failed_children += stats.failed_children;
        totals.applied_layers += stats.applied_layers;
        totals.stale_results += stats.stale_results;
        tokio::time::sleep(Duration::from_millis(16)).await;
    }

    println!(
        "done: {} sub-tile groups loaded, {} failed, {} layers backfilled, {} stale, {} blacklisted",
        totals.loaded_children,
        totals.failed_children,
        totals.applied_layers,
        totals.stale_results,
        pager.factory().blacklist().len()
    );
    Ok(())
}
